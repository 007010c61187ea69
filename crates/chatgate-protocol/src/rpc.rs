// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response envelopes carried by a [`Transport`](crate::Transport).

use serde::{Deserialize, Serialize};

use crate::client::ClientError;
use crate::flow_proto::{
    BreakBridgeRequest, BreakBridgeResponse, BreakRequest, BreakResponse,
    ConfirmationMessageRequest, ConfirmationMessageResponse, StartRequest, StartResponse,
};
use crate::gateway_proto::{SendMessageRequest, SendMessageResponse};
use crate::portal_proto::{Update, UpdateResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body")]
pub enum RpcRequest {
    Start(StartRequest),
    Break(BreakRequest),
    BreakBridge(BreakBridgeRequest),
    ConfirmationMessage(ConfirmationMessageRequest),
    SendMessage(SendMessageRequest),
    OnUpdate(Update),
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::Start(_) => "Start",
            RpcRequest::Break(_) => "Break",
            RpcRequest::BreakBridge(_) => "BreakBridge",
            RpcRequest::ConfirmationMessage(_) => "ConfirmationMessage",
            RpcRequest::SendMessage(_) => "SendMessage",
            RpcRequest::OnUpdate(_) => "OnUpdate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body")]
pub enum RpcResponse {
    Start(StartResponse),
    Break(BreakResponse),
    BreakBridge(BreakBridgeResponse),
    ConfirmationMessage(ConfirmationMessageResponse),
    SendMessage(SendMessageResponse),
    OnUpdate(UpdateResponse),
}

impl RpcResponse {
    pub fn method(&self) -> &'static str {
        match self {
            RpcResponse::Start(_) => "Start",
            RpcResponse::Break(_) => "Break",
            RpcResponse::BreakBridge(_) => "BreakBridge",
            RpcResponse::ConfirmationMessage(_) => "ConfirmationMessage",
            RpcResponse::SendMessage(_) => "SendMessage",
            RpcResponse::OnUpdate(_) => "OnUpdate",
        }
    }

    /// Empty acknowledgement matching `request`.
    pub fn empty_for(request: &RpcRequest) -> Self {
        match request {
            RpcRequest::Start(_) => RpcResponse::Start(StartResponse::default()),
            RpcRequest::Break(_) => RpcResponse::Break(BreakResponse::default()),
            RpcRequest::BreakBridge(_) => {
                RpcResponse::BreakBridge(BreakBridgeResponse::default())
            }
            RpcRequest::ConfirmationMessage(_) => {
                RpcResponse::ConfirmationMessage(ConfirmationMessageResponse::default())
            }
            RpcRequest::SendMessage(_) => {
                RpcResponse::SendMessage(SendMessageResponse::default())
            }
            RpcRequest::OnUpdate(_) => RpcResponse::OnUpdate(UpdateResponse::default()),
        }
    }

    /// Fail unless this is the answer to a `method` call.
    pub fn expect(self, method: &'static str) -> Result<Self, ClientError> {
        if self.method() == method {
            Ok(self)
        } else {
            Err(ClientError::UnexpectedResponse(format!(
                "expected {method}, got {}",
                self.method()
            )))
        }
    }

    pub fn into_send_message(self) -> Result<SendMessageResponse, ClientError> {
        match self {
            RpcResponse::SendMessage(response) => Ok(response),
            other => Err(ClientError::UnexpectedResponse(format!(
                "expected SendMessage, got {}",
                other.method()
            ))),
        }
    }
}
