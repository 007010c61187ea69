// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! RPC client that resolves a service through the registry, lets the caller
//! pick the node, and reports which node served the call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::registry::{Node, Registry};
use crate::rpc::{RpcRequest, RpcResponse};

/// Application error id the flow engine replies with when it holds no state
/// for the conversation.
pub const CONVERSATION_NOT_FOUND: &str = "grpc.chat.conversation.not_found";

/// Errors that can occur while issuing an RPC call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("no node available for service {service}")]
    NoneAvailable { service: String },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("application error [{id}]: {detail}")]
    Application { id: String, code: u16, detail: String },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ClientError {
    /// Application error id, when the remote side answered with one.
    pub fn application_id(&self) -> Option<&str> {
        match self {
            ClientError::Application { id, .. } => Some(id),
            _ => None,
        }
    }

    /// True when the flow engine reported it has no such conversation.
    pub fn is_conversation_not_found(&self) -> bool {
        self.application_id() == Some(CONVERSATION_NOT_FOUND)
    }
}

/// Delivers one request to one concrete node.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, node: &Node, request: RpcRequest) -> Result<RpcResponse, ClientError>;
}

/// Chooses one node out of the registry's candidates for a single call.
///
/// Returning `None` means the candidates were unusable; the client turns that
/// into [`ClientError::NoneAvailable`].
pub trait NodePicker: Send + Sync {
    fn pick<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node>;
}

/// Picks the first candidate. Handy for single-node setups and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstNode;

impl NodePicker for FirstNode {
    fn pick<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
        nodes.first()
    }
}

/// Successful call result tagged with the node that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Served<T> {
    pub node: Node,
    pub response: T,
}

impl<T> Served<T> {
    /// Replace the payload, keeping the serving node.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            node: self.node,
            response: f(self.response),
        }
    }
}

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Upper bound for one call, including node lookup
    pub call_timeout_ms: u64,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
        }
    }
}

/// RPC client bound to one logical service name.
#[derive(Clone)]
pub struct RpcClient {
    service: String,
    registry: Arc<dyn Registry>,
    transport: Arc<dyn Transport>,
    config: RpcClientConfig,
}

impl RpcClient {
    pub fn new(
        service: impl Into<String>,
        registry: Arc<dyn Registry>,
        transport: Arc<dyn Transport>,
        config: RpcClientConfig,
    ) -> Self {
        Self {
            service: service.into(),
            registry,
            transport,
            config,
        }
    }

    /// Logical service name this client resolves.
    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn config(&self) -> &RpcClientConfig {
        &self.config
    }

    /// Client for another service sharing this client's registry and transport.
    pub fn with_service(&self, service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            registry: self.registry.clone(),
            transport: self.transport.clone(),
            config: self.config.clone(),
        }
    }

    /// Resolve the service, let `picker` choose a node and send `request` to it.
    ///
    /// The whole call is bounded by `call_timeout_ms`. Application errors are
    /// returned exactly as the transport reported them.
    #[instrument(skip(self, picker, request), fields(service = %self.service))]
    pub async fn call(
        &self,
        picker: &dyn NodePicker,
        request: RpcRequest,
    ) -> Result<Served<RpcResponse>, ClientError> {
        let timeout = Duration::from_millis(self.config.call_timeout_ms);
        tokio::time::timeout(timeout, self.dispatch(picker, request))
            .await
            .map_err(|_| ClientError::Timeout(self.config.call_timeout_ms))?
    }

    async fn dispatch(
        &self,
        picker: &dyn NodePicker,
        request: RpcRequest,
    ) -> Result<Served<RpcResponse>, ClientError> {
        let nodes = self.registry.lookup(&self.service).await?;
        let node = picker
            .pick(&nodes)
            .cloned()
            .ok_or_else(|| ClientError::NoneAvailable {
                service: self.service.clone(),
            })?;

        debug!(node_id = %node.id, addr = %node.address, method = request.method(), "sending request");
        let response = self.transport.call(&node, request).await?;
        Ok(Served { node, response })
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("service", &self.service)
            .field("config", &self.config)
            .finish()
    }
}
