// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chatgate Protocol - RPC contracts between the chat gateway and its peers
//!
//! This crate describes the calls the gateway makes into the cluster:
//! - Flow engine calls (start, break, break bridge, confirmation message)
//! - Bot gateway calls (send message, returning provider bindings)
//! - Portal calls (push update to an internal portal instance)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    chatgate-protocol                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RpcClient: registry lookup -> NodePicker -> Transport      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Messages: flow_proto / gateway_proto / portal_proto        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: pluggable (trait), reports the serving node     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wire format is not fixed here. A [`Transport`] implementation only has
//! to deliver an [`RpcRequest`] to the chosen [`Node`] and hand back the
//! [`RpcResponse`]; [`RpcClient`] reports which node served each successful
//! call through [`Served`], which is what affinity routing depends on.
//!
//! # Usage
//!
//! ```ignore
//! use chatgate_protocol::{FirstNode, RpcClient, RpcClientConfig, RpcRequest, flow_proto};
//!
//! let client = RpcClient::new("workflow", registry, transport, RpcClientConfig::default());
//!
//! let request = RpcRequest::Break(flow_proto::BreakRequest {
//!     conversation_id: "conv-1".to_string(),
//!     cause: "operator closed".to_string(),
//! });
//!
//! let served = client.call(&FirstNode, request).await?;
//! println!("served by {}", served.node.id);
//! ```

pub mod client;
pub mod registry;
pub mod rpc;

/// Message shared by every service: a chat message as the gateway sees it.
pub mod chat_proto;

/// Flow engine protocol messages.
pub mod flow_proto;

/// Bot gateway protocol messages.
pub mod gateway_proto;

/// Portal protocol messages.
pub mod portal_proto;

pub use client::{ClientError, FirstNode, NodePicker, RpcClient, RpcClientConfig, Served, Transport};
pub use registry::{Node, Registry, StaticRegistry};
pub use rpc::{RpcRequest, RpcResponse};
