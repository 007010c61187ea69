// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Chatgate Core - conversation-to-node affinity routing
//!
//! Flow engine instances keep per-conversation state in memory, and provider
//! bot gateways keep per-channel webhook sessions. Every call for a
//! conversation (or channel) must therefore keep landing on the node that
//! served it last. This crate remembers that node, biases node selection
//! toward it, reconciles the node that actually answered after each call, and
//! persists the result so it survives restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │   ConversationChannel    │      │    GatewayDispatcher     │
//! │  start / break / confirm │      │  send / push / broadcast │
//! └────────────┬─────────────┘      └────────────┬─────────────┘
//!              │ per-subject lock                │
//!              ▼                                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  AffinityClient::invoke                                     │
//! │  peer() -> PreferredNode pick -> RpcClient call -> reconcile│
//! └────────────┬───────────────────────────────┬────────────────┘
//!              │ HOSTED / RE-HOST write-through │
//!              ▼                                ▼
//! ┌──────────────────────────┐      ┌──────────────────────────┐
//! │  ConversationNodes       │      │  ChannelHosts            │
//! │  conversation_node table │      │  channel.host column     │
//! └──────────────────────────┘      └──────────────────────────┘
//! ```
//!
//! # Transitions
//!
//! | Transition | When | Store |
//! |------------|------|-------|
//! | HOSTED | first successful call | written |
//! | SAME | same node answered | untouched |
//! | RE-HOST | another node answered | written |
//! | LOST | call failed or was cancelled | untouched (memory cleared) |
//!
//! # Storage
//!
//! PostgreSQL and SQLite backends implement [`persistence::Persistence`];
//! schemas ship as embedded [`migrations`].

/// Affinity reconciliation and the routed RPC client.
pub mod affinity;

/// Configuration loading from environment variables.
pub mod config;

/// Error types.
pub mod error;

/// Flow engine client (one handle per conversation).
pub mod flow;

/// Outbound delivery to bot gateways and portals.
pub mod gateway;

/// Embedded database migrations.
pub mod migrations;

/// Persistence trait and backends.
pub mod persistence;

/// Builder wiring everything together.
pub mod runtime;

/// Preferred-node selection and fallback strategies.
pub mod selector;

/// Durable affinity record stores.
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use affinity::{AffinityClient, AffinityHandle, CallOutcome, Transition, reconcile};
pub use error::{CoreError, RouteError};
pub use flow::{Confirmation, Conversation, ConversationChannel, FlowClient};
pub use gateway::{Broadcast, GatewayChannel, GatewayDispatcher, merge_bindings};
pub use runtime::{ChatGateway, ChatGatewayBuilder};

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `chatgate_core=info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatgate_core=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
