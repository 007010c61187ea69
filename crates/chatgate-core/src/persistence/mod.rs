// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for chatgate-core.
//!
//! This module defines the persistence abstraction and backend implementations.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use crate::error::CoreError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Channel record from the persistence layer.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChannelRecord {
    /// Unique identifier for the channel.
    pub id: String,
    /// Conversation this channel is a member of.
    pub conversation_id: String,
    /// Provider name (`telegram`, ...) or `websocket`, `chatflow`, `portal`.
    pub kind: String,
    /// Internal user id (0 for external contacts).
    pub user_id: i64,
    /// Provider profile id, as text.
    pub connection: Option<String>,
    /// Recipient id on the provider side.
    pub external_user_id: Option<String>,
    /// Gateway node hint (short node id, or `[name@]host:port` for portals).
    pub host: Option<String>,
    /// When the channel joined the conversation.
    pub created_at: DateTime<Utc>,
    /// When the channel was closed.
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChannelRecord {
    /// New open channel with no host hint.
    pub fn new(
        id: impl Into<String>,
        conversation_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            conversation_id: conversation_id.into(),
            kind: kind.into(),
            user_id: 0,
            connection: None,
            external_user_id: None,
            host: None,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// Persistence interface used by the affinity stores, flow client and gateway dispatcher.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // conversation_node

    async fn read_conversation_node(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, CoreError>;

    async fn write_conversation_node(
        &self,
        conversation_id: &str,
        node_id: &str,
    ) -> Result<(), CoreError>;

    async fn delete_conversation_node(&self, conversation_id: &str) -> Result<(), CoreError>;

    // conversation_confirmation

    async fn read_confirmation(&self, conversation_id: &str) -> Result<Option<String>, CoreError>;

    async fn write_confirmation(
        &self,
        conversation_id: &str,
        confirmation_id: &str,
    ) -> Result<(), CoreError>;

    async fn delete_confirmation(&self, conversation_id: &str) -> Result<(), CoreError>;

    // channel

    async fn insert_channel(&self, channel: &ChannelRecord) -> Result<(), CoreError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>, CoreError>;

    /// Open channels of a conversation, oldest first.
    async fn list_open_channels(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChannelRecord>, CoreError>;

    /// Set or clear `channel.host`. Fails with `ChannelNotFound` for unknown ids.
    async fn update_channel_host(
        &self,
        channel_id: &str,
        host: Option<&str>,
    ) -> Result<(), CoreError>;

    /// Mark the channel closed and drop its host hint.
    async fn close_channel(
        &self,
        channel_id: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    async fn health_check_db(&self) -> Result<bool, CoreError>;
}
