// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable subject -> node mapping.
//!
//! Two views over one [`Persistence`] backend: conversations keep their flow
//! engine node in `conversation_node`, channels keep their gateway node in
//! `channel.host`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::persistence::Persistence;

/// Durable affinity record store keyed by subject id.
#[async_trait]
pub trait AffinityStore: Send + Sync {
    /// Node of `subject_id`; `None` when no record exists.
    async fn read(&self, subject_id: &str) -> Result<Option<String>, CoreError>;

    /// Create or overwrite the record.
    async fn write(&self, subject_id: &str, node_id: &str) -> Result<(), CoreError>;

    /// Remove the record; no-op if absent.
    async fn delete(&self, subject_id: &str) -> Result<(), CoreError>;
}

/// Conversation affinity, backed by `conversation_node`.
#[derive(Clone)]
pub struct ConversationNodes {
    persistence: Arc<dyn Persistence>,
}

impl ConversationNodes {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl AffinityStore for ConversationNodes {
    async fn read(&self, subject_id: &str) -> Result<Option<String>, CoreError> {
        self.persistence.read_conversation_node(subject_id).await
    }

    async fn write(&self, subject_id: &str, node_id: &str) -> Result<(), CoreError> {
        self.persistence
            .write_conversation_node(subject_id, node_id)
            .await
    }

    async fn delete(&self, subject_id: &str) -> Result<(), CoreError> {
        self.persistence.delete_conversation_node(subject_id).await
    }
}

/// Channel affinity, backed by the `channel.host` column.
#[derive(Clone)]
pub struct ChannelHosts {
    persistence: Arc<dyn Persistence>,
}

impl ChannelHosts {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl AffinityStore for ChannelHosts {
    async fn read(&self, subject_id: &str) -> Result<Option<String>, CoreError> {
        let channel = self.persistence.get_channel(subject_id).await?;
        Ok(channel
            .and_then(|channel| channel.host)
            .filter(|host| !host.is_empty()))
    }

    async fn write(&self, subject_id: &str, node_id: &str) -> Result<(), CoreError> {
        self.persistence
            .update_channel_host(subject_id, Some(node_id))
            .await
    }

    async fn delete(&self, subject_id: &str) -> Result<(), CoreError> {
        match self.persistence.update_channel_host(subject_id, None).await {
            Err(CoreError::ChannelNotFound { .. }) => Ok(()),
            other => other,
        }
    }
}
