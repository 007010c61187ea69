// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::CoreError;

use super::{ChannelRecord, Persistence};

/// PostgreSQL-backed persistence provider.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new PostgreSQL persistence provider.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn read_conversation_node(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, CoreError> {
        read_conversation_node(&self.pool, conversation_id).await
    }

    async fn write_conversation_node(
        &self,
        conversation_id: &str,
        node_id: &str,
    ) -> Result<(), CoreError> {
        write_conversation_node(&self.pool, conversation_id, node_id).await
    }

    async fn delete_conversation_node(&self, conversation_id: &str) -> Result<(), CoreError> {
        delete_conversation_node(&self.pool, conversation_id).await
    }

    async fn read_confirmation(&self, conversation_id: &str) -> Result<Option<String>, CoreError> {
        read_confirmation(&self.pool, conversation_id).await
    }

    async fn write_confirmation(
        &self,
        conversation_id: &str,
        confirmation_id: &str,
    ) -> Result<(), CoreError> {
        write_confirmation(&self.pool, conversation_id, confirmation_id).await
    }

    async fn delete_confirmation(&self, conversation_id: &str) -> Result<(), CoreError> {
        delete_confirmation(&self.pool, conversation_id).await
    }

    async fn insert_channel(&self, channel: &ChannelRecord) -> Result<(), CoreError> {
        insert_channel(&self.pool, channel).await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>, CoreError> {
        get_channel(&self.pool, channel_id).await
    }

    async fn list_open_channels(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChannelRecord>, CoreError> {
        list_open_channels(&self.pool, conversation_id).await
    }

    async fn update_channel_host(
        &self,
        channel_id: &str,
        host: Option<&str>,
    ) -> Result<(), CoreError> {
        update_channel_host(&self.pool, channel_id, host).await
    }

    async fn close_channel(
        &self,
        channel_id: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        close_channel(&self.pool, channel_id, closed_at).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        health_check_db(&self.pool).await
    }
}

// ============================================================================
// Conversation affinity
// ============================================================================

/// Short id of the node that last served the conversation.
pub async fn read_conversation_node(
    pool: &PgPool,
    conversation_id: &str,
) -> Result<Option<String>, CoreError> {
    let node_id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT node_id
        FROM conversation_node
        WHERE conversation_id = $1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    Ok(node_id)
}

/// Upsert the conversation's node.
pub async fn write_conversation_node(
    pool: &PgPool,
    conversation_id: &str,
    node_id: &str,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO conversation_node (conversation_id, node_id, updated_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (conversation_id) DO UPDATE
        SET node_id = EXCLUDED.node_id,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(conversation_id)
    .bind(node_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_conversation_node(pool: &PgPool, conversation_id: &str) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM conversation_node WHERE conversation_id = $1")
        .bind(conversation_id)
        .execute(pool)
        .await?;

    Ok(())
}

// ============================================================================
// Confirmation tokens
// ============================================================================

pub async fn read_confirmation(
    pool: &PgPool,
    conversation_id: &str,
) -> Result<Option<String>, CoreError> {
    let confirmation_id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT confirmation_id
        FROM conversation_confirmation
        WHERE conversation_id = $1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    Ok(confirmation_id)
}

pub async fn write_confirmation(
    pool: &PgPool,
    conversation_id: &str,
    confirmation_id: &str,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO conversation_confirmation (conversation_id, confirmation_id, created_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (conversation_id) DO UPDATE
        SET confirmation_id = EXCLUDED.confirmation_id,
            created_at = EXCLUDED.created_at
        "#,
    )
    .bind(conversation_id)
    .bind(confirmation_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_confirmation(pool: &PgPool, conversation_id: &str) -> Result<(), CoreError> {
    sqlx::query("DELETE FROM conversation_confirmation WHERE conversation_id = $1")
        .bind(conversation_id)
        .execute(pool)
        .await?;

    Ok(())
}

// ============================================================================
// Channels
// ============================================================================

pub async fn insert_channel(pool: &PgPool, channel: &ChannelRecord) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO channel (id, conversation_id, kind, user_id, connection,
                             external_user_id, host, created_at, closed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&channel.id)
    .bind(&channel.conversation_id)
    .bind(&channel.kind)
    .bind(channel.user_id)
    .bind(&channel.connection)
    .bind(&channel.external_user_id)
    .bind(&channel.host)
    .bind(channel.created_at)
    .bind(channel.closed_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_channel(pool: &PgPool, channel_id: &str) -> Result<Option<ChannelRecord>, CoreError> {
    let record = sqlx::query_as::<_, ChannelRecord>(
        r#"
        SELECT id, conversation_id, kind, user_id, connection,
               external_user_id, host, created_at, closed_at
        FROM channel
        WHERE id = $1
        "#,
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

pub async fn list_open_channels(
    pool: &PgPool,
    conversation_id: &str,
) -> Result<Vec<ChannelRecord>, CoreError> {
    let records = sqlx::query_as::<_, ChannelRecord>(
        r#"
        SELECT id, conversation_id, kind, user_id, connection,
               external_user_id, host, created_at, closed_at
        FROM channel
        WHERE conversation_id = $1 AND closed_at IS NULL
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}

pub async fn update_channel_host(
    pool: &PgPool,
    channel_id: &str,
    host: Option<&str>,
) -> Result<(), CoreError> {
    let result = sqlx::query("UPDATE channel SET host = $2 WHERE id = $1")
        .bind(channel_id)
        .bind(host)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ChannelNotFound {
            channel_id: channel_id.to_string(),
        });
    }

    Ok(())
}

/// Close the channel; the first close time is kept.
pub async fn close_channel(
    pool: &PgPool,
    channel_id: &str,
    closed_at: DateTime<Utc>,
) -> Result<(), CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE channel
        SET closed_at = COALESCE(closed_at, $2),
            host = NULL
        WHERE id = $1
        "#,
    )
    .bind(channel_id)
    .bind(closed_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ChannelNotFound {
            channel_id: channel_id.to_string(),
        });
    }

    Ok(())
}

pub async fn health_check_db(pool: &PgPool) -> Result<bool, CoreError> {
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}
