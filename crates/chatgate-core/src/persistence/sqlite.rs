// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed persistence implementation.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CoreError;
use crate::migrations::SQLITE as MIGRATOR;

use super::{ChannelRecord, Persistence};

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a SQLite persistence from a file path.
    ///
    /// Creates missing parent directories and the database file, then runs
    /// all migrations.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/chatgate.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                    operation: "create_dir".to_string(),
                    details: format!("Failed to create directory {:?}: {}", parent, e),
                })?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect to a SQLite URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn read_conversation_node(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, CoreError> {
        let node_id: Option<String> = sqlx::query_scalar(
            "SELECT node_id FROM conversation_node WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(node_id)
    }

    async fn write_conversation_node(
        &self,
        conversation_id: &str,
        node_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversation_node (conversation_id, node_id, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (conversation_id) DO UPDATE
            SET node_id = excluded.node_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(conversation_id)
        .bind(node_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_conversation_node(&self, conversation_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM conversation_node WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn read_confirmation(&self, conversation_id: &str) -> Result<Option<String>, CoreError> {
        let confirmation_id: Option<String> = sqlx::query_scalar(
            "SELECT confirmation_id FROM conversation_confirmation WHERE conversation_id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(confirmation_id)
    }

    async fn write_confirmation(
        &self,
        conversation_id: &str,
        confirmation_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversation_confirmation (conversation_id, confirmation_id, created_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT (conversation_id) DO UPDATE
            SET confirmation_id = excluded.confirmation_id,
                created_at = excluded.created_at
            "#,
        )
        .bind(conversation_id)
        .bind(confirmation_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_confirmation(&self, conversation_id: &str) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM conversation_confirmation WHERE conversation_id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_channel(&self, channel: &ChannelRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO channel (id, conversation_id, kind, user_id, connection,
                                 external_user_id, host, created_at, closed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
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
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>, CoreError> {
        let record = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT id, conversation_id, kind, user_id, connection,
                   external_user_id, host, created_at, closed_at
            FROM channel
            WHERE id = ?
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_open_channels(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChannelRecord>, CoreError> {
        let records = sqlx::query_as::<_, ChannelRecord>(
            r#"
            SELECT id, conversation_id, kind, user_id, connection,
                   external_user_id, host, created_at, closed_at
            FROM channel
            WHERE conversation_id = ? AND closed_at IS NULL
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn update_channel_host(
        &self,
        channel_id: &str,
        host: Option<&str>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query("UPDATE channel SET host = ? WHERE id = ?")
            .bind(host)
            .bind(channel_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            });
        }

        Ok(())
    }

    async fn close_channel(
        &self,
        channel_id: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE channel
            SET closed_at = COALESCE(closed_at, ?),
                host = NULL
            WHERE id = ?
            "#,
        )
        .bind(closed_at)
        .bind(channel_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            });
        }

        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await;
        Ok(result.is_ok())
    }
}
