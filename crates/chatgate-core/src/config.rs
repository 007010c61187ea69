// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use crate::selector::FallbackStrategy;

/// Chatgate configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Registry name of the flow engine service
    pub flow_service: String,
    /// Registry name of the bot gateway service
    pub gateway_service: String,
    /// Portal service used when a channel hint names none
    pub portal_service: String,
    /// Upper bound for one RPC call
    pub call_timeout_ms: u64,
    /// Node choice when no preferred node is usable
    pub fallback: FallbackStrategy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `CHATGATE_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `CHATGATE_FLOW_SERVICE`: flow engine service name (default: workflow)
    /// - `CHATGATE_GATEWAY_SERVICE`: bot gateway service name (default: webitel.chat.bot)
    /// - `CHATGATE_PORTAL_SERVICE`: portal service name (default: webitel.portal)
    /// - `CHATGATE_CALL_TIMEOUT_MS`: RPC call timeout (default: 10000)
    /// - `CHATGATE_FALLBACK_STRATEGY`: `round_robin` or `random` (default: round_robin)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("CHATGATE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("CHATGATE_DATABASE_URL"))?;

        let flow_service =
            std::env::var("CHATGATE_FLOW_SERVICE").unwrap_or_else(|_| "workflow".to_string());
        let gateway_service = std::env::var("CHATGATE_GATEWAY_SERVICE")
            .unwrap_or_else(|_| "webitel.chat.bot".to_string());
        let portal_service = std::env::var("CHATGATE_PORTAL_SERVICE")
            .unwrap_or_else(|_| "webitel.portal".to_string());

        let call_timeout_ms: u64 = std::env::var("CHATGATE_CALL_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("CHATGATE_CALL_TIMEOUT_MS", "must be a positive integer")
            })?;
        if call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "CHATGATE_CALL_TIMEOUT_MS",
                "must be a positive integer",
            ));
        }

        let fallback: FallbackStrategy = std::env::var("CHATGATE_FALLBACK_STRATEGY")
            .unwrap_or_else(|_| "round_robin".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "CHATGATE_FALLBACK_STRATEGY",
                    "must be one of: round_robin, random",
                )
            })?;

        Ok(Self {
            database_url,
            flow_service,
            gateway_service,
            portal_service,
            call_timeout_ms,
            fallback,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
