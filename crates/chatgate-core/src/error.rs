// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for chatgate-core.
//!
//! [`CoreError`] covers storage and validation failures; [`RouteError`] is what
//! affinity-routed operations return, keeping RPC failures intact.

use chatgate_protocol::ClientError;
use std::fmt;

/// Storage and validation errors.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreError {
    /// Channel was not found in the database.
    ChannelNotFound {
        /// The channel ID that was not found.
        channel_id: String,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ChannelNotFound { .. } => "CHANNEL_NOT_FOUND",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelNotFound { channel_id } => {
                write!(f, "Channel '{}' not found", channel_id)
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

/// Failure of an affinity-routed operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouteError {
    /// The RPC call failed; the error is exactly what the client reported.
    #[error(transparent)]
    Rpc(#[from] ClientError),

    /// A store operation the caller depends on failed.
    #[error(transparent)]
    Store(#[from] CoreError),
}

impl RouteError {
    /// The RPC error, if this is one.
    pub fn as_rpc(&self) -> Option<&ClientError> {
        match self {
            RouteError::Rpc(err) => Some(err),
            RouteError::Store(_) => None,
        }
    }
}
