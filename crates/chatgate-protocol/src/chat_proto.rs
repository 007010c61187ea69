// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Chat message exchanged with the flow engine, bot gateways and portals.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Persisted message id; 0 marks a transient system notice
    pub id: i64,
    /// Message type, e.g. `text`, `file`, `closed`
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postback: Option<Postback>,
    /// Bindings: variable name to external (provider-side) value
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,
    /// Unix milliseconds
    #[serde(default)]
    pub created_at: i64,
}

impl Message {
    /// Plain text message.
    pub fn text(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            kind: "text".to_string(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// A message that was never stored and cannot carry bindings.
    pub fn is_transient(&self) -> bool {
        self.id == 0
    }
}

/// Button reply: the caption shown to the user and the code the flow reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Postback {
    pub code: String,
    pub text: String,
}
