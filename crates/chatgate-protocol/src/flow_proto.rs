// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chat_proto::Message;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartRequest {
    pub conversation_id: String,
    pub domain_id: i64,
    pub profile_id: i64,
    /// Flow schema to run; 0 lets the engine pick the profile's default
    #[serde(default)]
    pub schema_id: i32,
    /// Internal user the routine is started for (transfers), otherwise 0
    #[serde(default)]
    pub user_id: i64,
    pub message: Message,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StartResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakResponse {}

/// Why an agent bridge was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakBridgeCause {
    DeclineInvitation,
    LeaveConversation,
    Timeout,
}

impl BreakBridgeCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakBridgeCause::DeclineInvitation => "DECLINE_INVITATION",
            BreakBridgeCause::LeaveConversation => "LEAVE_CONVERSATION",
            BreakBridgeCause::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for BreakBridgeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakBridgeRequest {
    pub conversation_id: String,
    pub cause: BreakBridgeCause,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BreakBridgeResponse {}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfirmationMessageRequest {
    pub conversation_id: String,
    pub confirmation_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfirmationMessageResponse {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_bridge_cause_wire_names() {
        assert_eq!(
            serde_json::to_string(&BreakBridgeCause::DeclineInvitation).unwrap(),
            "\"DECLINE_INVITATION\""
        );
        let cause: BreakBridgeCause = serde_json::from_str("\"LEAVE_CONVERSATION\"").unwrap();
        assert_eq!(cause, BreakBridgeCause::LeaveConversation);
        assert_eq!(BreakBridgeCause::Timeout.to_string(), "TIMEOUT");
    }
}
