// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chat_proto::Message;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Provider profile (bot) id
    pub profile_id: i64,
    /// Recipient id on the provider side
    pub external_user_id: String,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// Provider-side identifiers for the delivered message
    #[serde(default)]
    pub bindings: HashMap<String, String>,
}
