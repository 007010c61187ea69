// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Flow engine client: one affinity-routed handle per conversation.

use std::collections::HashMap;
use std::sync::Arc;

use chatgate_protocol::chat_proto::Message;
use chatgate_protocol::flow_proto::{
    BreakBridgeCause, BreakBridgeRequest, BreakRequest, ConfirmationMessageRequest, StartRequest,
};
use chatgate_protocol::{ClientError, RpcRequest};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::affinity::{AffinityClient, AffinityHandle};
use crate::error::RouteError;
use crate::persistence::Persistence;
use crate::store::{AffinityStore, ConversationNodes};

/// Conversation attributes the flow engine is started with.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    pub conversation_id: String,
    pub domain_id: i64,
    /// Bot profile (schema owner) id
    pub profile_id: i64,
    /// Channel start variables, passed to `Start`. `flow` names the schema to run.
    pub variables: HashMap<String, String>,
}

/// Result of [`ConversationChannel::confirmation_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Message was handed to the waiting flow.
    Delivered,
    /// Flow is not waiting for input; nothing was sent.
    Idle,
}

/// Shared flow engine client; hands out per-conversation channels.
pub struct FlowClient {
    client: AffinityClient,
    persistence: Arc<dyn Persistence>,
    nodes: Arc<dyn AffinityStore>,
}

impl FlowClient {
    pub fn new(client: AffinityClient, persistence: Arc<dyn Persistence>) -> Self {
        let nodes = Arc::new(ConversationNodes::new(persistence.clone()));
        Self {
            client,
            persistence,
            nodes,
        }
    }

    /// Handle for one conversation. Its node is recovered lazily from the store.
    pub fn channel(self: &Arc<Self>, conversation: Conversation) -> ConversationChannel {
        let affinity = AffinityHandle::new(conversation.conversation_id.clone(), self.nodes.clone());
        let variables = conversation.variables.clone();
        ConversationChannel {
            flow: self.clone(),
            conversation,
            state: Mutex::new(ChannelState {
                affinity,
                pending: None,
                variables,
            }),
        }
    }
}

impl std::fmt::Debug for FlowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowClient")
            .field("client", &self.client)
            .finish()
    }
}

struct ChannelState {
    affinity: AffinityHandle,
    /// Confirmation token the flow is waiting on
    pending: Option<String>,
    /// Conversation variables, updated by transfers
    variables: HashMap<String, String>,
}

/// Flow engine handle for one conversation.
///
/// Every operation holds the handle's lock from node choice through the
/// affinity write-through, so calls on one conversation never interleave.
pub struct ConversationChannel {
    flow: Arc<FlowClient>,
    conversation: Conversation,
    state: Mutex<ChannelState>,
}

impl ConversationChannel {
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn conversation_id(&self) -> &str {
        &self.conversation.conversation_id
    }

    /// Node the next call will prefer, recovering it from the store if needed.
    pub async fn peer(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        state.affinity.peer().await.map(str::to_string)
    }

    /// Pending confirmation token held in memory.
    pub async fn pending_confirmation(&self) -> Option<String> {
        self.state.lock().await.pending.clone()
    }

    /// Current conversation variables.
    pub async fn variables(&self) -> HashMap<String, String> {
        self.state.lock().await.variables.clone()
    }

    /// Start the flow for this conversation on any available node.
    ///
    /// The `flow` variable selects the schema and is not forwarded; the other
    /// variables are also copied into the message metadata.
    #[instrument(skip(self, message), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn start(&self, message: &Message) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state, message, 0).await
    }

    async fn start_locked(
        &self,
        state: &mut ChannelState,
        message: &Message,
        user_id: i64,
    ) -> Result<(), RouteError> {
        state.affinity.reset();
        state.pending = None;

        let schema_id = take_schema_id(&mut state.variables);
        let mut message = message.clone();
        for (key, value) in &state.variables {
            message.variables.insert(key.clone(), value.clone());
        }

        let request = RpcRequest::Start(StartRequest {
            conversation_id: self.conversation.conversation_id.clone(),
            domain_id: self.conversation.domain_id,
            profile_id: self.conversation.profile_id,
            schema_id,
            user_id,
            message: flow_message(&message),
            variables: state.variables.clone(),
        });

        let served = self
            .flow
            .client
            .invoke(&mut state.affinity, request)
            .await
            .inspect_err(|e| error!(error = %e, "failed to start flow"))?;
        served.response.expect("Start")?;

        info!(
            host = %self.flow.client.selector().short_id(&served.node),
            schema_id,
            user_id,
            "flow started"
        );
        Ok(())
    }

    /// Stop the flow routine. A flow the engine no longer knows counts as stopped.
    #[instrument(skip(self), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn break_conversation(&self, cause: &str) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        self.break_locked(&mut state, cause).await
    }

    async fn break_locked(&self, state: &mut ChannelState, cause: &str) -> Result<(), RouteError> {
        state.affinity.peer().await;

        let request = RpcRequest::Break(BreakRequest {
            conversation_id: self.conversation.conversation_id.clone(),
            cause: cause.to_string(),
        });
        match self.flow.client.invoke(&mut state.affinity, request).await {
            Ok(served) => {
                served.response.expect("Break")?;
            }
            Err(e) if e.is_conversation_not_found() => {
                warn!("flow routine already stopped");
            }
            Err(e) => {
                error!(error = %e, "failed to break flow");
                return Err(e.into());
            }
        }

        state.pending = None;
        if let Err(e) = self
            .flow
            .persistence
            .delete_confirmation(self.conversation_id())
            .await
        {
            error!(error = %e, "failed to drop confirmation token");
        }
        Ok(())
    }

    /// Hand the conversation over to an internal user.
    ///
    /// Stops the running routine, records the hop in the `xfer` variable and
    /// starts a new routine for `user_id`. Variables are restored if the new
    /// routine fails to start.
    #[instrument(skip(self), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn transfer_to_user(
        &self,
        from_channel_id: &str,
        user_id: i64,
    ) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        self.break_locked(&mut state, TRANSFER_CAUSE).await?;

        let date = Utc::now().timestamp_millis();
        let hop = format!("{date}:{from_channel_id}:user:{user_id}");
        let saved = state.variables.clone();
        push_xfer(&mut state.variables, &hop);

        let message = xfer_message(date, HashMap::from([("xfer".to_string(), hop)]));
        if let Err(e) = self.start_locked(&mut state, &message, user_id).await {
            state.variables = saved;
            return Err(e);
        }

        info!(from_channel_id, user_id, "conversation transferred to user");
        Ok(())
    }

    /// Hand the conversation over to another flow schema.
    ///
    /// Like [`transfer_to_user`](Self::transfer_to_user), but the new routine
    /// runs `schema_id`.
    #[instrument(skip(self), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn transfer_to_schema(
        &self,
        from_channel_id: &str,
        schema_id: i64,
    ) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        self.break_locked(&mut state, TRANSFER_CAUSE).await?;

        let date = Utc::now().timestamp_millis();
        let hop = format!("{date}:{from_channel_id}:schema:{schema_id}");
        let saved = state.variables.clone();
        push_xfer(&mut state.variables, &hop);
        let schema = schema_id.to_string();
        state.variables.insert("flow".to_string(), schema.clone());

        let message = xfer_message(
            date,
            HashMap::from([("flow".to_string(), schema), ("xfer".to_string(), hop)]),
        );
        if let Err(e) = self.start_locked(&mut state, &message, 0).await {
            state.variables = saved;
            return Err(e);
        }

        info!(from_channel_id, schema_id, "conversation transferred to schema");
        Ok(())
    }

    /// Tear down the agent bridge of this conversation.
    #[instrument(skip(self), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn break_bridge(&self, cause: BreakBridgeCause) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        state.affinity.peer().await;

        let request = RpcRequest::BreakBridge(BreakBridgeRequest {
            conversation_id: self.conversation.conversation_id.clone(),
            cause,
        });
        match self.flow.client.invoke(&mut state.affinity, request).await {
            Ok(served) => {
                served.response.expect("BreakBridge")?;
                Ok(())
            }
            Err(e) if e.is_conversation_not_found() => {
                warn!(%cause, "flow routine already stopped");
                Ok(())
            }
            Err(e) => {
                error!(%cause, error = %e, "failed to break bridge");
                Err(e.into())
            }
        }
    }

    /// Deliver `message` into the flow's pending wait-for-input point.
    ///
    /// Returns [`Confirmation::Idle`] without any call when no confirmation
    /// token exists. A "conversation not found" reply is surfaced as is.
    #[instrument(skip(self, message), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn confirmation_message(&self, message: &Message) -> Result<Confirmation, RouteError> {
        let mut state = self.state.lock().await;

        let token = match state.pending.clone() {
            Some(token) => Some(token),
            None => self
                .flow
                .persistence
                .read_confirmation(self.conversation_id())
                .await?,
        };
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            debug!("flow is not waiting for a message");
            return Ok(Confirmation::Idle);
        };

        state.affinity.peer().await;
        let request = RpcRequest::ConfirmationMessage(ConfirmationMessageRequest {
            conversation_id: self.conversation.conversation_id.clone(),
            confirmation_id: token.clone(),
            messages: vec![flow_message(message)],
        });
        match self.flow.client.invoke(&mut state.affinity, request).await {
            Ok(served) => {
                served.response.expect("ConfirmationMessage")?;
            }
            Err(e) => {
                log_confirmation_error(&e);
                return Err(e.into());
            }
        }

        state.pending = None;
        if let Err(e) = self
            .flow
            .persistence
            .delete_confirmation(self.conversation_id())
            .await
        {
            error!(confirmation_id = %token, error = %e, "failed to drop confirmation token");
        }
        Ok(Confirmation::Delivered)
    }

    /// Record the token the flow engine issued when it started waiting for input.
    #[instrument(skip(self), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn await_confirmation(&self, token: &str) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        self.flow
            .persistence
            .write_confirmation(self.conversation_id(), token)
            .await?;
        if let Some(previous) = state.pending.as_deref().filter(|previous| *previous != token) {
            debug!(previous = %previous, confirmation_id = %token, "confirmation token replaced");
        }
        state.pending = Some(token.to_string());
        Ok(())
    }

    /// Permanently close the conversation's routing state.
    ///
    /// Deletes the durable node and confirmation records.
    #[instrument(skip(self), fields(conversation_id = %self.conversation.conversation_id))]
    pub async fn release(&self) -> Result<(), RouteError> {
        let mut state = self.state.lock().await;
        state.pending = None;
        state.affinity.forget().await?;
        self.flow
            .persistence
            .delete_confirmation(self.conversation_id())
            .await?;
        info!("conversation released");
        Ok(())
    }
}

impl std::fmt::Debug for ConversationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationChannel")
            .field("conversation", &self.conversation)
            .finish()
    }
}

const TRANSFER_CAUSE: &str = "transfer";

/// Remove the `flow` variable, returning the schema id it names (0 if none).
fn take_schema_id(variables: &mut HashMap<String, String>) -> i32 {
    variables
        .remove("flow")
        .and_then(|flow| flow.trim().parse().ok())
        .unwrap_or_default()
}

/// Append a transfer hop (`date:from:kind:to`) to the `xfer` history.
fn push_xfer(variables: &mut HashMap<String, String>, hop: &str) {
    let history = match variables.get("xfer").filter(|xfer| !xfer.is_empty()) {
        Some(xfer) => format!("{xfer};{hop}"),
        None => hop.to_string(),
    };
    variables.insert("xfer".to_string(), history);
}

/// Transient message announcing a transfer to the new routine.
fn xfer_message(date: i64, variables: HashMap<String, String>) -> Message {
    Message {
        id: 0,
        kind: "xfer".to_string(),
        text: "transfer".to_string(),
        postback: None,
        variables,
        created_at: date,
    }
}

fn log_confirmation_error(err: &ClientError) {
    if err.is_conversation_not_found() {
        warn!(error = %err, "conversation not found in flow engine");
    } else {
        error!(error = %err, "failed to deliver confirmation message");
    }
}

/// Message as the flow engine expects it: a postback is reduced to its code.
pub fn flow_message(message: &Message) -> Message {
    let mut message = message.clone();
    if let Some(postback) = &message.postback {
        if !postback.code.is_empty() {
            message.text = postback.code.clone();
        }
    }
    message
}
