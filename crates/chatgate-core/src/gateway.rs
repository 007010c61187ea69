// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Outbound delivery to provider bot gateways and internal portals.
//!
//! Provider channels stick to the gateway node recorded in `channel.host`;
//! a reply from another node moves the hint (RE-HOST). Portal channels carry a
//! `[name@]host:port` hint owned by the portal and are only routed by it.

use std::collections::HashMap;
use std::sync::Arc;

use chatgate_protocol::chat_proto::Message;
use chatgate_protocol::gateway_proto::SendMessageRequest;
use chatgate_protocol::portal_proto::Update;
use chatgate_protocol::{RpcClient, RpcRequest};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::affinity::{AffinityClient, AffinityHandle};
use crate::error::{CoreError, RouteError};
use crate::persistence::{ChannelRecord, Persistence};
use crate::selector::{PreferredHost, Strategy};
use crate::store::{AffinityStore, ChannelHosts};

/// How a channel receives messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Internal agent connected over websocket; served by the message broker
    Websocket,
    /// The flow engine itself; served by [`crate::flow`]
    Chatflow,
    /// Internal portal instance
    Portal,
    /// External provider reached through a bot gateway
    Provider,
}

impl ChannelKind {
    pub fn of(kind: &str) -> Self {
        match kind {
            "websocket" => ChannelKind::Websocket,
            "chatflow" => ChannelKind::Chatflow,
            "portal" => ChannelKind::Portal,
            _ => ChannelKind::Provider,
        }
    }
}

/// One conversation member reachable through the dispatcher.
pub struct GatewayChannel {
    record: ChannelRecord,
    affinity: Mutex<AffinityHandle>,
}

impl GatewayChannel {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn record(&self) -> &ChannelRecord {
        &self.record
    }

    pub fn kind(&self) -> ChannelKind {
        ChannelKind::of(&self.record.kind)
    }

    /// Current in-memory host hint.
    pub async fn host(&self) -> Option<String> {
        self.affinity.lock().await.current().map(str::to_string)
    }

    fn profile_id(&self) -> Result<i64, CoreError> {
        self.record
            .connection
            .as_deref()
            .and_then(|connection| connection.trim().parse().ok())
            .ok_or_else(|| CoreError::ValidationError {
                field: "connection".to_string(),
                message: format!("channel '{}' has no valid profile id", self.record.id),
            })
    }

    fn external_user_id(&self) -> Result<&str, CoreError> {
        self.record
            .external_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CoreError::ValidationError {
                field: "external_user_id".to_string(),
                message: format!("channel '{}' has no external user", self.record.id),
            })
    }
}

impl std::fmt::Debug for GatewayChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayChannel")
            .field("record", &self.record)
            .finish()
    }
}

/// Outcome of [`GatewayDispatcher::broadcast`].
#[derive(Debug, Default)]
pub struct Broadcast {
    /// Members the message was delivered to
    pub sent: usize,
    /// Message bindings changed and should be stored again
    pub rebind: bool,
    /// Last delivery failure, if any
    pub last_error: Option<RouteError>,
}

/// Delivers messages to provider gateways and portals.
pub struct GatewayDispatcher {
    bots: AffinityClient,
    portal: RpcClient,
    fallback: Arc<dyn Strategy>,
    persistence: Arc<dyn Persistence>,
    hosts: Arc<dyn AffinityStore>,
}

impl GatewayDispatcher {
    /// `portal` is the client for the default portal service; hints naming
    /// another service reuse its registry and transport.
    pub fn new(
        bots: AffinityClient,
        portal: RpcClient,
        fallback: Arc<dyn Strategy>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let hosts = Arc::new(ChannelHosts::new(persistence.clone()));
        Self {
            bots,
            portal,
            fallback,
            persistence,
            hosts,
        }
    }

    /// Wrap a loaded record; its `host` seeds the in-memory hint.
    pub fn channel(&self, record: ChannelRecord) -> GatewayChannel {
        let affinity =
            AffinityHandle::new(record.id.clone(), self.hosts.clone()).with_node(record.host.clone());
        GatewayChannel {
            record,
            affinity: Mutex::new(affinity),
        }
    }

    pub async fn load_channel(&self, channel_id: &str) -> Result<Option<GatewayChannel>, CoreError> {
        let record = self.persistence.get_channel(channel_id).await?;
        Ok(record.map(|record| self.channel(record)))
    }

    /// Open members of a conversation.
    pub async fn load_members(&self, conversation_id: &str) -> Result<Vec<GatewayChannel>, CoreError> {
        let records = self.persistence.list_open_channels(conversation_id).await?;
        Ok(records.into_iter().map(|record| self.channel(record)).collect())
    }

    /// Send `message` through the provider's bot gateway.
    ///
    /// Returns whether bindings from the gateway changed `message.variables`.
    #[instrument(skip(self, target, message), fields(channel_id = %target.record.id, message_id = message.id))]
    pub async fn send_message(
        &self,
        target: &GatewayChannel,
        message: &mut Message,
    ) -> Result<bool, RouteError> {
        let request = RpcRequest::SendMessage(SendMessageRequest {
            profile_id: target.profile_id()?,
            external_user_id: target.external_user_id()?.to_string(),
            message: message.clone(),
        });

        let served = {
            let mut affinity = target.affinity.lock().await;
            affinity.peer().await;
            self.bots
                .invoke(&mut affinity, request)
                .await
                .inspect_err(|e| error!(error = %e, "failed to send message"))?
        };

        let response = served.response.into_send_message()?;
        Ok(merge_bindings(message, response.bindings))
    }

    /// Push `message` to the portal instance named by the channel's hint.
    ///
    /// The hint is never rewritten from here.
    #[instrument(skip(self, target, message), fields(channel_id = %target.record.id, message_id = message.id))]
    pub async fn push_update(&self, target: &GatewayChannel, message: &Message) -> Result<(), RouteError> {
        let hint = target.host().await.unwrap_or_default();
        let (name, addr) = contact_service_host(&hint);
        let client = if name.is_empty() {
            self.portal.clone()
        } else {
            self.portal.with_service(name)
        };
        let picker = PreferredHost::new(addr, self.fallback.clone());

        let request = RpcRequest::OnUpdate(Update {
            channel_id: target.record.id.clone(),
            conversation_id: target.record.conversation_id.clone(),
            user_id: target.record.user_id,
            message: message.clone(),
        });
        let served = client
            .call(&picker, request)
            .await
            .inspect_err(|e| error!(service = %client.service(), addr = %addr, error = %e, "failed to push update"))?;
        served.response.expect("OnUpdate")?;

        debug!(service = %client.service(), addr = %served.node.address, "update pushed");
        Ok(())
    }

    /// Deliver to one member according to its kind.
    ///
    /// `Ok(None)` means the member is not served by this dispatcher.
    pub async fn deliver(
        &self,
        target: &GatewayChannel,
        message: &mut Message,
    ) -> Result<Option<bool>, RouteError> {
        match target.kind() {
            ChannelKind::Provider => self.send_message(target, message).await.map(Some),
            ChannelKind::Portal => self.push_update(target, message).await.map(|()| Some(false)),
            ChannelKind::Websocket | ChannelKind::Chatflow => Ok(None),
        }
    }

    /// Deliver `message` to every open member except `sender`.
    ///
    /// Failures do not stop the loop; the last one is reported.
    #[instrument(skip_all, fields(channel_id = %sender.record.id, message_id = message.id))]
    pub async fn broadcast(
        &self,
        sender: &GatewayChannel,
        members: &[GatewayChannel],
        message: &mut Message,
    ) -> Broadcast {
        let mut report = Broadcast::default();
        for member in members {
            if member.record.id == sender.record.id || member.record.is_closed() {
                continue;
            }
            match self.deliver(member, message).await {
                Ok(Some(rebind)) => {
                    report.sent += 1;
                    report.rebind |= rebind;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(member_id = %member.record.id, error = %e, "delivery failed");
                    report.last_error = Some(e);
                }
            }
        }
        if report.sent == 0 && report.last_error.is_none() {
            debug!("no gateway members to deliver to");
        }
        report
    }

    /// Permanently close a member channel and drop its host hint.
    pub async fn close_channel(&self, target: &GatewayChannel) -> Result<(), CoreError> {
        self.persistence
            .close_channel(&target.record.id, Utc::now())
            .await?;
        target.affinity.lock().await.reset();
        info!(channel_id = %target.record.id, "channel closed");
        Ok(())
    }
}

/// Merge gateway bindings into `message.variables`.
///
/// The empty key is dropped and gateway values win. Transient messages get no
/// bindings. Returns whether any value was added or changed.
pub fn merge_bindings(message: &mut Message, bindings: HashMap<String, String>) -> bool {
    if message.is_transient() {
        return false;
    }
    let mut rebind = false;
    for (key, value) in bindings {
        if key.is_empty() {
            continue;
        }
        if message.variables.get(&key) != Some(&value) {
            rebind = true;
            message.variables.insert(key, value);
        }
    }
    rebind
}

/// Split a portal hint `[0@][name@]host:port` into service name and address.
pub fn contact_service_host(hint: &str) -> (&str, &str) {
    let mut host = hint.trim();
    let mut name = "";
    if let Some(at) = host.rfind('@').filter(|at| *at > 0) {
        name = &host[..at];
        host = &host[at + 1..];
    }
    if let Some(at) = name.rfind('@') {
        if 0 < at && at + 2 < name.len() {
            name = &name[at + 1..];
        }
    }
    (name, host)
}
