// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-crate fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chatgate_protocol::gateway_proto::SendMessageResponse;
use chatgate_protocol::{
    ClientError, Node, RpcClient, RpcClientConfig, RpcRequest, RpcResponse, StaticRegistry,
    Transport,
};
use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::persistence::{ChannelRecord, Persistence};

fn db_error(operation: &str) -> CoreError {
    CoreError::DatabaseError {
        operation: operation.to_string(),
        details: "simulated failure".to_string(),
    }
}

/// In-memory persistence with write journals and failure toggles.
#[derive(Default)]
pub struct MockPersistence {
    nodes: Mutex<HashMap<String, String>>,
    confirmations: Mutex<HashMap<String, String>>,
    channels: Mutex<HashMap<String, ChannelRecord>>,
    node_writes: Mutex<Vec<(String, String)>>,
    host_writes: Mutex<Vec<(String, Option<String>)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, conversation_id: &str, node_id: &str) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), node_id.to_string());
        self
    }

    pub fn with_confirmation(self, conversation_id: &str, token: &str) -> Self {
        self.confirmations
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), token.to_string());
        self
    }

    pub fn with_channel(self, channel: ChannelRecord) -> Self {
        self.channels
            .lock()
            .unwrap()
            .insert(channel.id.clone(), channel);
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn node(&self, conversation_id: &str) -> Option<String> {
        self.nodes.lock().unwrap().get(conversation_id).cloned()
    }

    pub fn confirmation(&self, conversation_id: &str) -> Option<String> {
        self.confirmations.lock().unwrap().get(conversation_id).cloned()
    }

    pub fn channel(&self, channel_id: &str) -> Option<ChannelRecord> {
        self.channels.lock().unwrap().get(channel_id).cloned()
    }

    /// Every `write_conversation_node` call that reached the store.
    pub fn node_writes(&self) -> Vec<(String, String)> {
        self.node_writes.lock().unwrap().clone()
    }

    /// Every `update_channel_host` call that reached the store.
    pub fn host_writes(&self) -> Vec<(String, Option<String>)> {
        self.host_writes.lock().unwrap().clone()
    }

    fn check_read(&self, operation: &str) -> Result<(), CoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(db_error(operation));
        }
        Ok(())
    }

    fn check_write(&self, operation: &str) -> Result<(), CoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(db_error(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn read_conversation_node(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, CoreError> {
        self.check_read("read_conversation_node")?;
        Ok(self.node(conversation_id))
    }

    async fn write_conversation_node(
        &self,
        conversation_id: &str,
        node_id: &str,
    ) -> Result<(), CoreError> {
        self.node_writes
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), node_id.to_string()));
        self.check_write("write_conversation_node")?;
        self.nodes
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), node_id.to_string());
        Ok(())
    }

    async fn delete_conversation_node(&self, conversation_id: &str) -> Result<(), CoreError> {
        self.check_write("delete_conversation_node")?;
        self.nodes.lock().unwrap().remove(conversation_id);
        Ok(())
    }

    async fn read_confirmation(&self, conversation_id: &str) -> Result<Option<String>, CoreError> {
        self.check_read("read_confirmation")?;
        Ok(self.confirmation(conversation_id))
    }

    async fn write_confirmation(
        &self,
        conversation_id: &str,
        confirmation_id: &str,
    ) -> Result<(), CoreError> {
        self.check_write("write_confirmation")?;
        self.confirmations
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), confirmation_id.to_string());
        Ok(())
    }

    async fn delete_confirmation(&self, conversation_id: &str) -> Result<(), CoreError> {
        self.check_write("delete_confirmation")?;
        self.confirmations.lock().unwrap().remove(conversation_id);
        Ok(())
    }

    async fn insert_channel(&self, channel: &ChannelRecord) -> Result<(), CoreError> {
        self.check_write("insert_channel")?;
        self.channels
            .lock()
            .unwrap()
            .insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>, CoreError> {
        self.check_read("get_channel")?;
        Ok(self.channel(channel_id))
    }

    async fn list_open_channels(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChannelRecord>, CoreError> {
        self.check_read("list_open_channels")?;
        let mut channels: Vec<_> = self
            .channels
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.conversation_id == conversation_id && !c.is_closed())
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(channels)
    }

    async fn update_channel_host(
        &self,
        channel_id: &str,
        host: Option<&str>,
    ) -> Result<(), CoreError> {
        self.host_writes
            .lock()
            .unwrap()
            .push((channel_id.to_string(), host.map(str::to_string)));
        self.check_write("update_channel_host")?;
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| CoreError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            })?;
        channel.host = host.map(str::to_string);
        Ok(())
    }

    async fn close_channel(
        &self,
        channel_id: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.check_write("close_channel")?;
        let mut channels = self.channels.lock().unwrap();
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| CoreError::ChannelNotFound {
                channel_id: channel_id.to_string(),
            })?;
        channel.closed_at.get_or_insert(closed_at);
        channel.host = None;
        Ok(())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        Ok(!self.fail_reads.load(Ordering::SeqCst))
    }
}

/// Transport that records calls and answers per node.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<(String, RpcRequest)>>,
    failures: Mutex<HashMap<String, ClientError>>,
    method_failures: Mutex<HashMap<&'static str, ClientError>>,
    bindings: Mutex<HashMap<String, String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `node_id` fails with `err`.
    pub fn fail_on(&self, node_id: &str, err: ClientError) {
        self.failures
            .lock()
            .unwrap()
            .insert(node_id.to_string(), err);
    }

    /// Every `method` call fails with `err`, whichever node serves it.
    pub fn fail_method(&self, method: &'static str, err: ClientError) {
        self.method_failures.lock().unwrap().insert(method, err);
    }

    pub fn heal(&self, node_id: &str) {
        self.failures.lock().unwrap().remove(node_id);
    }

    /// Bindings returned by every `SendMessage` call.
    pub fn reply_bindings(&self, bindings: &[(&str, &str)]) {
        *self.bindings.lock().unwrap() = bindings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<(String, RpcRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(&self, node: &Node, request: RpcRequest) -> Result<RpcResponse, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((node.id.clone(), request.clone()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.failures.lock().unwrap().get(&node.id) {
            return Err(err.clone());
        }
        if let Some(err) = self.method_failures.lock().unwrap().get(request.method()) {
            return Err(err.clone());
        }

        match request {
            RpcRequest::SendMessage(_) => Ok(RpcResponse::SendMessage(SendMessageResponse {
                bindings: self.bindings.lock().unwrap().clone(),
            })),
            other => Ok(RpcResponse::empty_for(&other)),
        }
    }
}

/// Registry holding `service` with nodes `<service>-<short id>`.
pub fn cluster(service: &str, short_ids: &[&str]) -> Arc<StaticRegistry> {
    let registry = StaticRegistry::default();
    set_nodes(&registry, service, short_ids);
    Arc::new(registry)
}

pub fn set_nodes(registry: &StaticRegistry, service: &str, short_ids: &[&str]) {
    registry.set(
        service,
        short_ids
            .iter()
            .enumerate()
            .map(|(i, id)| Node::new(format!("{service}-{id}"), format!("10.0.0.{}:10021", i + 1)))
            .collect(),
    );
}

pub fn rpc_client(
    service: &str,
    registry: Arc<StaticRegistry>,
    transport: Arc<FakeTransport>,
) -> RpcClient {
    RpcClient::new(service, registry, transport, RpcClientConfig::default())
}
