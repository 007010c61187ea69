// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for chatgate-core integration tests.
//!
//! Provides TestContext: a SQLite-backed gateway wired to an in-process
//! registry and a scripted transport that records every call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use chatgate_core::persistence::{ChannelRecord, Persistence, SqlitePersistence};
use chatgate_core::{ChatGateway, CoreError};
use chatgate_protocol::gateway_proto::SendMessageResponse;
use chatgate_protocol::{ClientError, Node, RpcRequest, RpcResponse, StaticRegistry, Transport};

pub const FLOW: &str = "workflow";
pub const BOTS: &str = "webitel.chat.bot";

/// Transport answering per node, failing on demand.
#[derive(Default)]
pub struct ScriptedTransport {
    calls: Mutex<Vec<(String, &'static str)>>,
    failures: Mutex<HashMap<String, ClientError>>,
    bindings: Mutex<HashMap<String, String>>,
}

impl ScriptedTransport {
    pub fn fail_on(&self, node_id: &str, err: ClientError) {
        self.failures
            .lock()
            .unwrap()
            .insert(node_id.to_string(), err);
    }

    pub fn heal_all(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn reply_bindings(&self, bindings: &[(&str, &str)]) {
        *self.bindings.lock().unwrap() = bindings
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
    }

    /// `(node id, method)` of every call, in order.
    pub fn calls(&self) -> Vec<(String, &'static str)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, node: &Node, request: RpcRequest) -> Result<RpcResponse, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((node.id.clone(), request.method()));
        if let Some(err) = self.failures.lock().unwrap().get(&node.id) {
            return Err(err.clone());
        }
        Ok(match request {
            RpcRequest::SendMessage(_) => RpcResponse::SendMessage(SendMessageResponse {
                bindings: self.bindings.lock().unwrap().clone(),
            }),
            other => RpcResponse::empty_for(&other),
        })
    }
}

/// SQLite persistence that journals affinity writes.
pub struct RecordingPersistence {
    inner: SqlitePersistence,
    node_writes: Mutex<Vec<(String, String)>>,
    host_writes: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingPersistence {
    pub fn node_writes(&self) -> Vec<(String, String)> {
        self.node_writes.lock().unwrap().clone()
    }

    pub fn host_writes(&self) -> Vec<(String, Option<String>)> {
        self.host_writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Persistence for RecordingPersistence {
    async fn read_conversation_node(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, CoreError> {
        self.inner.read_conversation_node(conversation_id).await
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
        self.inner
            .write_conversation_node(conversation_id, node_id)
            .await
    }

    async fn delete_conversation_node(&self, conversation_id: &str) -> Result<(), CoreError> {
        self.inner.delete_conversation_node(conversation_id).await
    }

    async fn read_confirmation(&self, conversation_id: &str) -> Result<Option<String>, CoreError> {
        self.inner.read_confirmation(conversation_id).await
    }

    async fn write_confirmation(
        &self,
        conversation_id: &str,
        confirmation_id: &str,
    ) -> Result<(), CoreError> {
        self.inner
            .write_confirmation(conversation_id, confirmation_id)
            .await
    }

    async fn delete_confirmation(&self, conversation_id: &str) -> Result<(), CoreError> {
        self.inner.delete_confirmation(conversation_id).await
    }

    async fn insert_channel(&self, channel: &ChannelRecord) -> Result<(), CoreError> {
        self.inner.insert_channel(channel).await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Option<ChannelRecord>, CoreError> {
        self.inner.get_channel(channel_id).await
    }

    async fn list_open_channels(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ChannelRecord>, CoreError> {
        self.inner.list_open_channels(conversation_id).await
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
        self.inner.update_channel_host(channel_id, host).await
    }

    async fn close_channel(
        &self,
        channel_id: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.inner.close_channel(channel_id, closed_at).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        self.inner.health_check_db().await
    }
}

/// Gateway over a SQLite file, with a registry and transport under test control.
pub struct TestContext {
    pub dir: tempfile::TempDir,
    pub db_path: PathBuf,
    pub persistence: Arc<RecordingPersistence>,
    pub registry: Arc<StaticRegistry>,
    pub transport: Arc<ScriptedTransport>,
    pub gateway: ChatGateway,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("chatgate.db");
        let registry = Arc::new(StaticRegistry::default());
        let transport = Arc::new(ScriptedTransport::default());
        let (persistence, gateway) = open(&db_path, registry.clone(), transport.clone()).await;
        Self {
            dir,
            db_path,
            persistence,
            registry,
            transport,
            gateway,
        }
    }

    /// Simulate a process restart: new gateway, same database and cluster.
    pub async fn restart(&mut self) {
        let (persistence, gateway) =
            open(&self.db_path, self.registry.clone(), self.transport.clone()).await;
        self.persistence = persistence;
        self.gateway = gateway;
    }

    pub fn nodes(&self, service: &str, short_ids: &[&str]) {
        self.registry.set(
            service,
            short_ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    Node::new(format!("{service}-{id}"), format!("10.1.0.{}:10021", i + 1))
                })
                .collect(),
        );
    }
}

async fn open(
    path: &PathBuf,
    registry: Arc<StaticRegistry>,
    transport: Arc<ScriptedTransport>,
) -> (Arc<RecordingPersistence>, ChatGateway) {
    let inner = SqlitePersistence::from_path(path)
        .await
        .expect("open sqlite");
    let persistence = Arc::new(RecordingPersistence {
        inner,
        node_writes: Mutex::new(Vec::new()),
        host_writes: Mutex::new(Vec::new()),
    });
    let gateway = ChatGateway::builder()
        .persistence(persistence.clone())
        .registry(registry)
        .transport(transport)
        .build()
        .expect("build gateway");
    (persistence, gateway)
}

/// Provider channel bound to bot profile 12.
pub fn provider_channel(id: &str, conversation_id: &str, host: Option<&str>) -> ChannelRecord {
    let mut record = ChannelRecord::new(id, conversation_id, "telegram");
    record.connection = Some("12".to_string());
    record.external_user_id = Some(format!("tg-{id}"));
    record.host = host.map(str::to_string);
    record
}

/// Log sink capturing formatted `tracing` output.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.contents().matches(needle).count()
    }

    /// Subscriber writing to this capture, for `tracing::subscriber::set_default`.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || sink.clone())
            .finish()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
