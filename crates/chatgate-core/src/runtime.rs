// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable wiring of the flow client and the gateway dispatcher.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chatgate_core::runtime::ChatGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     chatgate_core::init_tracing();
//!     let gateway = ChatGateway::from_env(registry, transport).await?;
//!
//!     let channel = gateway.conversation(conversation);
//!     channel.start(&message).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use chatgate_protocol::{Registry, RpcClient, RpcClientConfig, Transport};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use crate::affinity::AffinityClient;
use crate::config::Config;
use crate::error::CoreError;
use crate::flow::{Conversation, ConversationChannel, FlowClient};
use crate::gateway::GatewayDispatcher;
use crate::persistence::{Persistence, PostgresPersistence, SqlitePersistence};
use crate::selector::{FallbackStrategy, PreferredNode, ServiceName};

/// Builder for a [`ChatGateway`].
pub struct ChatGatewayBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    registry: Option<Arc<dyn Registry>>,
    transport: Option<Arc<dyn Transport>>,
    flow_service: String,
    gateway_service: String,
    portal_service: String,
    call_timeout_ms: u64,
    fallback: FallbackStrategy,
}

impl std::fmt::Debug for ChatGatewayBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGatewayBuilder")
            .field("persistence", &self.persistence.as_ref().map(|_| "..."))
            .field("registry", &self.registry.as_ref().map(|_| "..."))
            .field("transport", &self.transport.as_ref().map(|_| "..."))
            .field("flow_service", &self.flow_service)
            .field("gateway_service", &self.gateway_service)
            .field("portal_service", &self.portal_service)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .field("fallback", &self.fallback)
            .finish()
    }
}

impl Default for ChatGatewayBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            registry: None,
            transport: None,
            flow_service: "workflow".to_string(),
            gateway_service: "webitel.chat.bot".to_string(),
            portal_service: "webitel.portal".to_string(),
            call_timeout_ms: RpcClientConfig::default().call_timeout_ms,
            fallback: FallbackStrategy::default(),
        }
    }
}

impl ChatGatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the service registry (required).
    pub fn registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the RPC transport (required).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Take service names, timeout and fallback from `config`.
    pub fn config(mut self, config: &Config) -> Self {
        self.flow_service = config.flow_service.clone();
        self.gateway_service = config.gateway_service.clone();
        self.portal_service = config.portal_service.clone();
        self.call_timeout_ms = config.call_timeout_ms;
        self.fallback = config.fallback;
        self
    }

    pub fn call_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.call_timeout_ms = timeout_ms;
        self
    }

    pub fn fallback(mut self, fallback: FallbackStrategy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Build the gateway. Fails if a required part is missing.
    pub fn build(self) -> Result<ChatGateway> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("registry is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| anyhow::anyhow!("transport is required"))?;

        let rpc_config = RpcClientConfig {
            call_timeout_ms: self.call_timeout_ms,
        };
        let rpc = |service: &str| {
            RpcClient::new(service, registry.clone(), transport.clone(), rpc_config.clone())
        };

        let flow = AffinityClient::new(
            rpc(&self.flow_service),
            PreferredNode::new(ServiceName::new(&self.flow_service), self.fallback.build()),
        );
        let bots = AffinityClient::new(
            rpc(&self.gateway_service),
            PreferredNode::new(ServiceName::new(&self.gateway_service), self.fallback.build()),
        );
        let dispatcher = GatewayDispatcher::new(
            bots,
            rpc(&self.portal_service),
            self.fallback.build(),
            persistence.clone(),
        );

        Ok(ChatGateway {
            flow: Arc::new(FlowClient::new(flow, persistence.clone())),
            dispatcher: Arc::new(dispatcher),
            persistence,
        })
    }
}

/// Flow client and gateway dispatcher sharing one persistence backend.
pub struct ChatGateway {
    flow: Arc<FlowClient>,
    dispatcher: Arc<GatewayDispatcher>,
    persistence: Arc<dyn Persistence>,
}

impl std::fmt::Debug for ChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGateway")
            .field("flow", &self.flow)
            .field("persistence", &"...")
            .finish()
    }
}

impl ChatGateway {
    pub fn builder() -> ChatGatewayBuilder {
        ChatGatewayBuilder::new()
    }

    /// Build from `CHATGATE_*` environment variables (and `.env`), connecting
    /// to the configured database.
    pub async fn from_env(
        registry: Arc<dyn Registry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::from_env().map_err(|e| {
            error!("Configuration error: {}", e);
            e
        })?;
        info!(
            flow_service = %config.flow_service,
            gateway_service = %config.gateway_service,
            call_timeout_ms = config.call_timeout_ms,
            "Configuration loaded"
        );

        let persistence = connect_persistence(&config.database_url).await?;
        ChatGateway::builder()
            .config(&config)
            .persistence(persistence)
            .registry(registry)
            .transport(transport)
            .build()
    }

    pub fn flow(&self) -> &Arc<FlowClient> {
        &self.flow
    }

    pub fn dispatcher(&self) -> &Arc<GatewayDispatcher> {
        &self.dispatcher
    }

    /// Flow engine handle for one conversation.
    pub fn conversation(&self, conversation: Conversation) -> ConversationChannel {
        self.flow.channel(conversation)
    }

    pub async fn health_check(&self) -> Result<bool, CoreError> {
        self.persistence.health_check_db().await
    }
}

/// Open the backend named by `database_url` and run its migrations.
///
/// `sqlite:` URLs select SQLite; anything else is treated as PostgreSQL.
pub async fn connect_persistence(database_url: &str) -> Result<Arc<dyn Persistence>, CoreError> {
    if database_url.starts_with("sqlite:") {
        let persistence = SqlitePersistence::connect(database_url).await?;
        info!("SQLite database ready");
        return Ok(Arc::new(persistence));
    }

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    crate::migrations::run_postgres(&pool).await?;
    info!("PostgreSQL database ready");
    Ok(Arc::new(PostgresPersistence::new(pool)))
}
