// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service discovery contract.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::ClientError;

/// One reachable instance of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Fully qualified instance id, `<service>-<short id>`
    pub id: String,
    /// Network address, `host:port`
    pub address: String,
}

impl Node {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Supplies the current node list for a service name.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn lookup(&self, service: &str) -> Result<Vec<Node>, ClientError>;
}

/// Registry backed by a fixed, replaceable node table.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    services: RwLock<HashMap<String, Vec<Node>>>,
}

impl StaticRegistry {
    /// Replace the node list of `service`.
    pub fn set(&self, service: &str, nodes: Vec<Node>) {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        services.insert(service.to_string(), nodes);
    }

    /// Drop one node from `service`, as if it left the cluster.
    pub fn remove(&self, service: &str, node_id: &str) {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(nodes) = services.get_mut(service) {
            nodes.retain(|node| node.id != node_id);
        }
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn lookup(&self, service: &str) -> Result<Vec<Node>, ClientError> {
        let services = self
            .services
            .read()
            .map_err(|_| ClientError::Registry("registry lock poisoned".to_string()))?;
        Ok(services.get(service).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_service_is_empty() {
        let registry = StaticRegistry::default();
        assert!(registry.lookup("workflow").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_and_remove() {
        let registry = StaticRegistry::default();
        registry.set(
            "workflow",
            vec![
                Node::new("workflow-a", "10.0.0.1:10021"),
                Node::new("workflow-b", "10.0.0.2:10021"),
            ],
        );
        registry.remove("workflow", "workflow-a");

        let nodes = registry.lookup("workflow").await.unwrap();
        assert_eq!(nodes, vec![Node::new("workflow-b", "10.0.0.2:10021")]);
    }
}
