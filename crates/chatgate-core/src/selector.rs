// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node selection with a preferred node and a fallback strategy.
//!
//! The registry reports fully qualified node ids (`<service>-<short id>`) while
//! affinity records keep the short id. [`ServiceName`] is the only place that
//! converts between the two.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatgate_protocol::{Node, NodePicker};
use rand::Rng;
use tracing::{trace, warn};

/// Logical service name and its node-id prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceName {
    name: String,
    prefix: String,
}

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let prefix = format!("{name}-");
        Self { name, prefix }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Short id of a registry node id. Ids without the prefix are returned as is.
    pub fn short_id<'a>(&self, node_id: &'a str) -> &'a str {
        node_id.strip_prefix(self.prefix.as_str()).unwrap_or(node_id)
    }

    /// Registry node id for a short id.
    pub fn qualify(&self, short_id: &str) -> String {
        format!("{}{}", self.prefix, self.short_id(short_id))
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Fallback node choice over a candidate list.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Name used in log records.
    fn name(&self) -> &'static str;

    /// Choose one of `nodes`; `None` only when `nodes` is empty.
    fn next<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node>;
}

/// Cycles through the candidates with a shared atomic cursor.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Strategy for RoundRobin {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn next<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
        if nodes.is_empty() {
            return None;
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        nodes.get(n % nodes.len())
    }
}

/// Uniformly random candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Strategy for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    fn next<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
        if nodes.is_empty() {
            return None;
        }
        let i = rand::thread_rng().gen_range(0..nodes.len());
        nodes.get(i)
    }
}

/// Configurable fallback strategy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackStrategy {
    #[default]
    RoundRobin,
    Random,
}

impl FallbackStrategy {
    /// Build a fresh strategy object; every client gets its own.
    pub fn build(self) -> Arc<dyn Strategy> {
        match self {
            FallbackStrategy::RoundRobin => Arc::new(RoundRobin::new()),
            FallbackStrategy::Random => Arc::new(Random),
        }
    }
}

impl FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round_robin" | "roundrobin" => Ok(FallbackStrategy::RoundRobin),
            "random" => Ok(FallbackStrategy::Random),
            other => Err(format!("unknown fallback strategy: {other}")),
        }
    }
}

/// Prefers a node by short id, otherwise defers to the fallback.
#[derive(Debug, Clone)]
pub struct PreferredNode {
    service: ServiceName,
    fallback: Arc<dyn Strategy>,
}

impl PreferredNode {
    pub fn new(service: ServiceName, fallback: Arc<dyn Strategy>) -> Self {
        Self { service, fallback }
    }

    pub fn service(&self) -> &ServiceName {
        &self.service
    }

    /// Short id of `node`, the form affinity records store.
    pub fn short_id<'a>(&self, node: &'a Node) -> &'a str {
        self.service.short_id(&node.id)
    }

    /// `preferred` if it is among `candidates`, otherwise the fallback's choice.
    pub fn select<'a>(&self, candidates: &'a [Node], preferred: &str) -> Option<&'a Node> {
        if preferred.is_empty() {
            return self.fallback.next(candidates);
        }

        let wanted = self.service.short_id(preferred);
        if let Some(node) = candidates.iter().find(|node| self.short_id(node) == wanted) {
            trace!(service = %self.service, peer = %wanted, addr = %node.address, "preferred node selected");
            return Some(node);
        }

        let next = self.fallback.next(candidates);
        if let Some(node) = next {
            warn!(
                service = %self.service,
                peer = %wanted,
                next = %self.short_id(node),
                strategy = self.fallback.name(),
                "preferred node not found"
            );
        }
        next
    }

    /// Single-call picker preferring `preferred`.
    pub fn picker<'s>(&'s self, preferred: &'s str) -> PreferredPick<'s> {
        PreferredPick {
            selector: self,
            preferred,
        }
    }
}

/// [`NodePicker`] view of a [`PreferredNode`] bound to one preference.
#[derive(Debug)]
pub struct PreferredPick<'s> {
    selector: &'s PreferredNode,
    preferred: &'s str,
}

impl NodePicker for PreferredPick<'_> {
    fn pick<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
        self.selector.select(nodes, self.preferred)
    }
}

/// Prefers the first node whose address starts with a host prefix.
#[derive(Debug, Clone)]
pub struct PreferredHost {
    host: String,
    fallback: Arc<dyn Strategy>,
}

impl PreferredHost {
    pub fn new(host: impl Into<String>, fallback: Arc<dyn Strategy>) -> Self {
        Self {
            host: host.into(),
            fallback,
        }
    }
}

impl NodePicker for PreferredHost {
    fn pick<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
        if !self.host.is_empty() {
            if let Some(node) = nodes.iter().find(|node| node.address.starts_with(&self.host)) {
                return Some(node);
            }
            warn!(host = %self.host, strategy = self.fallback.name(), "preferred host not found");
        }
        self.fallback.next(nodes)
    }
}
