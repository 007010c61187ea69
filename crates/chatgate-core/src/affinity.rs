// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sticky routing of RPC calls to the node that last served a subject.
//!
//! An [`AffinityHandle`] remembers, for one conversation or channel, the node
//! that answered its last successful call. [`AffinityClient::invoke`] routes a
//! call toward that node, then reconciles the node that actually answered:
//!
//! | Before   | Outcome        | Transition | Store write |
//! |----------|----------------|------------|-------------|
//! | unknown  | served by N    | HOSTED     | N           |
//! | N        | served by N    | SAME       | none        |
//! | M        | served by N    | RE-HOST    | N           |
//! | any      | failed         | LOST       | none        |
//!
//! LOST only clears the in-memory node; the durable record is kept so the
//! next [`AffinityHandle::peer`] can try the remembered node again.

use std::sync::Arc;

use chatgate_protocol::{ClientError, Node, RpcClient, RpcRequest, RpcResponse, Served};
use tracing::{debug, error, info, trace, warn};

use crate::error::CoreError;
use crate::selector::PreferredNode;
use crate::store::AffinityStore;

/// What a single call observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Call succeeded on the node with this short id.
    Served(String),
    /// Call failed (transport, timeout or application error).
    Failed,
}

/// Affinity change caused by one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First node for the subject.
    Hosted { node: String },
    /// Served by the remembered node.
    Same { node: String },
    /// Served by a different node than remembered.
    Rehost { from: String, to: String },
    /// Call failed; `from` is the node that was remembered, if any.
    Lost { from: Option<String> },
}

impl Transition {
    /// In-memory node after the transition.
    pub fn next_node(&self) -> Option<&str> {
        match self {
            Transition::Hosted { node } | Transition::Same { node } => Some(node),
            Transition::Rehost { to, .. } => Some(to),
            Transition::Lost { .. } => None,
        }
    }

    /// Node to write through to the store, if the transition changes it.
    pub fn persisted_node(&self) -> Option<&str> {
        match self {
            Transition::Hosted { node } => Some(node),
            Transition::Rehost { to, .. } => Some(to),
            Transition::Same { .. } | Transition::Lost { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Hosted { .. } => "HOSTED",
            Transition::Same { .. } => "SAME",
            Transition::Rehost { .. } => "RE-HOST",
            Transition::Lost { .. } => "LOST",
        }
    }
}

/// Reconcile the remembered node with what a call observed.
pub fn reconcile(prior: Option<&str>, outcome: &CallOutcome) -> Transition {
    let prior = prior.filter(|node| !node.is_empty());
    match (prior, outcome) {
        (prior, CallOutcome::Failed) => Transition::Lost {
            from: prior.map(str::to_string),
        },
        (None, CallOutcome::Served(node)) => Transition::Hosted { node: node.clone() },
        (Some(prior), CallOutcome::Served(node)) if prior == node => {
            Transition::Same { node: node.clone() }
        }
        (Some(prior), CallOutcome::Served(node)) => Transition::Rehost {
            from: prior.to_string(),
            to: node.clone(),
        },
    }
}

/// In-memory affinity for one subject, with its durable store.
pub struct AffinityHandle {
    subject_id: String,
    current: Option<String>,
    store: Arc<dyn AffinityStore>,
    last_transition: Option<Transition>,
}

impl AffinityHandle {
    pub fn new(subject_id: impl Into<String>, store: Arc<dyn AffinityStore>) -> Self {
        Self {
            subject_id: subject_id.into(),
            current: None,
            store,
            last_transition: None,
        }
    }

    /// Seed the in-memory node from a value loaded along with the subject.
    pub fn with_node(mut self, node: Option<String>) -> Self {
        self.current = node.filter(|node| !node.is_empty());
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Remembered node without consulting the store.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Transition applied by the most recent call.
    pub fn last_transition(&self) -> Option<&Transition> {
        self.last_transition.as_ref()
    }

    /// Forget the in-memory node; the durable record is left alone.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Remembered node, recovering it from the store when memory is empty.
    ///
    /// A store failure is logged and treated as "no preference".
    pub async fn peer(&mut self) -> Option<&str> {
        if self.current.is_none() {
            match self.store.read(&self.subject_id).await {
                Ok(Some(node)) if !node.is_empty() => {
                    debug!(subject_id = %self.subject_id, host = %node, "LOCATE");
                    self.current = Some(node);
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        subject_id = %self.subject_id,
                        error = %e,
                        "affinity lookup failed, routing without preference"
                    );
                }
            }
        }
        self.current.as_deref()
    }

    /// Drop the subject's affinity from memory and from the store.
    pub async fn forget(&mut self) -> Result<(), CoreError> {
        self.current = None;
        self.store.delete(&self.subject_id).await
    }

    /// Apply a transition: memory first, then write-through.
    ///
    /// A failed write is logged; memory keeps the new node.
    async fn apply(&mut self, transition: Transition, node: Option<&Node>, err: Option<&ClientError>) {
        let addr = node.map(|node| node.address.as_str()).unwrap_or_default();
        match &transition {
            Transition::Hosted { node } => {
                info!(subject_id = %self.subject_id, host = %node, addr = %addr, "HOSTED");
            }
            Transition::Same { node } => {
                trace!(subject_id = %self.subject_id, host = %node, "SAME");
            }
            Transition::Rehost { from, to } => {
                info!(subject_id = %self.subject_id, peer = %from, host = %to, addr = %addr, "RE-HOST");
            }
            Transition::Lost { from: Some(from) } => {
                warn!(
                    subject_id = %self.subject_id,
                    peer = %from,
                    error = %err.map(ToString::to_string).unwrap_or_default(),
                    "LOST"
                );
            }
            Transition::Lost { from: None } => {
                debug!(
                    subject_id = %self.subject_id,
                    error = %err.map(ToString::to_string).unwrap_or_default(),
                    "call failed with no remembered node"
                );
            }
        }

        self.current = transition.next_node().map(str::to_string);
        if let Some(node) = transition.persisted_node() {
            if let Err(e) = self.store.write(&self.subject_id, node).await {
                error!(
                    subject_id = %self.subject_id,
                    host = %node,
                    error = %e,
                    "failed to persist affinity"
                );
            }
        }
        self.last_transition = Some(transition);
    }
}

impl std::fmt::Debug for AffinityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityHandle")
            .field("subject_id", &self.subject_id)
            .field("current", &self.current)
            .finish()
    }
}

/// Clears the remembered node if the call future is dropped mid-flight.
struct LostOnCancel<'a> {
    subject_id: &'a str,
    current: &'a mut Option<String>,
    armed: bool,
}

impl LostOnCancel<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for LostOnCancel<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Some(node) = self.current.take() {
                warn!(subject_id = %self.subject_id, peer = %node, "LOST (call cancelled)");
            }
        }
    }
}

/// RPC client wrapped with preferred-node selection and affinity reconciliation.
#[derive(Debug, Clone)]
pub struct AffinityClient {
    rpc: RpcClient,
    selector: PreferredNode,
}

impl AffinityClient {
    pub fn new(rpc: RpcClient, selector: PreferredNode) -> Self {
        Self { rpc, selector }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn selector(&self) -> &PreferredNode {
        &self.selector
    }

    /// Issue `request` toward the handle's remembered node and reconcile.
    ///
    /// Uses the in-memory node only; call [`AffinityHandle::peer`] first to
    /// recover it from the store. The call's result is returned unchanged.
    pub async fn invoke(
        &self,
        handle: &mut AffinityHandle,
        request: RpcRequest,
    ) -> Result<Served<RpcResponse>, ClientError> {
        let preferred = handle.current.clone().unwrap_or_default();
        let picker = self.selector.picker(&preferred);

        let guard = LostOnCancel {
            subject_id: &handle.subject_id,
            current: &mut handle.current,
            armed: true,
        };
        let result = self.rpc.call(&picker, request).await;
        guard.disarm();

        let outcome = match &result {
            Ok(served) => CallOutcome::Served(self.selector.short_id(&served.node).to_string()),
            Err(_) => CallOutcome::Failed,
        };
        let transition = reconcile(handle.current(), &outcome);
        handle
            .apply(
                transition,
                result.as_ref().ok().map(|served| &served.node),
                result.as_ref().err(),
            )
            .await;

        result
    }
}
