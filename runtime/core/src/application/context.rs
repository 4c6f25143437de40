// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution Context
//!
//! The principal-bound handle every graph operation goes through. It carries
//! the principal, that principal's root and the shared runtime services, and
//! is cheap to clone: walkers and flows each hold their own copy.
//!
//! Explicit operations fail with [`RuntimeError::PermissionDenied`] when the
//! principal lacks the required level:
//!
//! | Operation | Required |
//! |-----------|----------|
//! | `get`, `get_attr`, `attributes`, `neighbors` | `READ` on the anchor |
//! | `connect` | `CONNECT` on both endpoints |
//! | `disconnect` | `CONNECT` on the edge |
//! | `set_attr`, `delete`, `grant`, `revoke`, `set_default_access` | `WRITE` |
//!
//! Neighbour enumeration additionally drops, without error, every neighbour
//! whose edge or node the principal cannot read.

use crate::application::access::AccessEvaluator;
use crate::application::scheduler;
use crate::domain::anchor::{Anchor, AnchorId, AnchorKind, Attributes, PrincipalId};
use crate::domain::archetype::ArchetypeRegistry;
use crate::domain::errors::RuntimeError;
use crate::domain::permission::Permission;
use crate::domain::query::{Neighbor, NeighborQuery};
use crate::domain::walker::{Walker, WalkerResult};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::graph_store::GraphStore;
use crate::infrastructure::tiered_memory::CommitSummary;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct ExecutionContext {
    principal: PrincipalId,
    root: AnchorId,
    graph: GraphStore,
    access: AccessEvaluator,
    registry: Arc<ArchetypeRegistry>,
    events: EventBus,
    max_visits: Option<usize>,
}

impl ExecutionContext {
    pub(crate) fn new(
        principal: PrincipalId,
        root: AnchorId,
        graph: GraphStore,
        access: AccessEvaluator,
        registry: Arc<ArchetypeRegistry>,
        events: EventBus,
        max_visits: Option<usize>,
    ) -> Self {
        Self {
            principal,
            root,
            graph,
            access,
            registry,
            events,
            max_visits,
        }
    }

    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    pub fn root_id(&self) -> AnchorId {
        self.root
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn access(&self) -> &AccessEvaluator {
        &self.access
    }

    pub fn registry(&self) -> &Arc<ArchetypeRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn max_visits(&self) -> Option<usize> {
        self.max_visits
    }

    pub async fn root(&self) -> Result<Anchor, RuntimeError> {
        self.graph.resolve(self.root).await
    }

    /// Resolve `id` and require `level` on it.
    async fn guarded(&self, id: AnchorId, level: Permission) -> Result<Anchor, RuntimeError> {
        let anchor = self.graph.resolve(id).await?;
        self.access.ensure(&self.principal, &anchor, level).await?;
        Ok(anchor)
    }

    pub async fn can_read(&self, anchor: &Anchor) -> Result<bool, RuntimeError> {
        self.access.check(&self.principal, anchor, Permission::Read).await
    }

    /// Direct read of an anchor.
    pub async fn get(&self, id: AnchorId) -> Result<Anchor, RuntimeError> {
        self.guarded(id, Permission::Read).await
    }

    pub async fn get_attr(&self, id: AnchorId, key: &str) -> Result<Option<Value>, RuntimeError> {
        Ok(self.get(id).await?.get(key).cloned())
    }

    pub async fn attributes(&self, id: AnchorId) -> Result<Attributes, RuntimeError> {
        Ok(self.get(id).await?.attributes)
    }

    pub async fn set_attr(&self, id: AnchorId, key: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        self.guarded(id, Permission::Write).await?;
        self.graph.set_attr(id, key, value.into()).await
    }

    /// Create a node owned by this context's principal. It stays ephemeral
    /// until connected to a root and committed.
    pub async fn create_node(&self, archetype: &str, attributes: Attributes) -> Result<Anchor, RuntimeError> {
        self.graph.create_node(&self.principal, archetype, attributes).await
    }

    pub async fn connect(
        &self,
        source: AnchorId,
        archetype: &str,
        target: AnchorId,
        attributes: Attributes,
    ) -> Result<Anchor, RuntimeError> {
        self.guarded(source, Permission::Connect).await?;
        if target != source {
            self.guarded(target, Permission::Connect).await?;
        }
        self.graph
            .connect(&self.principal, source, archetype, target, attributes)
            .await
    }

    pub async fn disconnect(&self, edge: AnchorId) -> Result<(), RuntimeError> {
        self.guarded(edge, Permission::Connect).await?;
        self.graph.disconnect(edge).await
    }

    pub async fn delete(&self, id: AnchorId) -> Result<(), RuntimeError> {
        self.guarded(id, Permission::Write).await?;
        self.graph.delete(id).await
    }

    /// Readable neighbours of `from`. Requires `READ` on `from`.
    pub async fn neighbors(&self, from: AnchorId, query: &NeighborQuery) -> Result<Vec<Neighbor>, RuntimeError> {
        self.guarded(from, Permission::Read).await?;
        self.readable_neighbors(from, query).await
    }

    /// Readable neighbours of `from`, or nothing when `from` itself is not
    /// readable.
    pub(crate) async fn visible_neighbors(
        &self,
        from: AnchorId,
        query: &NeighborQuery,
    ) -> Result<Vec<Neighbor>, RuntimeError> {
        let here = self.graph.resolve(from).await?;
        if !self.can_read(&here).await? {
            debug!("{} cannot read {}; visiting zero targets", self.principal, from);
            return Ok(Vec::new());
        }
        self.readable_neighbors(from, query).await
    }

    async fn readable_neighbors(&self, from: AnchorId, query: &NeighborQuery) -> Result<Vec<Neighbor>, RuntimeError> {
        let mut visible = Vec::new();
        for neighbor in self.graph.neighbors(from, query).await? {
            if !self.can_read(&neighbor.edge).await? || !self.can_read(&neighbor.node).await? {
                debug!(
                    "Filtered neighbour {} via {} for {}",
                    neighbor.node.id, neighbor.edge.id, self.principal
                );
                continue;
            }
            visible.push(neighbor);
        }
        Ok(visible)
    }

    pub async fn grant(&self, id: AnchorId, grantee: PrincipalId, level: Permission) -> Result<(), RuntimeError> {
        self.guarded(id, Permission::Write).await?;
        debug!("{} grants {} on {} to {}", self.principal, level, id, grantee);
        self.graph
            .memory()
            .update(id, move |a| a.access.grant(grantee, level))
            .await
    }

    pub async fn revoke(&self, id: AnchorId, grantee: &PrincipalId) -> Result<Option<Permission>, RuntimeError> {
        self.guarded(id, Permission::Write).await?;
        self.graph.memory().update(id, |a| a.access.revoke(grantee)).await
    }

    pub async fn set_default_access(&self, id: AnchorId, level: Permission) -> Result<(), RuntimeError> {
        self.guarded(id, Permission::Write).await?;
        self.graph.memory().update(id, move |a| a.access.default = level).await
    }

    /// Run `walker` from `at` to completion.
    pub async fn spawn(&self, walker: Walker, at: AnchorId) -> Result<WalkerResult, RuntimeError> {
        Box::pin(scheduler::run_walker(self.clone(), walker, at)).await
    }

    /// Construct a walker of `archetype` with `args` and run it from `at`.
    pub async fn spawn_type(
        &self,
        archetype: &str,
        at: AnchorId,
        args: Attributes,
    ) -> Result<WalkerResult, RuntimeError> {
        self.spawn(Walker::with_attributes(archetype, args), at).await
    }

    pub async fn commit(&self) -> Result<CommitSummary, RuntimeError> {
        self.graph.memory().commit().await
    }

    /// Stage a snapshot of `walker`. It is written on the next commit and is
    /// never swept.
    pub async fn persist_walker(&self, walker: &Walker) -> Result<(), RuntimeError> {
        let mut snapshot = Anchor::walker_snapshot(
            walker.id,
            walker.archetype.clone(),
            self.principal.clone(),
            walker.attributes.clone(),
        );
        if let Some(existing) = self.graph.memory().get(walker.id).await? {
            self.access.ensure(&self.principal, &existing, Permission::Write).await?;
            snapshot.owner = existing.owner;
            snapshot.access = existing.access;
            snapshot.created_at = existing.created_at;
            snapshot.seq = existing.seq;
        } else {
            snapshot.seq = self.graph.memory().next_seq();
        }
        self.graph.memory().put(snapshot)
    }

    pub async fn load_walker(&self, id: AnchorId) -> Result<Walker, RuntimeError> {
        let anchor = self.get(id).await?;
        if anchor.kind != AnchorKind::Walker {
            return Err(RuntimeError::InvalidOperation(format!(
                "{} is a {} anchor, not a walker snapshot",
                id, anchor.kind
            )));
        }
        Ok(Walker::from_snapshot(&anchor))
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("principal", &self.principal)
            .field("root", &self.root)
            .field("max_visits", &self.max_visits)
            .finish()
    }
}
