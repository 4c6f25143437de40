// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Graph Store
//!
//! Graph-shaped operations over [`TieredMemory`]: creating nodes and edges,
//! keeping node adjacency consistent with edge endpoints, and resolving
//! filtered neighbourhoods. No access checks happen here; callers go through
//! [`crate::application::ExecutionContext`] for that.

use crate::domain::anchor::{Anchor, AnchorId, Attributes, PrincipalId};
use crate::domain::errors::RuntimeError;
use crate::domain::query::{Direction, Neighbor, NeighborQuery};
use crate::infrastructure::tiered_memory::TieredMemory;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct GraphStore {
    memory: Arc<TieredMemory>,
}

impl GraphStore {
    pub fn new(memory: Arc<TieredMemory>) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &Arc<TieredMemory> {
        &self.memory
    }

    /// Resolve an anchor that must exist.
    pub async fn resolve(&self, id: AnchorId) -> Result<Anchor, RuntimeError> {
        self.memory
            .get(id)
            .await?
            .ok_or(RuntimeError::DanglingReference(id))
    }

    pub async fn get_or_create_root(&self, principal: &PrincipalId) -> Result<Anchor, RuntimeError> {
        let id = AnchorId::for_root(principal);
        if let Some(root) = self.memory.get(id).await? {
            return Ok(root);
        }
        let mut root = Anchor::root(principal);
        root.seq = self.memory.next_seq();
        self.memory.put(root.clone())?;
        debug!("Created root {} for principal {}", id, principal);
        Ok(root)
    }

    pub async fn create_node(
        &self,
        owner: &PrincipalId,
        archetype: &str,
        attributes: Attributes,
    ) -> Result<Anchor, RuntimeError> {
        let mut node = Anchor::node(archetype, owner.clone(), attributes);
        node.seq = self.memory.next_seq();
        self.memory.put(node.clone())?;
        Ok(node)
    }

    /// Create a directed edge `source -> target` and attach it to both
    /// endpoints.
    pub async fn connect(
        &self,
        owner: &PrincipalId,
        source: AnchorId,
        archetype: &str,
        target: AnchorId,
        attributes: Attributes,
    ) -> Result<Anchor, RuntimeError> {
        for id in [source, target] {
            let anchor = self.resolve(id).await?;
            if !anchor.kind.is_node_like() {
                return Err(RuntimeError::InvalidOperation(format!(
                    "cannot connect {} anchor {}",
                    anchor.kind, id
                )));
            }
        }

        let mut edge = Anchor::edge(archetype, owner.clone(), source, target, attributes);
        edge.seq = self.memory.next_seq();
        let edge_id = edge.id;
        self.memory.put(edge.clone())?;

        self.memory.update(source, |a| a.attach_edge(edge_id)).await?;
        if target != source {
            self.memory.update(target, |a| a.attach_edge(edge_id)).await?;
        }
        Ok(edge)
    }

    /// Detach an edge from its endpoints and delete it.
    pub async fn disconnect(&self, edge_id: AnchorId) -> Result<(), RuntimeError> {
        let edge = self.resolve(edge_id).await?;
        let Some(ends) = edge.endpoints else {
            return Err(RuntimeError::InvalidOperation(format!(
                "{} is a {} anchor, not an edge",
                edge_id, edge.kind
            )));
        };
        for endpoint in [ends.source, ends.target] {
            match self.memory.update(endpoint, |a| a.detach_edge(edge_id)).await {
                Ok(_) | Err(RuntimeError::StaleAnchor(_)) | Err(RuntimeError::DanglingReference(_)) => {}
                Err(e) => return Err(e),
            }
        }
        self.memory.delete(edge_id).await
    }

    /// Delete an anchor. Edges are disconnected first; deleting a node
    /// leaves its edges in place, and traversals over them report the node
    /// as stale.
    pub async fn delete(&self, id: AnchorId) -> Result<(), RuntimeError> {
        let anchor = self.resolve(id).await?;
        if anchor.is_root() {
            return Err(RuntimeError::InvalidOperation(format!(
                "root {} cannot be deleted",
                id
            )));
        }
        if anchor.is_edge() {
            return self.disconnect(id).await;
        }
        self.memory.delete(id).await
    }

    pub async fn set_attr(&self, id: AnchorId, key: &str, value: Value) -> Result<(), RuntimeError> {
        let key = key.to_string();
        self.memory.update(id, move |a| a.set(key, value)).await
    }

    /// Neighbours of `location` that pass `query`, in edge creation order
    /// unless the query sorts.
    ///
    /// For a node the edges are its incident edges. For an edge location the
    /// "neighbours" are its endpoints, with the edge itself as the connecting
    /// edge.
    ///
    /// Direction and edge filters run before the far node is resolved; node
    /// filters run after. A deleted far node therefore fails the query with
    /// [`RuntimeError::StaleAnchor`] even when a node filter would have
    /// rejected it, unless an edge filter already excluded its edge.
    pub async fn neighbors(&self, location: AnchorId, query: &NeighborQuery) -> Result<Vec<Neighbor>, RuntimeError> {
        let here = self.resolve(location).await?;
        let mut out = Vec::new();

        if let Some(ends) = here.endpoints {
            let far: Vec<AnchorId> = match query.direction {
                Direction::Outgoing => vec![ends.target],
                Direction::Incoming => vec![ends.source],
                Direction::Any if ends.source == ends.target => vec![ends.source],
                Direction::Any => vec![ends.source, ends.target],
            };
            for id in far {
                let node = self.resolve(id).await?;
                if query.accepts_node(&node) {
                    out.push(Neighbor {
                        edge: here.clone(),
                        node,
                    });
                }
            }
            query.apply_sort(&mut out);
            return Ok(out);
        }

        for edge_id in &here.edges {
            let edge = self.resolve(*edge_id).await?;
            let Some(ends) = edge.endpoints else {
                continue;
            };
            let direction_ok = match query.direction {
                Direction::Outgoing => ends.source == location,
                Direction::Incoming => ends.target == location,
                Direction::Any => true,
            };
            if !direction_ok || !query.accepts_edge(&edge) {
                continue;
            }
            let node = self.resolve(ends.other(location)).await?;
            if query.accepts_node(&node) {
                out.push(Neighbor { edge, node });
            }
        }
        query.apply_sort(&mut out);
        Ok(out)
    }
}
