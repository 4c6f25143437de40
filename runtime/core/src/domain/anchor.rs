// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Anchors
//!
//! An anchor is the storage-level envelope of a graph object: identity,
//! ownership, access descriptor and the archetype's attribute bag. Nodes,
//! edges, roots and persisted walker snapshots all live in the arena as
//! anchors and refer to each other only by [`AnchorId`].
//!
//! ## In-memory vs persisted shape
//!
//! [`Anchor`] is what L1 holds. It carries the node adjacency list and the
//! tier-sync bookkeeping (`dirty`, `revision`). [`AnchorRecord`] is the
//! serialisable shape written to L2/L3; adjacency is not part of it and is
//! re-derived from edge records (ordered by `seq`) when a node is loaded.

use crate::domain::permission::{Access, Permission};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Attribute bag of an archetype instance.
pub type Attributes = BTreeMap<String, Value>;

/// Archetype name carried by every root anchor.
pub const ROOT_ARCHETYPE: &str = "Root";

/// Stable anchor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identity of the root owned by `principal`.
    ///
    /// Derived deterministically so every session resolves the same root for
    /// the same principal. The system principal's root is the nil UUID.
    pub fn for_root(principal: &PrincipalId) -> Self {
        if principal.is_system() {
            return Self(Uuid::nil());
        }
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, principal.as_str().as_bytes()))
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

const SYSTEM_PRINCIPAL: &str = "__system__";

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The runtime's own principal. Always holds WRITE.
    pub fn system() -> Self {
        Self(SYSTEM_PRINCIPAL.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_PRINCIPAL
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Root,
    Node,
    Edge,
    Walker,
}

impl AnchorKind {
    /// Roots and nodes are locations with adjacency.
    pub fn is_node_like(self) -> bool {
        matches!(self, AnchorKind::Root | AnchorKind::Node)
    }
}

impl fmt::Display for AnchorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnchorKind::Root => "root",
            AnchorKind::Node => "node",
            AnchorKind::Edge => "edge",
            AnchorKind::Walker => "walker",
        };
        write!(f, "{}", name)
    }
}

/// Ordered endpoints of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoints {
    pub source: AnchorId,
    pub target: AnchorId,
}

impl Endpoints {
    pub fn touches(&self, id: AnchorId) -> bool {
        self.source == id || self.target == id
    }

    /// The endpoint opposite `id`. For self-loops this is `id` itself.
    pub fn other(&self, id: AnchorId) -> AnchorId {
        if self.source == id {
            self.target
        } else {
            self.source
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub id: AnchorId,
    pub kind: AnchorKind,
    pub archetype: String,
    pub owner: PrincipalId,
    pub access: Access,
    pub attributes: Attributes,
    pub endpoints: Option<Endpoints>,
    /// Incident edges in creation order. Only populated for roots and nodes.
    pub edges: Vec<AnchorId>,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub dirty: bool,
    pub revision: u64,
}

impl Anchor {
    fn blank(id: AnchorId, kind: AnchorKind, archetype: String, owner: PrincipalId) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            archetype,
            owner,
            access: Access::default(),
            attributes: Attributes::new(),
            endpoints: None,
            edges: Vec::new(),
            seq: 0,
            created_at: now,
            updated_at: now,
            dirty: true,
            revision: 0,
        }
    }

    pub fn root(principal: &PrincipalId) -> Self {
        Self::blank(
            AnchorId::for_root(principal),
            AnchorKind::Root,
            ROOT_ARCHETYPE.to_string(),
            principal.clone(),
        )
    }

    pub fn node(archetype: impl Into<String>, owner: PrincipalId, attributes: Attributes) -> Self {
        let mut anchor = Self::blank(AnchorId::new(), AnchorKind::Node, archetype.into(), owner);
        anchor.attributes = attributes;
        anchor
    }

    pub fn edge(
        archetype: impl Into<String>,
        owner: PrincipalId,
        source: AnchorId,
        target: AnchorId,
        attributes: Attributes,
    ) -> Self {
        let mut anchor = Self::blank(AnchorId::new(), AnchorKind::Edge, archetype.into(), owner);
        anchor.attributes = attributes;
        anchor.endpoints = Some(Endpoints { source, target });
        anchor
    }

    /// Snapshot anchor for a walker. Reuses the walker's id so repeated
    /// persists overwrite the same record.
    pub fn walker_snapshot(
        id: AnchorId,
        archetype: impl Into<String>,
        owner: PrincipalId,
        attributes: Attributes,
    ) -> Self {
        let mut anchor = Self::blank(id, AnchorKind::Walker, archetype.into(), owner);
        anchor.attributes = attributes;
        anchor
    }

    pub fn is_root(&self) -> bool {
        self.kind == AnchorKind::Root
    }

    pub fn is_edge(&self) -> bool {
        self.kind == AnchorKind::Edge
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.dirty = true;
    }

    pub fn attach_edge(&mut self, edge: AnchorId) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    pub fn detach_edge(&mut self, edge: AnchorId) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| *e != edge);
        before != self.edges.len()
    }

    pub fn to_record(&self) -> AnchorRecord {
        AnchorRecord {
            id: self.id,
            kind: self.kind,
            archetype: self.archetype.clone(),
            owner: self.owner.clone(),
            default_permission: self.access.default,
            overrides: self
                .access
                .overrides
                .iter()
                .map(|(grantee, level)| PermissionOverride {
                    grantee: grantee.clone(),
                    level: *level,
                })
                .collect(),
            attributes: self.attributes.clone(),
            source: self.endpoints.map(|e| e.source),
            target: self.endpoints.map(|e| e.target),
            seq: self.seq,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Rebuild an anchor from its persisted shape. Adjacency starts empty and
    /// the anchor is clean.
    pub fn from_record(record: AnchorRecord) -> Self {
        let endpoints = match (record.source, record.target) {
            (Some(source), Some(target)) => Some(Endpoints { source, target }),
            _ => None,
        };
        let mut access = Access::with_default(record.default_permission);
        for o in record.overrides {
            access.grant(o.grantee, o.level);
        }
        Self {
            id: record.id,
            kind: record.kind,
            archetype: record.archetype,
            owner: record.owner,
            access,
            attributes: record.attributes,
            endpoints,
            edges: Vec::new(),
            seq: record.seq,
            created_at: record.created_at,
            updated_at: record.updated_at,
            dirty: false,
            revision: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOverride {
    pub grantee: PrincipalId,
    pub level: Permission,
}

/// Serialisable anchor as written to L2 and L3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub id: AnchorId,
    pub kind: AnchorKind,
    pub archetype: String,
    pub owner: PrincipalId,
    pub default_permission: Permission,
    #[serde(default)]
    pub overrides: Vec<PermissionOverride>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AnchorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<AnchorId>,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnchorRecord {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn touches(&self, id: AnchorId) -> bool {
        self.source == Some(id) || self.target == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_ids_are_deterministic_per_principal() {
        let alice = PrincipalId::new("alice");
        assert_eq!(AnchorId::for_root(&alice), AnchorId::for_root(&alice));
        assert_ne!(
            AnchorId::for_root(&alice),
            AnchorId::for_root(&PrincipalId::new("bob"))
        );
        assert_eq!(AnchorId::for_root(&PrincipalId::system()).0, Uuid::nil());
    }

    #[test]
    fn test_endpoints_other_handles_self_loops() {
        let a = AnchorId::new();
        let b = AnchorId::new();
        let e = Endpoints { source: a, target: b };
        assert_eq!(e.other(a), b);
        assert_eq!(e.other(b), a);
        let lp = Endpoints { source: a, target: a };
        assert_eq!(lp.other(a), a);
        assert!(lp.touches(a));
        assert!(!lp.touches(b));
    }

    #[test]
    fn test_record_roundtrip_preserves_access_and_drops_adjacency() {
        let owner = PrincipalId::new("alice");
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), json!("Ada"));
        let mut node = Anchor::node("Person", owner.clone(), attrs);
        node.access.default = Permission::Read;
        node.access.grant(PrincipalId::new("bob"), Permission::Write);
        node.attach_edge(AnchorId::new());
        node.seq = 7;

        let bytes = node.to_record().to_json().unwrap();
        let restored = Anchor::from_record(AnchorRecord::from_json(&bytes).unwrap());

        assert_eq!(restored.id, node.id);
        assert_eq!(restored.owner, owner);
        assert_eq!(restored.access, node.access);
        assert_eq!(restored.get("name"), Some(&json!("Ada")));
        assert_eq!(restored.seq, 7);
        assert!(restored.edges.is_empty());
        assert!(!restored.dirty);
    }

    #[test]
    fn test_attach_edge_is_idempotent() {
        let mut node = Anchor::node("N", PrincipalId::new("p"), Attributes::new());
        let e = AnchorId::new();
        node.attach_edge(e);
        node.attach_edge(e);
        assert_eq!(node.edges, vec![e]);
        assert!(node.detach_edge(e));
        assert!(!node.detach_edge(e));
    }
}
