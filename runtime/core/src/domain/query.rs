// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Neighbour queries and visit directives.
//!
//! A [`NeighborQuery`] filters the edges incident to a location: direction,
//! edge archetype, edge predicate, node archetype, node predicate, then an
//! optional sort. A [`VisitSpec`] wraps a query with what a walker does with
//! the result (which targets to enqueue and where in the queue).

use crate::domain::anchor::{Anchor, Attributes};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Any,
}

pub type AttrPredicate = Arc<dyn Fn(&Attributes) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub descending: bool,
}

#[derive(Clone, Default)]
pub struct NeighborQuery {
    pub direction: Direction,
    pub edge_types: Option<Vec<String>>,
    pub node_types: Option<Vec<String>>,
    pub edge_filter: Option<AttrPredicate>,
    pub node_filter: Option<AttrPredicate>,
    pub sort_by: Option<SortKey>,
}

impl NeighborQuery {
    pub fn outgoing() -> Self {
        Self::default()
    }

    pub fn incoming() -> Self {
        Self {
            direction: Direction::Incoming,
            ..Self::default()
        }
    }

    pub fn any() -> Self {
        Self {
            direction: Direction::Any,
            ..Self::default()
        }
    }

    /// Restrict to edges of this archetype. Repeated calls form a union.
    pub fn edge_type(mut self, archetype: impl Into<String>) -> Self {
        self.edge_types.get_or_insert_with(Vec::new).push(archetype.into());
        self
    }

    /// Restrict to target nodes of this archetype. Repeated calls form a union.
    pub fn node_type(mut self, archetype: impl Into<String>) -> Self {
        self.node_types.get_or_insert_with(Vec::new).push(archetype.into());
        self
    }

    pub fn where_edge<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Attributes) -> bool + Send + Sync + 'static,
    {
        self.edge_filter = Some(Arc::new(predicate));
        self
    }

    pub fn where_node<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Attributes) -> bool + Send + Sync + 'static,
    {
        self.node_filter = Some(Arc::new(predicate));
        self
    }

    pub fn sort_by(mut self, attribute: impl Into<String>, descending: bool) -> Self {
        self.sort_by = Some(SortKey {
            attribute: attribute.into(),
            descending,
        });
        self
    }

    pub fn accepts_edge(&self, edge: &Anchor) -> bool {
        if let Some(types) = &self.edge_types {
            if !types.iter().any(|t| t == &edge.archetype) {
                return false;
            }
        }
        match &self.edge_filter {
            Some(predicate) => predicate(&edge.attributes),
            None => true,
        }
    }

    pub fn accepts_node(&self, node: &Anchor) -> bool {
        if let Some(types) = &self.node_types {
            if !types.iter().any(|t| t == &node.archetype) {
                return false;
            }
        }
        match &self.node_filter {
            Some(predicate) => predicate(&node.attributes),
            None => true,
        }
    }

    /// Stable sort of `neighbors` by the configured node attribute. Missing
    /// attributes sort last.
    pub fn apply_sort(&self, neighbors: &mut [Neighbor]) {
        let Some(key) = &self.sort_by else {
            return;
        };
        neighbors.sort_by(|a, b| {
            let ord = compare_attr(a.node.get(&key.attribute), b.node.get(&key.attribute));
            if key.descending {
                match (a.node.get(&key.attribute), b.node.get(&key.attribute)) {
                    (Some(_), Some(_)) => ord.reverse(),
                    _ => ord,
                }
            } else {
                ord
            }
        });
    }
}

impl fmt::Debug for NeighborQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeighborQuery")
            .field("direction", &self.direction)
            .field("edge_types", &self.edge_types)
            .field("node_types", &self.node_types)
            .field("edge_filter", &self.edge_filter.is_some())
            .field("node_filter", &self.node_filter.is_some())
            .field("sort_by", &self.sort_by)
            .finish()
    }
}

fn compare_attr(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// One hop from a location: the edge taken and the anchor on its far side.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub edge: Anchor,
    pub node: Anchor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    First,
    Last,
}

/// Whether a visit enqueues the far nodes or the edges themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitTarget {
    #[default]
    Nodes,
    Edges,
}

#[derive(Debug, Clone, Default)]
pub struct VisitSpec {
    pub query: NeighborQuery,
    pub selection: Selection,
    pub target: VisitTarget,
    /// Insert targets at the front of the queue instead of the back.
    pub depth_first: bool,
}

impl VisitSpec {
    pub fn outgoing() -> Self {
        Self::from(NeighborQuery::outgoing())
    }

    pub fn incoming() -> Self {
        Self::from(NeighborQuery::incoming())
    }

    pub fn any() -> Self {
        Self::from(NeighborQuery::any())
    }

    pub fn edge_type(mut self, archetype: impl Into<String>) -> Self {
        self.query = self.query.edge_type(archetype);
        self
    }

    pub fn node_type(mut self, archetype: impl Into<String>) -> Self {
        self.query = self.query.node_type(archetype);
        self
    }

    pub fn where_edge<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Attributes) -> bool + Send + Sync + 'static,
    {
        self.query = self.query.where_edge(predicate);
        self
    }

    pub fn where_node<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Attributes) -> bool + Send + Sync + 'static,
    {
        self.query = self.query.where_node(predicate);
        self
    }

    pub fn sort_by(mut self, attribute: impl Into<String>, descending: bool) -> Self {
        self.query = self.query.sort_by(attribute, descending);
        self
    }

    pub fn first(mut self) -> Self {
        self.selection = Selection::First;
        self
    }

    pub fn last(mut self) -> Self {
        self.selection = Selection::Last;
        self
    }

    pub fn edges(mut self) -> Self {
        self.target = VisitTarget::Edges;
        self
    }

    pub fn depth_first(mut self) -> Self {
        self.depth_first = true;
        self
    }

    /// Apply the selection to an already filtered neighbour list.
    pub fn select(&self, mut neighbors: Vec<Neighbor>) -> Vec<Neighbor> {
        match self.selection {
            Selection::All => neighbors,
            Selection::First => {
                neighbors.truncate(1);
                neighbors
            }
            Selection::Last => neighbors.pop().into_iter().collect(),
        }
    }
}

impl From<NeighborQuery> for VisitSpec {
    fn from(query: NeighborQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }
}
