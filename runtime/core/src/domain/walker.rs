// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Walker
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Walker instances, their lifecycle phases and the result
//!   handed back to the spawner

use crate::domain::anchor::{Anchor, AnchorId, Attributes};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// A walker instance: an archetype name plus its attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Walker {
    pub id: AnchorId,
    pub archetype: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Walker {
    pub fn new(archetype: impl Into<String>) -> Self {
        Self {
            id: AnchorId::new(),
            archetype: archetype.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(archetype: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Self::new(archetype)
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Rebuild a walker from its persisted snapshot anchor.
    pub fn from_snapshot(anchor: &Anchor) -> Self {
        Self {
            id: anchor.id,
            archetype: anchor.archetype.clone(),
            attributes: anchor.attributes.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "location", rename_all = "snake_case")]
pub enum WalkerPhase {
    Spawned,
    Visiting(AnchorId),
    AbilityDispatch(AnchorId),
    Disengaged,
    Completed,
}

impl WalkerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, WalkerPhase::Disengaged | WalkerPhase::Completed)
    }
}

/// Mutable state of a running walker. Owned by the scheduler and shared with
/// the ability contexts of that walker only.
#[derive(Debug)]
pub struct WalkerState {
    pub walker: Walker,
    pub queue: VecDeque<AnchorId>,
    pub reports: Vec<Value>,
    pub phase: WalkerPhase,
    pub disengaged: bool,
    pub skip_requested: bool,
    pub return_value: Option<Value>,
    pub visited: usize,
}

impl WalkerState {
    pub fn new(walker: Walker) -> Self {
        Self {
            walker,
            queue: VecDeque::new(),
            reports: Vec::new(),
            phase: WalkerPhase::Spawned,
            disengaged: false,
            skip_requested: false,
            return_value: None,
            visited: 0,
        }
    }

    /// Enqueue targets. Depth-first inserts them at the front, preserving
    /// their relative order.
    pub fn enqueue(&mut self, targets: &[AnchorId], depth_first: bool) {
        if depth_first {
            for id in targets.iter().rev() {
                self.queue.push_front(*id);
            }
        } else {
            self.queue.extend(targets.iter().copied());
        }
    }

    pub fn into_result(self) -> WalkerResult {
        let return_value = self.return_value.unwrap_or_else(|| {
            Value::Object(self.walker.attributes.clone().into_iter().collect())
        });
        WalkerResult {
            walker: self.walker,
            reports: self.reports,
            return_value,
            phase: self.phase,
            visited: self.visited,
        }
    }
}

/// Outcome of a completed spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkerResult {
    pub walker: Walker,
    pub reports: Vec<Value>,
    /// Explicit return value, or the walker's final attributes when none was set.
    pub return_value: Value,
    pub phase: WalkerPhase,
    pub visited: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_breadth_first_appends_and_depth_first_prepends() {
        let (a, b, c, d) = (AnchorId::new(), AnchorId::new(), AnchorId::new(), AnchorId::new());
        let mut state = WalkerState::new(Walker::new("W"));
        state.enqueue(&[a, b], false);
        state.enqueue(&[c, d], true);
        assert_eq!(state.queue.iter().copied().collect::<Vec<_>>(), vec![c, d, a, b]);
    }

    #[test]
    fn test_result_defaults_return_value_to_walker_attributes() {
        let state = WalkerState::new(Walker::new("W").with_attr("count", 3));
        let result = state.into_result();
        assert_eq!(result.return_value, json!({"count": 3}));
        assert_eq!(result.phase, WalkerPhase::Spawned);
    }

    #[test]
    fn test_explicit_return_value_wins() {
        let mut state = WalkerState::new(Walker::new("W").with_attr("count", 3));
        state.return_value = Some(json!("done"));
        assert_eq!(state.into_result().return_value, json!("done"));
    }
}
