// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain events published on the [`crate::infrastructure::event_bus::EventBus`].

use crate::domain::anchor::{AnchorId, PrincipalId};
use crate::domain::repository::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalkerEvent {
    WalkerSpawned {
        walker_id: AnchorId,
        archetype: String,
        principal: PrincipalId,
        start: AnchorId,
        spawned_at: DateTime<Utc>,
    },
    LocationVisited {
        walker_id: AnchorId,
        location: AnchorId,
        archetype: String,
        visited_at: DateTime<Utc>,
    },
    /// Implicit visit dropped because the principal cannot read the target.
    VisitDenied {
        walker_id: AnchorId,
        location: AnchorId,
        principal: PrincipalId,
        denied_at: DateTime<Utc>,
    },
    WalkerDisengaged {
        walker_id: AnchorId,
        location: AnchorId,
        disengaged_at: DateTime<Utc>,
    },
    WalkerCompleted {
        walker_id: AnchorId,
        visited: usize,
        reports: usize,
        completed_at: DateTime<Utc>,
    },
    WalkerFailed {
        walker_id: AnchorId,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl WalkerEvent {
    pub fn walker_id(&self) -> AnchorId {
        match self {
            WalkerEvent::WalkerSpawned { walker_id, .. }
            | WalkerEvent::LocationVisited { walker_id, .. }
            | WalkerEvent::VisitDenied { walker_id, .. }
            | WalkerEvent::WalkerDisengaged { walker_id, .. }
            | WalkerEvent::WalkerCompleted { walker_id, .. }
            | WalkerEvent::WalkerFailed { walker_id, .. } => *walker_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MemoryEvent {
    Committed {
        persisted: usize,
        swept: usize,
        committed_at: DateTime<Utc>,
    },
    AnchorDeleted {
        anchor: AnchorId,
        deleted_at: DateTime<Utc>,
    },
    /// A non-authoritative tier failed and was skipped.
    TierDegraded {
        tier: Tier,
        reason: String,
        degraded_at: DateTime<Utc>,
    },
}
