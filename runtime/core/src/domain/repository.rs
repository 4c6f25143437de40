// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tier Interfaces
//!
//! Persistence contracts for the two tiers that sit behind L1:
//!
//! | Trait | Tier | Implementations |
//! |-------|------|-----------------|
//! | [`SharedCache`] | L2 | `LruSharedCache` |
//! | [`AnchorStore`] | L3 | `SledAnchorStore`, `FileAnchorStore`, `InMemoryAnchorStore`, `FallbackAnchorStore` |
//!
//! Both exchange [`AnchorRecord`]s, never in-memory [`crate::domain::Anchor`]s.
//! Concrete implementations live in `crate::infrastructure` and are selected
//! from the runtime config (`memory.store.backend`).

use crate::domain::anchor::{AnchorId, AnchorKind, AnchorRecord};
use crate::domain::errors::RuntimeError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    L1,
    L2,
    L3,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::L1 => "L1",
            Tier::L2 => "L2",
            Tier::L3 => "L3",
        };
        write!(f, "{}", name)
    }
}

/// Durable anchor storage (L3).
#[async_trait]
pub trait AnchorStore: Send + Sync {
    async fn load(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError>;

    /// Upsert a batch of records.
    async fn save(&self, records: &[AnchorRecord]) -> Result<(), StoreError>;

    /// Remove records. Unknown ids are ignored.
    async fn delete(&self, ids: &[AnchorId]) -> Result<(), StoreError>;

    /// Edge records with `node` as source or target, in no particular order.
    async fn edges_of(&self, node: AnchorId) -> Result<Vec<AnchorRecord>, StoreError>;

    /// Every stored id with its kind.
    async fn list_keys(&self) -> Result<Vec<(AnchorId, AnchorKind)>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// True while the store answers from a partial view of its data, as a
    /// primary/fallback pair does during an outage. Commits skip the sweep
    /// while this holds.
    fn is_degraded(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str;
}

/// Shared cache (L2). May be shared by several memories.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError>;

    async fn put(&self, record: &AnchorRecord, ttl: Duration) -> Result<(), StoreError>;

    async fn invalidate(&self, id: AnchorId) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt record for {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StoreError {
    /// Lift into a runtime error attributed to `tier`.
    pub fn at(self, tier: Tier) -> RuntimeError {
        match self {
            StoreError::Serialization(reason) => RuntimeError::Serialization(reason),
            other => RuntimeError::TierUnavailable {
                tier,
                reason: other.to_string(),
            },
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
