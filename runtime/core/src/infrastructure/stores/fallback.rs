// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Primary/fallback L3 composition.
//!
//! Operations go to the primary store until it reports
//! [`StoreError::Unavailable`]. From then on the store is degraded:
//!
//! - writes and deletes go to the fallback, and deleted ids are remembered
//! - reads try the fallback first and then the primary, so anything the
//!   primary holds is either returned or its unavailability is surfaced
//! - key listings merge both sides when the primary answers
//!
//! Records left in the fallback are replayed into the primary the first time
//! a healthy primary is used, which also covers a new session opened after
//! an outage. [`FallbackAnchorStore::try_recover`] (also run by
//! `health_check`) does the same for a degraded store and switches back.
//! Other errors (serialization, corruption) are returned as-is and do not
//! trigger the switch.

use crate::domain::anchor::{AnchorId, AnchorKind, AnchorRecord};
use crate::domain::repository::{AnchorStore, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct FallbackAnchorStore {
    primary: Arc<dyn AnchorStore>,
    fallback: Arc<dyn AnchorStore>,
    degraded: AtomicBool,
    reconciled: AtomicBool,
    // Serializes replay against degraded writes.
    replay_lock: tokio::sync::Mutex<()>,
    pending_deletes: Mutex<HashSet<AnchorId>>,
}

impl FallbackAnchorStore {
    pub fn new(primary: Arc<dyn AnchorStore>, fallback: Arc<dyn AnchorStore>) -> Self {
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
            reconciled: AtomicBool::new(false),
            replay_lock: tokio::sync::Mutex::new(()),
            pending_deletes: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Record a primary failure. Returns true if the caller should continue
    /// on the degraded path.
    fn degrade_on(&self, err: &StoreError, op: &str) -> bool {
        if !err.is_unavailable() {
            return false;
        }
        if !self.degraded.swap(true, Ordering::AcqRel) {
            warn!(
                "{} store failed during {} ({}); switching to {} store",
                self.primary.backend_name(),
                op,
                err,
                self.fallback.backend_name()
            );
            metrics::counter!("osp_store_fallback_total", "op" => op.to_string()).increment(1);
        }
        true
    }

    fn is_pending_delete(&self, id: AnchorId) -> bool {
        self.pending_deletes.lock().contains(&id)
    }

    /// Move everything held by the fallback into the primary, then clear the
    /// fallback. Returns the number of records moved.
    async fn replay(&self) -> Result<usize, StoreError> {
        let keys = match self.fallback.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cannot list {} store for replay: {}", self.fallback.backend_name(), e);
                return Ok(0);
            }
        };
        let deletes: Vec<AnchorId> = self.pending_deletes.lock().iter().copied().collect();

        let mut records = Vec::with_capacity(keys.len());
        for (id, _) in &keys {
            if let Some(record) = self.fallback.load(*id).await? {
                records.push(record);
            }
        }
        if !deletes.is_empty() {
            self.primary.delete(&deletes).await?;
        }
        if !records.is_empty() {
            self.primary.save(&records).await?;
        }
        let ids: Vec<AnchorId> = keys.into_iter().map(|(id, _)| id).collect();
        if !ids.is_empty() {
            self.fallback.delete(&ids).await?;
        }

        let mut pending = self.pending_deletes.lock();
        for id in &deletes {
            pending.remove(id);
        }
        Ok(records.len())
    }

    async fn ensure_reconciled(&self) {
        if self.reconciled.load(Ordering::Acquire) || self.is_degraded() {
            return;
        }
        let _guard = self.replay_lock.lock().await;
        if self.reconciled.load(Ordering::Acquire) || self.is_degraded() {
            return;
        }
        match self.replay().await {
            Ok(0) => {}
            Ok(moved) => info!(
                "Replayed {} records from {} store into {} store",
                moved,
                self.fallback.backend_name(),
                self.primary.backend_name()
            ),
            Err(e) if self.degrade_on(&e, "replay") => return,
            Err(e) => warn!("Replay into {} store failed: {}", self.primary.backend_name(), e),
        }
        self.reconciled.store(true, Ordering::Release);
    }

    /// Check the primary and, if it answers, replay the fallback into it and
    /// leave degraded mode. Returns whether the primary is in use afterwards.
    pub async fn try_recover(&self) -> Result<bool, StoreError> {
        if !self.is_degraded() {
            return Ok(true);
        }
        let _guard = self.replay_lock.lock().await;
        if !self.is_degraded() {
            return Ok(true);
        }
        if let Err(e) = self.primary.health_check().await {
            debug!("{} store still unavailable: {}", self.primary.backend_name(), e);
            return Ok(false);
        }
        let moved = match self.replay().await {
            Ok(moved) => moved,
            Err(e) if e.is_unavailable() => return Ok(false),
            Err(e) => return Err(e),
        };
        self.degraded.store(false, Ordering::Release);
        self.reconciled.store(true, Ordering::Release);
        info!(
            "{} store recovered; replayed {} records from {} store",
            self.primary.backend_name(),
            moved,
            self.fallback.backend_name()
        );
        metrics::counter!("osp_store_recoveries_total").increment(1);
        Ok(true)
    }

    async fn degraded_load(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        if self.is_pending_delete(id) {
            return Ok(None);
        }
        if let Some(record) = self.fallback.load(id).await? {
            return Ok(Some(record));
        }
        self.primary.load(id).await
    }

    async fn degraded_edges_of(&self, node: AnchorId) -> Result<Vec<AnchorRecord>, StoreError> {
        let mut merged: HashMap<AnchorId, AnchorRecord> = self
            .primary
            .edges_of(node)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        for record in self.fallback.edges_of(node).await? {
            merged.insert(record.id, record);
        }
        let pending = self.pending_deletes.lock();
        Ok(merged
            .into_values()
            .filter(|r| !pending.contains(&r.id))
            .collect())
    }

    async fn degraded_list_keys(&self) -> Result<Vec<(AnchorId, AnchorKind)>, StoreError> {
        let mut keys: HashMap<AnchorId, AnchorKind> = self.fallback.list_keys().await?.into_iter().collect();
        match self.primary.list_keys().await {
            Ok(primary) => {
                for (id, kind) in primary {
                    keys.entry(id).or_insert(kind);
                }
            }
            Err(e) if e.is_unavailable() => {
                debug!("Listing {} store only: {}", self.fallback.backend_name(), e);
            }
            Err(e) => return Err(e),
        }
        let pending = self.pending_deletes.lock();
        let mut keys: Vec<(AnchorId, AnchorKind)> =
            keys.into_iter().filter(|(id, _)| !pending.contains(id)).collect();
        keys.sort_by_key(|(id, _)| *id);
        Ok(keys)
    }
}

#[async_trait]
impl AnchorStore for FallbackAnchorStore {
    async fn load(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        self.ensure_reconciled().await;
        if !self.is_degraded() {
            match self.primary.load(id).await {
                Err(e) if self.degrade_on(&e, "load") => {}
                other => return other,
            }
        }
        self.degraded_load(id).await
    }

    async fn save(&self, records: &[AnchorRecord]) -> Result<(), StoreError> {
        self.ensure_reconciled().await;
        if !self.is_degraded() {
            match self.primary.save(records).await {
                Err(e) if self.degrade_on(&e, "save") => {}
                other => return other,
            }
        }
        let _guard = self.replay_lock.lock().await;
        if !self.is_degraded() {
            return self.primary.save(records).await;
        }
        self.fallback.save(records).await
    }

    async fn delete(&self, ids: &[AnchorId]) -> Result<(), StoreError> {
        self.ensure_reconciled().await;
        if !self.is_degraded() {
            match self.primary.delete(ids).await {
                Err(e) if self.degrade_on(&e, "delete") => {}
                other => return other,
            }
        }
        let _guard = self.replay_lock.lock().await;
        if !self.is_degraded() {
            return self.primary.delete(ids).await;
        }
        self.fallback.delete(ids).await?;
        self.pending_deletes.lock().extend(ids.iter().copied());
        Ok(())
    }

    async fn edges_of(&self, node: AnchorId) -> Result<Vec<AnchorRecord>, StoreError> {
        self.ensure_reconciled().await;
        if !self.is_degraded() {
            match self.primary.edges_of(node).await {
                Err(e) if self.degrade_on(&e, "edges_of") => {}
                other => return other,
            }
        }
        self.degraded_edges_of(node).await
    }

    async fn list_keys(&self) -> Result<Vec<(AnchorId, AnchorKind)>, StoreError> {
        self.ensure_reconciled().await;
        if !self.is_degraded() {
            match self.primary.list_keys().await {
                Err(e) if self.degrade_on(&e, "list_keys") => {}
                other => return other,
            }
        }
        self.degraded_list_keys().await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.try_recover().await? {
            self.primary.health_check().await
        } else {
            self.fallback.health_check().await
        }
    }

    fn is_degraded(&self) -> bool {
        FallbackAnchorStore::is_degraded(self)
    }

    fn backend_name(&self) -> &'static str {
        if self.is_degraded() {
            self.fallback.backend_name()
        } else {
            self.primary.backend_name()
        }
    }
}
