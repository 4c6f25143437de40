// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tiered Memory
//!
//! Anchor-keyed access across three tiers:
//!
//! | Tier | Backing | Lifetime |
//! |------|---------|----------|
//! | L1 | `HashMap` in this process | volatile, always present |
//! | L2 | [`SharedCache`] (optional) | volatile, TTL-bounded |
//! | L3 | [`AnchorStore`] | durable, authoritative on reload |
//!
//! Reads go L1 → L2 → L3 and populate the tiers they missed. Writes land in
//! L1 only and mark the anchor dirty; nothing reaches L2/L3 until
//! [`TieredMemory::commit`].
//!
//! ## Commit
//!
//! Commit is mark-and-sweep over the whole graph. Marking walks edges
//! (in either direction) from every root known to L1 or L3, reading L3
//! records directly so the persisted graph is not pulled into L1. Reachable
//! dirty anchors are flushed to L3 and then L2. Persisted anchors that were
//! not marked are removed from L3 and L2; walker snapshots are never swept.
//! The sweep is skipped while L3 is degraded or could not be fully read.
//!
//! ## Deletion
//!
//! Deletion is immediate in every tier and leaves a tombstone, so later
//! dereferences fail with [`RuntimeError::StaleAnchor`] instead of silently
//! resolving to nothing. A commit that sweeps drops tombstones nothing in L1
//! still refers to.

use crate::domain::anchor::{Anchor, AnchorId, AnchorKind, AnchorRecord, Endpoints};
use crate::domain::errors::RuntimeError;
use crate::domain::events::MemoryEvent;
use crate::domain::repository::{AnchorStore, SharedCache, StoreError, Tier};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

fn record_ends(record: &AnchorRecord) -> Option<Endpoints> {
    match (record.source, record.target) {
        (Some(source), Some(target)) => Some(Endpoints { source, target }),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CommitSummary {
    pub reachable: usize,
    pub persisted: usize,
    pub swept: usize,
}

pub struct TieredMemory {
    l1: RwLock<HashMap<AnchorId, Anchor>>,
    tombstones: RwLock<HashSet<AnchorId>>,
    l2: Option<Arc<dyn SharedCache>>,
    l2_ttl: Duration,
    l3: Arc<dyn AnchorStore>,
    next_seq: AtomicU64,
    events: EventBus,
}

impl TieredMemory {
    pub fn new(l3: Arc<dyn AnchorStore>, events: EventBus) -> Self {
        Self {
            l1: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashSet::new()),
            l2: None,
            l2_ttl: Duration::from_secs(300),
            l3,
            next_seq: AtomicU64::new(1),
            events,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn SharedCache>, ttl: Duration) -> Self {
        self.l2 = Some(cache);
        self.l2_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<dyn AnchorStore> {
        &self.l3
    }

    pub fn has_cache(&self) -> bool {
        self.l2.is_some()
    }

    /// Allocate the next creation sequence number.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    fn observe_seq(&self, seq: u64) {
        self.next_seq.fetch_max(seq.saturating_add(1), Ordering::SeqCst);
    }

    pub fn is_deleted(&self, id: AnchorId) -> bool {
        self.tombstones.read().contains(&id)
    }

    pub fn l1_contains(&self, id: AnchorId) -> bool {
        self.l1.read().contains_key(&id)
    }

    pub fn l1_len(&self) -> usize {
        self.l1.read().len()
    }

    /// Dirty flag of the L1 copy, if any.
    pub fn is_dirty(&self, id: AnchorId) -> Option<bool> {
        self.l1.read().get(&id).map(|a| a.dirty)
    }

    fn l1_get(&self, id: AnchorId) -> Option<Anchor> {
        self.l1.read().get(&id).cloned()
    }

    /// Insert a freshly loaded anchor unless another task got there first.
    fn l1_install(&self, anchor: Anchor) -> Anchor {
        self.l1.write().entry(anchor.id).or_insert(anchor).clone()
    }

    fn tier_degraded(&self, tier: Tier, err: &StoreError) {
        warn!("{} tier error ignored: {}", tier, err);
        metrics::counter!("osp_memory_tier_errors_total", "tier" => tier.to_string()).increment(1);
        self.events.publish_memory_event(MemoryEvent::TierDegraded {
            tier,
            reason: err.to_string(),
            degraded_at: Utc::now(),
        });
    }

    async fn cache_put(&self, record: &AnchorRecord) {
        if let Some(cache) = &self.l2 {
            if let Err(e) = cache.put(record, self.l2_ttl).await {
                self.tier_degraded(Tier::L2, &e);
            }
        }
    }

    async fn cache_invalidate(&self, id: AnchorId) {
        if let Some(cache) = &self.l2 {
            if let Err(e) = cache.invalidate(id).await {
                self.tier_degraded(Tier::L2, &e);
            }
        }
    }

    async fn fetch_record(&self, id: AnchorId) -> Result<Option<AnchorRecord>, RuntimeError> {
        if let Some(cache) = &self.l2 {
            match cache.get(id).await {
                Ok(Some(record)) => {
                    metrics::counter!("osp_memory_reads_total", "tier" => "l2").increment(1);
                    return Ok(Some(record));
                }
                Ok(None) => {}
                Err(e) => self.tier_degraded(Tier::L2, &e),
            }
        }

        let record = self.l3.load(id).await.map_err(|e| e.at(Tier::L3))?;
        match &record {
            Some(record) => {
                metrics::counter!("osp_memory_reads_total", "tier" => "l3").increment(1);
                self.cache_put(record).await;
            }
            None => metrics::counter!("osp_memory_misses_total").increment(1),
        }
        Ok(record)
    }

    /// Turn a record into an L1 anchor, re-deriving node adjacency from the
    /// persisted edge records in creation order.
    async fn hydrate(&self, record: AnchorRecord) -> Result<Anchor, RuntimeError> {
        self.observe_seq(record.seq);
        let mut anchor = Anchor::from_record(record);
        if !anchor.kind.is_node_like() {
            return Ok(anchor);
        }

        let mut edges = self
            .l3
            .edges_of(anchor.id)
            .await
            .map_err(|e| e.at(Tier::L3))?;
        edges.sort_by_key(|e| (e.seq, e.created_at));
        for edge in edges {
            if self.is_deleted(edge.id) {
                continue;
            }
            self.observe_seq(edge.seq);
            anchor.edges.push(edge.id);
            if !self.l1_contains(edge.id) {
                self.l1_install(Anchor::from_record(edge));
            }
        }
        Ok(anchor)
    }

    /// Resolve an anchor through the tiers.
    ///
    /// `Ok(None)` means no tier knows the id. Deleted ids fail with
    /// [`RuntimeError::StaleAnchor`].
    pub async fn get(&self, id: AnchorId) -> Result<Option<Anchor>, RuntimeError> {
        if self.is_deleted(id) {
            return Err(RuntimeError::StaleAnchor(id));
        }
        if let Some(anchor) = self.l1_get(id) {
            metrics::counter!("osp_memory_reads_total", "tier" => "l1").increment(1);
            return Ok(Some(anchor));
        }

        let Some(record) = self.fetch_record(id).await? else {
            return Ok(None);
        };
        let anchor = self.hydrate(record).await?;
        Ok(Some(self.l1_install(anchor)))
    }

    /// Write an anchor to L1 and mark it dirty. Last write wins.
    pub fn put(&self, mut anchor: Anchor) -> Result<(), RuntimeError> {
        if self.is_deleted(anchor.id) {
            return Err(RuntimeError::StaleAnchor(anchor.id));
        }
        let mut l1 = self.l1.write();
        anchor.revision = l1.get(&anchor.id).map(|a| a.revision + 1).unwrap_or(0);
        anchor.dirty = true;
        anchor.updated_at = Utc::now();
        l1.insert(anchor.id, anchor);
        Ok(())
    }

    /// Apply `f` to the L1 copy of `id` under the L1 write lock, loading it
    /// first if needed. The anchor is marked dirty.
    pub async fn update<F, R>(&self, id: AnchorId, f: F) -> Result<R, RuntimeError>
    where
        F: FnOnce(&mut Anchor) -> R + Send,
    {
        if self.get(id).await?.is_none() {
            return Err(RuntimeError::DanglingReference(id));
        }
        let mut l1 = self.l1.write();
        let anchor = match l1.get_mut(&id) {
            Some(anchor) => anchor,
            None if self.is_deleted(id) => return Err(RuntimeError::StaleAnchor(id)),
            None => return Err(RuntimeError::DanglingReference(id)),
        };
        let out = f(anchor);
        anchor.revision += 1;
        anchor.dirty = true;
        anchor.updated_at = Utc::now();
        Ok(out)
    }

    /// Remove an anchor from every tier and tombstone its id.
    pub async fn delete(&self, id: AnchorId) -> Result<(), RuntimeError> {
        self.l1.write().remove(&id);
        self.tombstones.write().insert(id);
        self.cache_invalidate(id).await;
        self.l3.delete(&[id]).await.map_err(|e| e.at(Tier::L3))?;
        debug!("Deleted anchor {}", id);
        self.events.publish_memory_event(MemoryEvent::AnchorDeleted {
            anchor: id,
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    /// Drop a clean anchor from L1. Dirty anchors are kept.
    pub fn evict(&self, id: AnchorId) -> bool {
        let mut l1 = self.l1.write();
        match l1.get(&id) {
            Some(anchor) if !anchor.dirty => {
                l1.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Refresh an anchor from L3, discarding its L1 copy and L2 entry.
    ///
    /// Edges that exist only in L1 stay attached to a reloaded node.
    pub async fn reload(&self, id: AnchorId) -> Result<Option<Anchor>, RuntimeError> {
        if self.is_deleted(id) {
            return Err(RuntimeError::StaleAnchor(id));
        }
        self.cache_invalidate(id).await;
        let record = self.l3.load(id).await.map_err(|e| e.at(Tier::L3))?;
        let Some(record) = record else {
            self.l1.write().remove(&id);
            return Ok(None);
        };
        self.cache_put(&record).await;

        let mut anchor = self.hydrate(record).await?;
        if anchor.kind.is_node_like() {
            let mut local: Vec<(u64, AnchorId)> = self
                .l1
                .read()
                .values()
                .filter(|a| a.dirty && a.endpoints.is_some_and(|e| e.touches(id)))
                .filter(|a| !anchor.edges.contains(&a.id))
                .map(|a| (a.seq, a.id))
                .collect();
            local.sort();
            anchor.edges.extend(local.into_iter().map(|(_, edge)| edge));
        }
        self.l1.write().insert(id, anchor.clone());
        Ok(Some(anchor))
    }

    async fn root_ids(&self) -> Result<Vec<AnchorId>, RuntimeError> {
        let mut ids: Vec<AnchorId> = self
            .l1
            .read()
            .values()
            .filter(|a| a.is_root())
            .map(|a| a.id)
            .collect();
        let stored = self.l3.list_keys().await.map_err(|e| e.at(Tier::L3))?;
        for (id, kind) in stored {
            if kind == AnchorKind::Root && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids.retain(|id| !self.is_deleted(*id));
        ids.sort();
        Ok(ids)
    }

    /// Every root known to L1 or L3.
    pub async fn roots(&self) -> Result<Vec<Anchor>, RuntimeError> {
        let mut roots = Vec::new();
        for id in self.root_ids().await? {
            if let Some(root) = self.get(id).await? {
                roots.push(root);
            }
        }
        Ok(roots)
    }

    /// Edges of a node as `(edge, far end)` pairs, read from L1 when the node
    /// is there and from L3 otherwise. Nothing is installed into L1.
    ///
    /// `Ok(None)` means the node is deleted or unknown.
    async fn mark_links(&self, id: AnchorId) -> Result<Option<Vec<(AnchorId, AnchorId)>>, RuntimeError> {
        if self.is_deleted(id) {
            return Ok(None);
        }
        let local: Option<Vec<AnchorId>> = self.l1.read().get(&id).map(|anchor| anchor.edges.clone());
        let Some(edge_ids) = local else {
            let Some(record) = self.l3.load(id).await.map_err(|e| e.at(Tier::L3))? else {
                return Ok(None);
            };
            if !record.kind.is_node_like() {
                return Ok(Some(Vec::new()));
            }
            let edges = self.l3.edges_of(id).await.map_err(|e| e.at(Tier::L3))?;
            let links = edges
                .into_iter()
                .filter(|edge| !self.is_deleted(edge.id))
                .filter_map(|edge| record_ends(&edge).map(|ends| (edge.id, ends.other(id))))
                .collect();
            return Ok(Some(links));
        };

        let mut links = Vec::with_capacity(edge_ids.len());
        for edge_id in edge_ids {
            if self.is_deleted(edge_id) {
                continue;
            }
            let local = self.l1.read().get(&edge_id).map(|edge| edge.endpoints);
            let ends = match local {
                Some(ends) => ends,
                None => self
                    .l3
                    .load(edge_id)
                    .await
                    .map_err(|e| e.at(Tier::L3))?
                    .and_then(|r| record_ends(&r)),
            };
            if let Some(ends) = ends {
                links.push((edge_id, ends.other(id)));
            }
        }
        Ok(Some(links))
    }

    /// Ids reachable from the roots. The flag is false when part of the graph
    /// could not be read, in which case nothing may be swept.
    async fn mark(&self) -> Result<(HashSet<AnchorId>, bool), RuntimeError> {
        let mut reachable = HashSet::new();
        let mut complete = true;
        let mut frontier: VecDeque<(AnchorId, Option<AnchorId>)> =
            self.root_ids().await?.into_iter().map(|id| (id, None)).collect();

        while let Some((id, via)) = frontier.pop_front() {
            if reachable.contains(&id) {
                reachable.extend(via);
                continue;
            }
            let links = match self.mark_links(id).await {
                Ok(Some(links)) => links,
                Ok(None) => continue,
                Err(RuntimeError::TierUnavailable { reason, .. }) => {
                    debug!("Marking stopped at {}: {}", id, reason);
                    complete = false;
                    reachable.extend(via);
                    continue;
                }
                Err(e) => return Err(e),
            };
            reachable.insert(id);
            reachable.extend(via);
            for (edge, far) in links {
                if !reachable.contains(&edge) {
                    frontier.push_back((far, Some(edge)));
                }
            }
        }
        Ok((reachable, complete))
    }

    /// Forget tombstones that no L1 anchor refers to and that L3 no longer
    /// holds. Returns how many were dropped.
    async fn prune_tombstones(&self) -> usize {
        let candidates: Vec<AnchorId> = {
            let tombstones = self.tombstones.read();
            let l1 = self.l1.read();
            let mut referenced: HashSet<AnchorId> = HashSet::new();
            for anchor in l1.values() {
                referenced.extend(anchor.edges.iter().copied());
                if let Some(ends) = anchor.endpoints {
                    referenced.insert(ends.source);
                    referenced.insert(ends.target);
                }
            }
            tombstones.iter().filter(|id| !referenced.contains(id)).copied().collect()
        };

        let mut pruned = Vec::new();
        for id in candidates {
            match self.l3.load(id).await {
                Ok(None) => pruned.push(id),
                Ok(Some(_)) => {}
                Err(e) => {
                    debug!("Keeping tombstones, L3 lookup failed: {}", e);
                    break;
                }
            }
        }
        if !pruned.is_empty() {
            let mut tombstones = self.tombstones.write();
            for id in &pruned {
                tombstones.remove(id);
            }
        }
        pruned.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.read().len()
    }

    /// Flush reachable dirty anchors and sweep unreachable persisted ones.
    pub async fn commit(&self) -> Result<CommitSummary, RuntimeError> {
        let started = Instant::now();
        if self.l3.is_degraded() {
            if let Err(e) = self.l3.health_check().await {
                debug!("L3 recovery attempt failed: {}", e);
            }
        }
        let (reachable, complete) = self.mark().await?;

        let (records, revisions): (Vec<AnchorRecord>, Vec<(AnchorId, u64)>) = self
            .l1
            .read()
            .values()
            .filter(|a| a.dirty && (a.kind == AnchorKind::Walker || reachable.contains(&a.id)))
            .map(|a| (a.to_record(), (a.id, a.revision)))
            .unzip();

        if !records.is_empty() {
            self.l3.save(&records).await.map_err(|e| e.at(Tier::L3))?;
        }
        for record in &records {
            self.cache_put(record).await;
        }
        {
            let mut l1 = self.l1.write();
            for (id, revision) in &revisions {
                if let Some(anchor) = l1.get_mut(id) {
                    if anchor.revision == *revision {
                        anchor.dirty = false;
                    }
                }
            }
        }

        let sweep = complete && !self.l3.is_degraded();
        let garbage: Vec<AnchorId> = if sweep {
            self.l3
                .list_keys()
                .await
                .map_err(|e| e.at(Tier::L3))?
                .into_iter()
                .filter(|(id, kind)| *kind != AnchorKind::Walker && !reachable.contains(id))
                .map(|(id, _)| id)
                .collect()
        } else {
            warn!("L3 is degraded or partly unreadable; sweep deferred to a later commit");
            Vec::new()
        };

        if !garbage.is_empty() {
            self.l3.delete(&garbage).await.map_err(|e| e.at(Tier::L3))?;
            for id in &garbage {
                self.cache_invalidate(*id).await;
            }
            // Swept anchors still in L1 are ephemeral again.
            let mut l1 = self.l1.write();
            for id in &garbage {
                if let Some(anchor) = l1.get_mut(id) {
                    anchor.dirty = true;
                }
            }
        }
        if sweep {
            let pruned = self.prune_tombstones().await;
            if pruned > 0 {
                debug!("Pruned {} tombstones", pruned);
            }
        }

        let summary = CommitSummary {
            reachable: reachable.len(),
            persisted: records.len(),
            swept: garbage.len(),
        };
        info!(
            "Committed to {} store: {} persisted, {} swept, {} reachable",
            self.l3.backend_name(),
            summary.persisted,
            summary.swept,
            summary.reachable
        );
        metrics::counter!("osp_commits_total").increment(1);
        metrics::histogram!("osp_commit_duration_seconds").record(started.elapsed().as_secs_f64());
        self.events.publish_memory_event(MemoryEvent::Committed {
            persisted: summary.persisted,
            swept: summary.swept,
            committed_at: Utc::now(),
        });
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anchor::{Attributes, PrincipalId};
    use crate::infrastructure::cache::LruSharedCache;
    use crate::infrastructure::stores::InMemoryAnchorStore;
    use serde_json::json;

    fn alice() -> PrincipalId {
        PrincipalId::new("alice")
    }

    fn memory_over(store: &InMemoryAnchorStore) -> TieredMemory {
        TieredMemory::new(Arc::new(store.clone()), EventBus::new(16))
    }

    fn link(memory: &TieredMemory, from: &mut Anchor, to: &mut Anchor) -> Anchor {
        let mut edge = Anchor::edge("Link", alice(), from.id, to.id, Attributes::new());
        edge.seq = memory.next_seq();
        from.attach_edge(edge.id);
        to.attach_edge(edge.id);
        memory.put(edge.clone()).unwrap();
        memory.put(from.clone()).unwrap();
        memory.put(to.clone()).unwrap();
        edge
    }

    #[tokio::test]
    async fn test_put_marks_dirty_and_get_hits_l1() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let node = Anchor::node("A", alice(), Attributes::new());
        memory.put(node.clone()).unwrap();
        assert_eq!(memory.is_dirty(node.id), Some(true));
        assert_eq!(memory.get(node.id).await.unwrap().unwrap().id, node.id);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_commit_persists_reachable_and_skips_orphans() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let mut root = Anchor::root(&alice());
        let mut child = Anchor::node("A", alice(), Attributes::new());
        let orphan = Anchor::node("Orphan", alice(), Attributes::new());
        let edge = link(&memory, &mut root, &mut child);
        memory.put(orphan.clone()).unwrap();

        let summary = memory.commit().await.unwrap();
        assert_eq!(summary.persisted, 3);
        assert_eq!(summary.swept, 0);
        assert!(store.contains(root.id).await);
        assert!(store.contains(child.id).await);
        assert!(store.contains(edge.id).await);
        assert!(!store.contains(orphan.id).await);
        assert_eq!(memory.is_dirty(child.id), Some(false));
        assert_eq!(memory.is_dirty(orphan.id), Some(true));
    }

    #[tokio::test]
    async fn test_adjacency_is_rederived_in_creation_order() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let mut root = Anchor::root(&alice());
        let mut a = Anchor::node("A", alice(), Attributes::new());
        let mut b = Anchor::node("B", alice(), Attributes::new());
        let first = link(&memory, &mut root, &mut a);
        let second = link(&memory, &mut root, &mut b);
        memory.commit().await.unwrap();

        let fresh = memory_over(&store);
        let reloaded = fresh.get(root.id).await.unwrap().unwrap();
        assert_eq!(reloaded.edges, vec![first.id, second.id]);
        assert!(fresh.next_seq() > second.seq);
    }

    #[tokio::test]
    async fn test_sweep_removes_disconnected_persisted_nodes() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let mut root = Anchor::root(&alice());
        let mut child = Anchor::node("A", alice(), Attributes::new());
        let edge = link(&memory, &mut root, &mut child);
        memory.commit().await.unwrap();

        root.detach_edge(edge.id);
        child.detach_edge(edge.id);
        memory.put(root).unwrap();
        memory.put(child.clone()).unwrap();
        memory.delete(edge.id).await.unwrap();

        let summary = memory.commit().await.unwrap();
        assert_eq!(summary.swept, 1);
        assert!(!store.contains(child.id).await);
        assert_eq!(memory.is_dirty(child.id), Some(true));
    }

    #[tokio::test]
    async fn test_commit_marks_persisted_graph_without_loading_it() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let mut root = Anchor::root(&alice());
        let mut a = Anchor::node("A", alice(), Attributes::new());
        let mut b = Anchor::node("B", alice(), Attributes::new());
        link(&memory, &mut root, &mut a);
        link(&memory, &mut a, &mut b);
        memory.commit().await.unwrap();

        let fresh = memory_over(&store);
        fresh.get(root.id).await.unwrap().unwrap();
        let resident = fresh.l1_len();

        let summary = fresh.commit().await.unwrap();
        assert_eq!(summary.reachable, 5);
        assert_eq!(summary.swept, 0);
        assert_eq!(fresh.l1_len(), resident);
        assert!(!fresh.l1_contains(b.id));
        assert!(store.contains(b.id).await);
    }

    #[tokio::test]
    async fn test_sweeping_commit_drops_unreferenced_tombstones() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let mut root = Anchor::root(&alice());
        let mut child = Anchor::node("A", alice(), Attributes::new());
        let edge = link(&memory, &mut root, &mut child);
        memory.commit().await.unwrap();

        root.detach_edge(edge.id);
        child.detach_edge(edge.id);
        memory.put(root).unwrap();
        memory.put(child).unwrap();
        memory.delete(edge.id).await.unwrap();
        assert_eq!(memory.tombstone_count(), 1);

        memory.commit().await.unwrap();
        assert_eq!(memory.tombstone_count(), 0);
        assert!(memory.get(edge.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tombstones_still_referenced_are_kept() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let mut root = Anchor::root(&alice());
        let mut child = Anchor::node("A", alice(), Attributes::new());
        let edge = link(&memory, &mut root, &mut child);
        memory.commit().await.unwrap();

        memory.delete(child.id).await.unwrap();
        let summary = memory.commit().await.unwrap();
        assert_eq!(summary.reachable, 2);
        assert_eq!(memory.tombstone_count(), 1);
        assert!(matches!(memory.get(child.id).await, Err(RuntimeError::StaleAnchor(_))));
        assert!(store.contains(edge.id).await);
    }

    #[tokio::test]
    async fn test_deleted_ids_are_stale() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let node = Anchor::node("A", alice(), Attributes::new());
        memory.put(node.clone()).unwrap();
        memory.delete(node.id).await.unwrap();

        assert!(matches!(memory.get(node.id).await, Err(RuntimeError::StaleAnchor(_))));
        assert!(matches!(memory.put(node.clone()), Err(RuntimeError::StaleAnchor(_))));
        assert!(memory.get(AnchorId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_l2_serves_evicted_anchors() {
        let store = InMemoryAnchorStore::new();
        let cache = Arc::new(LruSharedCache::new(16));
        let memory = memory_over(&store).with_cache(cache.clone(), Duration::from_secs(60));
        let mut root = Anchor::root(&alice());
        root.set("k", json!(1));
        memory.put(root.clone()).unwrap();
        memory.commit().await.unwrap();
        assert_eq!(cache.len(), 1);

        // Remove from L3 behind the cache's back; an L1 miss is then served by L2.
        store.delete(&[root.id]).await.unwrap();
        assert!(memory.evict(root.id));
        let served = memory.get(root.id).await.unwrap().unwrap();
        assert_eq!(served.get("k"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_reload_prefers_l3_over_l1_and_l2() {
        let store = InMemoryAnchorStore::new();
        let cache = Arc::new(LruSharedCache::new(16));
        let memory = memory_over(&store).with_cache(cache.clone(), Duration::from_secs(60));
        let mut root = Anchor::root(&alice());
        root.set("v", json!("old"));
        memory.put(root.clone()).unwrap();
        memory.commit().await.unwrap();

        let mut newer = root.to_record();
        newer.attributes.insert("v".into(), json!("new"));
        store.save(&[newer]).await.unwrap();

        assert_eq!(memory.get(root.id).await.unwrap().unwrap().get("v"), Some(&json!("old")));
        let reloaded = memory.reload(root.id).await.unwrap().unwrap();
        assert_eq!(reloaded.get("v"), Some(&json!("new")));
        assert_eq!(
            cache.get(root.id).await.unwrap().unwrap().attributes.get("v"),
            Some(&json!("new"))
        );
    }

    #[tokio::test]
    async fn test_update_is_applied_in_place() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let node = Anchor::node("A", alice(), Attributes::new());
        memory.put(node.clone()).unwrap();
        let before = memory.l1_get(node.id).unwrap().revision;

        memory.update(node.id, |a| a.set("x", json!(5))).await.unwrap();
        let after = memory.l1_get(node.id).unwrap();
        assert_eq!(after.get("x"), Some(&json!(5)));
        assert!(after.revision > before);

        let missing = memory.update(AnchorId::new(), |_| ()).await;
        assert!(matches!(missing, Err(RuntimeError::DanglingReference(_))));
    }

    #[tokio::test]
    async fn test_walker_snapshots_are_never_swept() {
        let store = InMemoryAnchorStore::new();
        let memory = memory_over(&store);
        let snapshot = Anchor::walker_snapshot(AnchorId::new(), "W", alice(), Attributes::new());
        memory.put(snapshot.clone()).unwrap();

        let first = memory.commit().await.unwrap();
        assert_eq!(first.persisted, 1);
        let second = memory.commit().await.unwrap();
        assert_eq!(second.swept, 0);
        assert!(store.contains(snapshot.id).await);
    }
}
