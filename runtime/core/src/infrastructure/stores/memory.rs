// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory L3 store for tests and throwaway sessions.
//
// Cloning shares the backing map, so two runtimes opened over clones of the
// same store observe each other's commits.

use crate::domain::anchor::{AnchorId, AnchorKind, AnchorRecord};
use crate::domain::repository::{AnchorStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryAnchorStore {
    records: Arc<RwLock<HashMap<AnchorId, AnchorRecord>>>,
}

impl InMemoryAnchorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn contains(&self, id: AnchorId) -> bool {
        self.records.read().await.contains_key(&id)
    }
}

#[async_trait]
impl AnchorStore for InMemoryAnchorStore {
    async fn load(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn save(&self, records: &[AnchorRecord]) -> Result<(), StoreError> {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.id, record.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[AnchorId]) -> Result<(), StoreError> {
        let mut map = self.records.write().await;
        for id in ids {
            map.remove(id);
        }
        Ok(())
    }

    async fn edges_of(&self, node: AnchorId) -> Result<Vec<AnchorRecord>, StoreError> {
        let map = self.records.read().await;
        Ok(map
            .values()
            .filter(|r| r.kind == AnchorKind::Edge && r.touches(node))
            .cloned()
            .collect())
    }

    async fn list_keys(&self) -> Result<Vec<(AnchorId, AnchorKind)>, StoreError> {
        let map = self.records.read().await;
        Ok(map.values().map(|r| (r.id, r.kind)).collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
