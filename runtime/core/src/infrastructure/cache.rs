// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! L2 shared cache backed by an LRU map with per-entry TTL.
//!
//! One `LruSharedCache` can be handed (as `Arc<dyn SharedCache>`) to several
//! tiered memories so they share warm records.

use crate::domain::anchor::{AnchorId, AnchorRecord};
use crate::domain::repository::{SharedCache, StoreError};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

struct Entry {
    record: AnchorRecord,
    expires_at: Instant,
}

pub struct LruSharedCache {
    entries: Mutex<LruCache<AnchorId, Entry>>,
}

impl LruSharedCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl SharedCache for LruSharedCache {
    async fn get(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(&id) {
            Some(entry) if entry.expires_at > Instant::now() => return Ok(Some(entry.record.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(&id);
        }
        Ok(None)
    }

    async fn put(&self, record: &AnchorRecord, ttl: Duration) -> Result<(), StoreError> {
        let entry = Entry {
            record: record.clone(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.lock().put(record.id, entry);
        Ok(())
    }

    async fn invalidate(&self, id: AnchorId) -> Result<(), StoreError> {
        self.entries.lock().pop(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anchor::{Anchor, Attributes, PrincipalId};

    fn record() -> AnchorRecord {
        Anchor::node("N", PrincipalId::new("p"), Attributes::new()).to_record()
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = LruSharedCache::new(4);
        let r = record();
        cache.put(&r, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(r.id).await.unwrap(), Some(r.clone()));
        cache.invalidate(r.id).await.unwrap();
        assert_eq!(cache.get(r.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted_on_read() {
        let cache = LruSharedCache::new(4);
        let r = record();
        cache.put(&r, Duration::ZERO).await.unwrap();
        assert_eq!(cache.get(r.id).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = LruSharedCache::new(2);
        let (a, b, c) = (record(), record(), record());
        let ttl = Duration::from_secs(60);
        cache.put(&a, ttl).await.unwrap();
        cache.put(&b, ttl).await.unwrap();
        cache.get(a.id).await.unwrap();
        cache.put(&c, ttl).await.unwrap();

        assert!(cache.get(a.id).await.unwrap().is_some());
        assert!(cache.get(b.id).await.unwrap().is_none());
        assert!(cache.get(c.id).await.unwrap().is_some());
        assert_eq!(cache.len(), 2);
    }
}
