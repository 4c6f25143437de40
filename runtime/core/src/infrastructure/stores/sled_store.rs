// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # sled L3 Store
//!
//! Primary durable backend. One sled database per session with two trees:
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `anchors` | anchor id (16 bytes) | JSON [`AnchorRecord`] |
//! | `edge_index` | node id ++ edge id (32 bytes) | empty |
//!
//! The edge index lets a node's adjacency be rebuilt without scanning every
//! record. Writes go through a sled transaction spanning both trees.

use crate::domain::anchor::{AnchorId, AnchorKind, AnchorRecord};
use crate::domain::repository::{AnchorStore, StoreError};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use std::path::Path;
use tracing::{debug, info};

const ANCHORS_TREE: &str = "anchors";
const EDGE_INDEX_TREE: &str = "edge_index";

pub struct SledAnchorStore {
    db: sled::Db,
    anchors: sled::Tree,
    edge_index: sled::Tree,
}

fn index_key(node: AnchorId, edge: AnchorId) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[..16].copy_from_slice(node.as_bytes());
    key[16..].copy_from_slice(edge.as_bytes());
    key
}

fn decode_id(bytes: &[u8]) -> Result<AnchorId, StoreError> {
    let raw: [u8; 16] = bytes.try_into().map_err(|_| StoreError::Corrupt {
        id: format!("{:?}", bytes),
        reason: "key is not 16 bytes".to_string(),
    })?;
    Ok(AnchorId::from_bytes(raw))
}

fn decode_record(key: &[u8], value: &[u8]) -> Result<AnchorRecord, StoreError> {
    AnchorRecord::from_json(value).map_err(|e| StoreError::Corrupt {
        id: decode_id(key).map(|id| id.to_string()).unwrap_or_default(),
        reason: e.to_string(),
    })
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

fn map_tx_error(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::from(e),
    }
}

impl SledAnchorStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        let anchors = db.open_tree(ANCHORS_TREE)?;
        let edge_index = db.open_tree(EDGE_INDEX_TREE)?;
        info!("Opened sled anchor store at {:?} ({} anchors)", path, anchors.len());
        Ok(Self {
            db,
            anchors,
            edge_index,
        })
    }

    /// Temporary database removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        let anchors = db.open_tree(ANCHORS_TREE)?;
        let edge_index = db.open_tree(EDGE_INDEX_TREE)?;
        Ok(Self {
            db,
            anchors,
            edge_index,
        })
    }
}

#[async_trait]
impl AnchorStore for SledAnchorStore {
    async fn load(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        match self.anchors.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode_record(id.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, records: &[AnchorRecord]) -> Result<(), StoreError> {
        let encoded = records
            .iter()
            .map(|r| r.to_json().map(|bytes| (r, bytes)))
            .collect::<Result<Vec<_>, _>>()?;

        (&self.anchors, &self.edge_index)
            .transaction(|(anchors, edge_index)| {
                for (record, bytes) in &encoded {
                    anchors.insert(record.id.as_bytes().as_slice(), bytes.as_slice())?;
                    if let (Some(source), Some(target)) = (record.source, record.target) {
                        edge_index.insert(index_key(source, record.id).as_slice(), &[] as &[u8])?;
                        edge_index.insert(index_key(target, record.id).as_slice(), &[] as &[u8])?;
                    }
                }
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(map_tx_error)?;

        self.db.flush_async().await?;
        debug!("Saved {} anchor records to sled", records.len());
        Ok(())
    }

    async fn delete(&self, ids: &[AnchorId]) -> Result<(), StoreError> {
        let mut endpoints = Vec::new();
        for id in ids {
            if let Some(record) = self.load(*id).await? {
                if let (Some(source), Some(target)) = (record.source, record.target) {
                    endpoints.push((record.id, source, target));
                }
            }
        }

        (&self.anchors, &self.edge_index)
            .transaction(|(anchors, edge_index)| {
                for id in ids {
                    anchors.remove(id.as_bytes().as_slice())?;
                }
                for (edge, source, target) in &endpoints {
                    edge_index.remove(index_key(*source, *edge).as_slice())?;
                    edge_index.remove(index_key(*target, *edge).as_slice())?;
                }
                Ok::<(), ConflictableTransactionError<StoreError>>(())
            })
            .map_err(map_tx_error)?;

        self.db.flush_async().await?;
        Ok(())
    }

    async fn edges_of(&self, node: AnchorId) -> Result<Vec<AnchorRecord>, StoreError> {
        let edge_ids = self
            .edge_index
            .scan_prefix(node.as_bytes())
            .map(|entry| {
                let (key, _) = entry?;
                decode_id(&key[16..])
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut edges = Vec::with_capacity(edge_ids.len());
        for edge_id in edge_ids {
            if let Some(record) = self.load(edge_id).await? {
                edges.push(record);
            }
        }
        Ok(edges)
    }

    async fn list_keys(&self) -> Result<Vec<(AnchorId, AnchorKind)>, StoreError> {
        let mut keys = Vec::new();
        for entry in self.anchors.iter() {
            let (key, value) = entry?;
            let record = decode_record(&key, &value)?;
            keys.push((record.id, record.kind));
        }
        Ok(keys)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.db.checksum()?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anchor::{Anchor, Attributes, PrincipalId};

    fn owner() -> PrincipalId {
        PrincipalId::new("alice")
    }

    #[test]
    fn test_sled_errors_mean_unavailable() {
        let err = StoreError::from(sled::Error::Unsupported("read-only".into()));
        assert!(err.is_unavailable());
        let err = map_tx_error(TransactionError::Storage(sled::Error::ReportableBug("bad page".into())));
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_save_load_and_edge_index() {
        let store = SledAnchorStore::temporary().unwrap();
        let a = Anchor::node("A", owner(), Attributes::new());
        let b = Anchor::node("B", owner(), Attributes::new());
        let e = Anchor::edge("E", owner(), a.id, b.id, Attributes::new());

        store
            .save(&[a.to_record(), b.to_record(), e.to_record()])
            .await
            .unwrap();

        assert_eq!(store.load(a.id).await.unwrap(), Some(a.to_record()));
        let from_a = store.edges_of(a.id).await.unwrap();
        let from_b = store.edges_of(b.id).await.unwrap();
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].id, e.id);
        assert_eq!(from_b[0].id, e.id);
        assert_eq!(store.list_keys().await.unwrap().len(), 3);

        store.delete(&[e.id]).await.unwrap();
        assert!(store.edges_of(a.id).await.unwrap().is_empty());
        assert_eq!(store.load(e.id).await.unwrap(), None);
        store.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.sled");
        let node = Anchor::node("A", owner(), Attributes::new());
        {
            let store = SledAnchorStore::open(&path).unwrap();
            store.save(&[node.to_record()]).await.unwrap();
        }
        let store = SledAnchorStore::open(&path).unwrap();
        assert_eq!(store.load(node.id).await.unwrap(), Some(node.to_record()));
    }
}
