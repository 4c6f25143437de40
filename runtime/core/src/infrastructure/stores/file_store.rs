// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// JSON File L3 Store
//
// Fallback durable backend used when sled cannot be opened or fails at
// runtime. The whole session is one JSON document mapping anchor id to
// record. Every mutation rewrites the document through a temp file and a
// rename, so a crash leaves either the old or the new document.

use crate::domain::anchor::{AnchorId, AnchorKind, AnchorRecord};
use crate::domain::repository::{AnchorStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct FileAnchorStore {
    path: PathBuf,
    records: Mutex<BTreeMap<AnchorId, AnchorRecord>>,
}

impl FileAnchorStore {
    /// Open (or create) the store at `path`, loading any existing document.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str::<BTreeMap<AnchorId, AnchorRecord>>(&content)?
            }
        } else {
            BTreeMap::new()
        };

        info!("Opened file anchor store at {:?} ({} anchors)", path, records.len());
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_document(&self, records: &BTreeMap<AnchorId, AnchorRecord>) -> Result<(), StoreError> {
        let document = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &document).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} anchors to {:?}", records.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl AnchorStore for FileAnchorStore {
    async fn load(&self, id: AnchorId) -> Result<Option<AnchorRecord>, StoreError> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn save(&self, records: &[AnchorRecord]) -> Result<(), StoreError> {
        let mut map = self.records.lock().await;
        for record in records {
            map.insert(record.id, record.clone());
        }
        self.write_document(&map).await
    }

    async fn delete(&self, ids: &[AnchorId]) -> Result<(), StoreError> {
        let mut map = self.records.lock().await;
        let mut changed = false;
        for id in ids {
            changed |= map.remove(id).is_some();
        }
        if changed {
            self.write_document(&map).await?;
        }
        Ok(())
    }

    async fn edges_of(&self, node: AnchorId) -> Result<Vec<AnchorRecord>, StoreError> {
        let map = self.records.lock().await;
        Ok(map
            .values()
            .filter(|r| r.kind == AnchorKind::Edge && r.touches(node))
            .cloned()
            .collect())
    }

    async fn list_keys(&self) -> Result<Vec<(AnchorId, AnchorKind)>, StoreError> {
        let map = self.records.lock().await;
        Ok(map.values().map(|r| (r.id, r.kind)).collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => Err(StoreError::Unavailable(
                format!("directory {:?} no longer exists", dir),
            )),
            _ => Ok(()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anchor::{Anchor, Attributes, PrincipalId};
    use serde_json::json;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.anchors.json");
        let mut node = Anchor::node("A", PrincipalId::new("alice"), Attributes::new());
        node.set("k", json!([1, 2]));
        let other = Anchor::node("B", PrincipalId::new("alice"), Attributes::new());
        let edge = Anchor::edge("E", PrincipalId::new("alice"), node.id, other.id, Attributes::new());

        {
            let store = FileAnchorStore::open(&path).unwrap();
            store
                .save(&[node.to_record(), other.to_record(), edge.to_record()])
                .await
                .unwrap();
            store.delete(&[other.id]).await.unwrap();
        }

        let store = FileAnchorStore::open(&path).unwrap();
        assert_eq!(store.load(node.id).await.unwrap(), Some(node.to_record()));
        assert_eq!(store.load(other.id).await.unwrap(), None);
        assert_eq!(store.edges_of(node.id).await.unwrap().len(), 1);
        assert_eq!(store.list_keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.anchors.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileAnchorStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
