// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! L3 Store Infrastructure Module
//!
//! Concrete implementations of the [`AnchorStore`] trait and the factory
//! that picks one from the runtime configuration.

pub mod fallback;
pub mod file_store;
pub mod memory;
pub mod sled_store;

pub use fallback::FallbackAnchorStore;
pub use file_store::FileAnchorStore;
pub use memory::InMemoryAnchorStore;
pub use sled_store::SledAnchorStore;

use crate::domain::config::{RuntimeConfigManifest, StoreBackend};
use crate::domain::errors::RuntimeError;
use crate::domain::repository::{AnchorStore, Tier};
use std::sync::Arc;
use tracing::{info, warn};

/// Build the L3 store for the configured session.
///
/// `sled` is wrapped in a [`FallbackAnchorStore`] over the JSON file store.
/// If sled cannot be opened at all, the file store is used directly. Only a
/// failure of every candidate is an error.
pub fn create_anchor_store(config: &RuntimeConfigManifest) -> Result<Arc<dyn AnchorStore>, RuntimeError> {
    let session = &config.spec.session;
    let store: Arc<dyn AnchorStore> = match config.spec.memory.store.backend {
        StoreBackend::Sled => {
            let file = FileAnchorStore::open(config.file_store_path());
            match (SledAnchorStore::open(config.sled_path()), file) {
                (Ok(sled), Ok(file)) => {
                    info!("Session '{}' persisting to sled at {:?}", session, config.sled_path());
                    Arc::new(FallbackAnchorStore::new(Arc::new(sled), Arc::new(file)))
                }
                (Ok(sled), Err(e)) => {
                    warn!("File fallback store unavailable ({}); running on sled alone", e);
                    Arc::new(sled)
                }
                (Err(e), Ok(file)) => {
                    warn!("Failed to open sled store ({}); falling back to {:?}", e, file.path());
                    Arc::new(file)
                }
                (Err(sled_err), Err(file_err)) => {
                    return Err(RuntimeError::TierUnavailable {
                        tier: Tier::L3,
                        reason: format!("sled: {}; file: {}", sled_err, file_err),
                    });
                }
            }
        }
        StoreBackend::File => {
            let file = FileAnchorStore::open(config.file_store_path()).map_err(|e| e.at(Tier::L3))?;
            info!("Session '{}' persisting to {:?}", session, file.path());
            Arc::new(file)
        }
        StoreBackend::Memory => {
            info!("Session '{}' using in-memory store; nothing survives the process", session);
            Arc::new(InMemoryAnchorStore::new())
        }
    };
    Ok(store)
}
