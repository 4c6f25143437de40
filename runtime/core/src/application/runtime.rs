// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime
//!
//! Session-level facade. Opening a runtime wires the L3 store selected by
//! the configuration, the optional L2 cache, the event bus and the archetype
//! registry together; [`Runtime::context`] then hands out principal-bound
//! [`ExecutionContext`]s.
//!
//! ```no_run
//! # async fn demo() -> Result<(), osp_core::RuntimeError> {
//! use osp_core::domain::config::RuntimeConfigManifest;
//! use osp_core::{ArchetypeRegistry, PrincipalId, Runtime, Walker};
//!
//! let config = RuntimeConfigManifest::default();
//! let runtime = Runtime::open(&config, ArchetypeRegistry::new().walker("Noop", vec![]))?;
//! let ctx = runtime.context(&PrincipalId::new("alice")).await?;
//! let result = ctx.spawn(Walker::new("Noop"), ctx.root_id()).await?;
//! assert!(result.reports.is_empty());
//! runtime.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::application::access::AccessEvaluator;
use crate::application::context::ExecutionContext;
use crate::domain::anchor::{Anchor, AnchorId, PrincipalId};
use crate::domain::archetype::ArchetypeRegistry;
use crate::domain::config::RuntimeConfigManifest;
use crate::domain::errors::RuntimeError;
use crate::domain::repository::{AnchorStore, SharedCache};
use crate::infrastructure::cache::LruSharedCache;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::graph_store::GraphStore;
use crate::infrastructure::stores::create_anchor_store;
use crate::infrastructure::tiered_memory::{CommitSummary, TieredMemory};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Runtime {
    session: String,
    memory: Arc<TieredMemory>,
    graph: GraphStore,
    access: AccessEvaluator,
    registry: Arc<ArchetypeRegistry>,
    events: EventBus,
    max_visits: Option<usize>,
    auto_commit: bool,
}

impl Runtime {
    /// Open the session described by `config`.
    pub fn open(config: &RuntimeConfigManifest, registry: ArchetypeRegistry) -> Result<Self, RuntimeError> {
        config
            .validate()
            .map_err(|e| RuntimeError::Config(format!("{:#}", e)))?;
        let store = create_anchor_store(config)?;
        let cache: Option<Arc<dyn SharedCache>> = if config.spec.memory.cache.enabled {
            Some(Arc::new(LruSharedCache::new(config.spec.memory.cache.capacity)))
        } else {
            None
        };
        Ok(Self::open_with(config, registry, store, cache))
    }

    /// Open over caller-supplied tiers. Several runtimes built over the same
    /// store and cache observe each other's commits.
    pub fn open_with(
        config: &RuntimeConfigManifest,
        registry: ArchetypeRegistry,
        store: Arc<dyn AnchorStore>,
        cache: Option<Arc<dyn SharedCache>>,
    ) -> Self {
        let events = EventBus::new(config.spec.events.capacity);
        let mut memory = TieredMemory::new(store, events.clone());
        if let Some(cache) = cache {
            memory = memory.with_cache(cache, config.spec.memory.cache.ttl);
        }
        info!(
            "Opened session '{}' (L2 {}, L3 {})",
            config.spec.session,
            if memory.has_cache() { "on" } else { "off" },
            memory.store().backend_name()
        );
        Self::assemble(
            config.spec.session.clone(),
            Arc::new(memory),
            registry,
            events,
            config.spec.scheduler.max_visits,
            config.spec.auto_commit,
        )
    }

    /// Runtime over an existing memory, without auto-commit.
    pub fn new(memory: Arc<TieredMemory>, registry: ArchetypeRegistry, max_visits: Option<usize>) -> Self {
        Self::assemble("default".to_string(), memory, registry, EventBus::default(), max_visits, false)
    }

    fn assemble(
        session: String,
        memory: Arc<TieredMemory>,
        registry: ArchetypeRegistry,
        events: EventBus,
        max_visits: Option<usize>,
        auto_commit: bool,
    ) -> Self {
        let registry = Arc::new(registry);
        Self {
            session,
            graph: GraphStore::new(memory.clone()),
            access: AccessEvaluator::new(memory.clone(), registry.clone()),
            memory,
            registry,
            events,
            max_visits,
            auto_commit,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn memory(&self) -> &Arc<TieredMemory> {
        &self.memory
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn registry(&self) -> &Arc<ArchetypeRegistry> {
        &self.registry
    }

    /// Execution context for `principal`, creating its root on first use.
    pub async fn context(&self, principal: &PrincipalId) -> Result<ExecutionContext, RuntimeError> {
        let root = self.graph.get_or_create_root(principal).await?;
        Ok(ExecutionContext::new(
            principal.clone(),
            root.id,
            self.graph.clone(),
            self.access.clone(),
            self.registry.clone(),
            self.events.clone(),
            self.max_visits,
        ))
    }

    pub async fn system_context(&self) -> Result<ExecutionContext, RuntimeError> {
        self.context(&PrincipalId::system()).await
    }

    /// Every root in L1 or the L3 store of this session.
    pub async fn allroots(&self) -> Result<Vec<Anchor>, RuntimeError> {
        self.memory.roots().await
    }

    pub async fn commit(&self) -> Result<CommitSummary, RuntimeError> {
        self.memory.commit().await
    }

    pub async fn reload(&self, id: AnchorId) -> Result<Option<Anchor>, RuntimeError> {
        self.memory.reload(id).await
    }

    /// Close the session, committing first when auto-commit is configured.
    pub async fn close(self) -> Result<Option<CommitSummary>, RuntimeError> {
        if !self.auto_commit {
            return Ok(None);
        }
        match self.memory.commit().await {
            Ok(summary) => {
                info!("Session '{}' closed after final commit", self.session);
                Ok(Some(summary))
            }
            Err(e) => {
                warn!("Final commit of session '{}' failed: {}", self.session, e);
                Err(e)
            }
        }
    }
}
