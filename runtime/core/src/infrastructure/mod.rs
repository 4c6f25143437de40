// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Tier implementations, graph store, event bus, telemetry

pub mod cache;
pub mod event_bus;
pub mod graph_store;
pub mod stores;
pub mod telemetry;
pub mod tiered_memory;

pub use cache::LruSharedCache;
pub use event_bus::{EventBus, RuntimeEvent};
pub use graph_store::GraphStore;
pub use tiered_memory::{CommitSummary, TieredMemory};
