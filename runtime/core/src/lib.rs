// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # OSP Runtime Core
//!
//! Object-spatial execution runtime. Programs are graphs of nodes joined by
//! typed edges, and computation moves through the graph as walkers that
//! trigger abilities on the locations they visit.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Anchors, tiered memory (L1/L2/L3), access control and the
//!   walker scheduler
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`domain`] | Anchors, permissions, archetypes and abilities, walker state, config, events |
//! | [`infrastructure`] | Tiered memory, L2 cache, L3 stores, graph store, event bus, telemetry |
//! | [`application`] | Access evaluation, execution context, walker scheduler, runtime facade |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{AbilityContext, AccessEvaluator, ExecutionContext, Runtime};
