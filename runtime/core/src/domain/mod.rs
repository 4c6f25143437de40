// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types of the object-spatial model. Nothing in here touches a tier.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anchors, permissions, archetypes, walkers, queries, events

pub mod anchor;
pub mod permission;
pub mod archetype;
pub mod walker;
pub mod query;
pub mod events;
pub mod config;
pub mod errors;
pub mod repository;

pub use anchor::{Anchor, AnchorId, AnchorKind, AnchorRecord, Attributes, Endpoints, PrincipalId};
pub use archetype::{Ability, AbilityEvent, AccessHook, ArchetypeRegistry, Trigger};
pub use errors::RuntimeError;
pub use permission::{Access, Permission};
pub use query::{Direction, Neighbor, NeighborQuery, Selection, VisitSpec, VisitTarget};
pub use walker::{Walker, WalkerPhase, WalkerResult};
