// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `osp-flow`: Detached Flows and Joins
//!
//! Runs work concurrently with its caller on the ambient tokio runtime:
//! arbitrary futures, blocking closures and whole walkers. Submitting never
//! blocks; [`FlowExecutor::wait`] suspends until the flow resolves and hands
//! back its value or its failure.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `FlowId`, `FlowInfo`, `FlowKind`, `FlowError` |
//! | [`application`] | Application | `FlowExecutor`, `FlowHandle` |
//!
//! ## Semantics
//!
//! - Flows have no mutual ordering unless joined.
//! - There is no built-in timeout; wrap `wait` in `tokio::time::timeout` if
//!   one is needed.
//! - A failing flow never affects other flows. Its error, or its panic, is
//!   surfaced by `wait` only.

pub mod domain;
pub mod application;

pub use application::{FlowExecutor, FlowHandle};
pub use domain::*;
