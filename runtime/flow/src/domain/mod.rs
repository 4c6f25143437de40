// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Flow Domain Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`flow`] | `FlowId`, `FlowInfo`, `FlowKind`, `FlowError` |

pub mod flow;

pub use flow::*;
