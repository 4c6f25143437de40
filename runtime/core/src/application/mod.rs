// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod access;
pub mod context;
pub mod runtime;
pub mod scheduler;

pub use access::AccessEvaluator;
pub use context::ExecutionContext;
pub use runtime::Runtime;
pub use scheduler::AbilityContext;
