// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Flow identity, bookkeeping and failure taxonomy.

use chrono::{DateTime, Utc};
use osp_core::RuntimeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a submitted flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub Uuid);

impl FlowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// An async task on the runtime's worker threads.
    Task,
    /// A closure on the blocking thread pool.
    Blocking,
    /// A walker spawned under an execution context.
    Walker,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowKind::Task => "task",
            FlowKind::Blocking => "blocking",
            FlowKind::Walker => "walker",
        };
        write!(f, "{}", name)
    }
}

/// A flow that has been submitted and not yet resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowInfo {
    pub id: FlowId,
    pub kind: FlowKind,
    pub label: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Failed(anyhow::Error),

    #[error("Flow panicked: {0}")]
    Panicked(String),

    #[error("Flow was cancelled before completing")]
    Cancelled,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

impl FlowError {
    /// Classify an error returned by a flow body, keeping runtime errors
    /// distinguishable.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<RuntimeError>() {
            Ok(runtime) => FlowError::Runtime(runtime),
            Err(other) => FlowError::Failed(other),
        }
    }

    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            FlowError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}
