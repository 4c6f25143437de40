// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Flow Application Layer
//!
//! [`FlowExecutor`] submits work to the ambient tokio runtime and tracks it
//! until it resolves. Every submission returns a [`FlowHandle`]; joining the
//! handle through [`FlowExecutor::wait`] yields the flow's value or a
//! [`FlowError`].

use crate::domain::{FlowError, FlowId, FlowInfo, FlowKind};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use osp_core::{AnchorId, ExecutionContext, Walker, WalkerResult};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

/// Handle to a submitted flow.
///
/// Dropping the handle detaches the flow; it keeps running to completion.
#[derive(Debug)]
pub struct FlowHandle<T> {
    id: FlowId,
    join: JoinHandle<Result<T, FlowError>>,
}

impl<T> FlowHandle<T> {
    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the flow. A subsequent wait reports [`FlowError::Cancelled`].
    pub fn abort(&self) {
        self.join.abort();
    }

    async fn join(self) -> Result<T, FlowError> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(classify_join_error(err)),
        }
    }
}

fn classify_join_error(err: JoinError) -> FlowError {
    if err.is_cancelled() {
        return FlowError::Cancelled;
    }
    match err.try_into_panic() {
        Ok(payload) => FlowError::Panicked(panic_message(payload)),
        Err(other) => FlowError::Panicked(other.to_string()),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Removes a flow from the active set however its task ends.
struct ActiveGuard {
    id: FlowId,
    active: Arc<DashMap<FlowId, FlowInfo>>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.remove(&self.id);
    }
}

#[derive(Clone)]
pub struct FlowExecutor {
    handle: Handle,
    active: Arc<DashMap<FlowId, FlowInfo>>,
}

impl FlowExecutor {
    /// Bind to the tokio runtime of the calling context.
    pub fn current() -> Result<Self, FlowError> {
        let handle = Handle::try_current().map_err(|e| FlowError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            active: Arc::new(DashMap::new()),
        }
    }

    fn register(&self, kind: FlowKind, label: impl Into<String>) -> ActiveGuard {
        let info = FlowInfo {
            id: FlowId::new(),
            kind,
            label: label.into(),
            started_at: Utc::now(),
        };
        debug!(flow_id = %info.id, kind = %kind, label = %info.label, "Flow submitted");
        metrics::counter!("osp_flows_started_total", "kind" => kind.to_string()).increment(1);
        let id = info.id;
        self.active.insert(id, info);
        ActiveGuard {
            id,
            active: self.active.clone(),
        }
    }

    /// Run an async body concurrently with the caller.
    pub fn flow<F, T>(&self, label: impl Into<String>, body: F) -> FlowHandle<T>
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.register(FlowKind::Task, label);
        let id = guard.id;
        let join = self.handle.spawn(async move {
            let _guard = guard;
            body.await.map_err(|e| record_failure(id, FlowError::from_anyhow(e)))
        });
        FlowHandle { id, join }
    }

    /// Run a blocking closure on the blocking thread pool.
    pub fn flow_blocking<F, T>(&self, label: impl Into<String>, body: F) -> FlowHandle<T>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.register(FlowKind::Blocking, label);
        let id = guard.id;
        let join = self.handle.spawn_blocking(move || {
            let _guard = guard;
            body().map_err(|e| record_failure(id, FlowError::from_anyhow(e)))
        });
        FlowHandle { id, join }
    }

    /// Spawn a walker as a detached flow under `ctx`'s principal.
    pub fn flow_walker(&self, ctx: ExecutionContext, walker: Walker, at: AnchorId) -> FlowHandle<WalkerResult> {
        let label = format!("walker:{}", walker.archetype);
        let guard = self.register(FlowKind::Walker, label);
        let id = guard.id;
        let join = self.handle.spawn(async move {
            let _guard = guard;
            ctx.spawn(walker, at)
                .await
                .map_err(|e| record_failure(id, FlowError::Runtime(e)))
        });
        FlowHandle { id, join }
    }

    /// Suspend until the flow resolves.
    pub async fn wait<T>(&self, handle: FlowHandle<T>) -> Result<T, FlowError> {
        let id = handle.id;
        let result = handle.join().await;
        if let Err(FlowError::Panicked(msg)) = &result {
            warn!(flow_id = %id, panic = %msg, "Flow panicked");
            metrics::counter!("osp_flows_failed_total", "reason" => "panic").increment(1);
        }
        result
    }

    /// Wait for every handle, in submission order.
    pub async fn wait_all<T>(&self, handles: Vec<FlowHandle<T>>) -> Vec<Result<T, FlowError>> {
        join_all(handles.into_iter().map(|h| self.wait(h))).await
    }

    /// Flows submitted through this executor that have not resolved yet.
    pub fn active_flows(&self) -> Vec<FlowInfo> {
        let mut flows: Vec<FlowInfo> = self.active.iter().map(|e| e.value().clone()).collect();
        flows.sort_by_key(|f| f.started_at);
        flows
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl std::fmt::Debug for FlowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowExecutor")
            .field("active", &self.active.len())
            .finish()
    }
}

fn record_failure(id: FlowId, err: FlowError) -> FlowError {
    warn!(flow_id = %id, error = %err, "Flow failed");
    metrics::counter!("osp_flows_failed_total", "reason" => "error").increment(1);
    err
}
