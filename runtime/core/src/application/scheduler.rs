// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Walker Scheduler
//!
//! Drives a single walker from its spawn location until its queue is empty
//! or it disengages.
//!
//! ```text
//! Spawned ─► Visiting(loc) ─► AbilityDispatch(loc) ─┬─► Visiting(next) ...
//!                                                   ├─► Disengaged
//!                                                   └─► Completed (queue empty)
//! ```
//!
//! At each location the dispatch plan runs walker-entry, location-entry,
//! location-exit and walker-exit abilities, in registration order within
//! each group. Locations the principal cannot read are skipped without
//! running anything and reported as [`WalkerEvent::VisitDenied`].
//!
//! Ability execution and queue draining are sequential within one walker.
//! State shared with ability contexts sits behind a `parking_lot` mutex that
//! is never held across an await point.

use crate::application::context::ExecutionContext;
use crate::domain::anchor::{Anchor, AnchorId, Attributes, PrincipalId};
use crate::domain::errors::RuntimeError;
use crate::domain::events::WalkerEvent;
use crate::domain::query::{Neighbor, NeighborQuery, VisitSpec, VisitTarget};
use crate::domain::walker::{Walker, WalkerPhase, WalkerResult, WalkerState};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle passed to every ability invocation.
///
/// Gives access to the walker's state, the current location and the
/// principal's [`ExecutionContext`]. Clones share the same walker state.
#[derive(Clone)]
pub struct AbilityContext {
    exec: ExecutionContext,
    state: Arc<Mutex<WalkerState>>,
    here: Arc<Anchor>,
}

impl AbilityContext {
    pub fn execution(&self) -> &ExecutionContext {
        &self.exec
    }

    pub fn principal(&self) -> &PrincipalId {
        self.exec.principal()
    }

    /// Snapshot of the current location taken just before this ability ran.
    pub fn here(&self) -> &Anchor {
        &self.here
    }

    pub fn here_id(&self) -> AnchorId {
        self.here.id
    }

    pub fn attr(&self, key: &str) -> Option<Value> {
        self.here.get(key).cloned()
    }

    pub fn walker_id(&self) -> AnchorId {
        self.state.lock().walker.id
    }

    pub fn walker_archetype(&self) -> String {
        self.state.lock().walker.archetype.clone()
    }

    pub fn walker(&self) -> Walker {
        self.state.lock().walker.clone()
    }

    pub fn walker_attr(&self, key: &str) -> Option<Value> {
        self.state.lock().walker.get(key).cloned()
    }

    pub fn set_walker_attr(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.state
            .lock()
            .walker
            .attributes
            .insert(key.into(), value.into());
    }

    /// Append to the walker's report list. Never interrupts traversal.
    pub fn report(&self, value: impl Into<Value>) {
        self.state.lock().reports.push(value.into());
    }

    pub fn reports(&self) -> Vec<Value> {
        self.state.lock().reports.clone()
    }

    /// Stop the walker: no further abilities run, here or anywhere else.
    pub fn disengage(&self) {
        let mut state = self.state.lock();
        state.disengaged = true;
        state.queue.clear();
    }

    /// Skip the remaining abilities at this location.
    pub fn skip(&self) {
        self.state.lock().skip_requested = true;
    }

    pub fn set_return_value(&self, value: impl Into<Value>) {
        self.state.lock().return_value = Some(value.into());
    }

    pub fn phase(&self) -> WalkerPhase {
        self.state.lock().phase
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Enqueue a specific anchor. Access is checked when it is reached.
    pub fn visit_anchor(&self, id: AnchorId) {
        self.state.lock().enqueue(&[id], false);
    }

    pub fn visit_anchors(&self, ids: &[AnchorId], depth_first: bool) {
        self.state.lock().enqueue(ids, depth_first);
    }

    /// Enqueue the neighbours of the current location selected by `spec`.
    /// Returns how many targets were enqueued.
    pub async fn visit(&self, spec: VisitSpec) -> Result<usize, RuntimeError> {
        self.visit_from(self.here.id, spec).await
    }

    pub async fn visit_from(&self, from: AnchorId, spec: VisitSpec) -> Result<usize, RuntimeError> {
        let neighbors = self.exec.visible_neighbors(from, &spec.query).await?;
        let targets: Vec<AnchorId> = spec
            .select(neighbors)
            .iter()
            .map(|n| match spec.target {
                VisitTarget::Nodes => n.node.id,
                VisitTarget::Edges => n.edge.id,
            })
            .collect();
        self.state.lock().enqueue(&targets, spec.depth_first);
        Ok(targets.len())
    }

    pub async fn neighbors(&self, query: &NeighborQuery) -> Result<Vec<Neighbor>, RuntimeError> {
        self.exec.neighbors(self.here.id, query).await
    }

    pub async fn create_node(&self, archetype: &str, attributes: Attributes) -> Result<Anchor, RuntimeError> {
        self.exec.create_node(archetype, attributes).await
    }

    /// Connect the current location to `target`.
    pub async fn connect_to(
        &self,
        archetype: &str,
        target: AnchorId,
        attributes: Attributes,
    ) -> Result<Anchor, RuntimeError> {
        self.exec.connect(self.here.id, archetype, target, attributes).await
    }

    pub async fn set_here_attr(&self, key: &str, value: impl Into<Value>) -> Result<(), RuntimeError> {
        self.exec.set_attr(self.here.id, key, value).await
    }

    /// Run a nested walker to completion under the same principal.
    pub async fn spawn(&self, walker: Walker, at: AnchorId) -> Result<WalkerResult, RuntimeError> {
        self.exec.spawn(walker, at).await
    }
}

impl std::fmt::Debug for AbilityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilityContext")
            .field("principal", self.exec.principal())
            .field("here", &self.here.id)
            .finish()
    }
}

pub(crate) async fn run_walker(
    ctx: ExecutionContext,
    walker: Walker,
    start: AnchorId,
) -> Result<WalkerResult, RuntimeError> {
    if !ctx.registry().has_walker(&walker.archetype) {
        return Err(RuntimeError::UnknownArchetype(walker.archetype));
    }
    ctx.graph().resolve(start).await?;

    let walker_id = walker.id;
    let archetype = walker.archetype.clone();
    let mut initial = WalkerState::new(walker);
    initial.queue.push_back(start);
    let state = Arc::new(Mutex::new(initial));

    debug!("Spawning walker {} ({}) at {}", walker_id, archetype, start);
    metrics::counter!("osp_walkers_spawned_total").increment(1);
    ctx.events().publish_walker_event(WalkerEvent::WalkerSpawned {
        walker_id,
        archetype: archetype.clone(),
        principal: ctx.principal().clone(),
        start,
        spawned_at: Utc::now(),
    });

    if let Err(e) = drive(&ctx, &state).await {
        warn!("Walker {} ({}) failed: {}", walker_id, archetype, e);
        metrics::counter!("osp_walkers_failed_total").increment(1);
        ctx.events().publish_walker_event(WalkerEvent::WalkerFailed {
            walker_id,
            reason: e.to_string(),
            failed_at: Utc::now(),
        });
        return Err(e);
    }

    let final_state = match Arc::try_unwrap(state) {
        Ok(mutex) => mutex.into_inner(),
        // An ability kept a clone of its context around.
        Err(shared) => {
            let mut guard = shared.lock();
            let walker = guard.walker.clone();
            std::mem::replace(&mut *guard, WalkerState::new(walker))
        }
    };

    info!(
        "Walker {} ({}) finished: {:?}, {} visits, {} reports",
        walker_id,
        archetype,
        final_state.phase,
        final_state.visited,
        final_state.reports.len()
    );
    ctx.events().publish_walker_event(WalkerEvent::WalkerCompleted {
        walker_id,
        visited: final_state.visited,
        reports: final_state.reports.len(),
        completed_at: Utc::now(),
    });
    Ok(final_state.into_result())
}

async fn drive(ctx: &ExecutionContext, state: &Arc<Mutex<WalkerState>>) -> Result<(), RuntimeError> {
    loop {
        let next = {
            let mut s = state.lock();
            if s.disengaged {
                None
            } else {
                s.queue.pop_front()
            }
        };
        let Some(location) = next else {
            break;
        };

        let here = ctx.graph().resolve(location).await?;
        let (walker_id, walker_archetype) = {
            let s = state.lock();
            (s.walker.id, s.walker.archetype.clone())
        };

        if !ctx.can_read(&here).await? {
            debug!(
                "Walker {} skipping {}: {} lacks READ",
                walker_id,
                location,
                ctx.principal()
            );
            metrics::counter!("osp_visits_denied_total").increment(1);
            ctx.events().publish_walker_event(WalkerEvent::VisitDenied {
                walker_id,
                location,
                principal: ctx.principal().clone(),
                denied_at: Utc::now(),
            });
            continue;
        }

        {
            let mut s = state.lock();
            s.visited += 1;
            if let Some(limit) = ctx.max_visits() {
                if s.visited > limit {
                    return Err(RuntimeError::VisitLimitExceeded(limit));
                }
            }
            s.phase = WalkerPhase::Visiting(location);
        }
        metrics::counter!("osp_walker_visits_total").increment(1);
        ctx.events().publish_walker_event(WalkerEvent::LocationVisited {
            walker_id,
            location,
            archetype: here.archetype.clone(),
            visited_at: Utc::now(),
        });

        let plan = ctx.registry().dispatch_plan(&walker_archetype, &here.archetype);
        {
            let mut s = state.lock();
            s.phase = WalkerPhase::AbilityDispatch(location);
            s.skip_requested = false;
        }

        let mut here = Arc::new(here);
        for ability in plan {
            let halted = {
                let s = state.lock();
                s.disengaged || s.skip_requested
            };
            if halted {
                break;
            }
            match ctx.graph().memory().get(location).await {
                Ok(Some(fresh)) => here = Arc::new(fresh),
                Ok(None) | Err(RuntimeError::StaleAnchor(_)) => {}
                Err(e) => return Err(e),
            }

            debug!("Walker {} running '{}' at {}", walker_id, ability.name, location);
            let actx = AbilityContext {
                exec: ctx.clone(),
                state: state.clone(),
                here: here.clone(),
            };
            ability
                .invoke(actx)
                .await
                .map_err(|e| RuntimeError::from_ability(&ability.name, e))?;
        }

        let disengaged = {
            let mut s = state.lock();
            s.skip_requested = false;
            if s.disengaged {
                s.phase = WalkerPhase::Disengaged;
            }
            s.disengaged
        };
        if disengaged {
            debug!("Walker {} disengaged at {}", walker_id, location);
            ctx.events().publish_walker_event(WalkerEvent::WalkerDisengaged {
                walker_id,
                location,
                disengaged_at: Utc::now(),
            });
            return Ok(());
        }
    }

    state.lock().phase = WalkerPhase::Completed;
    Ok(())
}
