// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Archetypes and Abilities
//!
//! Archetypes are registered once, before any walker runs, into an
//! [`ArchetypeRegistry`]. The registry is the dispatch table the scheduler
//! consults on every visit:
//!
//! - walker archetypes carry abilities triggered by the *location* archetype
//!   they arrive at (`Root`, node or edge archetype names);
//! - node and edge archetypes carry abilities triggered by the *walker*
//!   archetype that arrives;
//! - any archetype may carry an [`AccessHook`] that supplies a default
//!   permission when no explicit grant applies.
//!
//! Ability bodies are async. They receive an owned
//! [`AbilityContext`](crate::application::AbilityContext) handle and resolve
//! to `anyhow::Result<()>`.

use crate::application::AbilityContext;
use crate::domain::anchor::{Anchor, PrincipalId};
use crate::domain::permission::Permission;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Which archetypes fire an ability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires for every counterpart.
    Any,
    Exact(String),
    /// Union trigger: fires when the counterpart is any of these.
    OneOf(Vec<String>),
}

impl Trigger {
    pub fn exact(archetype: impl Into<String>) -> Self {
        Trigger::Exact(archetype.into())
    }

    pub fn one_of<I, S>(archetypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Trigger::OneOf(archetypes.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, archetype: &str) -> bool {
        match self {
            Trigger::Any => true,
            Trigger::Exact(name) => name == archetype,
            Trigger::OneOf(names) => names.iter().any(|n| n == archetype),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbilityEvent {
    Entry,
    Exit,
}

pub type AbilityFuture = BoxFuture<'static, anyhow::Result<()>>;

type AbilityFn = Arc<dyn Fn(AbilityContext) -> AbilityFuture + Send + Sync>;

/// A named, triggered unit of behaviour.
#[derive(Clone)]
pub struct Ability {
    pub name: String,
    pub trigger: Trigger,
    pub event: AbilityEvent,
    body: AbilityFn,
}

impl Ability {
    pub fn new<F, Fut>(name: impl Into<String>, trigger: Trigger, event: AbilityEvent, body: F) -> Self
    where
        F: Fn(AbilityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: AbilityFn = Arc::new(move |ctx: AbilityContext| -> AbilityFuture { Box::pin(body(ctx)) });
        Self {
            name: name.into(),
            trigger,
            event,
            body,
        }
    }

    pub fn on_entry<F, Fut>(name: impl Into<String>, trigger: Trigger, body: F) -> Self
    where
        F: Fn(AbilityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, trigger, AbilityEvent::Entry, body)
    }

    pub fn on_exit<F, Fut>(name: impl Into<String>, trigger: Trigger, body: F) -> Self
    where
        F: Fn(AbilityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(name, trigger, AbilityEvent::Exit, body)
    }

    /// Entry ability with a synchronous body.
    pub fn on_entry_sync<F>(name: impl Into<String>, trigger: Trigger, body: F) -> Self
    where
        F: Fn(&AbilityContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::sync(name, trigger, AbilityEvent::Entry, body)
    }

    /// Exit ability with a synchronous body.
    pub fn on_exit_sync<F>(name: impl Into<String>, trigger: Trigger, body: F) -> Self
    where
        F: Fn(&AbilityContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::sync(name, trigger, AbilityEvent::Exit, body)
    }

    fn sync<F>(name: impl Into<String>, trigger: Trigger, event: AbilityEvent, body: F) -> Self
    where
        F: Fn(&AbilityContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let body: AbilityFn = Arc::new(move |ctx: AbilityContext| -> AbilityFuture {
            let outcome = body(&ctx);
            Box::pin(std::future::ready(outcome))
        });
        Self {
            name: name.into(),
            trigger,
            event,
            body,
        }
    }

    pub fn invoke(&self, ctx: AbilityContext) -> AbilityFuture {
        (self.body)(ctx)
    }
}

impl fmt::Debug for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ability")
            .field("name", &self.name)
            .field("trigger", &self.trigger)
            .field("event", &self.event)
            .finish()
    }
}

/// Archetype-level default permission, consulted after explicit grants.
pub trait AccessHook: Send + Sync {
    fn default_permission(&self, principal: &PrincipalId, anchor: &Anchor) -> Option<Permission>;
}

impl<F> AccessHook for F
where
    F: Fn(&PrincipalId, &Anchor) -> Option<Permission> + Send + Sync,
{
    fn default_permission(&self, principal: &PrincipalId, anchor: &Anchor) -> Option<Permission> {
        self(principal, anchor)
    }
}

/// Side of the dispatch table an archetype's abilities live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Side {
    Walker,
    Location,
}

/// Dispatch table keyed by (archetype, side).
#[derive(Clone, Default)]
pub struct ArchetypeRegistry {
    abilities: HashMap<(String, Side), Vec<Ability>>,
    access_hooks: HashMap<String, Arc<dyn AccessHook>>,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a walker archetype. Its abilities trigger on location archetypes.
    pub fn walker(mut self, archetype: impl Into<String>, abilities: Vec<Ability>) -> Self {
        self.abilities
            .entry((archetype.into(), Side::Walker))
            .or_default()
            .extend(abilities);
        self
    }

    /// Register a node archetype. Its abilities trigger on walker archetypes.
    pub fn node(self, archetype: impl Into<String>, abilities: Vec<Ability>) -> Self {
        self.location(archetype, abilities)
    }

    /// Register an edge archetype. Its abilities trigger on walker archetypes.
    pub fn edge(self, archetype: impl Into<String>, abilities: Vec<Ability>) -> Self {
        self.location(archetype, abilities)
    }

    fn location(mut self, archetype: impl Into<String>, abilities: Vec<Ability>) -> Self {
        self.abilities
            .entry((archetype.into(), Side::Location))
            .or_default()
            .extend(abilities);
        self
    }

    pub fn access_hook<H>(mut self, archetype: impl Into<String>, hook: H) -> Self
    where
        H: AccessHook + 'static,
    {
        self.access_hooks.insert(archetype.into(), Arc::new(hook));
        self
    }

    pub fn has_walker(&self, archetype: &str) -> bool {
        self.abilities.contains_key(&(archetype.to_string(), Side::Walker))
    }

    pub fn hook_for(&self, archetype: &str) -> Option<Arc<dyn AccessHook>> {
        self.access_hooks.get(archetype).cloned()
    }

    fn matching(&self, owner: &str, side: Side, counterpart: &str, event: AbilityEvent) -> Vec<Ability> {
        self.abilities
            .get(&(owner.to_string(), side))
            .map(|list| {
                list.iter()
                    .filter(|a| a.event == event && a.trigger.matches(counterpart))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Abilities to run when `walker` arrives at a location of archetype
    /// `location`, in order: walker entry, location entry, location exit,
    /// walker exit. Within each group, registration order.
    pub fn dispatch_plan(&self, walker: &str, location: &str) -> Vec<Ability> {
        let mut plan = self.matching(walker, Side::Walker, location, AbilityEvent::Entry);
        plan.extend(self.matching(location, Side::Location, walker, AbilityEvent::Entry));
        plan.extend(self.matching(location, Side::Location, walker, AbilityEvent::Exit));
        plan.extend(self.matching(walker, Side::Walker, location, AbilityEvent::Exit));
        plan
    }
}

impl fmt::Debug for ArchetypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchetypeRegistry")
            .field("archetypes", &self.abilities.len())
            .field("access_hooks", &self.access_hooks.len())
            .finish()
    }
}
