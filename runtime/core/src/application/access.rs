// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Control Evaluator
//!
//! Computes the effective [`Permission`] a principal holds on an anchor.
//! The system principal and the anchor's owner always hold `WRITE`. Anyone
//! else gets the highest of:
//!
//! - an override for the principal on the anchor itself
//! - an override for the principal on the owner's root (root-level grant)
//! - the archetype's [`AccessHook`](crate::domain::AccessHook), evaluated on
//!   every call
//! - the anchor's default level
//!
//! A `NO_ACCESS` override therefore never lowers access below the default.
//!
//! Nothing here is cached; a grant or revoke is visible to the next check.

use crate::domain::anchor::{Anchor, AnchorId, PrincipalId};
use crate::domain::archetype::ArchetypeRegistry;
use crate::domain::errors::RuntimeError;
use crate::domain::permission::Permission;
use crate::infrastructure::tiered_memory::TieredMemory;
use std::sync::Arc;

#[derive(Clone)]
pub struct AccessEvaluator {
    memory: Arc<TieredMemory>,
    registry: Arc<ArchetypeRegistry>,
}

impl AccessEvaluator {
    pub fn new(memory: Arc<TieredMemory>, registry: Arc<ArchetypeRegistry>) -> Self {
        Self { memory, registry }
    }

    pub async fn effective_permission(
        &self,
        principal: &PrincipalId,
        anchor: &Anchor,
    ) -> Result<Permission, RuntimeError> {
        if principal.is_system() || &anchor.owner == principal {
            return Ok(Permission::Write);
        }
        let mut effective = anchor.access.default;
        if let Some(level) = anchor.access.override_for(principal) {
            effective = effective.max(level);
        }
        if !anchor.is_root() {
            let owner_root = AnchorId::for_root(&anchor.owner);
            let root = match self.memory.get(owner_root).await {
                Ok(root) => root,
                Err(RuntimeError::StaleAnchor(_)) => None,
                Err(e) => return Err(e),
            };
            if let Some(level) = root.and_then(|r| r.access.override_for(principal)) {
                effective = effective.max(level);
            }
        }
        if let Some(hook) = self.registry.hook_for(&anchor.archetype) {
            if let Some(level) = hook.default_permission(principal, anchor) {
                effective = effective.max(level);
            }
        }
        Ok(effective)
    }

    pub async fn check(
        &self,
        principal: &PrincipalId,
        anchor: &Anchor,
        required: Permission,
    ) -> Result<bool, RuntimeError> {
        Ok(self.effective_permission(principal, anchor).await?.allows(required))
    }

    /// Like [`check`](Self::check), but a shortfall is a
    /// [`RuntimeError::PermissionDenied`].
    pub async fn ensure(
        &self,
        principal: &PrincipalId,
        anchor: &Anchor,
        required: Permission,
    ) -> Result<(), RuntimeError> {
        let actual = self.effective_permission(principal, anchor).await?;
        if actual.allows(required) {
            Ok(())
        } else {
            Err(RuntimeError::PermissionDenied {
                principal: principal.clone(),
                anchor: anchor.id,
                required,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::anchor::Attributes;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::stores::InMemoryAnchorStore;

    fn setup(registry: ArchetypeRegistry) -> (Arc<TieredMemory>, AccessEvaluator) {
        let memory = Arc::new(TieredMemory::new(
            Arc::new(InMemoryAnchorStore::new()),
            EventBus::new(16),
        ));
        let evaluator = AccessEvaluator::new(memory.clone(), Arc::new(registry));
        (memory, evaluator)
    }

    fn p(name: &str) -> PrincipalId {
        PrincipalId::new(name)
    }

    #[tokio::test]
    async fn test_owner_and_system_hold_write() {
        let (_, access) = setup(ArchetypeRegistry::new());
        let doc = Anchor::node("Doc", p("alice"), Attributes::new());
        assert_eq!(access.effective_permission(&p("alice"), &doc).await.unwrap(), Permission::Write);
        assert_eq!(
            access.effective_permission(&PrincipalId::system(), &doc).await.unwrap(),
            Permission::Write
        );
        assert_eq!(access.effective_permission(&p("bob"), &doc).await.unwrap(), Permission::NoAccess);
    }

    #[tokio::test]
    async fn test_highest_of_override_root_grant_and_default() {
        let (memory, access) = setup(ArchetypeRegistry::new());
        let mut root = Anchor::root(&p("alice"));
        root.access.grant(p("bob"), Permission::Read);
        memory.put(root).unwrap();

        let mut doc = Anchor::node("Doc", p("alice"), Attributes::new());
        assert_eq!(access.effective_permission(&p("bob"), &doc).await.unwrap(), Permission::Read);
        assert_eq!(access.effective_permission(&p("carol"), &doc).await.unwrap(), Permission::NoAccess);

        doc.access.grant(p("bob"), Permission::Connect);
        assert_eq!(access.effective_permission(&p("bob"), &doc).await.unwrap(), Permission::Connect);

        doc.access.default = Permission::Read;
        assert!(access.check(&p("carol"), &doc, Permission::Read).await.unwrap());
        assert!(!access.check(&p("carol"), &doc, Permission::Connect).await.unwrap());

        // A grant below the root-level grant does not lower it.
        doc.access.grant(p("bob"), Permission::NoAccess);
        assert_eq!(access.effective_permission(&p("bob"), &doc).await.unwrap(), Permission::Read);
    }

    #[tokio::test]
    async fn test_no_access_override_never_lowers_default() {
        let (_, access) = setup(ArchetypeRegistry::new());
        let mut doc = Anchor::node("Doc", p("alice"), Attributes::new());
        doc.access.default = Permission::Read;
        doc.access.grant(p("bob"), Permission::NoAccess);
        assert_eq!(access.effective_permission(&p("bob"), &doc).await.unwrap(), Permission::Read);

        doc.access.grant(p("bob"), Permission::Write);
        assert_eq!(access.effective_permission(&p("bob"), &doc).await.unwrap(), Permission::Write);
    }

    #[tokio::test]
    async fn test_hook_can_raise_but_not_lower_default() {
        let registry = ArchetypeRegistry::new().access_hook("Public", |_p: &PrincipalId, a: &Anchor| {
            a.get("open").and_then(|v| v.as_bool()).map(|open| {
                if open {
                    Permission::Read
                } else {
                    Permission::NoAccess
                }
            })
        });
        let (_, access) = setup(registry);
        let mut page = Anchor::node("Public", p("alice"), Attributes::new());
        assert_eq!(access.effective_permission(&p("bob"), &page).await.unwrap(), Permission::NoAccess);

        page.set("open", serde_json::json!(true));
        assert_eq!(access.effective_permission(&p("bob"), &page).await.unwrap(), Permission::Read);
        page.set("open", serde_json::json!(false));
        assert_eq!(access.effective_permission(&p("bob"), &page).await.unwrap(), Permission::NoAccess);

        page.access.default = Permission::Connect;
        assert_eq!(access.effective_permission(&p("bob"), &page).await.unwrap(), Permission::Connect);
    }

    #[tokio::test]
    async fn test_ensure_reports_levels() {
        let (_, access) = setup(ArchetypeRegistry::new());
        let mut doc = Anchor::node("Doc", p("alice"), Attributes::new());
        doc.access.grant(p("bob"), Permission::Read);
        access.ensure(&p("bob"), &doc, Permission::Read).await.unwrap();

        let err = access.ensure(&p("bob"), &doc, Permission::Write).await.unwrap_err();
        match err {
            RuntimeError::PermissionDenied { required, actual, .. } => {
                assert_eq!(required, Permission::Write);
                assert_eq!(actual, Permission::Read);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
