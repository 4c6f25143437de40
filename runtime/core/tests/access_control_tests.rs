// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Multi-tenant access control.
//!
//! Explicit operations raise `PermissionDenied`; traversal silently skips
//! what the principal cannot read.

use osp_core::domain::config::RuntimeConfigManifest;
use osp_core::domain::events::WalkerEvent;
use osp_core::infrastructure::stores::InMemoryAnchorStore;
use osp_core::infrastructure::RuntimeEvent;
use osp_core::{
    Ability, AbilityContext, Anchor, ArchetypeRegistry, Attributes, NeighborQuery, Permission, PrincipalId, Runtime,
    RuntimeError, Trigger, VisitSpec, Walker,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn attrs(value: Value) -> Attributes {
    value
        .as_object()
        .map(|m| m.clone().into_iter().collect())
        .unwrap_or_default()
}

fn registry() -> ArchetypeRegistry {
    ArchetypeRegistry::new().walker(
        "Reader",
        vec![
            Ability::on_entry("spread", Trigger::Any, |ctx: AbilityContext| async move {
                ctx.visit(VisitSpec::outgoing()).await?;
                anyhow::Ok(())
            }),
            Ability::on_entry_sync("read", Trigger::exact("Doc"), |ctx: &AbilityContext| {
                ctx.report(ctx.attr("title").unwrap_or(Value::Null));
                Ok(())
            }),
        ],
    )
}

fn runtime_over(store: &InMemoryAnchorStore, registry: ArchetypeRegistry) -> Runtime {
    let mut config = RuntimeConfigManifest::default();
    config.spec.auto_commit = false;
    Runtime::open_with(&config, registry, Arc::new(store.clone()), None)
}

fn runtime(registry: ArchetypeRegistry) -> Runtime {
    runtime_over(&InMemoryAnchorStore::new(), registry)
}

fn p(name: &str) -> PrincipalId {
    PrincipalId::new(name)
}

#[tokio::test]
async fn test_traversal_skips_unreadable_nodes_but_direct_read_fails() {
    let rt = runtime(registry());
    let owner = rt.context(&p("P")).await.unwrap();
    let guest = rt.context(&p("Q")).await.unwrap();

    let hub = owner.create_node("Hub", Attributes::new()).await.unwrap();
    let shared = owner.create_node("Doc", attrs(json!({ "title": "T" }))).await.unwrap();
    let secret = owner.create_node("Doc", attrs(json!({ "title": "S" }))).await.unwrap();
    owner.connect(owner.root_id(), "Has", hub.id, Attributes::new()).await.unwrap();
    let to_shared = owner.connect(hub.id, "Has", shared.id, Attributes::new()).await.unwrap();
    let to_secret = owner.connect(hub.id, "Has", secret.id, Attributes::new()).await.unwrap();
    for id in [hub.id, shared.id, to_shared.id, to_secret.id] {
        owner.set_default_access(id, Permission::Read).await.unwrap();
    }

    let walker = Walker::new("Reader");
    let mut events = rt.events().subscribe();
    let result = guest.spawn(walker.clone(), hub.id).await.unwrap();
    assert_eq!(result.reports, vec![json!("T")]);

    let err = guest.get(secret.id).await.unwrap_err();
    match err {
        RuntimeError::PermissionDenied { principal, anchor, required, actual } => {
            assert_eq!(principal, p("Q"));
            assert_eq!(anchor, secret.id);
            assert_eq!(required, Permission::Read);
            assert_eq!(actual, Permission::NoAccess);
        }
        other => panic!("unexpected error: {other}"),
    }

    // Filtering happened at enumeration time: no visit to S was ever attempted.
    while let Ok(event) = events.try_recv() {
        if let RuntimeEvent::Walker(WalkerEvent::VisitDenied { location, .. }) = event {
            assert_ne!(location, secret.id);
        }
    }

    let owner_view = owner.spawn(Walker::new("Reader"), hub.id).await.unwrap();
    assert_eq!(owner_view.reports, vec![json!("T"), json!("S")]);
}

#[tokio::test]
async fn test_spawning_on_unreadable_location_visits_nothing() {
    let rt = runtime(registry());
    let owner = rt.context(&p("P")).await.unwrap();
    let guest = rt.context(&p("Q")).await.unwrap();
    let doc = owner.create_node("Doc", attrs(json!({ "title": "private" }))).await.unwrap();

    let walker = Walker::new("Reader");
    let mut events = rt.events().subscribe_walker(walker.id);
    let result = guest.spawn(walker, doc.id).await.unwrap();
    assert!(result.reports.is_empty());
    assert_eq!(result.visited, 0);

    let mut denied = false;
    loop {
        match events.recv().await.unwrap() {
            WalkerEvent::VisitDenied { location, .. } => {
                assert_eq!(location, doc.id);
                denied = true;
            }
            WalkerEvent::WalkerCompleted { .. } => break,
            _ => {}
        }
    }
    assert!(denied);
}

#[tokio::test]
async fn test_grant_and_revoke() {
    let rt = runtime(ArchetypeRegistry::new());
    let alice = rt.context(&p("alice")).await.unwrap();
    let bob = rt.context(&p("bob")).await.unwrap();
    let doc = alice.create_node("Doc", attrs(json!({ "title": "plan" }))).await.unwrap();

    assert!(bob.get(doc.id).await.unwrap_err().is_permission_denied());
    assert!(bob
        .grant(doc.id, p("bob"), Permission::Write)
        .await
        .unwrap_err()
        .is_permission_denied());

    alice.grant(doc.id, p("bob"), Permission::Read).await.unwrap();
    assert_eq!(bob.get_attr(doc.id, "title").await.unwrap(), Some(json!("plan")));
    assert!(bob.set_attr(doc.id, "title", "hijacked").await.unwrap_err().is_permission_denied());

    alice.grant(doc.id, p("bob"), Permission::Write).await.unwrap();
    bob.set_attr(doc.id, "title", "edited").await.unwrap();
    // WRITE lets bob delegate further.
    bob.grant(doc.id, p("carol"), Permission::Read).await.unwrap();
    let carol = rt.context(&p("carol")).await.unwrap();
    assert_eq!(carol.get_attr(doc.id, "title").await.unwrap(), Some(json!("edited")));

    assert_eq!(alice.revoke(doc.id, &p("bob")).await.unwrap(), Some(Permission::Write));
    assert!(bob.get(doc.id).await.unwrap_err().is_permission_denied());
    assert_eq!(alice.revoke(doc.id, &p("bob")).await.unwrap(), None);
}

#[tokio::test]
async fn test_permission_is_monotonic_in_granted_level() {
    let rt = runtime(ArchetypeRegistry::new());
    let alice = rt.context(&p("alice")).await.unwrap();
    let bob = rt.context(&p("bob")).await.unwrap();
    let doc = alice.create_node("Doc", Attributes::new()).await.unwrap();

    let levels = [Permission::NoAccess, Permission::Read, Permission::Connect, Permission::Write];
    let required = [Permission::Read, Permission::Connect, Permission::Write];
    let mut previous: Vec<bool> = vec![false; required.len()];
    for level in levels {
        alice.grant(doc.id, p("bob"), level).await.unwrap();
        let anchor: Anchor = alice.get(doc.id).await.unwrap();
        let effective = bob.access().effective_permission(&p("bob"), &anchor).await.unwrap();
        assert_eq!(effective, level);

        let mut allowed = Vec::new();
        for req in required {
            allowed.push(bob.access().check(&p("bob"), &anchor, req).await.unwrap());
        }
        for (before, now) in previous.iter().zip(&allowed) {
            assert!(!before || *now, "raising the grant removed an allowance");
        }
        previous = allowed;
    }
    assert_eq!(previous, vec![true, true, true]);
}

#[tokio::test]
async fn test_root_grant_covers_owned_anchors() {
    let rt = runtime(ArchetypeRegistry::new());
    let alice = rt.context(&p("alice")).await.unwrap();
    let bob = rt.context(&p("bob")).await.unwrap();
    let board = alice.create_node("Board", Attributes::new()).await.unwrap();
    let note = bob.create_node("Note", Attributes::new()).await.unwrap();

    assert!(bob
        .connect(board.id, "Pinned", note.id, Attributes::new())
        .await
        .unwrap_err()
        .is_permission_denied());

    alice.grant(alice.root_id(), p("bob"), Permission::Connect).await.unwrap();
    let pin = bob.connect(board.id, "Pinned", note.id, Attributes::new()).await.unwrap();
    assert_eq!(pin.owner, p("bob"));
    let pinned = bob.neighbors(board.id, &NeighborQuery::outgoing()).await.unwrap();
    assert_eq!(pinned.len(), 1);
    // Alice owns the board but not bob's edge or note.
    assert!(alice.neighbors(board.id, &NeighborQuery::outgoing()).await.unwrap().is_empty());

    // A lower anchor-level grant does not take the root grant away.
    let other = alice.create_node("Board", Attributes::new()).await.unwrap();
    alice.grant(other.id, p("bob"), Permission::NoAccess).await.unwrap();
    bob.connect(other.id, "Pinned", note.id, Attributes::new()).await.unwrap();
}

#[tokio::test]
async fn test_no_access_grant_keeps_default_level() {
    let rt = runtime(ArchetypeRegistry::new());
    let alice = rt.context(&p("alice")).await.unwrap();
    let bob = rt.context(&p("bob")).await.unwrap();
    let doc = alice.create_node("Doc", attrs(json!({ "title": "public" }))).await.unwrap();
    alice.set_default_access(doc.id, Permission::Read).await.unwrap();
    alice.grant(doc.id, p("bob"), Permission::NoAccess).await.unwrap();

    let anchor = alice.get(doc.id).await.unwrap();
    assert_eq!(
        bob.access().effective_permission(&p("bob"), &anchor).await.unwrap(),
        Permission::Read
    );
    assert_eq!(bob.get_attr(doc.id, "title").await.unwrap(), Some(json!("public")));
    assert!(bob.set_attr(doc.id, "title", "x").await.unwrap_err().is_permission_denied());
}

#[tokio::test]
async fn test_archetype_hook_is_evaluated_per_access() {
    let registry = ArchetypeRegistry::new().access_hook("Notice", |_who: &PrincipalId, anchor: &Anchor| {
        match anchor.get("published").and_then(Value::as_bool) {
            Some(true) => Some(Permission::Read),
            _ => None,
        }
    });
    let rt = runtime(registry);
    let alice = rt.context(&p("alice")).await.unwrap();
    let bob = rt.context(&p("bob")).await.unwrap();
    let notice = alice.create_node("Notice", attrs(json!({ "published": false }))).await.unwrap();

    assert!(bob.get(notice.id).await.unwrap_err().is_permission_denied());
    alice.set_attr(notice.id, "published", true).await.unwrap();
    assert!(bob.get(notice.id).await.is_ok());
    assert!(bob.set_attr(notice.id, "published", false).await.unwrap_err().is_permission_denied());
}

#[tokio::test]
async fn test_system_principal_reads_everything() {
    let rt = runtime(ArchetypeRegistry::new());
    let alice = rt.context(&p("alice")).await.unwrap();
    let doc = alice.create_node("Doc", attrs(json!({ "title": "x" }))).await.unwrap();
    let system = rt.system_context().await.unwrap();
    assert_eq!(system.root_id().0, uuid::Uuid::nil());
    system.set_attr(doc.id, "title", "y").await.unwrap();
    assert_eq!(alice.get_attr(doc.id, "title").await.unwrap(), Some(json!("y")));
}

#[tokio::test]
async fn test_grants_survive_commit() {
    let store = InMemoryAnchorStore::new();
    let first = runtime_over(&store, ArchetypeRegistry::new());
    let alice = first.context(&p("alice")).await.unwrap();
    let doc = alice.create_node("Doc", attrs(json!({ "title": "shared" }))).await.unwrap();
    alice.connect(alice.root_id(), "Has", doc.id, Attributes::new()).await.unwrap();
    alice.grant(doc.id, p("bob"), Permission::Read).await.unwrap();
    first.commit().await.unwrap();

    let second = runtime_over(&store, ArchetypeRegistry::new());
    let bob = second.context(&p("bob")).await.unwrap();
    assert_eq!(bob.get_attr(doc.id, "title").await.unwrap(), Some(json!("shared")));
}
