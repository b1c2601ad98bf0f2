//! Phase ordering and routing rules across a handler chain

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{entries, log, record, Actions, Changed, Clicked, Direct, Guarded};
use tributary_core::{
    DispatchMode, Event, EventCallback, EventCoordinator, EventHandle, HandlerId, InvokePolicy, PathPool,
    TrickleDown,
};

#[test]
fn test_phase_order_on_three_level_chain() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let root = coordinator
        .handler("root")
        .default_actions(Actions::new("root", &log))
        .build();
    let mid = coordinator.handler("mid").parent(&root).build();
    let leaf = coordinator
        .handler("leaf")
        .parent(&mid)
        .default_actions(Actions::new("leaf", &log))
        .build();

    root.register_callback(&record::<Clicked>(&log, "root"), TrickleDown::TrickleDown);
    root.register_callback(&record::<Clicked>(&log, "root"), TrickleDown::NoTrickleDown);
    mid.register_callback(&record::<Clicked>(&log, "mid"), TrickleDown::TrickleDown);
    mid.register_callback(&record::<Clicked>(&log, "mid"), TrickleDown::NoTrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf-td"), TrickleDown::TrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf-bu"), TrickleDown::NoTrickleDown);

    let evt = coordinator.pooled(Clicked);
    leaf.send_event(&evt).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "root:TrickleDown",
            "mid:TrickleDown",
            "leaf-td:AtTarget",
            "leaf-bu:AtTarget",
            "mid:BubbleUp",
            "root:BubbleUp",
            "leaf:default_at_target",
            "leaf:default",
        ]
    );

    let processed = evt.borrow().base().is_processed();
    assert!(processed);
    evt.release();
}

#[test]
fn test_end_to_end_target_and_current_target() {
    let coordinator = EventCoordinator::new();
    let a = coordinator.handler("a").build();
    let b = coordinator.handler("b").parent(&a).build();
    let c = coordinator.handler("c").parent(&b).build();

    let seen: Rc<RefCell<Vec<(HandlerId, HandlerId)>>> = Rc::default();
    let sink = Rc::clone(&seen);
    let f = EventCallback::<Changed>::new(move |evt| {
        let target = evt.target().map(|t| t.id());
        let current = evt.current_target().map(|t| t.id());
        if let (Some(target), Some(current)) = (target, current) {
            sink.borrow_mut().push((target, current));
        }
        Ok(())
    });
    a.register_callback(&f, TrickleDown::NoTrickleDown);

    c.send_event(&EventHandle::new(Changed)).unwrap();

    assert_eq!(*seen.borrow(), vec![(c.id(), a.id())]);
}

#[test]
fn test_stop_propagation_in_trickle_down() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let root = coordinator.handler("root").build();
    let mid = coordinator.handler("mid").parent(&root).build();
    let leaf = coordinator
        .handler("leaf")
        .parent(&mid)
        .default_actions(Actions::new("leaf", &log))
        .build();

    root.register_callback(&record::<Clicked>(&log, "root"), TrickleDown::TrickleDown);
    root.register_callback(&record::<Clicked>(&log, "root"), TrickleDown::NoTrickleDown);
    let sink = Rc::clone(&log);
    let stopper = EventCallback::<Clicked>::new(move |evt| {
        sink.borrow_mut().push(format!("mid:{:?}", evt.phase()));
        evt.stop_propagation();
        Ok(())
    });
    mid.register_callback(&stopper, TrickleDown::TrickleDown);
    mid.register_callback(&record::<Clicked>(&log, "mid"), TrickleDown::NoTrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf"), TrickleDown::NoTrickleDown);

    leaf.send_event(&EventHandle::new(Clicked)).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "root:TrickleDown",
            "mid:TrickleDown",
            "leaf:AtTarget",
            "leaf:default_at_target",
            "leaf:default",
        ]
    );
}

#[test]
fn test_stop_immediate_propagation_only_silences_current_node() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let root = coordinator.handler("root").build();
    let mid = coordinator.handler("mid").parent(&root).build();
    let leaf = coordinator.handler("leaf").parent(&mid).build();

    root.register_callback(&record::<Clicked>(&log, "root"), TrickleDown::TrickleDown);
    let sink = Rc::clone(&log);
    let first = EventCallback::<Clicked>::new(move |evt| {
        sink.borrow_mut().push("mid-first".to_string());
        evt.stop_immediate_propagation();
        Ok(())
    });
    mid.register_callback(&first, TrickleDown::TrickleDown);
    mid.register_callback(&record::<Clicked>(&log, "mid-second"), TrickleDown::TrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf-td"), TrickleDown::TrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf-bu"), TrickleDown::NoTrickleDown);

    leaf.send_event(&EventHandle::new(Clicked)).unwrap();

    assert_eq!(
        entries(&log),
        vec!["root:TrickleDown", "mid-first", "leaf-td:AtTarget", "leaf-bu:AtTarget"]
    );
}

#[test]
fn test_prevent_default_skips_default_actions() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let root = coordinator.handler("root").build();
    let leaf = coordinator
        .handler("leaf")
        .parent(&root)
        .default_actions(Actions::new("leaf", &log))
        .build();

    let preventer = EventCallback::<Clicked>::new(|evt| {
        evt.prevent_default();
        Ok(())
    });
    root.register_callback(&preventer, TrickleDown::TrickleDown);

    let evt = EventHandle::new(Clicked);
    leaf.send_event(&evt).unwrap();

    assert!(entries(&log).is_empty());
    assert!(evt.borrow().base().is_default_prevented());
}

#[test]
fn test_composite_root_is_a_target_not_an_ancestor() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let top = coordinator.handler("top").build();
    let composite = coordinator.handler("composite").parent(&top).composite_root(true).build();
    let leaf = coordinator.handler("leaf").parent(&composite).build();

    top.register_callback(&record::<Clicked>(&log, "top"), TrickleDown::TrickleDown);
    top.register_callback(&record::<Clicked>(&log, "top"), TrickleDown::NoTrickleDown);
    let sink = Rc::clone(&log);
    let composite_td = EventCallback::<Clicked>::new(move |evt| {
        let target = evt.target().map(|t| t.name().to_string()).unwrap_or_default();
        sink.borrow_mut().push(format!("composite-td:{:?}:{target}", evt.phase()));
        Ok(())
    });
    composite.register_callback(&composite_td, TrickleDown::TrickleDown);
    composite.register_callback(&record::<Clicked>(&log, "composite-bu"), TrickleDown::NoTrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf"), TrickleDown::NoTrickleDown);

    let evt = EventHandle::new(Clicked);
    leaf.send_event(&evt).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "top:TrickleDown",
            "leaf:AtTarget",
            "composite-td:AtTarget:composite",
            "composite-bu:AtTarget",
            "top:BubbleUp",
        ]
    );
    let target = evt.borrow().base().target().map(|t| t.id());
    assert_eq!(target, Some(leaf.id()));
}

#[test]
fn test_composite_root_path_membership() {
    let coordinator = EventCoordinator::new();
    let top = coordinator.handler("top").build();
    let composite = coordinator.handler("composite").parent(&top).composite_root(true).build();
    let leaf = coordinator.handler("leaf").parent(&composite).build();
    for node in [&top, &composite] {
        node.register_callback(&EventCallback::<Clicked>::new(|_| Ok(())), TrickleDown::TrickleDown);
        node.register_callback(&EventCallback::<Clicked>::new(|_| Ok(())), TrickleDown::NoTrickleDown);
    }

    let paths = PathPool::default();
    let ids = |nodes: &[Rc<tributary_core::CallbackHandler>]| nodes.iter().map(|n| n.id()).collect::<Vec<_>>();

    let mut evt = Event::new(Clicked);
    let path = paths.build(&leaf, evt.base());
    assert_eq!(ids(path.trickle_down_path()), vec![top.id()]);
    assert_eq!(ids(path.bubble_up_path()), vec![top.id()]);
    assert_eq!(ids(path.target_elements()), vec![leaf.id(), composite.id()]);
    paths.release(path);

    evt.base_mut().set_ignore_composite_roots(true);
    let path = paths.build(&leaf, evt.base());
    assert_eq!(ids(path.trickle_down_path()), vec![composite.id(), top.id()]);
    assert_eq!(ids(path.target_elements()), vec![leaf.id()]);
    paths.release(path);
}

#[test]
fn test_fast_path_for_non_propagating_events() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let parent = coordinator.handler("parent").build();
    let node = coordinator
        .handler("node")
        .parent(&parent)
        .bubbles_on_send(false)
        .default_actions(Actions::new("node", &log))
        .build();
    parent.register_callback(&record::<Direct>(&log, "parent"), TrickleDown::NoTrickleDown);
    node.register_callback(&record::<Direct>(&log, "node"), TrickleDown::NoTrickleDown);

    let evt = EventHandle::new(Direct);
    node.send_event(&evt).unwrap();

    assert_eq!(
        entries(&log),
        vec!["node:AtTarget", "node:default_at_target", "node:default"]
    );
    assert!(evt.borrow().base().path().is_none());
}

#[test]
fn test_bubbles_on_send_forces_bubbling() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let parent = coordinator.handler("parent").build();
    let node = coordinator.handler("node").parent(&parent).build();
    parent.register_callback(&record::<Direct>(&log, "parent"), TrickleDown::NoTrickleDown);

    node.send_event(&EventHandle::new(Direct)).unwrap();

    assert_eq!(entries(&log), vec!["parent:BubbleUp"]);
}

#[test]
fn test_disabled_handlers_run_only_include_disabled_callbacks() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let parent = coordinator.handler("parent").enabled(false).build();
    let leaf = coordinator
        .handler("leaf")
        .parent(&parent)
        .default_actions(Actions::new("leaf", &log))
        .build();

    parent.register_callback(&record::<Guarded>(&log, "parent-default"), TrickleDown::NoTrickleDown);
    parent.register_callback_with_policy(
        &record::<Guarded>(&log, "parent-include"),
        TrickleDown::NoTrickleDown,
        InvokePolicy::IncludeDisabled,
    );
    leaf.register_callback(&record::<Guarded>(&log, "leaf"), TrickleDown::NoTrickleDown);

    leaf.send_event(&EventHandle::new(Guarded)).unwrap();
    assert_eq!(
        entries(&log),
        vec![
            "leaf:AtTarget",
            "parent-include:BubbleUp",
            "leaf:default_at_target",
            "leaf:default",
        ]
    );

    log.borrow_mut().clear();
    leaf.set_enabled(false);
    parent.set_enabled(true);
    leaf.send_event(&EventHandle::new(Guarded)).unwrap();
    assert_eq!(
        entries(&log),
        vec![
            "parent-default:BubbleUp",
            "parent-include:BubbleUp",
            "leaf:disabled_at_target",
            "leaf:disabled",
        ]
    );
}

#[test]
fn test_disabled_handlers_ignored_without_skip_flag() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let parent = coordinator.handler("parent").enabled(false).build();
    let leaf = coordinator.handler("leaf").parent(&parent).build();
    parent.register_callback(&record::<Changed>(&log, "parent"), TrickleDown::NoTrickleDown);

    leaf.send_event(&EventHandle::new(Changed)).unwrap();

    assert_eq!(entries(&log), vec!["parent:BubbleUp"]);
}

#[test]
fn test_skip_listed_handler_is_not_visited() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let root = coordinator.handler("root").build();
    let mid = coordinator.handler("mid").parent(&root).build();
    let leaf = coordinator.handler("leaf").parent(&mid).build();
    root.register_callback(&record::<Changed>(&log, "root"), TrickleDown::NoTrickleDown);
    mid.register_callback(&record::<Changed>(&log, "mid"), TrickleDown::NoTrickleDown);

    let evt = EventHandle::new(Changed);
    assert!(evt.borrow_mut().base_mut().skip_handler(mid.id()));
    leaf.send_event(&evt).unwrap();

    assert_eq!(entries(&log), vec!["root:BubbleUp"]);
}

#[test]
fn test_skip_listed_composite_root_gets_no_target_visit() {
    let log = log();
    let coordinator = EventCoordinator::new();
    let top = coordinator.handler("top").build();
    let composite = coordinator
        .handler("composite")
        .parent(&top)
        .composite_root(true)
        .default_actions(Actions::new("composite", &log))
        .build();
    let leaf = coordinator
        .handler("leaf")
        .parent(&composite)
        .default_actions(Actions::new("leaf", &log))
        .build();
    top.register_callback(&record::<Clicked>(&log, "top"), TrickleDown::NoTrickleDown);
    composite.register_callback(&record::<Clicked>(&log, "composite"), TrickleDown::NoTrickleDown);
    leaf.register_callback(&record::<Clicked>(&log, "leaf"), TrickleDown::NoTrickleDown);

    let evt = EventHandle::new(Clicked);
    assert!(evt.borrow_mut().base_mut().skip_handler(composite.id()));
    leaf.send_event(&evt).unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "leaf:AtTarget",
            "top:BubbleUp",
            "leaf:default_at_target",
            "leaf:default",
        ]
    );
}

#[test]
fn test_foreign_coordinator_ancestors_are_skipped() {
    let log = log();
    let home = EventCoordinator::new();
    let away = EventCoordinator::new();
    let foreign = away.handler("foreign").build();
    let local = home.handler("local").parent(&foreign).build();

    foreign.register_callback(&record::<Changed>(&log, "foreign"), TrickleDown::NoTrickleDown);
    local.register_callback(&record::<Changed>(&log, "local"), TrickleDown::NoTrickleDown);

    local.send_event(&EventHandle::new(Changed)).unwrap();

    assert_eq!(entries(&log), vec!["local:AtTarget"]);
}

#[test]
fn test_unregister_during_invocation_applies_to_next_dispatch() {
    let coordinator = EventCoordinator::new();
    let node = coordinator.handler("node").build();

    let once_hits = Rc::new(Cell::new(0));
    let always_hits = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<EventCallback<Changed>>>> = Rc::default();

    let weak_node = Rc::downgrade(&node);
    let own = Rc::clone(&slot);
    let counter = Rc::clone(&once_hits);
    let once = EventCallback::<Changed>::new(move |_| {
        counter.set(counter.get() + 1);
        let callback = own.borrow().clone();
        if let (Some(node), Some(callback)) = (weak_node.upgrade(), callback) {
            assert!(node.unregister_callback(&callback, TrickleDown::NoTrickleDown));
            let pending = node.registry().is_some_and(|r| r.has_pending_changes());
            assert!(pending);
        }
        Ok(())
    });
    *slot.borrow_mut() = Some(once.clone());

    let counter = Rc::clone(&always_hits);
    let always = EventCallback::<Changed>::new(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });

    node.register_callback(&once, TrickleDown::NoTrickleDown);
    node.register_callback(&always, TrickleDown::NoTrickleDown);

    node.send_event(&EventHandle::new(Changed)).unwrap();
    assert_eq!((once_hits.get(), always_hits.get()), (1, 1));

    let registry = node.registry().unwrap();
    assert!(!registry.has_pending_changes());
    assert_eq!(registry.len(), 1);

    node.send_event_with_mode(&EventHandle::new(Changed), DispatchMode::Immediate)
        .unwrap();
    assert_eq!((once_hits.get(), always_hits.get()), (1, 2));

    slot.borrow_mut().take();
}

#[test]
fn test_register_during_invocation_waits_for_next_dispatch() {
    let coordinator = EventCoordinator::new();
    let node = coordinator.handler("node").build();
    let late_hits = Rc::new(Cell::new(0));

    let counter = Rc::clone(&late_hits);
    let late = EventCallback::<Changed>::new(move |_| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    let weak_node = Rc::downgrade(&node);
    let adder = EventCallback::<Changed>::new(move |_| {
        if let Some(node) = weak_node.upgrade() {
            node.register_callback(&late, TrickleDown::NoTrickleDown);
        }
        Ok(())
    });
    node.register_callback(&adder, TrickleDown::NoTrickleDown);

    node.send_event(&EventHandle::new(Changed)).unwrap();
    assert_eq!(late_hits.get(), 0);

    node.send_event(&EventHandle::new(Changed)).unwrap();
    assert_eq!(late_hits.get(), 1);
}

#[test]
fn test_user_args_are_passed_to_callback() {
    let coordinator = EventCoordinator::new();
    let node = coordinator.handler("node").build();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    let cb = tributary_core::EventCallbackWithArgs::<Changed, String>::new(move |_, label| {
        sink.borrow_mut().push(label.clone());
        Ok(())
    });
    node.register_callback_with_args(&cb, "first".to_string(), TrickleDown::NoTrickleDown);
    node.send_event(&EventHandle::new(Changed)).unwrap();

    node.register_callback_with_args(&cb, "second".to_string(), TrickleDown::NoTrickleDown);
    node.send_event(&EventHandle::new(Changed)).unwrap();

    assert_eq!(*seen.borrow(), vec!["first".to_string(), "second".to_string()]);
}
