// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end navigation scenarios and the properties that must hold across them.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use crate::arena::{ControllerId, RouterId};
use crate::bundle::Bundle;
use crate::change::{ChangeHandler, SimpleSwapChangeHandler};
use crate::controller::{ControllerState, RetainViewMode};
use crate::error::NavError;
use crate::host::{Intent, MenuItem};
use crate::lifecycle_handler::LifecycleHandler;
use crate::test_support::{
    Log, MockChangeHandler, RecordingActivity, RecordingChangeListener, RecordingListener,
    TestController, child_container_of, container_builder, container_children, handler,
    handler_for, handler_with_router, is_attached, is_gone, push, push_with, view_of,
};
use crate::transaction::RouterTransaction;

fn top(h: &LifecycleHandler, router: RouterId) -> Option<ControllerId> {
    h.router_ref(router)?
        .backstack()
        .peek()
        .map(RouterTransaction::controller)
}

fn size(h: &LifecycleHandler, router: RouterId) -> usize {
    h.router_ref(router).map_or(0, |r| r.backstack_size())
}

/// `(instance id, tag, index)` of every transaction, root first.
fn identity(h: &LifecycleHandler, router: RouterId) -> Vec<(String, Option<String>, Option<u32>)> {
    h.router_ref(router)
        .unwrap()
        .transactions()
        .iter()
        .map(|t| {
            (
                h.controller_state(t.controller())
                    .unwrap()
                    .instance_id()
                    .to_owned(),
                t.tag().map(str::to_owned),
                t.transaction_index(),
            )
        })
        .collect()
}

#[test]
fn push_pop_round_trip() {
    let (mut h, router) = handler_with_router();
    let (changes, shared) = RecordingChangeListener::shared();
    h.router(router).add_change_listener(shared);

    let a = push(&mut h, router, "a", Some("a"));
    let (a_events, listener) = RecordingListener::shared();
    h.controller(a).add_lifecycle_listener(listener);
    assert_eq!(size(&h, router), 1);
    assert_eq!(top(&h, router), Some(a));
    assert!(is_attached(&h, a));

    let b = push(&mut h, router, "b", Some("b"));
    let (b_events, listener) = RecordingListener::shared();
    h.controller(b).add_lifecycle_listener(listener);
    assert_eq!(size(&h, router), 2);
    assert_eq!(top(&h, router), Some(b));
    assert!(!is_attached(&h, a));
    assert!(view_of(&h, a).is_none(), "released on detach");
    assert!(is_attached(&h, b));

    assert!(h.router(router).pop_current_controller().unwrap());
    assert_eq!(size(&h, router), 1);
    assert_eq!(top(&h, router), Some(a));
    assert!(is_attached(&h, a));
    assert!(is_gone(&h, b));
    assert_eq!(container_children(&h, router), vec![view_of(&h, a).unwrap()]);

    let a_events = a_events.borrow();
    assert_eq!(a_events.count("post_attach"), 1);
    assert_eq!(a_events.count("post_detach"), 1);
    assert_eq!(a_events.count("post_create_view"), 1);
    assert_eq!(b_events.borrow().events.last(), Some(&"post_destroy"));

    let changes = changes.borrow();
    assert_eq!(
        changes.changes,
        vec![
            (false, Some(a), None, true),
            (true, Some(a), None, true),
            (false, Some(b), Some(a), true),
            (true, Some(b), Some(a), true),
            (false, Some(a), Some(b), false),
            (true, Some(a), Some(b), false),
        ]
    );
}

#[test]
fn pop_to_tag_destroys_everything_above() {
    let (mut h, router) = handler_with_router();
    let c: Vec<_> = ["t1", "t2", "t3", "t4"]
        .iter()
        .map(|tag| push(&mut h, router, tag, Some(tag)))
        .collect();

    assert!(h.router(router).pop_to_tag("t2"));
    assert_eq!(size(&h, router), 2);
    assert!(!is_gone(&h, c[0]));
    assert!(!is_gone(&h, c[1]));
    assert!(is_gone(&h, c[2]));
    assert!(is_gone(&h, c[3]));
    assert_eq!(container_children(&h, router), vec![view_of(&h, c[1]).unwrap()]);
    assert!(is_attached(&h, c[1]));
    assert!(!h.router(router).pop_to_tag("t4"), "popped tags are gone");
}

#[test]
fn replace_top_keeps_overlaid_views() {
    let (mut h, router) = handler_with_router();
    let c1 = push(&mut h, router, "c1", None);
    let v1 = view_of(&h, c1).unwrap();
    let c2 = push_with(
        &mut h,
        router,
        TestController::new("c2"),
        None,
        Some(Box::new(SimpleSwapChangeHandler::new(false))),
    );
    assert_eq!(container_children(&h, router), vec![v1, view_of(&h, c2).unwrap()]);
    assert!(is_attached(&h, c1), "overlaid controller stays attached");

    let c3 = h.create_controller(TestController::new("c3")).unwrap();
    let transaction = RouterTransaction::builder(c3)
        .push_change_handler(SimpleSwapChangeHandler::new(false))
        .build();
    h.router(router).replace_top_controller(transaction).unwrap();

    assert_eq!(container_children(&h, router), vec![v1, view_of(&h, c3).unwrap()]);
    assert!(is_gone(&h, c2));
    assert!(is_attached(&h, c1));
    assert!(is_attached(&h, c3));
    assert_eq!(top(&h, router), Some(c3));
}

#[test]
fn state_survives_process_death() {
    let (mut h, router) = handler_with_router();
    push(&mut h, router, "c1", Some("first"));
    push(&mut h, router, "c2", Some("second"));
    let before = identity(&h, router);

    let bytes = h.on_save_instance_state().to_bytes().unwrap();
    let saved = Bundle::from_bytes(&bytes).unwrap();

    let mut restored = handler();
    let container = container_builder(1)(restored.views_mut());
    let router = restored.attach_router(container, Some(&saved)).unwrap();
    restored.router(router).rebind_if_needed();

    assert_eq!(identity(&restored, router), before);
    let controllers = restored.router_ref(router).unwrap().backstack().controllers();
    let [top, bottom] = controllers[..] else {
        panic!("expected two controllers, got {controllers:?}");
    };
    assert!(is_attached(&restored, top));
    assert!(view_of(&restored, bottom).is_none(), "released controllers stay released");
    assert_eq!(
        container_children(&restored, router),
        vec![view_of(&restored, top).unwrap()]
    );
    let hooks = restored.controller_hooks::<TestController>(top).unwrap();
    assert_eq!(hooks.name, "c2");
    assert!(hooks.events().contains(&"restore_instance_state".to_owned()));
}

#[test]
fn configuration_change_rebinds_attached_controllers() {
    let mut h = handler_for(RecordingActivity::changing());
    let container = container_builder(1)(h.views_mut());
    let router = h.attach_router(container, None).unwrap();
    let c1 = push(&mut h, router, "c1", Some("first"));
    let c2 = push(&mut h, router, "c2", Some("second"));
    let before = identity(&h, router);

    assert!(h.on_activity_destroyed());
    assert!(view_of(&h, c2).is_none());
    assert!(h.controller_state(c2).unwrap().needs_attach());
    assert!(!h.controller_state(c1).unwrap().needs_attach());
    assert!(!is_gone(&h, c2));

    h.set_activity(Box::new(RecordingActivity::default()));
    let container = container_builder(1)(h.views_mut());
    assert_eq!(h.attach_router(container, None).unwrap(), router);
    h.router(router).rebind_if_needed();

    assert!(is_attached(&h, c2));
    assert!(view_of(&h, c1).is_none());
    assert_eq!(identity(&h, router), before);
    let events = h.controller_hooks::<TestController>(c2).unwrap().events();
    assert_eq!(events.iter().filter(|e| *e == "create_view").count(), 2);
    assert!(!events.contains(&"destroy".to_owned()));
}

#[test]
fn target_controller_resolves_across_child_routers() {
    let (mut h, router) = handler_with_router();
    let p = push_with(&mut h, router, TestController::hosting("p", 7), None, None);
    let container = child_container_of(&h, p);
    let child = h.controller(p).child_router(container, Some("details")).unwrap();
    assert_eq!(h.controller(p).child_router(container, Some("details")).unwrap(), child);

    let c = h.create_controller(TestController::new("c")).unwrap();
    h.controller(c).set_target_controller(Some(p)).unwrap();
    let c2 = h.create_controller(TestController::new("c2")).unwrap();
    h.controller(p).set_target_controller(Some(c2)).unwrap();
    assert_eq!(h.controller(p).target_controller(), None, "target not pushed yet");

    h.router(child).push_controller(RouterTransaction::with(c)).unwrap();
    assert_eq!(h.controller(c).target_controller(), Some(p));
    assert_eq!(h.controller(c).parent_controller(), Some(p));

    h.router(child).push_controller(RouterTransaction::with(c2)).unwrap();
    assert_eq!(h.controller(p).target_controller(), Some(c2));
    assert!(matches!(
        h.controller(c).set_target_controller(Some(c2)),
        Err(NavError::InvalidModification(_))
    ));
}

#[test]
fn back_press_reaches_children_first() {
    let (mut h, router) = handler_with_router();
    let p = push_with(&mut h, router, TestController::hosting("p", 7), None, None);
    let container = child_container_of(&h, p);
    let child = h.controller(p).child_router(container, None).unwrap();
    h.router(child).set_pops_last_view(true);
    let c1 = push(&mut h, child, "c1", None);
    let c2 = push(&mut h, child, "c2", None);
    assert!(is_attached(&h, c2));

    assert!(h.router(router).handle_back());
    assert!(is_gone(&h, c2));
    assert!(is_attached(&h, c1));
    assert!(is_attached(&h, p));

    assert!(h.router(router).handle_back());
    assert!(is_gone(&h, c1));
    assert!(!h.router_ref(child).unwrap().has_root_controller());
    assert!(h.views().children(container).is_empty());
    assert!(is_attached(&h, p));

    assert!(!h.router(router).handle_back(), "last controller popped");
    assert_eq!(size(&h, router), 0);
    assert!(h.controller_state(p).unwrap().is_being_destroyed());
}

#[test]
fn consumed_back_does_not_pop() {
    let (mut h, router) = handler_with_router();
    let c = push(&mut h, router, "c", None);
    h.controller_hooks_mut::<TestController>(c).unwrap().consumes_back = true;
    assert!(h.router(router).handle_back());
    assert_eq!(size(&h, router), 1);
    assert!(is_attached(&h, c));
}

#[test]
fn set_backstack_reorders_with_increasing_indices() {
    let (mut h, router) = handler_with_router();
    let a = push(&mut h, router, "a", Some("a"));
    let b = push(&mut h, router, "b", Some("b"));
    let c = push(&mut h, router, "c", Some("c"));
    let transactions = h.router_ref(router).unwrap().transactions();
    let indices: Vec<_> = transactions.iter().filter_map(|t| t.transaction_index()).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let take = |id| {
        transactions
            .iter()
            .find(|t| t.controller() == id)
            .cloned()
            .unwrap()
    };
    h.router(router)
        .set_backstack(vec![take(c), take(a), take(b)], None)
        .unwrap();

    let reordered = h.router_ref(router).unwrap().transactions();
    let order: Vec<_> = reordered.iter().map(RouterTransaction::controller).collect();
    assert_eq!(order, vec![c, a, b]);
    let indices: Vec<_> = reordered.iter().filter_map(|t| t.transaction_index()).collect();
    assert!(indices.windows(2).all(|w| w[0] < w[1]), "indices {indices:?}");
    for id in [a, b, c] {
        assert!(!is_gone(&h, id));
    }
    assert!(is_attached(&h, b));
    assert!(!is_attached(&h, a));
    assert!(!is_attached(&h, c));
    assert_eq!(container_children(&h, router), vec![view_of(&h, b).unwrap()]);
}

#[test]
fn set_backstack_destroys_dropped_controllers() {
    let (mut h, router) = handler_with_router();
    let a = push(&mut h, router, "a", None);
    let b = push(&mut h, router, "b", None);
    let c = h.create_controller(TestController::new("c")).unwrap();
    h.router(router)
        .set_root(RouterTransaction::with(c))
        .unwrap();
    assert!(is_gone(&h, a));
    assert!(is_gone(&h, b));
    assert!(is_attached(&h, c));
    assert_eq!(container_children(&h, router), vec![view_of(&h, c).unwrap()]);
}

#[test]
fn controllers_live_on_one_backstack() {
    let (mut h, router) = handler_with_router();
    let p = push_with(&mut h, router, TestController::hosting("p", 7), None, None);
    let container = child_container_of(&h, p);
    let child = h.controller(p).child_router(container, None).unwrap();

    assert!(matches!(
        h.router(router).push_controller(RouterTransaction::with(p)),
        Err(NavError::AlreadyPushed)
    ));
    assert!(matches!(
        h.router(child).push_controller(RouterTransaction::with(p)),
        Err(NavError::AlreadyPushed)
    ));
    let c = h.create_controller(TestController::new("c")).unwrap();
    assert!(matches!(
        h.router(child)
            .set_backstack(vec![RouterTransaction::with(c), RouterTransaction::with(c)], None),
        Err(NavError::AlreadyPushed)
    ));
    assert_eq!(size(&h, router), 1);
    assert_eq!(size(&h, child), 0);
}

#[test]
fn view_state_round_trips_through_release() {
    let (mut h, router) = handler_with_router();
    let a = push_with(&mut h, router, TestController::hosting("a", 5), None, None);
    let (events, listener) = RecordingListener::shared();
    h.controller(a).add_lifecycle_listener(listener);
    h.controller_hooks_mut::<TestController>(a).unwrap().draft = Some("hello".into());
    let inner = child_container_of(&h, a);
    h.views_mut().set_state(inner, json!({ "scroll": 42 }));

    push(&mut h, router, "b", None);
    assert!(view_of(&h, a).is_none());
    assert!(h.controller_state(a).unwrap().view_state().is_some());

    h.router(router).pop_current_controller().unwrap();
    let hooks = h.controller_hooks::<TestController>(a).unwrap();
    assert_eq!(hooks.restored_draft.as_deref(), Some("hello"));
    let inner = child_container_of(&h, a);
    assert_eq!(h.views().state(inner), Some(&json!({ "scroll": 42 })));
    assert!(
        h.controller_state(a).unwrap().view_state().is_none(),
        "saved view state is consumed by the fresh view"
    );
    let events = events.borrow();
    assert_eq!(events.count("save_view_state"), 1);
    assert_eq!(events.count("restore_view_state"), 1);
}

#[test]
fn retained_view_survives_detach() {
    let (mut h, router) = handler_with_router();
    let a = push(&mut h, router, "a", None);
    h.controller(a).set_retain_view_mode(RetainViewMode::RetainDetach);
    let view = view_of(&h, a).unwrap();
    push(&mut h, router, "b", None);
    assert!(!is_attached(&h, a));
    assert_eq!(view_of(&h, a), Some(view));

    h.router(router).pop_current_controller().unwrap();
    assert_eq!(view_of(&h, a), Some(view), "the retained view is shown again");
    assert!(is_attached(&h, a));

    h.controller(a).set_retain_view_mode(RetainViewMode::ReleaseDetach);
    assert_eq!(view_of(&h, a), Some(view), "attached views are kept");
}

#[test]
fn inflating_elsewhere_moves_the_view_out_first() {
    let (mut h, router) = handler_with_router();
    let a = push(&mut h, router, "a", None);
    h.controller(a).set_retain_view_mode(RetainViewMode::RetainDetach);
    let old = view_of(&h, a).unwrap();
    let elsewhere = container_builder(2)(h.views_mut());

    let new = h.inflate(a, elsewhere).unwrap();
    assert_ne!(new, old);
    assert!(!h.views().is_alive(old));
    assert!(h.views().parent(new).is_none());
    assert!(container_children(&h, router).is_empty());
}

#[test]
fn pending_changes_complete_exactly_once() {
    let (mut h, router) = handler_with_router();
    let a = push(&mut h, router, "a", None);

    // Completed by ticking.
    let completed = Log::default();
    let b = push_with(
        &mut h,
        router,
        TestController::new("b"),
        None,
        Some(Box::new(MockChangeHandler::new(true, Rc::clone(&completed)))),
    );
    assert!(h.has_pending_changes());
    assert_eq!(
        container_children(&h, router).len(),
        2,
        "both views show while the change runs"
    );
    h.advance(Duration::from_millis(16));
    assert!(!h.has_pending_changes());
    assert_eq!(*completed.borrow(), vec!["perform", "completed"]);
    assert!(view_of(&h, a).is_none());

    // Superseded by another push.
    let snapped = Log::default();
    push_with(
        &mut h,
        router,
        TestController::new("c"),
        None,
        Some(Box::new(MockChangeHandler::new(true, Rc::clone(&snapped)))),
    );
    let d = push(&mut h, router, "d", None);
    assert_eq!(*snapped.borrow(), vec!["perform", "complete_immediately"]);
    assert!(is_attached(&h, d));

    // Aborted by popping its controller.
    let aborted = Log::default();
    let e = push_with(
        &mut h,
        router,
        TestController::new("e"),
        None,
        Some(Box::new(MockChangeHandler::new(true, Rc::clone(&aborted)))),
    );
    h.router(router).pop_controller(e).unwrap();
    assert_eq!(*aborted.borrow(), vec!["perform", "abort"]);
    assert!(is_gone(&h, e));
    assert!(is_attached(&h, d));
    assert_eq!(container_children(&h, router), vec![view_of(&h, d).unwrap()]);
    assert!(!h.has_pending_changes());
    assert!(!is_gone(&h, b));
}

#[test]
fn destroying_a_router_empties_its_container() {
    let (mut h, router) = handler_with_router();
    let c: Vec<_> = (0..3)
        .map(|i| {
            push_with(
                &mut h,
                router,
                TestController::new("overlay"),
                None,
                (i > 0).then(|| {
                    Box::new(SimpleSwapChangeHandler::new(false)) as Box<dyn ChangeHandler>
                }),
            )
        })
        .collect();
    let container = h.router_ref(router).unwrap().container().unwrap();
    assert_eq!(h.views().children(container).len(), 3);

    h.router(router).destroy(true);
    assert!(h.views().children(container).is_empty());
    for id in c {
        assert!(is_gone(&h, id));
    }
}

#[test]
fn child_routers_come_back_after_process_death() {
    let (mut h, router) = handler_with_router();
    let p = push_with(&mut h, router, TestController::hosting("p", 7), None, None);
    let container = child_container_of(&h, p);
    let child = h.controller(p).child_router(container, Some("list")).unwrap();
    push(&mut h, child, "c", Some("row"));
    let saved = h.on_save_instance_state();

    let mut restored = handler();
    let container = container_builder(1)(restored.views_mut());
    let router = restored.attach_router(container, Some(&saved)).unwrap();
    let p = top(&restored, router).unwrap();
    assert!(is_attached(&restored, p));
    let state = restored.controller_state(p).unwrap();
    let [child] = state.child_routers()[..] else {
        panic!("expected one child router");
    };
    let r = restored.router_ref(child).unwrap();
    assert_eq!(r.tag(), Some("list"));
    assert_eq!(r.host_id(), Some(7));
    assert_eq!(r.host_controller(), Some(p));
    let c = r.controller_with_tag("row").unwrap();
    assert!(is_attached(&restored, c));
    assert_eq!(restored.controller(c).parent_controller(), Some(p));
    assert_eq!(
        restored.views().children(child_container_of(&restored, p)),
        &[view_of(&restored, c).unwrap()]
    );
}

#[test]
fn failed_restore_leaves_nothing_behind() {
    let (mut h, router) = handler_with_router();
    push(&mut h, router, "a", None);
    push(&mut h, router, "b", None);
    let saved = h.on_save_instance_state();

    // Swap the class of the second controller for one nobody registered.
    let mut corrupt = saved.clone();
    let key = saved
        .keys()
        .find(|k| saved.get_bundle(k).is_some_and(|b| b.contains_key("backstack")))
        .unwrap()
        .to_owned();
    let mut router_bag = saved.get_bundle(&key).unwrap().clone();
    let mut backstack = router_bag.get_bundle("backstack").unwrap().clone();
    let mut entries = backstack.get_bundle_list("entries").unwrap().to_vec();
    assert_eq!(entries.len(), 2);
    let mut controller_bag = entries[1].get_bundle("controller.bundle").unwrap().clone();
    controller_bag.put_string("className", "nobody::Nothing");
    entries[1].put_bundle("controller.bundle", controller_bag);
    backstack.put_bundle_list("entries", entries);
    router_bag.put_bundle("backstack", backstack);
    corrupt.put_bundle(key, router_bag);

    let mut restored = handler();
    let container = container_builder(1)(restored.views_mut());
    assert!(matches!(
        restored.attach_router(container, Some(&corrupt)),
        Err(NavError::MissingConstructor { .. })
    ));
    assert!(restored.controllers.keys().is_empty(), "first entry was dropped");
    assert!(restored.routers.keys().is_empty());
    assert!(restored.routers().is_empty());

    let router = restored.attach_router(container, Some(&saved)).unwrap();
    assert_eq!(size(&restored, router), 2);
    assert!(is_attached(&restored, top(&restored, router).unwrap()));
}

#[test]
fn child_router_detaches_with_its_host() {
    let (mut h, router) = handler_with_router();
    let p = push_with(&mut h, router, TestController::hosting("p", 7), None, None);
    let container = child_container_of(&h, p);
    let child = h.controller(p).child_router(container, None).unwrap();
    let c = push(&mut h, child, "c", None);

    let q = push(&mut h, router, "q", None);
    assert!(!is_attached(&h, c));
    assert!(view_of(&h, c).is_none());
    assert!(!h.router_ref(child).unwrap().has_host(), "host view released");

    h.router(router).pop_controller(q).unwrap();
    assert!(is_attached(&h, p));
    assert!(h.router_ref(child).unwrap().has_host());
    assert!(is_attached(&h, c), "child controller rebinds with its host");
}

#[test]
fn host_requests_wait_for_a_router() {
    let activity = RecordingActivity::default();
    let log = Rc::clone(&activity.log);
    let mut h = handler_for(activity);
    let container = container_builder(1)(h.views_mut());
    let router = h.attach_router(container, None).unwrap();

    let c = h.create_controller(TestController::new("c")).unwrap();
    h.controller(c).start_activity(Intent::new("share"));
    h.controller(c)
        .start_activity_for_result(Intent::new("pick"), 3, None);
    h.controller(c)
        .request_permissions(vec!["camera".into()], 9);
    assert!(log.borrow().started.is_empty(), "queued until routed");

    h.router(router).push_controller(RouterTransaction::with(c)).unwrap();
    assert_eq!(log.borrow().started, vec![Intent::new("share")]);
    assert_eq!(log.borrow().started_for_result, vec![("pick".to_owned(), 3)]);
    assert_eq!(
        log.borrow().permission_requests,
        vec![(vec!["camera".to_owned()], 9)]
    );

    h.on_activity_result(3, -1, None);
    h.on_request_permissions_result(9, &["camera".to_owned()], &[true]);
    h.on_activity_result(99, 0, None);
    let hooks = h.controller_hooks::<TestController>(c).unwrap();
    assert_eq!(hooks.activity_results, vec![(3, -1)]);
    assert_eq!(hooks.permission_results, vec![(9, vec![true])]);
    assert!(h.controller_state(c).unwrap().requested_permissions().is_empty());
}

#[test]
fn request_maps_survive_save() {
    let (mut h, router) = handler_with_router();
    let c = push(&mut h, router, "c", None);
    h.controller(c).register_for_activity_result(4);
    let saved = h.on_save_instance_state();

    let mut restored = handler();
    restored.on_create(Some(&saved));
    let container = container_builder(1)(restored.views_mut());
    let router = restored.attach_router(container, Some(&saved)).unwrap();
    let c = top(&restored, router).unwrap();
    restored.on_activity_result(4, 1, None);
    assert_eq!(
        restored
            .controller_hooks::<TestController>(c)
            .unwrap()
            .activity_results,
        vec![(4, 1)]
    );
}

#[test]
fn permission_rationale_prefers_the_requesting_controller() {
    let activity = RecordingActivity {
        rationale: true,
        ..RecordingActivity::default()
    };
    let mut h = handler_for(activity);
    let container = container_builder(1)(h.views_mut());
    let router = h.attach_router(container, None).unwrap();
    let c = push(&mut h, router, "c", None);
    assert!(h.should_show_request_permission_rationale("camera"), "host default");

    h.controller_hooks_mut::<TestController>(c).unwrap().rationale = Some(false);
    h.controller(c).request_permissions(vec!["camera".into()], 1);
    assert!(!h.should_show_request_permission_rationale("camera"));
    assert!(!h.controller(c).should_show_request_permission_rationale("camera"));
}

#[test]
fn options_menu_follows_attached_visible_controllers() {
    let activity = RecordingActivity::default();
    let log = Rc::clone(&activity.log);
    let mut h = handler_for(activity);
    let container = container_builder(1)(h.views_mut());
    let router = h.attach_router(container, None).unwrap();
    let c = push(&mut h, router, "c", None);
    let item = MenuItem {
        id: 1,
        title: "Search".into(),
    };
    h.controller_hooks_mut::<TestController>(c).unwrap().menu_item = Some(item.clone());

    h.controller(c).set_has_options_menu(true);
    assert_eq!(log.borrow().menu_invalidations, 1);
    let mut menu: Vec<MenuItem> = Vec::new();
    h.on_create_options_menu(&mut menu);
    assert_eq!(menu, vec![item.clone()]);
    assert!(h.on_options_item_selected(&item));

    h.controller(c).set_options_menu_hidden(true);
    assert_eq!(log.borrow().menu_invalidations, 2);
    let mut menu: Vec<MenuItem> = Vec::new();
    h.on_create_options_menu(&mut menu);
    assert!(menu.is_empty());
    assert!(!h.on_options_item_selected(&item));
}

#[test]
fn activity_lifecycle_fans_out_depth_first() {
    let (mut h, router) = handler_with_router();
    let p = push_with(&mut h, router, TestController::hosting("p", 7), None, None);
    let container = child_container_of(&h, p);
    let child = h.controller(p).child_router(container, None).unwrap();
    let c = push(&mut h, child, "c", None);

    h.on_activity_started();
    h.on_activity_resumed();
    h.on_activity_paused();
    h.on_activity_stopped();
    for id in [p, c] {
        let events = h.controller_hooks::<TestController>(id).unwrap().events();
        let lifecycle: Vec<_> = events
            .iter()
            .filter(|e| e.starts_with("activity_"))
            .cloned()
            .collect();
        assert_eq!(
            lifecycle,
            vec!["activity_started", "activity_resumed", "activity_paused", "activity_stopped"]
        );
    }

    assert!(!h.on_activity_destroyed());
    assert!(h.is_destroyed());
    assert!(is_gone(&h, p));
    assert!(is_gone(&h, c));
    assert!(h.routers().is_empty());
}

#[test]
fn destroyed_controllers_hear_nothing_more() {
    let (mut h, router) = handler_with_router();
    let a = push(&mut h, router, "a", None);
    let (events, listener) = RecordingListener::shared();
    h.controller(a).add_lifecycle_listener(listener);
    h.router(router).pop_current_controller().unwrap();
    let count = events.borrow().events.len();
    assert_eq!(events.borrow().events.last(), Some(&"post_destroy"));

    h.on_activity_started();
    h.on_save_instance_state();
    h.on_activity_destroyed();
    assert_eq!(events.borrow().events.len(), count);
    assert!(h.controller_state(a).is_none_or(ControllerState::is_destroyed));
}

#[derive(Clone, Debug)]
enum Op {
    Push,
    Pop,
    Replace,
    PopToRoot,
    Reverse,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Push),
        2 => Just(Op::Pop),
        1 => Just(Op::Replace),
        1 => Just(Op::PopToRoot),
        1 => Just(Op::Reverse),
    ]
}

type Observed = Vec<(ControllerId, Rc<RefCell<RecordingListener>>)>;

fn observed_controller(h: &mut LifecycleHandler, observed: &mut Observed) -> ControllerId {
    let c = h.create_controller(TestController::new("p")).unwrap();
    let (events, listener) = RecordingListener::shared();
    h.controller(c).add_lifecycle_listener(listener);
    observed.push((c, events));
    c
}

fn check_router(
    h: &LifecycleHandler,
    router: RouterId,
    observed: &Observed,
) -> Result<(), TestCaseError> {
    let transactions = h.router_ref(router).unwrap().transactions();
    let controllers: Vec<_> = transactions.iter().map(RouterTransaction::controller).collect();
    for (i, c) in controllers.iter().enumerate() {
        prop_assert!(!controllers[..i].contains(c), "{c:?} twice on the backstack");
        prop_assert!(!is_gone(h, *c));
    }

    let indices: Vec<_> = transactions.iter().map(|t| t.transaction_index()).collect();
    prop_assert!(indices.iter().all(Option::is_some));
    prop_assert!(indices.windows(2).all(|w| w[0] < w[1]), "indices {:?}", indices);

    if let Some((top, below)) = controllers.split_last() {
        prop_assert_eq!(container_children(h, router), vec![view_of(h, *top).unwrap()]);
        prop_assert!(is_attached(h, *top));
        for c in below {
            prop_assert!(view_of(h, *c).is_none());
        }
    }

    for (c, events) in observed {
        let events = events.borrow();
        prop_assert_eq!(events.count("pre_attach"), events.count("post_attach"));
        prop_assert_eq!(events.count("pre_detach"), events.count("post_detach"));
        let attaches = events.count("post_attach");
        let detaches = events.count("post_detach");
        prop_assert!(attaches == detaches || attaches == detaches + 1);
        if let Some(pos) = events.events.iter().position(|e| *e == "post_destroy") {
            prop_assert_eq!(pos, events.events.len() - 1);
        }
        if !controllers.contains(c) {
            prop_assert!(is_gone(h, *c));
            prop_assert_eq!(events.count("post_destroy"), 1);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn navigation_keeps_router_invariants(ops in prop::collection::vec(op(), 1..30)) {
        let (mut h, router) = handler_with_router();
        let mut observed = Observed::new();
        for op in ops {
            let len = size(&h, router);
            match op {
                Op::Push => {
                    let c = observed_controller(&mut h, &mut observed);
                    h.router(router).push_controller(RouterTransaction::with(c)).unwrap();
                }
                Op::Pop => {
                    // Popping the last controller keeps its view, which is covered elsewhere.
                    if len > 1 {
                        prop_assert!(h.router(router).pop_current_controller().unwrap());
                    }
                }
                Op::Replace => {
                    let c = observed_controller(&mut h, &mut observed);
                    h.router(router)
                        .replace_top_controller(RouterTransaction::with(c))
                        .unwrap();
                }
                Op::PopToRoot => {
                    prop_assert_eq!(h.router(router).pop_to_root(), len > 1);
                }
                Op::Reverse => {
                    let mut transactions = h.router_ref(router).unwrap().transactions();
                    transactions.reverse();
                    h.router(router).set_backstack(transactions, None).unwrap();
                }
            }
            check_router(&h, router, &observed)?;
        }
    }
}
