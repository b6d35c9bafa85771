// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording doubles shared by the crate's tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use understory_view::{LocalView, ViewId, ViewTree};

use crate::arena::{ControllerId, RouterId};
use crate::bundle::Bundle;
use crate::change::{
    ChangeContext, ChangeEvent, ChangeHandler, ChangeStatus, ChangeType, ControllerChangeListener,
};
use crate::controller::{
    Controller, ControllerContext, ControllerState, LifecycleListener, SharedLifecycleListener,
};
use crate::host::{Activity, Intent, Menu, MenuItem};
use crate::lifecycle_handler::LifecycleHandler;
use crate::registry::ClassRegistry;
use crate::router::SharedChangeListener;
use crate::transaction::RouterTransaction;

pub(crate) type Log = Rc<RefCell<Vec<String>>>;

const KEY_NAME: &str = "name";
const KEY_CHILD_CONTAINER: &str = "childContainer";
const KEY_DRAFT: &str = "draft";

/// Registry knowing [`TestController`] and [`MockChangeHandler`].
pub(crate) fn registry() -> ClassRegistry {
    let mut registry = ClassRegistry::new();
    registry
        .register_controller::<TestController>()
        .register_change_handler::<MockChangeHandler>();
    registry
}

/// A handler over a [`RecordingActivity`] with no routers yet.
pub(crate) fn handler() -> LifecycleHandler {
    handler_for(RecordingActivity::default())
}

/// A handler over `activity` with no routers yet.
pub(crate) fn handler_for(activity: RecordingActivity) -> LifecycleHandler {
    LifecycleHandler::new(Box::new(activity), Rc::new(registry()))
}

/// A handler with one activity-hosted router on an attached container (element id 1).
pub(crate) fn handler_with_router() -> (LifecycleHandler, RouterId) {
    let mut h = handler();
    let container = container_builder(1)(h.views_mut());
    let router = h.attach_router(container, None).unwrap();
    (h, router)
}

/// Builds a window holding one container group with `element_id`.
pub(crate) fn container_builder(element_id: u32) -> impl FnOnce(&mut ViewTree) -> ViewId {
    move |views| {
        let window = views.insert(None, LocalView::default());
        let container = views.insert(Some(window), LocalView::with_element_id(element_id));
        views.attach_to_window(window);
        container
    }
}

/// Create a [`TestController`] named `name` and push it with `tag`.
pub(crate) fn push(
    h: &mut LifecycleHandler,
    router: RouterId,
    name: &str,
    tag: Option<&str>,
) -> ControllerId {
    push_with(h, router, TestController::new(name), tag, None)
}

/// Push `controller` with an optional tag and push handler.
pub(crate) fn push_with(
    h: &mut LifecycleHandler,
    router: RouterId,
    controller: TestController,
    tag: Option<&str>,
    push_handler: Option<Box<dyn ChangeHandler>>,
) -> ControllerId {
    let c = h.create_controller(controller).unwrap();
    let mut transaction = RouterTransaction::with(c);
    transaction.set_tag(tag.map(str::to_owned)).unwrap();
    transaction.set_push_change_handler(push_handler).unwrap();
    h.router(router).push_controller(transaction).unwrap();
    c
}

/// Children of `router`'s container.
pub(crate) fn container_children(h: &LifecycleHandler, router: RouterId) -> Vec<ViewId> {
    let container = h.router_ref(router).and_then(|r| r.container()).unwrap();
    h.views().children(container).to_vec()
}

/// View of `c`, if materialised.
pub(crate) fn view_of(h: &LifecycleHandler, c: ControllerId) -> Option<ViewId> {
    h.controller_state(c).and_then(ControllerState::view)
}

/// Whether `c` is alive and logically attached.
pub(crate) fn is_attached(h: &LifecycleHandler, c: ControllerId) -> bool {
    h.controller_state(c).is_some_and(ControllerState::is_attached)
}

/// Whether `c` finished destroying (and possibly was dropped already).
pub(crate) fn is_gone(h: &LifecycleHandler, c: ControllerId) -> bool {
    h.controller_state(c).is_none_or(ControllerState::is_destroyed)
}

/// The child container group inside `c`'s view.
pub(crate) fn child_container_of(h: &LifecycleHandler, c: ControllerId) -> ViewId {
    let hooks = h.controller_hooks::<TestController>(c).unwrap();
    let element_id = hooks.child_container.unwrap();
    h.views()
        .find_by_element_id(view_of(h, c).unwrap(), element_id)
        .unwrap()
}

/// A controller recording every hook it sees.
///
/// Its name and child container element id survive save and restore through instance
/// state; a restored instance starts with an empty log.
#[derive(Debug, Default)]
pub(crate) struct TestController {
    pub(crate) name: String,
    pub(crate) log: Log,
    /// Element id of a group created inside the view, for hosting a child router.
    pub(crate) child_container: Option<u32>,
    pub(crate) consumes_back: bool,
    /// Written to the view-state bag when the view is released.
    pub(crate) draft: Option<String>,
    pub(crate) restored_draft: Option<String>,
    pub(crate) rationale: Option<bool>,
    pub(crate) menu_item: Option<MenuItem>,
    pub(crate) activity_results: Vec<(i32, i32)>,
    pub(crate) permission_results: Vec<(i32, Vec<bool>)>,
}

impl TestController {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// A controller whose view contains a group with `element_id`.
    pub(crate) fn hosting(name: &str, element_id: u32) -> Self {
        Self {
            child_container: Some(element_id),
            ..Self::new(name)
        }
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.log.borrow_mut().push(event.into());
    }
}

impl Controller for TestController {
    fn on_create_view(&mut self, cx: &mut ControllerContext<'_>, _container: ViewId) -> ViewId {
        self.record("create_view");
        let views = cx.views_mut();
        let view = views.insert(None, LocalView::default());
        if let Some(element_id) = self.child_container {
            views.insert(Some(view), LocalView::with_element_id(element_id));
        }
        view
    }

    fn on_attach(&mut self, _cx: &mut ControllerContext<'_>, _view: ViewId) {
        self.record("attach");
    }

    fn on_detach(&mut self, _cx: &mut ControllerContext<'_>, _view: ViewId) {
        self.record("detach");
    }

    fn on_destroy_view(&mut self, _cx: &mut ControllerContext<'_>, _view: ViewId) {
        self.record("destroy_view");
    }

    fn on_destroy(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record("destroy");
    }

    fn on_change_started(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
        self.record(format!("change_started:{change_type:?}"));
    }

    fn on_change_ended(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        _handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
        self.record(format!("change_ended:{change_type:?}"));
    }

    fn on_activity_started(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record("activity_started");
    }

    fn on_activity_resumed(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record("activity_resumed");
    }

    fn on_activity_paused(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record("activity_paused");
    }

    fn on_activity_stopped(&mut self, _cx: &mut ControllerContext<'_>) {
        self.record("activity_stopped");
    }

    fn on_save_view_state(&mut self, _cx: &mut ControllerContext<'_>, _view: ViewId, out: &mut Bundle) {
        if let Some(draft) = &self.draft {
            out.put_string(KEY_DRAFT, draft.as_str());
        }
    }

    fn on_restore_view_state(&mut self, _cx: &mut ControllerContext<'_>, _view: ViewId, saved: &Bundle) {
        self.restored_draft = saved.get_string(KEY_DRAFT).map(str::to_owned);
    }

    fn on_save_instance_state(&mut self, _cx: &mut ControllerContext<'_>, out: &mut Bundle) {
        out.put_string(KEY_NAME, self.name.as_str());
        if let Some(element_id) = self.child_container {
            out.put_int(KEY_CHILD_CONTAINER, i64::from(element_id));
        }
    }

    fn on_restore_instance_state(&mut self, _cx: &mut ControllerContext<'_>, saved: &Bundle) {
        self.record("restore_instance_state");
        if let Some(name) = saved.get_string(KEY_NAME) {
            self.name = name.to_owned();
        }
        self.child_container = saved
            .get_int(KEY_CHILD_CONTAINER)
            .and_then(|i| u32::try_from(i).ok());
    }

    fn on_activity_result(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        request_code: i32,
        result_code: i32,
        _data: Option<&Intent>,
    ) {
        self.activity_results.push((request_code, result_code));
    }

    fn on_request_permissions_result(
        &mut self,
        _cx: &mut ControllerContext<'_>,
        request_code: i32,
        _permissions: &[String],
        grants: &[bool],
    ) {
        self.permission_results.push((request_code, grants.to_vec()));
    }

    fn should_show_request_permission_rationale(&self, _permission: &str) -> Option<bool> {
        self.rationale
    }

    fn on_create_options_menu(&mut self, _cx: &mut ControllerContext<'_>, menu: &mut dyn Menu) {
        if let Some(item) = &self.menu_item {
            menu.add_item(item.clone());
        }
    }

    fn on_options_item_selected(&mut self, _cx: &mut ControllerContext<'_>, item: &MenuItem) -> bool {
        self.menu_item.as_ref() == Some(item)
    }

    fn handle_back(&mut self, _cx: &mut ControllerContext<'_>) -> bool {
        self.record("back");
        self.consumes_back
    }
}

/// Everything a [`RecordingActivity`] was asked to do.
#[derive(Debug, Default)]
pub(crate) struct ActivityLog {
    pub(crate) started: Vec<Intent>,
    pub(crate) started_for_result: Vec<(String, i32)>,
    pub(crate) permission_requests: Vec<(Vec<String>, i32)>,
    pub(crate) menu_invalidations: u32,
}

/// An activity that records requests into a shared [`ActivityLog`].
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordingActivity {
    pub(crate) changing_configurations: bool,
    pub(crate) rationale: bool,
    pub(crate) log: Rc<RefCell<ActivityLog>>,
}

impl RecordingActivity {
    /// An activity being recreated for a configuration change.
    pub(crate) fn changing() -> Self {
        Self {
            changing_configurations: true,
            ..Self::default()
        }
    }
}

impl Activity for RecordingActivity {
    fn is_changing_configurations(&self) -> bool {
        self.changing_configurations
    }

    fn invalidate_options_menu(&mut self) {
        self.log.borrow_mut().menu_invalidations += 1;
    }

    fn start_activity(&mut self, intent: &Intent) {
        self.log.borrow_mut().started.push(intent.clone());
    }

    fn start_activity_for_result(&mut self, intent: &Intent, request_code: i32, _options: Option<&Bundle>) {
        self.log
            .borrow_mut()
            .started_for_result
            .push((intent.action.clone(), request_code));
    }

    fn request_permissions(&mut self, permissions: &[String], request_code: i32) {
        self.log
            .borrow_mut()
            .permission_requests
            .push((permissions.to_vec(), request_code));
    }

    fn should_show_request_permission_rationale(&self, _permission: &str) -> bool {
        self.rationale
    }
}

/// Lifecycle listener recording callback names.
#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    pub(crate) events: Vec<&'static str>,
}

impl RecordingListener {
    pub(crate) fn shared() -> (Rc<RefCell<Self>>, SharedLifecycleListener) {
        let listener = Rc::new(RefCell::new(Self::default()));
        let shared: SharedLifecycleListener = listener.clone();
        (listener, shared)
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.events.iter().filter(|e| **e == event).count()
    }
}

impl LifecycleListener for RecordingListener {
    fn on_change_start(&mut self, _: &ControllerState, _: &dyn ChangeHandler, _: ChangeType) {
        self.events.push("change_start");
    }
    fn on_change_end(&mut self, _: &ControllerState, _: &dyn ChangeHandler, _: ChangeType) {
        self.events.push("change_end");
    }
    fn pre_create_view(&mut self, _: &ControllerState) {
        self.events.push("pre_create_view");
    }
    fn post_create_view(&mut self, _: &ControllerState, _: ViewId) {
        self.events.push("post_create_view");
    }
    fn pre_attach(&mut self, _: &ControllerState, _: ViewId) {
        self.events.push("pre_attach");
    }
    fn post_attach(&mut self, _: &ControllerState, _: ViewId) {
        self.events.push("post_attach");
    }
    fn pre_detach(&mut self, _: &ControllerState, _: ViewId) {
        self.events.push("pre_detach");
    }
    fn post_detach(&mut self, _: &ControllerState, _: ViewId) {
        self.events.push("post_detach");
    }
    fn pre_destroy_view(&mut self, _: &ControllerState, _: ViewId) {
        self.events.push("pre_destroy_view");
    }
    fn post_destroy_view(&mut self, _: &ControllerState) {
        self.events.push("post_destroy_view");
    }
    fn pre_destroy(&mut self, _: &ControllerState) {
        self.events.push("pre_destroy");
    }
    fn post_destroy(&mut self, _: &ControllerState) {
        self.events.push("post_destroy");
    }
    fn on_save_view_state(&mut self, _: &ControllerState, _: &mut Bundle) {
        self.events.push("save_view_state");
    }
    fn on_restore_view_state(&mut self, _: &ControllerState, _: &Bundle) {
        self.events.push("restore_view_state");
    }
}

/// One observed change: `(completed, to, from, is_push)`.
pub(crate) type ObservedChange = (bool, Option<ControllerId>, Option<ControllerId>, bool);

/// Change listener recording started and completed changes.
#[derive(Debug, Default)]
pub(crate) struct RecordingChangeListener {
    pub(crate) changes: Vec<ObservedChange>,
}

impl RecordingChangeListener {
    pub(crate) fn shared() -> (Rc<RefCell<Self>>, SharedChangeListener) {
        let listener = Rc::new(RefCell::new(Self::default()));
        let shared: SharedChangeListener = listener.clone();
        (listener, shared)
    }
}

impl ControllerChangeListener for RecordingChangeListener {
    fn on_change_started(&mut self, event: &ChangeEvent<'_>) {
        self.changes.push((false, event.to, event.from, event.is_push));
    }

    fn on_change_completed(&mut self, event: &ChangeEvent<'_>) {
        self.changes.push((true, event.to, event.from, event.is_push));
    }
}

/// An asynchronous handler: the incoming view is added right away, the outgoing one leaves
/// once the change completes after `frames` ticks.
///
/// Every copy logs into the same [`Log`]: `perform`, then exactly one of `completed`,
/// `complete_immediately` or `abort`.
#[derive(Clone, Debug)]
pub(crate) struct MockChangeHandler {
    pub(crate) removes_from_view_on_push: bool,
    pub(crate) frames: u32,
    pub(crate) log: Log,
}

impl Default for MockChangeHandler {
    fn default() -> Self {
        Self::new(true, Log::default())
    }
}

impl MockChangeHandler {
    pub(crate) fn new(removes_from_view_on_push: bool, log: Log) -> Self {
        Self {
            removes_from_view_on_push,
            frames: 1,
            log,
        }
    }

    fn finish(&self, cx: &mut ChangeContext<'_>) {
        if let Some(from) = cx.from() {
            if !cx.is_push() || self.removes_from_view_on_push {
                cx.remove_from_container(from);
            }
        }
    }
}

impl ChangeHandler for MockChangeHandler {
    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus {
        self.log.borrow_mut().push("perform".into());
        if let Some(to) = cx.to() {
            if cx.views().parent(to).is_none() {
                let container = cx.container();
                cx.views_mut().add_child(container, to);
            }
        }
        ChangeStatus::Pending
    }

    fn advance(&mut self, cx: &mut ChangeContext<'_>, _elapsed: Duration) -> ChangeStatus {
        self.frames = self.frames.saturating_sub(1);
        if self.frames > 0 {
            return ChangeStatus::Pending;
        }
        self.log.borrow_mut().push("completed".into());
        self.finish(cx);
        ChangeStatus::Completed
    }

    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        self.log.borrow_mut().push("complete_immediately".into());
        self.finish(cx);
    }

    fn on_abort_push(
        &mut self,
        cx: &mut ChangeContext<'_>,
        _new_handler: &dyn ChangeHandler,
        _new_top: Option<ControllerId>,
    ) {
        self.log.borrow_mut().push("abort".into());
        self.finish(cx);
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.clone())
    }
}
