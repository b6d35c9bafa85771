// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Controllers: screen units with a view lifecycle.
//!
//! A controller is split in two:
//!
//! - [`Controller`]: user code. Every lifecycle hook is an optional trait method; only
//!   [`Controller::on_create_view`] must be provided.
//! - [`ControllerState`]: bookkeeping owned by the [`LifecycleHandler`]: the view handle,
//!   attach flags, saved state, child routers, listeners.
//!
//! Hooks receive a [`ControllerContext`] that exposes the view tree and the owning handler,
//! so a hook may navigate (push, pop, create child routers) reentrantly.

use core::fmt;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use understory_view::{ViewId, ViewTree};

use crate::arena::{ControllerId, RouterId};
use crate::attach::ViewAttachHandler;
use crate::bundle::Bundle;
use crate::change::{ChangeHandler, ChangeType};
use crate::host::{HostRequest, Intent, Menu, MenuItem};
use crate::lifecycle_handler::LifecycleHandler;

mod handle;
mod lifecycle;
mod state;

pub use handle::ControllerMut;

/// What happens to a controller's view when it detaches.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RetainViewMode {
    /// Save view state and drop the view on every detach.
    #[default]
    ReleaseDetach,
    /// Keep the view across detaches; it is dropped when the controller is destroyed or
    /// its host goes away.
    RetainDetach,
}

impl RetainViewMode {
    pub(crate) fn ordinal(self) -> i64 {
        match self {
            Self::ReleaseDetach => 0,
            Self::RetainDetach => 1,
        }
    }

    pub(crate) fn from_ordinal(ordinal: i64) -> Self {
        if ordinal == 1 {
            Self::RetainDetach
        } else {
            Self::ReleaseDetach
        }
    }
}

bitflags::bitflags! {
    /// Controller lifecycle flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ControllerFlags: u16 {
        /// Destruction has started; the controller finishes destroying once its view is gone.
        const BEING_DESTROYED     = 1 << 0;
        /// Terminal.
        const DESTROYED           = 1 << 1;
        /// Logically attached (hooks have seen `on_attach`).
        const ATTACHED            = 1 << 2;
        /// The view itself is attached to a window.
        const VIEW_ATTACHED       = 1 << 3;
        /// A detach arrived while frozen and still has to be processed.
        const VIEW_WAS_DETACHED   = 1 << 4;
        /// View state was saved and not yet consumed by a fresh view.
        const HAS_SAVED_VIEW_STATE = 1 << 5;
        /// Detach signals are postponed.
        const DETACH_FROZEN       = 1 << 6;
        /// The controller must be re-attached when its router rebinds.
        const NEEDS_ATTACH        = 1 << 7;
        /// Contributes to the host options menu.
        const HAS_OPTIONS_MENU    = 1 << 8;
        /// Options menu contribution is hidden.
        const OPTIONS_MENU_HIDDEN = 1 << 9;
    }
}

/// User-supplied behaviour of a controller.
///
/// Classes that may be restored from saved state must be registered with the
/// [`ClassRegistry`](crate::ClassRegistry) under their [`class_name`](Controller::class_name).
pub trait Controller: Any {
    /// Registry key of this controller's class.
    fn class_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }

    /// Create the view. The returned view should be parentless; the change handler
    /// places it into `container`.
    fn on_create_view(&mut self, cx: &mut ControllerContext<'_>, container: ViewId) -> ViewId;

    /// Create the view with the saved view state (if any) at hand.
    fn on_create_view_with_state(
        &mut self,
        cx: &mut ControllerContext<'_>,
        container: ViewId,
        saved_view_state: Option<&Bundle>,
    ) -> ViewId {
        let _ = saved_view_state;
        self.on_create_view(cx, container)
    }

    /// The view is logically attached.
    fn on_attach(&mut self, cx: &mut ControllerContext<'_>, view: ViewId) {
        let _ = (cx, view);
    }

    /// The view is logically detached.
    fn on_detach(&mut self, cx: &mut ControllerContext<'_>, view: ViewId) {
        let _ = (cx, view);
    }

    /// The view is about to be released.
    fn on_destroy_view(&mut self, cx: &mut ControllerContext<'_>, view: ViewId) {
        let _ = (cx, view);
    }

    /// The controller is destroyed. Terminal.
    fn on_destroy(&mut self, cx: &mut ControllerContext<'_>) {
        let _ = cx;
    }

    /// A change involving this controller started.
    fn on_change_started(
        &mut self,
        cx: &mut ControllerContext<'_>,
        handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
        let _ = (cx, handler, change_type);
    }

    /// A change involving this controller ended.
    fn on_change_ended(
        &mut self,
        cx: &mut ControllerContext<'_>,
        handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
        let _ = (cx, handler, change_type);
    }

    /// The host activity started.
    fn on_activity_started(&mut self, cx: &mut ControllerContext<'_>) {
        let _ = cx;
    }

    /// The host activity resumed.
    fn on_activity_resumed(&mut self, cx: &mut ControllerContext<'_>) {
        let _ = cx;
    }

    /// The host activity paused.
    fn on_activity_paused(&mut self, cx: &mut ControllerContext<'_>) {
        let _ = cx;
    }

    /// The host activity stopped.
    fn on_activity_stopped(&mut self, cx: &mut ControllerContext<'_>) {
        let _ = cx;
    }

    /// Save state tied to the view before it is released.
    fn on_save_view_state(&mut self, cx: &mut ControllerContext<'_>, view: ViewId, out: &mut Bundle) {
        let _ = (cx, view, out);
    }

    /// Restore state saved by [`on_save_view_state`](Controller::on_save_view_state) onto a
    /// fresh view.
    fn on_restore_view_state(
        &mut self,
        cx: &mut ControllerContext<'_>,
        view: ViewId,
        saved: &Bundle,
    ) {
        let _ = (cx, view, saved);
    }

    /// Save instance state.
    fn on_save_instance_state(&mut self, cx: &mut ControllerContext<'_>, out: &mut Bundle) {
        let _ = (cx, out);
    }

    /// Restore instance state after the controller was recreated and given a router.
    fn on_restore_instance_state(&mut self, cx: &mut ControllerContext<'_>, saved: &Bundle) {
        let _ = (cx, saved);
    }

    /// Result of an activity started with
    /// [`ControllerMut::start_activity_for_result`].
    fn on_activity_result(
        &mut self,
        cx: &mut ControllerContext<'_>,
        request_code: i32,
        result_code: i32,
        data: Option<&Intent>,
    ) {
        let _ = (cx, request_code, result_code, data);
    }

    /// Result of [`ControllerMut::request_permissions`].
    fn on_request_permissions_result(
        &mut self,
        cx: &mut ControllerContext<'_>,
        request_code: i32,
        permissions: &[String],
        grants: &[bool],
    ) {
        let _ = (cx, request_code, permissions, grants);
    }

    /// Whether to show a rationale before requesting `permission`.
    fn should_show_request_permission_rationale(&self, permission: &str) -> Option<bool> {
        let _ = permission;
        None
    }

    /// Populate the host options menu.
    fn on_create_options_menu(&mut self, cx: &mut ControllerContext<'_>, menu: &mut dyn Menu) {
        let _ = (cx, menu);
    }

    /// Adjust the host options menu before it shows.
    fn on_prepare_options_menu(&mut self, cx: &mut ControllerContext<'_>, menu: &mut dyn Menu) {
        let _ = (cx, menu);
    }

    /// An options menu item was selected. Return `true` to consume it.
    fn on_options_item_selected(&mut self, cx: &mut ControllerContext<'_>, item: &MenuItem) -> bool {
        let _ = (cx, item);
        false
    }

    /// Back was pressed while this controller is on top. Return `true` to consume it.
    fn handle_back(&mut self, cx: &mut ControllerContext<'_>) -> bool {
        let _ = cx;
        false
    }
}

/// Access handed to [`Controller`] hooks.
pub struct ControllerContext<'a> {
    pub(crate) handler: &'a mut LifecycleHandler,
    pub(crate) id: ControllerId,
}

impl fmt::Debug for ControllerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerContext")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl ControllerContext<'_> {
    /// The controller being called.
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Bookkeeping of the controller being called.
    pub fn state(&self) -> Option<&ControllerState> {
        self.handler.controller_state(self.id)
    }

    /// Arguments the controller was created with.
    pub fn args(&self) -> Option<&Bundle> {
        self.state().and_then(ControllerState::args)
    }

    /// The view tree.
    pub fn views(&self) -> &ViewTree {
        &self.handler.views
    }

    /// The view tree, mutably.
    pub fn views_mut(&mut self) -> &mut ViewTree {
        &mut self.handler.views
    }

    /// Operations on the controller being called.
    pub fn controller(&mut self) -> ControllerMut<'_> {
        ControllerMut::new(self.handler, self.id)
    }

    /// The handler that owns this controller.
    pub fn handler(&mut self) -> &mut LifecycleHandler {
        self.handler
    }
}

/// Observer of a single controller's lifecycle.
///
/// Every `pre_*`/`post_*` pair straddles the corresponding [`Controller`] hook. Listeners are
/// called in registration order; no callback fires after `post_destroy`.
#[allow(unused_variables, reason = "Every callback is optional.")]
pub trait LifecycleListener {
    /// A change involving the controller started.
    fn on_change_start(
        &mut self,
        controller: &ControllerState,
        handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
    }
    /// A change involving the controller ended.
    fn on_change_end(
        &mut self,
        controller: &ControllerState,
        handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
    }
    /// Before the view is created.
    fn pre_create_view(&mut self, controller: &ControllerState) {}
    /// After the view is created.
    fn post_create_view(&mut self, controller: &ControllerState, view: ViewId) {}
    /// Before `on_attach`.
    fn pre_attach(&mut self, controller: &ControllerState, view: ViewId) {}
    /// After `on_attach`.
    fn post_attach(&mut self, controller: &ControllerState, view: ViewId) {}
    /// Before `on_detach`.
    fn pre_detach(&mut self, controller: &ControllerState, view: ViewId) {}
    /// After `on_detach`.
    fn post_detach(&mut self, controller: &ControllerState, view: ViewId) {}
    /// Before the view is released.
    fn pre_destroy_view(&mut self, controller: &ControllerState, view: ViewId) {}
    /// After the view is released.
    fn post_destroy_view(&mut self, controller: &ControllerState) {}
    /// Before `on_destroy`.
    fn pre_destroy(&mut self, controller: &ControllerState) {}
    /// After `on_destroy`. Last callback for this controller.
    fn post_destroy(&mut self, controller: &ControllerState) {}
    /// Instance state is being saved.
    fn on_save_instance_state(&mut self, controller: &ControllerState, out: &mut Bundle) {}
    /// Instance state was restored.
    fn on_restore_instance_state(&mut self, controller: &ControllerState, saved: &Bundle) {}
    /// View state is being saved.
    fn on_save_view_state(&mut self, controller: &ControllerState, out: &mut Bundle) {}
    /// View state was restored.
    fn on_restore_view_state(&mut self, controller: &ControllerState, saved: &Bundle) {}
}

/// Shared handle to a [`LifecycleListener`].
pub type SharedLifecycleListener = Rc<RefCell<dyn LifecycleListener>>;

/// Bookkeeping for one controller.
pub struct ControllerState {
    pub(crate) id: ControllerId,
    pub(crate) instance_id: String,
    pub(crate) class_name: String,
    pub(crate) args: Option<Bundle>,
    pub(crate) view: Option<ViewId>,
    pub(crate) view_state: Option<Bundle>,
    pub(crate) saved_instance_state: Option<Bundle>,
    pub(crate) retain_view_mode: RetainViewMode,
    pub(crate) flags: ControllerFlags,
    pub(crate) target_instance_id: Option<String>,
    pub(crate) requested_permissions: Vec<String>,
    pub(crate) overridden_push_handler: Option<Box<dyn ChangeHandler>>,
    pub(crate) overridden_pop_handler: Option<Box<dyn ChangeHandler>>,
    pub(crate) router: Option<RouterId>,
    pub(crate) parent: Option<ControllerId>,
    pub(crate) child_routers: Vec<RouterId>,
    pub(crate) lifecycle_listeners: Vec<SharedLifecycleListener>,
    pub(crate) child_backstack: Vec<ControllerId>,
    pub(crate) attach_handler: Option<ViewAttachHandler>,
    pub(crate) on_router_set: Vec<HostRequest>,
}

impl fmt::Debug for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerState")
            .field("id", &self.id)
            .field("instance_id", &self.instance_id)
            .field("class_name", &self.class_name)
            .field("view", &self.view)
            .field("flags", &self.flags)
            .field("router", &self.router)
            .field("child_routers", &self.child_routers)
            .finish_non_exhaustive()
    }
}

impl ControllerState {
    pub(crate) fn new(
        id: ControllerId,
        instance_id: String,
        class_name: String,
        args: Option<Bundle>,
    ) -> Self {
        Self {
            id,
            instance_id,
            class_name,
            args,
            view: None,
            view_state: None,
            saved_instance_state: None,
            retain_view_mode: RetainViewMode::default(),
            flags: ControllerFlags::empty(),
            target_instance_id: None,
            requested_permissions: Vec::new(),
            overridden_push_handler: None,
            overridden_pop_handler: None,
            router: None,
            parent: None,
            child_routers: Vec::new(),
            lifecycle_listeners: Vec::new(),
            child_backstack: Vec::new(),
            attach_handler: None,
            on_router_set: Vec::new(),
        }
    }

    /// Handle of this controller.
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Process-unique id, preserved across save and restore.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Registered class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Construction arguments.
    pub fn args(&self) -> Option<&Bundle> {
        self.args.as_ref()
    }

    /// The view, while materialised.
    pub fn view(&self) -> Option<ViewId> {
        self.view
    }

    /// Router whose backstack holds this controller.
    pub fn router(&self) -> Option<RouterId> {
        self.router
    }

    /// Controller hosting this controller's router.
    pub fn parent_controller(&self) -> Option<ControllerId> {
        self.parent
    }

    /// Routers hosted by this controller.
    pub fn child_routers(&self) -> &[RouterId] {
        &self.child_routers
    }

    /// All lifecycle flags.
    pub fn flags(&self) -> ControllerFlags {
        self.flags
    }

    /// Whether the controller is logically attached.
    pub fn is_attached(&self) -> bool {
        self.flags.contains(ControllerFlags::ATTACHED)
    }

    /// Whether destruction has started.
    pub fn is_being_destroyed(&self) -> bool {
        self.flags.contains(ControllerFlags::BEING_DESTROYED)
    }

    /// Whether the controller is destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.flags.contains(ControllerFlags::DESTROYED)
    }

    /// Whether the controller must be re-attached when its router rebinds.
    pub fn needs_attach(&self) -> bool {
        self.flags.contains(ControllerFlags::NEEDS_ATTACH)
    }

    /// Whether detach signals are currently postponed.
    pub fn is_detach_frozen(&self) -> bool {
        self.flags.contains(ControllerFlags::DETACH_FROZEN)
    }

    /// View state saved while no view is materialised.
    pub fn view_state(&self) -> Option<&Bundle> {
        self.view_state.as_ref()
    }

    /// View retention policy.
    pub fn retain_view_mode(&self) -> RetainViewMode {
        self.retain_view_mode
    }

    /// Instance id of the target controller.
    pub fn target_instance_id(&self) -> Option<&str> {
        self.target_instance_id.as_deref()
    }

    /// Permissions requested and not yet answered.
    pub fn requested_permissions(&self) -> &[String] {
        &self.requested_permissions
    }

    /// Whether the controller contributes to the options menu.
    pub fn has_options_menu(&self) -> bool {
        self.flags.contains(ControllerFlags::HAS_OPTIONS_MENU)
    }

    /// Whether the options menu contribution is hidden.
    pub fn is_options_menu_hidden(&self) -> bool {
        self.flags.contains(ControllerFlags::OPTIONS_MENU_HIDDEN)
    }

    /// Overriding push handler.
    pub fn overridden_push_handler(&self) -> Option<&dyn ChangeHandler> {
        self.overridden_push_handler.as_deref()
    }

    /// Overriding pop handler.
    pub fn overridden_pop_handler(&self) -> Option<&dyn ChangeHandler> {
        self.overridden_pop_handler.as_deref()
    }

    pub(crate) fn set(&mut self, flag: ControllerFlags, value: bool) {
        self.flags.set(flag, value);
    }

    pub(crate) fn has(&self, flag: ControllerFlags) -> bool {
        self.flags.contains(flag)
    }
}

pub(crate) struct ControllerEntry {
    pub(crate) state: ControllerState,
    pub(crate) hooks: Option<Box<dyn Controller>>,
}

impl fmt::Debug for ControllerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerEntry")
            .field("state", &self.state)
            .field("hooks_present", &self.hooks.is_some())
            .finish()
    }
}
