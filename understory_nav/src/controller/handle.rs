// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::rc::Rc;

use understory_view::ViewId;

use crate::arena::{ControllerId, RouterId};
use crate::bundle::Bundle;
use crate::change::ChangeHandler;
use crate::controller::{ControllerFlags, ControllerState, RetainViewMode, SharedLifecycleListener};
use crate::error::NavError;
use crate::host::{HostRequest, Intent};
use crate::lifecycle_handler::LifecycleHandler;

/// Mutable access to one controller.
///
/// Obtained from [`LifecycleHandler::controller`] or, inside a hook, from
/// [`ControllerContext::controller`](crate::ControllerContext::controller). Operations on
/// a controller that has been dropped do nothing or fail with [`NavError::StaleController`].
pub struct ControllerMut<'a> {
    handler: &'a mut LifecycleHandler,
    id: ControllerId,
}

impl core::fmt::Debug for ControllerMut<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerMut")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<'a> ControllerMut<'a> {
    pub(crate) fn new(handler: &'a mut LifecycleHandler, id: ControllerId) -> Self {
        Self { handler, id }
    }

    /// The controller being operated on.
    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Its bookkeeping.
    pub fn state(&self) -> Option<&ControllerState> {
        self.handler.controller_state(self.id)
    }

    /// Router whose backstack holds it.
    pub fn router(&self) -> Option<RouterId> {
        self.state().and_then(ControllerState::router)
    }

    /// Its construction arguments.
    pub fn args(&self) -> Option<&Bundle> {
        self.state().and_then(ControllerState::args)
    }

    /// Its instance id.
    pub fn instance_id(&self) -> Option<&str> {
        self.state().map(ControllerState::instance_id)
    }

    /// The controller hosting its router.
    pub fn parent_controller(&self) -> Option<ControllerId> {
        self.state().and_then(ControllerState::parent_controller)
    }

    /// Child router living in `container` (a group inside this controller's view), created
    /// on first use and rebound if its previous container went away.
    pub fn child_router(&mut self, container: ViewId, tag: Option<&str>) -> Result<RouterId, NavError> {
        let router = self
            .handler
            .child_router(self.id, container, tag, true)?
            .ok_or(NavError::StaleRouter);
        self.handler.settle();
        router
    }

    /// Like [`ControllerMut::child_router`] but never creates one.
    pub fn existing_child_router(
        &mut self,
        container: ViewId,
        tag: Option<&str>,
    ) -> Result<Option<RouterId>, NavError> {
        let router = self.handler.child_router(self.id, container, tag, false);
        self.handler.settle();
        router
    }

    /// Destroy `router` along with its views.
    pub fn remove_child_router(&mut self, router: RouterId) {
        self.handler.remove_child_router(self.id, router);
        self.handler.settle();
    }

    /// Remember `target` (usually the controller that should receive a result).
    ///
    /// The target can be set once; a second call fails with
    /// [`NavError::InvalidModification`].
    pub fn set_target_controller(&mut self, target: Option<ControllerId>) -> Result<(), NavError> {
        let target_instance_id = match target {
            Some(target) => Some(
                self.handler
                    .controller_state(target)
                    .ok_or(NavError::StaleController)?
                    .instance_id()
                    .to_owned(),
            ),
            None => None,
        };
        let entry = self
            .handler
            .controllers
            .get_mut(self.id)
            .ok_or(NavError::StaleController)?;
        if entry.state.target_instance_id.is_some() {
            return Err(NavError::InvalidModification(
                "a controller's target may only be set once",
            ));
        }
        entry.state.target_instance_id = target_instance_id;
        Ok(())
    }

    /// Resolve the target through the root of this controller's router tree.
    pub fn target_controller(&self) -> Option<ControllerId> {
        let state = self.state()?;
        let target = state.target_instance_id()?;
        let root = self.handler.root_router(state.router()?)?;
        self.handler.find_controller_in_router(root, target)
    }

    /// Change the view retention policy; switching to release while detached drops the
    /// view right away.
    pub fn set_retain_view_mode(&mut self, mode: RetainViewMode) {
        let Some(entry) = self.handler.controllers.get_mut(self.id) else {
            return;
        };
        entry.state.retain_view_mode = mode;
        if mode == RetainViewMode::ReleaseDetach && !entry.state.is_attached() {
            self.handler.remove_view_reference(self.id);
        }
        self.handler.settle();
    }

    /// Use `handler` instead of the transaction's push handler.
    pub fn override_push_handler(&mut self, handler: Option<Box<dyn ChangeHandler>>) {
        if let Some(entry) = self.handler.controllers.get_mut(self.id) {
            entry.state.overridden_push_handler = handler;
        }
    }

    /// Use `handler` instead of the transaction's pop handler.
    pub fn override_pop_handler(&mut self, handler: Option<Box<dyn ChangeHandler>>) {
        if let Some(entry) = self.handler.controllers.get_mut(self.id) {
            entry.state.overridden_pop_handler = handler;
        }
    }

    /// Opt in to the host options menu.
    pub fn set_has_options_menu(&mut self, has_menu: bool) {
        self.set_menu_flag(ControllerFlags::HAS_OPTIONS_MENU, has_menu);
    }

    /// Hide this controller's menu items while keeping it attached.
    pub fn set_options_menu_hidden(&mut self, hidden: bool) {
        self.set_menu_flag(ControllerFlags::OPTIONS_MENU_HIDDEN, hidden);
    }

    fn set_menu_flag(&mut self, flag: ControllerFlags, value: bool) {
        let Some(entry) = self.handler.controllers.get_mut(self.id) else {
            return;
        };
        let before = entry.state.has(flag);
        entry.state.set(flag, value);
        let state = &entry.state;
        let invalidate = before != value
            && state.is_attached()
            && (state.has_options_menu() || flag == ControllerFlags::HAS_OPTIONS_MENU)
            && (!state.is_options_menu_hidden() || flag == ControllerFlags::OPTIONS_MENU_HIDDEN);
        if invalidate {
            self.handler.invalidate_options_menu();
        }
    }

    /// Ask the host for `permissions`; the result comes back through
    /// [`Controller::on_request_permissions_result`](crate::Controller::on_request_permissions_result).
    pub fn request_permissions(&mut self, permissions: Vec<String>, request_code: i32) {
        let Some(entry) = self.handler.controllers.get_mut(self.id) else {
            return;
        };
        for permission in &permissions {
            if !entry.state.requested_permissions.contains(permission) {
                entry.state.requested_permissions.push(permission.clone());
            }
        }
        self.handler.route_host_request(
            self.id,
            HostRequest::RequestPermissions {
                permissions,
                request_code,
            },
        );
    }

    /// Whether to show a rationale for `permission`: the controller's answer if it has
    /// one, the host's otherwise.
    pub fn should_show_request_permission_rationale(&self, permission: &str) -> bool {
        self.handler
            .controllers
            .get(self.id)
            .and_then(|e| e.hooks.as_ref())
            .and_then(|h| h.should_show_request_permission_rationale(permission))
            .unwrap_or_else(|| self.handler.activity_permission_rationale(permission))
    }

    /// Start an activity from the host.
    pub fn start_activity(&mut self, intent: Intent) {
        self.handler
            .route_host_request(self.id, HostRequest::StartActivity(intent));
    }

    /// Start an activity whose result is routed back to this controller.
    pub fn start_activity_for_result(&mut self, intent: Intent, request_code: i32, options: Option<Bundle>) {
        self.handler.route_host_request(
            self.id,
            HostRequest::StartActivityForResult {
                intent,
                request_code,
                options,
            },
        );
    }

    /// Route results for `request_code` to this controller.
    pub fn register_for_activity_result(&mut self, request_code: i32) {
        self.handler.route_host_request(
            self.id,
            HostRequest::RegisterForActivityResult(request_code),
        );
    }

    /// Offer back to attached children, then to the controller itself.
    pub fn handle_back(&mut self) -> bool {
        let handled = self.handler.controller_handle_back(self.id);
        self.handler.settle();
        handled
    }

    /// Observe this controller's lifecycle. Adding a listener twice has no effect.
    pub fn add_lifecycle_listener(&mut self, listener: SharedLifecycleListener) {
        if let Some(entry) = self.handler.controllers.get_mut(self.id) {
            let listeners = &mut entry.state.lifecycle_listeners;
            if !listeners.iter().any(|l| same_listener(l, &listener)) {
                listeners.push(listener);
            }
        }
    }

    /// Stop observing.
    pub fn remove_lifecycle_listener(&mut self, listener: &SharedLifecycleListener) {
        if let Some(entry) = self.handler.controllers.get_mut(self.id) {
            entry
                .state
                .lifecycle_listeners
                .retain(|l| !same_listener(l, listener));
        }
    }
}

fn same_listener(a: &SharedLifecycleListener, b: &SharedLifecycleListener) -> bool {
    core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
