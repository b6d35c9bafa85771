// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The controller state machine: view creation, attach and detach, view release, destroy.

use tracing::{trace, warn};
use understory_view::ViewId;

use crate::arena::{ControllerId, RouterId};
use crate::attach::ViewAttachHandler;
use crate::bundle::Bundle;
use crate::change::{ChangeHandler, ChangeType};
use crate::controller::{ControllerFlags, ControllerState, LifecycleListener, RetainViewMode};
use crate::host::{HostRequest, Menu, MenuItem};
use crate::lifecycle_handler::LifecycleHandler;
use crate::router::RouterHost;

const KEY_VIEW_STATE_HIERARCHY: &str = "viewState.hierarchy";
const KEY_VIEW_STATE_BUNDLE: &str = "viewState.bundle";

impl LifecycleHandler {
    /// Call every lifecycle listener of `id` in registration order.
    pub(crate) fn notify(
        &self,
        id: ControllerId,
        mut f: impl FnMut(&mut dyn LifecycleListener, &ControllerState),
    ) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        let listeners = state.lifecycle_listeners.clone();
        for listener in &listeners {
            f(&mut *listener.borrow_mut(), state);
        }
    }

    fn child_routers_of(&self, id: ControllerId) -> Vec<RouterId> {
        self.controller_state(id)
            .map(|s| s.child_routers.clone())
            .unwrap_or_default()
    }

    fn set_flag(&mut self, id: ControllerId, flag: ControllerFlags, value: bool) {
        if let Some(entry) = self.controllers.get_mut(id) {
            entry.state.set(flag, value);
        }
    }

    fn menu_visible(&self, id: ControllerId) -> bool {
        self.controller_state(id).is_some_and(|s| {
            s.is_attached() && s.has_options_menu() && !s.is_options_menu_hidden()
        })
    }

    /// Materialise the view of `id` for `container`, reusing a retained view that already
    /// lives there.
    pub(crate) fn inflate(&mut self, id: ControllerId, container: ViewId) -> Option<ViewId> {
        let existing = self.controller_state(id)?.view();
        if let Some(view) = existing {
            if self.views.parent(view).is_some_and(|p| p != container) {
                trace!(?id, "re-parenting view");
                self.detach(id, true);
                self.remove_view_reference(id);
            }
        }
        if let Some(view) = self.controller_state(id)?.view() {
            return Some(view);
        }

        self.notify(id, |l, s| l.pre_create_view(s));
        let saved = self
            .controller_state(id)?
            .view_state
            .as_ref()
            .and_then(|b| b.get_bundle(KEY_VIEW_STATE_BUNDLE))
            .cloned();
        let view = self.with_hooks(id, |hooks, cx| {
            hooks.on_create_view_with_state(cx, container, saved.as_ref())
        })?;
        let entry = self.controllers.get_mut(id)?;
        entry.state.view = Some(view);
        self.notify(id, |l, s| l.post_create_view(s, view));

        self.restore_view_state(id, view);
        self.restore_child_router_hosts(id, view);
        if let Some(entry) = self.controllers.get_mut(id) {
            entry.state.attach_handler = Some(ViewAttachHandler::listen_for_attach(view));
        }
        Some(view)
    }

    /// Hand a fresh view its saved state. The saved bag is consumed.
    fn restore_view_state(&mut self, id: ControllerId, view: ViewId) {
        let Some(view_state) = self
            .controllers
            .get_mut(id)
            .and_then(|e| e.state.view_state.take())
        else {
            return;
        };
        if let Some(hierarchy) = view_state.get_sparse(KEY_VIEW_STATE_HIERARCHY) {
            self.views.restore_hierarchy_state(view, hierarchy);
        }
        let user = view_state
            .get_bundle(KEY_VIEW_STATE_BUNDLE)
            .cloned()
            .unwrap_or_default();
        self.with_hooks(id, |hooks, cx| hooks.on_restore_view_state(cx, view, &user));
        self.notify(id, |l, s| l.on_restore_view_state(s, &view_state));
    }

    /// Rebind child routers that lost their host when the previous view was released.
    fn restore_child_router_hosts(&mut self, id: ControllerId, view: ViewId) {
        for router in self.child_routers_of(id) {
            let Some(host_id) = self
                .routers
                .get(router)
                .filter(|r| !r.has_host())
                .and_then(|r| r.host_id())
            else {
                continue;
            };
            let Some(container) = self
                .views
                .find_by_element_id(view, host_id)
                .filter(|&c| self.views.is_group(c))
            else {
                continue;
            };
            self.set_router_host(router, id, container);
            self.rebind_if_needed(router);
        }
    }

    /// Build the view-state bag of `view` without storing it.
    pub(crate) fn capture_view_state(&mut self, id: ControllerId, view: ViewId) -> Bundle {
        let hierarchy = self.views.save_hierarchy_state(view);
        let mut user = Bundle::new();
        self.with_hooks(id, |hooks, cx| hooks.on_save_view_state(cx, view, &mut user));
        let mut bag = Bundle::new();
        bag.put_sparse(KEY_VIEW_STATE_HIERARCHY, hierarchy)
            .put_bundle(KEY_VIEW_STATE_BUNDLE, user);
        self.notify(id, |l, s| l.on_save_view_state(s, &mut bag));
        bag
    }

    fn save_view_state(&mut self, id: ControllerId, view: ViewId) {
        let bag = self.capture_view_state(id, view);
        if let Some(entry) = self.controllers.get_mut(id) {
            entry.state.view_state = Some(bag);
            entry.state.set(ControllerFlags::HAS_SAVED_VIEW_STATE, true);
        }
    }

    pub(crate) fn on_view_attached(&mut self, id: ControllerId) {
        let Some(entry) = self.controllers.get_mut(id) else {
            return;
        };
        entry.state.set(ControllerFlags::VIEW_ATTACHED, true);
        entry.state.set(ControllerFlags::VIEW_WAS_DETACHED, false);
        self.attach(id);
    }

    pub(crate) fn on_view_detached(&mut self, id: ControllerId) {
        let Some(entry) = self.controllers.get_mut(id) else {
            return;
        };
        entry.state.set(ControllerFlags::VIEW_ATTACHED, false);
        entry.state.set(ControllerFlags::VIEW_WAS_DETACHED, true);
        if !entry.state.is_detach_frozen() {
            self.detach(id, false);
        }
    }

    fn attach(&mut self, id: ControllerId) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        let Some(view) = state.view() else {
            return;
        };
        if state.is_attached() || state.is_destroyed() {
            return;
        }
        self.set_flag(id, ControllerFlags::HAS_SAVED_VIEW_STATE, false);
        self.notify(id, |l, s| l.pre_attach(s, view));
        if let Some(entry) = self.controllers.get_mut(id) {
            entry.state.set(ControllerFlags::ATTACHED, true);
            entry.state.set(ControllerFlags::NEEDS_ATTACH, false);
        }
        trace!(?id, "attach");
        self.with_hooks(id, |hooks, cx| hooks.on_attach(cx, view));
        if self.controller_state(id).is_some_and(|s| s.has_options_menu() && !s.is_options_menu_hidden()) {
            self.invalidate_options_menu();
        }
        self.notify(id, |l, s| l.post_attach(s, view));
    }

    /// Logical detach; releases the view when forced, when the retain mode says so, or
    /// while being destroyed.
    pub(crate) fn detach(&mut self, id: ControllerId, force: bool) {
        for router in self.child_routers_of(id) {
            self.prepare_router_for_host_detach(router);
        }
        let Some(state) = self.controller_state(id) else {
            return;
        };
        let remove_view_ref = force
            || state.retain_view_mode() == RetainViewMode::ReleaseDetach
            || state.is_being_destroyed();
        if let (true, Some(view)) = (state.is_attached(), state.view()) {
            self.notify(id, |l, s| l.pre_detach(s, view));
            self.set_flag(id, ControllerFlags::ATTACHED, false);
            trace!(?id, "detach");
            self.with_hooks(id, |hooks, cx| hooks.on_detach(cx, view));
            if self.controller_state(id).is_some_and(|s| s.has_options_menu() && !s.is_options_menu_hidden()) {
                self.invalidate_options_menu();
            }
            self.notify(id, |l, s| l.post_detach(s, view));
        }
        if remove_view_ref {
            self.remove_view_reference(id);
        }
    }

    /// Release the view, saving its state unless the controller is going away, and finish
    /// destroying if that was pending.
    pub(crate) fn remove_view_reference(&mut self, id: ControllerId) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        if let Some(view) = state.view() {
            if !state.is_being_destroyed() && !state.has(ControllerFlags::HAS_SAVED_VIEW_STATE) {
                self.save_view_state(id, view);
            }
            self.notify(id, |l, s| l.pre_destroy_view(s, view));
            self.with_hooks(id, |hooks, cx| hooks.on_destroy_view(cx, view));
            if let Some(entry) = self.controllers.get_mut(id) {
                if let Some(attach) = entry.state.attach_handler.as_mut() {
                    attach.unregister();
                }
                entry.state.attach_handler = None;
                entry.state.set(ControllerFlags::VIEW_ATTACHED, false);
                entry.state.view = None;
            }
            trace!(?id, "view released");
            self.notify(id, |l, s| l.post_destroy_view(s));
            for router in self.child_routers_of(id) {
                self.remove_router_host(router);
            }
            self.views.remove(view);
        }
        if self.controller_state(id).is_some_and(ControllerState::is_being_destroyed) {
            self.perform_destroy(id);
        }
    }

    /// Start destroying `id`. It finishes once its view is gone.
    pub(crate) fn destroy_controller(&mut self, id: ControllerId, remove_views: bool) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        if state.is_destroyed() {
            return;
        }
        self.set_flag(id, ControllerFlags::BEING_DESTROYED, true);
        for router in self.child_routers_of(id) {
            self.destroy_router(router, false);
        }
        let attached = self.controller_state(id).is_some_and(ControllerState::is_attached);
        if !attached {
            self.remove_view_reference(id);
        } else if remove_views {
            self.detach(id, false);
        }
    }

    fn perform_destroy(&mut self, id: ControllerId) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        if state.is_destroyed() {
            return;
        }
        let instance_id = state.instance_id().to_owned();
        self.notify(id, |l, s| l.pre_destroy(s));
        self.set_flag(id, ControllerFlags::DESTROYED, true);
        self.activity_requests.retain(|_, owner| *owner != instance_id);
        self.with_hooks(id, |hooks, cx| hooks.on_destroy(cx));

        let (parent, router) = match self.controllers.get_mut(id) {
            Some(entry) => (entry.state.parent.take(), entry.state.router),
            None => (None, None),
        };
        if let Some(parent) = parent.and_then(|p| self.controllers.get_mut(p)) {
            parent.state.child_backstack.retain(|c| *c != id);
        }
        trace!(?id, "destroyed");
        self.notify(id, |l, s| l.post_destroy(s));
        if let Some(entry) = self.controllers.get_mut(id) {
            entry.state.lifecycle_listeners.clear();
        }
        if let Some(r) = router.and_then(|r| self.routers.get_mut(r)) {
            r.destroying.retain(|c| *c != id);
        }
    }

    pub(crate) fn change_started(
        &mut self,
        id: ControllerId,
        handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
        if !change_type.is_enter() {
            for router in self.child_routers_of(id) {
                self.router_set_detach_frozen(router, true);
            }
        }
        self.with_hooks(id, |hooks, cx| hooks.on_change_started(cx, handler, change_type));
        self.notify(id, |l, s| l.on_change_start(s, handler, change_type));
    }

    pub(crate) fn change_ended(
        &mut self,
        id: ControllerId,
        handler: &dyn ChangeHandler,
        change_type: ChangeType,
    ) {
        if !change_type.is_enter() {
            for router in self.child_routers_of(id) {
                self.router_set_detach_frozen(router, false);
            }
        }
        self.with_hooks(id, |hooks, cx| hooks.on_change_ended(cx, handler, change_type));
        self.notify(id, |l, s| l.on_change_end(s, handler, change_type));
    }

    /// Postpone detach signals; unfreezing processes a detach that arrived meanwhile.
    pub(crate) fn set_detach_frozen(&mut self, id: ControllerId, frozen: bool) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        if state.is_detach_frozen() == frozen {
            return;
        }
        self.set_flag(id, ControllerFlags::DETACH_FROZEN, frozen);
        for router in self.child_routers_of(id) {
            self.router_set_detach_frozen(router, frozen);
        }
        let was_detached = self
            .controller_state(id)
            .is_some_and(|s| s.view().is_some() && s.has(ControllerFlags::VIEW_WAS_DETACHED));
        if !frozen && was_detached {
            self.set_flag(id, ControllerFlags::VIEW_WAS_DETACHED, false);
            self.detach(id, false);
        }
    }

    pub(crate) fn prepare_controller_for_host_detach(&mut self, id: ControllerId) {
        let Some(entry) = self.controllers.get_mut(id) else {
            return;
        };
        let attached = entry.state.is_attached();
        if attached {
            entry.state.set(ControllerFlags::NEEDS_ATTACH, true);
        }
        for router in self.child_routers_of(id) {
            self.prepare_router_for_host_detach(router);
        }
    }

    /// Offer back to attached children (most recently pushed first), then to the hook.
    pub(crate) fn controller_handle_back(&mut self, id: ControllerId) -> bool {
        let children = self
            .controller_state(id)
            .map(|s| s.child_backstack.clone())
            .unwrap_or_default();
        for child in children.into_iter().rev() {
            let Some(router) = self
                .controller_state(child)
                .filter(|s| s.is_attached())
                .and_then(ControllerState::router)
            else {
                continue;
            };
            if self.router_handle_back(router) {
                return true;
            }
        }
        self.with_hooks(id, |hooks, cx| hooks.handle_back(cx))
            .unwrap_or(false)
    }

    pub(crate) fn controller_activity_started(&mut self, id: ControllerId) {
        self.with_hooks(id, |hooks, cx| hooks.on_activity_started(cx));
    }

    pub(crate) fn controller_activity_resumed(&mut self, id: ControllerId) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        if !state.is_attached() && state.view().is_some() && state.has(ControllerFlags::VIEW_ATTACHED) {
            self.attach(id);
        } else if state.is_attached() {
            self.set_flag(id, ControllerFlags::NEEDS_ATTACH, false);
        }
        self.with_hooks(id, |hooks, cx| hooks.on_activity_resumed(cx));
    }

    pub(crate) fn controller_activity_paused(&mut self, id: ControllerId) {
        self.with_hooks(id, |hooks, cx| hooks.on_activity_paused(cx));
    }

    pub(crate) fn controller_activity_stopped(&mut self, id: ControllerId) {
        self.with_hooks(id, |hooks, cx| hooks.on_activity_stopped(cx));
    }

    /// Configuration changes only release views; anything else destroys.
    pub(crate) fn controller_activity_destroyed(&mut self, id: ControllerId, changing: bool) {
        if changing {
            if self.controller_state(id).is_some_and(|s| s.view().is_some()) {
                self.detach(id, true);
            }
        } else {
            self.destroy_controller(id, true);
        }
    }

    pub(crate) fn controller_create_options_menu(&mut self, id: ControllerId, menu: &mut dyn Menu) {
        if self.menu_visible(id) {
            self.with_hooks(id, |hooks, cx| hooks.on_create_options_menu(cx, menu));
        }
    }

    pub(crate) fn controller_prepare_options_menu(&mut self, id: ControllerId, menu: &mut dyn Menu) {
        if self.menu_visible(id) {
            self.with_hooks(id, |hooks, cx| hooks.on_prepare_options_menu(cx, menu));
        }
    }

    pub(crate) fn controller_options_item_selected(&mut self, id: ControllerId, item: &MenuItem) -> bool {
        self.menu_visible(id)
            && self
                .with_hooks(id, |hooks, cx| hooks.on_options_item_selected(cx, item))
                .unwrap_or(false)
    }

    /// Record that `router` now holds `id`, restoring pending instance state and replaying
    /// host requests issued before.
    pub(crate) fn set_controller_router(&mut self, id: ControllerId, router: RouterId) {
        let host = match self.routers.get(router).map(|r| &r.host) {
            Some(RouterHost::Controller { host, .. }) => *host,
            _ => None,
        };
        let Some(entry) = self.controllers.get_mut(id) else {
            return;
        };
        let changed = entry.state.router != Some(router);
        entry.state.router = Some(router);
        if host.is_some() {
            entry.state.parent = host;
        }
        self.perform_on_restore_instance_state(id);
        if changed {
            let requests = self
                .controllers
                .get_mut(id)
                .map(|e| core::mem::take(&mut e.state.on_router_set))
                .unwrap_or_default();
            for request in requests {
                self.route_host_request(id, request);
            }
        }
    }

    fn perform_on_restore_instance_state(&mut self, id: ControllerId) {
        let Some(entry) = self.controllers.get_mut(id) else {
            return;
        };
        if entry.state.router.is_none() {
            return;
        }
        let Some(saved) = entry.state.saved_instance_state.take() else {
            return;
        };
        self.with_hooks(id, |hooks, cx| hooks.on_restore_instance_state(cx, &saved));
        self.notify(id, |l, s| l.on_restore_instance_state(s, &saved));
    }

    /// Perform `request` once `id` sits in a router tree with a host activity.
    pub(crate) fn route_host_request(&mut self, id: ControllerId, request: HostRequest) {
        let Some(state) = self.controller_state(id) else {
            return;
        };
        let Some(router) = state.router() else {
            if let Some(entry) = self.controllers.get_mut(id) {
                entry.state.on_router_set.push(request);
            }
            return;
        };
        if self.root_router(router).is_some() {
            self.perform_host_request(id, request);
        } else {
            warn!(?id, ?request, "host request dropped: router tree has no host");
        }
    }
}
