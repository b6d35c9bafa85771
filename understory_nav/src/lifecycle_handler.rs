// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-host bridge between an activity and its router tree.
//!
//! ## Overview
//!
//! A [`LifecycleHandler`] owns everything that belongs to one host activity:
//!
//! - the [`ViewTree`] holding every container and controller view,
//! - every controller and router, addressed by [`ControllerId`] / [`RouterId`],
//! - the activity itself, request-code maps for activity results and permissions,
//! - changes that are still animating.
//!
//! The host forwards its lifecycle (`on_activity_*`), results, menu calls and frame ticks
//! ([`LifecycleHandler::advance`]) here; the handler fans them out to its routers.
//!
//! ## Settling
//!
//! Every public operation ends by delivering queued view attach signals and by dropping
//! destroyed controllers that nothing references any more. Ids of dropped controllers
//! are stale: lookups return `None`.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use understory_view::{ViewId, ViewTree};

use crate::arena::{Arena, ControllerId, RouterId};
use crate::attach::AttachSignal;
use crate::bundle::Bundle;
use crate::change::{ChangeContext, ChangeStatus};
use crate::controller::{
    Controller, ControllerContext, ControllerEntry, ControllerMut, ControllerState,
};
use crate::error::NavError;
use crate::host::{Activity, HostRequest, Intent, Menu, MenuItem};
use crate::registry::ClassRegistry;
use crate::router::{Router, RouterHost, RouterMut};
use crate::router::change::PendingChange;

const KEY_PERMISSION_REQUESTS: &str = "permissionRequests";
const KEY_ACTIVITY_REQUESTS: &str = "activityRequests";
const KEY_ROUTER_STATE_PREFIX: &str = "routerState";

/// Everything one host activity owns; see the [module docs](self).
pub struct LifecycleHandler {
    pub(crate) views: ViewTree,
    pub(crate) controllers: Arena<ControllerId, ControllerEntry>,
    pub(crate) routers: Arena<RouterId, Router>,
    pub(crate) registry: Rc<ClassRegistry>,
    pub(crate) activity: Option<Box<dyn Activity>>,
    pub(crate) pending: Vec<PendingChange>,
    pub(crate) next_change_key: u64,
    router_map: BTreeMap<u32, RouterId>,
    pub(crate) permission_requests: BTreeMap<i32, String>,
    pub(crate) activity_requests: BTreeMap<i32, String>,
    hooks_out: u32,
    destroyed: bool,
}

impl core::fmt::Debug for LifecycleHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LifecycleHandler")
            .field("routers", &self.router_map)
            .field("pending_changes", &self.pending.len())
            .field("activity", &self.activity)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl LifecycleHandler {
    /// A handler for `activity` resolving restored classes through `registry`.
    pub fn new(activity: Box<dyn Activity>, registry: Rc<ClassRegistry>) -> Self {
        Self {
            views: ViewTree::new(),
            controllers: Arena::default(),
            routers: Arena::default(),
            registry,
            activity: Some(activity),
            pending: Vec::new(),
            next_change_key: 0,
            router_map: BTreeMap::new(),
            permission_requests: BTreeMap::new(),
            activity_requests: BTreeMap::new(),
            hooks_out: 0,
            destroyed: false,
        }
    }

    /// Restore the request-code maps saved by [`LifecycleHandler::on_save_instance_state`].
    ///
    /// Router state is restored per container by [`LifecycleHandler::attach_router`].
    pub fn on_create(&mut self, saved: Option<&Bundle>) {
        let Some(saved) = saved else {
            return;
        };
        if let Some(requests) = saved.get_string_sparse(KEY_PERMISSION_REQUESTS) {
            self.permission_requests = requests.clone();
        }
        if let Some(requests) = saved.get_string_sparse(KEY_ACTIVITY_REQUESTS) {
            self.activity_requests = requests.clone();
        }
    }

    /// Swap in the activity instance created after a configuration change.
    pub fn set_activity(&mut self, activity: Box<dyn Activity>) {
        self.activity = Some(activity);
    }

    /// The host activity, until it is destroyed.
    pub fn activity(&self) -> Option<&dyn Activity> {
        self.activity.as_deref()
    }

    /// The class registry used for restoring state.
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Whether the activity was destroyed for good.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// The view tree.
    pub fn views(&self) -> &ViewTree {
        &self.views
    }

    /// The view tree, mutably. Call [`LifecycleHandler::dispatch_attach_events`] after
    /// structural edits that attach or detach controller views.
    pub fn views_mut(&mut self) -> &mut ViewTree {
        &mut self.views
    }

    /// Attach a window root and deliver the resulting attach signals.
    pub fn attach_window(&mut self, root: ViewId) {
        self.views.attach_to_window(root);
        self.settle();
    }

    /// Detach a window root and deliver the resulting detach signals.
    pub fn detach_window(&mut self, root: ViewId) {
        self.views.detach_from_window(root);
        self.settle();
    }

    /// Deliver queued view attach signals to controllers.
    pub fn dispatch_attach_events(&mut self) {
        self.settle();
    }

    /// Take ownership of a new controller.
    ///
    /// Fails with [`NavError::MissingConstructor`] if its class is not registered, since it
    /// could not be restored from saved state.
    pub fn create_controller(&mut self, controller: impl Controller) -> Result<ControllerId, NavError> {
        self.insert_controller(Box::new(controller), None)
    }

    /// Take ownership of a new controller created with `args`.
    pub fn create_controller_with_args(
        &mut self,
        controller: impl Controller,
        args: Bundle,
    ) -> Result<ControllerId, NavError> {
        self.insert_controller(Box::new(controller), Some(args))
    }

    fn insert_controller(
        &mut self,
        hooks: Box<dyn Controller>,
        args: Option<Bundle>,
    ) -> Result<ControllerId, NavError> {
        let class = self.registry.controller_class(hooks.as_ref()).to_owned();
        if !self.registry.has_controller(&class) {
            return Err(NavError::MissingConstructor { class });
        }
        let instance_id = uuid::Uuid::new_v4().to_string();
        let id = self.controllers.insert_with(|id| ControllerEntry {
            state: ControllerState::new(id, instance_id, class.clone(), args),
            hooks: Some(hooks),
        });
        trace!(?id, %class, "controller created");
        Ok(id)
    }

    /// Get or create the activity-hosted router for `container`, restoring it from `saved`
    /// (the bag produced by [`LifecycleHandler::on_save_instance_state`]) on first use, and
    /// rebind controllers that were attached when the state was saved.
    pub fn attach_router(
        &mut self,
        container: ViewId,
        saved: Option<&Bundle>,
    ) -> Result<RouterId, NavError> {
        let key = self
            .views
            .element_id(container)
            .ok_or(NavError::MissingElementId)?;
        let id = match self.router_map.get(&key) {
            Some(&id) => {
                if let Some(router) = self.routers.get_mut(id) {
                    router.container = Some(container);
                    router.host = RouterHost::Activity { attached: true };
                }
                id
            }
            None => {
                let controllers_before = self.controllers.keys();
                let routers_before = self.routers.keys();
                let id = self
                    .routers
                    .insert_with(|id| Router::new(id, RouterHost::Activity { attached: true }, None));
                if let Some(router) = self.routers.get_mut(id) {
                    router.container = Some(container);
                }
                let state = saved.and_then(|s| s.get_bundle(&router_state_key(key)));
                if let Some(state) = state {
                    if let Err(err) = self.restore_router_state(id, state) {
                        self.discard_created_since(&controllers_before, &routers_before);
                        warn!(container_id = key, %err, "router state could not be restored");
                        return Err(err);
                    }
                }
                self.router_map.insert(key, id);
                debug!(?id, container_id = key, restored = state.is_some(), "router attached");
                id
            }
        };
        self.rebind_if_needed(id);
        self.settle();
        Ok(id)
    }

    /// Activity-hosted routers, ordered by container element id.
    pub fn routers(&self) -> Vec<RouterId> {
        self.router_map.values().copied().collect()
    }

    /// Navigation on `id`.
    pub fn router(&mut self, id: RouterId) -> RouterMut<'_> {
        RouterMut::new(self, id)
    }

    /// Read access to a router.
    pub fn router_ref(&self, id: RouterId) -> Option<&Router> {
        self.routers.get(id)
    }

    /// Operations on controller `id`.
    pub fn controller(&mut self, id: ControllerId) -> ControllerMut<'_> {
        ControllerMut::new(self, id)
    }

    /// Bookkeeping of controller `id`; `None` once it has been destroyed and dropped.
    pub fn controller_state(&self, id: ControllerId) -> Option<&ControllerState> {
        self.controllers.get(id).map(|e| &e.state)
    }

    /// The user half of controller `id`, if it is a `T` and not currently executing a hook.
    pub fn controller_hooks<T: Controller>(&self, id: ControllerId) -> Option<&T> {
        let hooks: &dyn Controller = self.controllers.get(id)?.hooks.as_deref()?;
        (hooks as &dyn core::any::Any).downcast_ref()
    }

    /// Mutable access to the user half of controller `id`.
    pub fn controller_hooks_mut<T: Controller>(&mut self, id: ControllerId) -> Option<&mut T> {
        let hooks: &mut dyn Controller = self.controllers.get_mut(id)?.hooks.as_deref_mut()?;
        (hooks as &mut dyn core::any::Any).downcast_mut()
    }

    /// Forward `onStart`.
    pub fn on_activity_started(&mut self) {
        for router in self.routers() {
            self.router_fan_out(router, &mut |h, c| h.controller_activity_started(c));
        }
        self.settle();
    }

    /// Forward `onResume`.
    pub fn on_activity_resumed(&mut self) {
        for router in self.routers() {
            self.router_fan_out(router, &mut |h, c| h.controller_activity_resumed(c));
        }
        self.settle();
    }

    /// Forward `onPause`.
    pub fn on_activity_paused(&mut self) {
        for router in self.routers() {
            self.router_fan_out(router, &mut |h, c| h.controller_activity_paused(c));
        }
        self.settle();
    }

    /// Forward `onStop`.
    pub fn on_activity_stopped(&mut self) {
        for router in self.routers() {
            self.router_fan_out(router, &mut |h, c| h.controller_activity_stopped(c));
        }
        self.settle();
    }

    /// Forward `onDestroy`. Returns whether the activity was changing configurations.
    ///
    /// On a configuration change controllers only lose their views and are re-attached by
    /// the next [`LifecycleHandler::attach_router`]; otherwise every controller is destroyed.
    pub fn on_activity_destroyed(&mut self) -> bool {
        let changing = self
            .activity
            .as_ref()
            .is_some_and(|a| a.is_changing_configurations());
        debug!(changing, "activity destroyed");
        let routers = self.routers();
        if changing {
            for &router in &routers {
                self.prepare_router_for_host_detach(router);
            }
        }
        for router in routers {
            self.router_on_activity_destroyed(router, changing);
        }
        self.activity = None;
        if !changing {
            self.destroyed = true;
            self.router_map.clear();
        }
        self.settle();
        changing
    }

    /// Save the request maps and every activity-hosted router.
    pub fn on_save_instance_state(&mut self) -> Bundle {
        let mut out = Bundle::new();
        out.put_string_sparse(KEY_PERMISSION_REQUESTS, self.permission_requests.clone())
            .put_string_sparse(KEY_ACTIVITY_REQUESTS, self.activity_requests.clone());
        let routers: Vec<(u32, RouterId)> =
            self.router_map.iter().map(|(k, v)| (*k, *v)).collect();
        for (key, router) in routers {
            let state = self.save_router(router);
            out.put_bundle(router_state_key(key), state);
        }
        self.settle();
        out
    }

    /// Route an activity result to the controller that registered `request_code`.
    pub fn on_activity_result(&mut self, request_code: i32, result_code: i32, data: Option<&Intent>) {
        let Some(instance_id) = self.activity_requests.get(&request_code).cloned() else {
            warn!(request_code, "activity result for an unknown request code");
            return;
        };
        match self.find_controller(&instance_id) {
            Some(c) => {
                self.with_hooks(c, |hooks, cx| {
                    hooks.on_activity_result(cx, request_code, result_code, data);
                });
            }
            None => warn!(request_code, %instance_id, "activity result routed to nobody"),
        }
        self.settle();
    }

    /// Route a permission result to the controller that requested it.
    pub fn on_request_permissions_result(
        &mut self,
        request_code: i32,
        permissions: &[String],
        grants: &[bool],
    ) {
        let Some(instance_id) = self.permission_requests.remove(&request_code) else {
            warn!(request_code, "permission result for an unknown request code");
            return;
        };
        match self.find_controller(&instance_id) {
            Some(c) => {
                if let Some(entry) = self.controllers.get_mut(c) {
                    entry
                        .state
                        .requested_permissions
                        .retain(|p| !permissions.contains(p));
                }
                self.with_hooks(c, |hooks, cx| {
                    hooks.on_request_permissions_result(cx, request_code, permissions, grants);
                });
            }
            None => warn!(request_code, %instance_id, "permission result routed to nobody"),
        }
        self.settle();
    }

    /// Whether a rationale should be shown for `permission`, asking the controller that
    /// requested it first and the activity otherwise.
    pub fn should_show_request_permission_rationale(&self, permission: &str) -> bool {
        for router in self.routers() {
            if let Some(answer) = self.router_permission_rationale(router, permission) {
                return answer;
            }
        }
        self.activity_permission_rationale(permission)
    }

    /// Let attached controllers with a visible menu populate `menu`.
    pub fn on_create_options_menu(&mut self, menu: &mut dyn Menu) {
        for router in self.routers() {
            self.router_fan_out(router, &mut |h, c| h.controller_create_options_menu(c, menu));
        }
        self.settle();
    }

    /// Let attached controllers with a visible menu adjust `menu`.
    pub fn on_prepare_options_menu(&mut self, menu: &mut dyn Menu) {
        for router in self.routers() {
            self.router_fan_out(router, &mut |h, c| h.controller_prepare_options_menu(c, menu));
        }
        self.settle();
    }

    /// Offer `item` to attached controllers with a visible menu until one consumes it.
    pub fn on_options_item_selected(&mut self, item: &MenuItem) -> bool {
        let mut consumed = false;
        for router in self.routers() {
            if self.router_options_item_selected(router, item) {
                consumed = true;
                break;
            }
        }
        self.settle();
        consumed
    }

    /// Advance every pending change by `elapsed`; this is the host's frame tick.
    pub fn advance(&mut self, elapsed: Duration) {
        let keys: Vec<u64> = self.pending.iter().map(|p| p.key).collect();
        for key in keys {
            let Some(pos) = self.pending.iter().position(|p| p.key == key) else {
                continue;
            };
            let mut change = self.pending.remove(pos);
            let status = {
                let mut cx = ChangeContext::new(
                    &mut self.views,
                    change.container,
                    change.from_view,
                    change.to_view,
                    change.is_push,
                );
                change.handler.advance(&mut cx, elapsed)
            };
            match status {
                ChangeStatus::Pending => {
                    let pos = pos.min(self.pending.len());
                    self.pending.insert(pos, change);
                }
                ChangeStatus::Completed => {
                    self.flush_attach_events();
                    self.finish_change(change);
                }
            }
        }
        self.settle();
    }

    /// Whether any change is still animating.
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Run a controller hook with the hooks taken out of their slot.
    ///
    /// Returns `None` if the controller is gone or one of its hooks is already running.
    pub(crate) fn with_hooks<R>(
        &mut self,
        id: ControllerId,
        f: impl FnOnce(&mut dyn Controller, &mut ControllerContext<'_>) -> R,
    ) -> Option<R> {
        let entry = self.controllers.get_mut(id)?;
        let Some(mut hooks) = entry.hooks.take() else {
            warn!(?id, "reentrant controller hook skipped");
            return None;
        };
        self.hooks_out += 1;
        let result = {
            let mut cx = ControllerContext { handler: self, id };
            f(hooks.as_mut(), &mut cx)
        };
        self.hooks_out -= 1;
        if let Some(entry) = self.controllers.get_mut(id) {
            entry.hooks = Some(hooks);
        }
        Some(result)
    }

    pub(crate) fn invalidate_options_menu(&mut self) {
        if let Some(activity) = self.activity.as_mut() {
            activity.invalidate_options_menu();
        }
    }

    pub(crate) fn activity_permission_rationale(&self, permission: &str) -> bool {
        self.activity
            .as_ref()
            .is_some_and(|a| a.should_show_request_permission_rationale(permission))
    }

    /// Perform a host request on behalf of `controller`.
    pub(crate) fn perform_host_request(&mut self, controller: ControllerId, request: HostRequest) {
        let Some(instance_id) = self
            .controller_state(controller)
            .map(|s| s.instance_id().to_owned())
        else {
            return;
        };
        let Some(activity) = self.activity.as_mut() else {
            warn!(?request, "host request dropped: no activity");
            return;
        };
        match request {
            HostRequest::StartActivity(intent) => activity.start_activity(&intent),
            HostRequest::StartActivityForResult {
                intent,
                request_code,
                options,
            } => {
                self.activity_requests.insert(request_code, instance_id);
                activity.start_activity_for_result(&intent, request_code, options.as_ref());
            }
            HostRequest::RegisterForActivityResult(request_code) => {
                self.activity_requests.insert(request_code, instance_id);
            }
            HostRequest::RequestPermissions {
                permissions,
                request_code,
            } => {
                self.permission_requests.insert(request_code, instance_id);
                activity.request_permissions(&permissions, request_code);
            }
        }
    }

    /// Search every activity-hosted router tree for `instance_id`.
    pub(crate) fn find_controller(&self, instance_id: &str) -> Option<ControllerId> {
        self.router_map
            .values()
            .find_map(|&r| self.find_controller_in_router(r, instance_id))
    }

    /// Deliver attach signals, then drop what is dead (unless a hook is running).
    pub(crate) fn settle(&mut self) {
        self.flush_attach_events();
        if self.hooks_out == 0 {
            self.reap();
        }
    }

    pub(crate) fn flush_attach_events(&mut self) {
        while let Some(event) = self.views.pop_attach_event() {
            let view = event.view();
            let mut signals = Vec::new();
            for id in self.controllers.keys() {
                let Some(entry) = self.controllers.get_mut(id) else {
                    continue;
                };
                let Some(attach) = entry.state.attach_handler.as_mut() else {
                    continue;
                };
                if !attach.watches(view) {
                    continue;
                }
                if let Some(signal) = attach.handle_event(&self.views, event) {
                    signals.push((id, signal));
                }
            }
            for (id, signal) in signals {
                match signal {
                    AttachSignal::Attached => self.on_view_attached(id),
                    AttachSignal::Detached => self.on_view_detached(id),
                }
            }
        }
    }

    fn reap(&mut self) {
        loop {
            let mut reaped = false;
            for id in self.controllers.keys() {
                let reapable = self.controllers.get(id).is_some_and(|e| {
                    e.state.is_destroyed() && e.hooks.is_some()
                }) && !self.pending.iter().any(|p| p.references(id));
                if reapable {
                    self.drop_controller(id);
                    reaped = true;
                }
            }
            for id in self.routers.keys() {
                if self.router_is_reapable(id) {
                    self.routers.remove(id);
                    trace!(?id, "router dropped");
                    reaped = true;
                }
            }
            if !reaped {
                break;
            }
        }
    }

    /// Drop every controller and router that is not in the given snapshots of the arenas.
    /// Undoes a restore that failed part way.
    fn discard_created_since(&mut self, controllers: &[ControllerId], routers: &[RouterId]) {
        for id in self.controllers.keys() {
            if !controllers.contains(&id) {
                self.drop_controller(id);
            }
        }
        for id in self.routers.keys() {
            if !routers.contains(&id) {
                self.routers.remove(id);
                trace!(?id, "router dropped");
            }
        }
    }

    fn drop_controller(&mut self, id: ControllerId) {
        let Some(entry) = self.controllers.remove(id) else {
            return;
        };
        for router in self.routers.keys() {
            if let Some(r) = self.routers.get_mut(router) {
                r.destroying.retain(|c| *c != id);
            }
        }
        for other in self.controllers.keys() {
            if let Some(e) = self.controllers.get_mut(other) {
                e.state.child_backstack.retain(|c| *c != id);
            }
        }
        trace!(?id, class = entry.state.class_name(), "controller dropped");
    }

    fn router_is_reapable(&self, id: RouterId) -> bool {
        let Some(router) = self.routers.get(id) else {
            return false;
        };
        let Some(owner) = router.owner else {
            return false;
        };
        let owned = self
            .controller_state(owner)
            .is_some_and(|s| !s.is_destroyed() && s.child_routers.contains(&id));
        !owned
            && router.backstack.is_empty()
            && router.destroying.iter().all(|c| !self.controllers.contains(*c))
            && !self.pending.iter().any(|p| p.router == id)
    }
}

fn router_state_key(container_id: u32) -> String {
    format!("{KEY_ROUTER_STATE_PREFIX}{container_id}")
}
