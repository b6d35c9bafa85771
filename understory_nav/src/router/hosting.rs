// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Router trees: hosts, siblings, and fan-out of host events.

use tracing::debug;
use understory_view::ViewId;

use crate::arena::{ControllerId, RouterId};
use crate::controller::ControllerFlags;
use crate::error::NavError;
use crate::host::MenuItem;
use crate::lifecycle_handler::LifecycleHandler;
use crate::router::{Router, RouterHost};
use crate::transaction::RouterTransaction;

impl LifecycleHandler {
    /// Get, rebind or create the child router of `host` keyed by `container`'s element id
    /// and `tag`.
    pub(crate) fn child_router(
        &mut self,
        host: ControllerId,
        container: ViewId,
        tag: Option<&str>,
        create: bool,
    ) -> Result<Option<RouterId>, NavError> {
        let host_id = self
            .views
            .element_id(container)
            .ok_or(NavError::MissingElementId)?;
        let state = self
            .controller_state(host)
            .filter(|s| !s.is_destroyed())
            .ok_or(NavError::StaleController)?;
        let existing = state.child_routers.iter().copied().find(|&r| {
            self.routers
                .get(r)
                .is_some_and(|r| r.host_id() == Some(host_id) && r.tag() == tag)
        });

        match existing {
            Some(router) => {
                if self.routers.get(router).is_some_and(|r| !r.has_host()) {
                    self.set_router_host(router, host, container);
                    self.rebind_if_needed(router);
                }
                Ok(Some(router))
            }
            None if create => {
                let router = self.routers.insert_with(|id| {
                    Router::new(
                        id,
                        RouterHost::Controller {
                            host_id,
                            tag: tag.map(str::to_owned),
                            host: None,
                        },
                        Some(host),
                    )
                });
                self.set_router_host(router, host, container);
                if let Some(entry) = self.controllers.get_mut(host) {
                    entry.state.child_routers.push(router);
                }
                debug!(?host, ?router, host_id, tag, "child router created");
                Ok(Some(router))
            }
            None => Ok(None),
        }
    }

    /// Drop `router` from `host`'s children and destroy it along with its views.
    pub(crate) fn remove_child_router(&mut self, host: ControllerId, router: RouterId) {
        let Some(entry) = self.controllers.get_mut(host) else {
            return;
        };
        let before = entry.state.child_routers.len();
        entry.state.child_routers.retain(|r| *r != router);
        if entry.state.child_routers.len() != before {
            self.destroy_router(router, true);
        }
    }

    /// Bind a controller-hosted router to `container` inside `host`'s view. Idempotent.
    pub(crate) fn set_router_host(&mut self, router: RouterId, host: ControllerId, container: ViewId) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        if r.host_controller() == Some(host) && r.container == Some(container) {
            return;
        }
        self.remove_router_host(router);
        let Some(r) = self.routers.get_mut(router) else {
            return;
        };
        if let RouterHost::Controller { host: bound, .. } = &mut r.host {
            *bound = Some(host);
        }
        r.container = Some(container);
        for controller in r.backstack.controllers() {
            if let Some(entry) = self.controllers.get_mut(controller) {
                entry.state.parent = Some(host);
            }
        }
    }

    /// Unbind a controller-hosted router, releasing every view it shows.
    pub(crate) fn remove_router_host(&mut self, router: RouterId) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        if !matches!(r.host, RouterHost::Controller { .. }) {
            return;
        }
        let mut controllers = r.destroying.clone();
        controllers.extend(r.backstack.controllers());
        for controller in controllers {
            if self.controller_state(controller).is_some_and(|s| s.view().is_some()) {
                self.detach(controller, true);
            }
        }
        if let Some(r) = self.routers.get_mut(router) {
            if let RouterHost::Controller { host, .. } = &mut r.host {
                *host = None;
            }
            r.container = None;
        }
    }

    /// Freeze or unfreeze detach signals of every controller on `router`.
    pub(crate) fn router_set_detach_frozen(&mut self, router: RouterId, frozen: bool) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        for controller in r.backstack.controllers() {
            self.set_detach_frozen(controller, frozen);
        }
    }

    /// The activity-hosted router at the top of `router`'s tree, or `None` while a host
    /// along the way is unbound.
    pub(crate) fn root_router(&self, router: RouterId) -> Option<RouterId> {
        let mut current = router;
        loop {
            match &self.routers.get(current)?.host {
                RouterHost::Activity { .. } => return Some(current),
                RouterHost::Controller { host, .. } => {
                    current = self.controller_state((*host)?)?.router()?;
                }
            }
        }
    }

    /// Routers that may share `router`'s container: for a child router its host's other
    /// child routers and the host router's siblings, for an activity router the other
    /// activity routers.
    pub(crate) fn sibling_routers(&self, router: RouterId) -> Vec<RouterId> {
        let Some(r) = self.routers.get(router) else {
            return Vec::new();
        };
        match &r.host {
            RouterHost::Activity { .. } => self
                .routers()
                .into_iter()
                .filter(|&other| other != router)
                .collect(),
            RouterHost::Controller { host, .. } => {
                let Some(host) = host.and_then(|h| self.controller_state(h)) else {
                    return Vec::new();
                };
                let mut siblings: Vec<RouterId> = host
                    .child_routers
                    .iter()
                    .copied()
                    .filter(|&other| other != router)
                    .collect();
                if let Some(host_router) = host.router() {
                    siblings.extend(self.sibling_routers(host_router));
                }
                siblings
            }
        }
    }

    /// Controller with `instance_id` on `router` or below it.
    pub(crate) fn find_controller_in_router(
        &self,
        router: RouterId,
        instance_id: &str,
    ) -> Option<ControllerId> {
        let r = self.routers.get(router)?;
        r.backstack.iter().find_map(|t| {
            let state = self.controller_state(t.controller())?;
            if state.instance_id() == instance_id {
                return Some(state.id());
            }
            state
                .child_routers
                .iter()
                .find_map(|&child| self.find_controller_in_router(child, instance_id))
        })
    }

    /// Call `f` for every controller on `router`, top first, descending into each
    /// controller's child routers right after it.
    pub(crate) fn router_fan_out(
        &mut self,
        router: RouterId,
        f: &mut dyn FnMut(&mut Self, ControllerId),
    ) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        for controller in r.backstack.controllers() {
            if !self.controllers.contains(controller) {
                continue;
            }
            f(self, controller);
            let children = self
                .controller_state(controller)
                .map(|s| s.child_routers.clone())
                .unwrap_or_default();
            for child in children {
                self.router_fan_out(child, f);
            }
        }
    }

    /// Raise `needs_attach` on everything currently shown, snapping pending pushes to
    /// their end state first.
    pub(crate) fn prepare_router_for_host_detach(&mut self, router: RouterId) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        for controller in r.backstack.controllers() {
            if self.complete_pending_push(controller) {
                if let Some(entry) = self.controllers.get_mut(controller) {
                    entry.state.set(ControllerFlags::NEEDS_ATTACH, true);
                }
            }
            self.prepare_controller_for_host_detach(controller);
        }
    }

    /// The host activity is going away.
    pub(crate) fn router_on_activity_destroyed(&mut self, router: RouterId, changing: bool) {
        let Some(r) = self.routers.get_mut(router) else {
            return;
        };
        r.change_listeners.clear();
        let controllers = r.backstack.controllers();
        let destroying = r.destroying.clone();
        for controller in controllers.into_iter().chain(destroying.into_iter().rev()) {
            self.controller_activity_destroyed(controller, changing);
            let children = self
                .controller_state(controller)
                .map(|s| s.child_routers.clone())
                .unwrap_or_default();
            for child in children {
                self.router_on_activity_destroyed(child, changing);
            }
        }
        let Some(r) = self.routers.get_mut(router) else {
            return;
        };
        if let RouterHost::Activity { attached } = &mut r.host {
            *attached = false;
            r.container = None;
        } else {
            self.remove_router_host(router);
        }
    }

    /// Offer `item` to the controllers of `router` until one consumes it.
    pub(crate) fn router_options_item_selected(&mut self, router: RouterId, item: &MenuItem) -> bool {
        let Some(r) = self.routers.get(router) else {
            return false;
        };
        for controller in r.backstack.controllers() {
            if self.controller_options_item_selected(controller, item) {
                return true;
            }
            let children = self
                .controller_state(controller)
                .map(|s| s.child_routers.clone())
                .unwrap_or_default();
            for child in children {
                if self.router_options_item_selected(child, item) {
                    return true;
                }
            }
        }
        false
    }

    /// Rationale answer of the controller on `router` (or below) that requested
    /// `permission`.
    pub(crate) fn router_permission_rationale(&self, router: RouterId, permission: &str) -> Option<bool> {
        let r = self.routers.get(router)?;
        r.backstack.iter().map(RouterTransaction::controller).find_map(|controller| {
            let entry = self.controllers.get(controller)?;
            if entry.state.requested_permissions.iter().any(|p| p == permission) {
                let answer = entry
                    .hooks
                    .as_ref()
                    .and_then(|h| h.should_show_request_permission_rationale(permission))
                    .unwrap_or_else(|| self.activity_permission_rationale(permission));
                return Some(answer);
            }
            entry
                .state
                .child_routers
                .iter()
                .find_map(|&child| self.router_permission_rationale(child, permission))
        })
    }
}
