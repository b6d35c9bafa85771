// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Controller state bags.

use std::rc::Rc;

use crate::arena::ControllerId;
use crate::bundle::Bundle;
use crate::change::{handler_from_bundle, handler_to_bundle};
use crate::controller::{ControllerEntry, ControllerFlags, ControllerState, RetainViewMode};
use crate::error::NavError;
use crate::lifecycle_handler::LifecycleHandler;
use crate::router::{Router, RouterHost};

const KEY_CLASS_NAME: &str = "className";
const KEY_VIEW_STATE: &str = "viewState";
const KEY_ARGS: &str = "args";
const KEY_INSTANCE_ID: &str = "instanceId";
const KEY_TARGET_INSTANCE_ID: &str = "targetInstanceId";
const KEY_REQUESTED_PERMISSIONS: &str = "requestedPermissions";
const KEY_NEEDS_ATTACH: &str = "needsAttach";
const KEY_RETAIN_VIEW_MODE: &str = "retainViewMode";
const KEY_OVERRIDDEN_PUSH_HANDLER: &str = "overriddenPushHandler";
const KEY_OVERRIDDEN_POP_HANDLER: &str = "overriddenPopHandler";
const KEY_CHILD_ROUTERS: &str = "childRouters";
const KEY_SAVED_STATE: &str = "savedState";

impl LifecycleHandler {
    /// Save `id` and its child routers.
    ///
    /// A live view's state is captured into the bag but not stored on the controller.
    pub(crate) fn save_controller(&mut self, id: ControllerId) -> Bundle {
        let Some(state) = self.controller_state(id) else {
            return Bundle::new();
        };
        let view = state.view();
        let stored_view_state = state.view_state.clone();
        let child_routers = state.child_routers.clone();
        let registry = Rc::clone(&self.registry);

        let mut out = Bundle::new();
        out.put_string(KEY_CLASS_NAME, state.class_name())
            .put_string(KEY_INSTANCE_ID, state.instance_id())
            .put_string_list(KEY_REQUESTED_PERMISSIONS, state.requested_permissions.clone())
            .put_bool(KEY_NEEDS_ATTACH, state.needs_attach() || state.is_attached())
            .put_int(KEY_RETAIN_VIEW_MODE, state.retain_view_mode().ordinal());
        if let Some(args) = state.args() {
            out.put_bundle(KEY_ARGS, args.clone());
        }
        if let Some(target) = state.target_instance_id() {
            out.put_string(KEY_TARGET_INSTANCE_ID, target);
        }
        if let Some(handler) = state.overridden_push_handler() {
            out.put_bundle(KEY_OVERRIDDEN_PUSH_HANDLER, handler_to_bundle(handler, &registry));
        }
        if let Some(handler) = state.overridden_pop_handler() {
            out.put_bundle(KEY_OVERRIDDEN_POP_HANDLER, handler_to_bundle(handler, &registry));
        }

        let view_state = match view {
            Some(view) => Some(self.capture_view_state(id, view)),
            None => stored_view_state,
        };
        if let Some(view_state) = view_state {
            out.put_bundle(KEY_VIEW_STATE, view_state);
        }

        let children = child_routers
            .into_iter()
            .map(|router| self.save_router(router))
            .collect();
        out.put_bundle_list(KEY_CHILD_ROUTERS, children);

        let mut saved = Bundle::new();
        self.with_hooks(id, |hooks, cx| hooks.on_save_instance_state(cx, &mut saved));
        self.notify(id, |l, s| l.on_save_instance_state(s, &mut saved));
        out.put_bundle(KEY_SAVED_STATE, saved);
        out
    }

    /// Recreate a controller (and its child routers) from a bag made by
    /// [`LifecycleHandler::save_controller`].
    pub(crate) fn restore_controller(&mut self, bag: &Bundle) -> Result<ControllerId, NavError> {
        let class = bag
            .get_string(KEY_CLASS_NAME)
            .ok_or(NavError::MissingState(KEY_CLASS_NAME))?;
        let args = bag.get_bundle(KEY_ARGS).cloned();
        let registry = Rc::clone(&self.registry);
        let hooks = registry.new_controller(class, args.as_ref())?;
        let overridden_push_handler = match bag.get_bundle(KEY_OVERRIDDEN_PUSH_HANDLER) {
            Some(handler) => handler_from_bundle(handler, &registry)?,
            None => None,
        };
        let overridden_pop_handler = match bag.get_bundle(KEY_OVERRIDDEN_POP_HANDLER) {
            Some(handler) => handler_from_bundle(handler, &registry)?,
            None => None,
        };
        let instance_id = bag
            .get_string(KEY_INSTANCE_ID)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_owned);

        let id = self.controllers.insert_with(|id| {
            let mut state = ControllerState::new(id, instance_id, class.to_owned(), args);
            state.view_state = bag.get_bundle(KEY_VIEW_STATE).cloned();
            state.target_instance_id = bag.get_string(KEY_TARGET_INSTANCE_ID).map(str::to_owned);
            state.requested_permissions = bag
                .get_string_list(KEY_REQUESTED_PERMISSIONS)
                .map(<[String]>::to_vec)
                .unwrap_or_default();
            state.retain_view_mode =
                RetainViewMode::from_ordinal(bag.get_int(KEY_RETAIN_VIEW_MODE).unwrap_or(0));
            state.set(
                ControllerFlags::NEEDS_ATTACH,
                bag.get_bool(KEY_NEEDS_ATTACH).unwrap_or(false),
            );
            state.overridden_push_handler = overridden_push_handler;
            state.overridden_pop_handler = overridden_pop_handler;
            state.saved_instance_state = bag.get_bundle(KEY_SAVED_STATE).cloned();
            ControllerEntry {
                state,
                hooks: Some(hooks),
            }
        });

        for child in bag.get_bundle_list(KEY_CHILD_ROUTERS).unwrap_or_default() {
            let router = self.routers.insert_with(|router| {
                Router::new(
                    router,
                    RouterHost::Controller {
                        host_id: 0,
                        tag: None,
                        host: None,
                    },
                    Some(id),
                )
            });
            if let Some(entry) = self.controllers.get_mut(id) {
                entry.state.child_routers.push(router);
            }
            self.restore_router_state(router, child)?;
        }
        Ok(id)
    }
}
