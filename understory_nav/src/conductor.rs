// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The process-wide table of host activities.
//!
//! A [`Conductor`] outlives individual activity instances: when an activity is recreated
//! after a configuration change it reinstalls under the same [`HostKey`] and finds its
//! [`LifecycleHandler`], controllers included, waiting for it.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::rc::Rc;

use tracing::debug;
use understory_view::{ViewId, ViewTree};

use crate::arena::RouterId;
use crate::bundle::Bundle;
use crate::error::NavError;
use crate::host::{Activity, HostKey};
use crate::lifecycle_handler::LifecycleHandler;
use crate::registry::ClassRegistry;

/// Lifecycle handlers keyed by host.
#[derive(Debug)]
pub struct Conductor {
    handlers: BTreeMap<HostKey, LifecycleHandler>,
    registry: Rc<ClassRegistry>,
}

impl Conductor {
    /// An empty table resolving restored classes through `registry`.
    pub fn new(registry: ClassRegistry) -> Self {
        Self {
            handlers: BTreeMap::new(),
            registry: Rc::new(registry),
        }
    }

    /// The shared class registry.
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    /// Install `activity` under `key`.
    ///
    /// The first install creates the handler and restores its request maps from `saved`;
    /// later installs (a recreated activity) only swap the activity in.
    pub fn install(
        &mut self,
        key: HostKey,
        activity: Box<dyn Activity>,
        saved: Option<&Bundle>,
    ) -> &mut LifecycleHandler {
        match self.handlers.entry(key) {
            Entry::Occupied(entry) => {
                let handler = entry.into_mut();
                handler.set_activity(activity);
                handler
            }
            Entry::Vacant(entry) => {
                debug!(?key, "host installed");
                let mut handler = LifecycleHandler::new(activity, Rc::clone(&self.registry));
                handler.on_create(saved);
                entry.insert(handler)
            }
        }
    }

    /// Install `activity` if needed, build (or find) its container with `container`, and
    /// get or create the router for it.
    pub fn attach_router(
        &mut self,
        key: HostKey,
        activity: Box<dyn Activity>,
        container: impl FnOnce(&mut ViewTree) -> ViewId,
        saved: Option<&Bundle>,
    ) -> Result<RouterId, NavError> {
        let handler = self.install(key, activity, saved);
        let container = container(handler.views_mut());
        handler.attach_router(container, saved)
    }

    /// Handler installed under `key`.
    pub fn handler(&self, key: HostKey) -> Option<&LifecycleHandler> {
        self.handlers.get(&key)
    }

    /// Handler installed under `key`, mutably.
    pub fn handler_mut(&mut self, key: HostKey) -> Option<&mut LifecycleHandler> {
        self.handlers.get_mut(&key)
    }

    /// Installed hosts.
    pub fn hosts(&self) -> impl Iterator<Item = HostKey> + '_ {
        self.handlers.keys().copied()
    }

    /// Forward `onStart` to `key`.
    pub fn on_activity_started(&mut self, key: HostKey) {
        if let Some(handler) = self.handlers.get_mut(&key) {
            handler.on_activity_started();
        }
    }

    /// Forward `onResume` to `key`.
    pub fn on_activity_resumed(&mut self, key: HostKey) {
        if let Some(handler) = self.handlers.get_mut(&key) {
            handler.on_activity_resumed();
        }
    }

    /// Forward `onPause` to `key`.
    pub fn on_activity_paused(&mut self, key: HostKey) {
        if let Some(handler) = self.handlers.get_mut(&key) {
            handler.on_activity_paused();
        }
    }

    /// Forward `onStop` to `key`.
    pub fn on_activity_stopped(&mut self, key: HostKey) {
        if let Some(handler) = self.handlers.get_mut(&key) {
            handler.on_activity_stopped();
        }
    }

    /// Save the state of `key`.
    pub fn on_save_instance_state(&mut self, key: HostKey) -> Option<Bundle> {
        self.handlers
            .get_mut(&key)
            .map(LifecycleHandler::on_save_instance_state)
    }

    /// Forward `onDestroy` to `key`; the handler is dropped unless the activity is only
    /// changing configurations.
    pub fn on_activity_destroyed(&mut self, key: HostKey) {
        let Some(handler) = self.handlers.get_mut(&key) else {
            return;
        };
        if !handler.on_activity_destroyed() {
            self.handlers.remove(&key);
            debug!(?key, "host removed");
        }
    }
}
