// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Running one change: inflate, notify, hand off to the handler, finish.

use tracing::trace;
use understory_view::ViewId;

use crate::arena::{ControllerId, RouterId};
use crate::change::{
    ChangeContext, ChangeEvent, ChangeHandler, ChangeStatus, ChangeType, SimpleSwapChangeHandler,
};
use crate::controller::ControllerFlags;
use crate::lifecycle_handler::LifecycleHandler;
use crate::router::{RouterHost, SharedChangeListener};

/// A change as requested by a navigation operation.
pub(crate) struct ChangeRequest {
    pub(crate) router: RouterId,
    pub(crate) to: Option<ControllerId>,
    pub(crate) from: Option<ControllerId>,
    pub(crate) is_push: bool,
    pub(crate) handler: Option<Box<dyn ChangeHandler>>,
    /// Remove the outgoing view on completion even if the handler keeps it.
    pub(crate) force_remove_view_on_push: bool,
    /// Controllers whose views are removed once this change completes.
    pub(crate) then_remove: Vec<ControllerId>,
}

impl ChangeRequest {
    pub(crate) fn new(
        router: RouterId,
        to: Option<ControllerId>,
        from: Option<ControllerId>,
        is_push: bool,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Self {
        Self {
            router,
            to,
            from,
            is_push,
            handler,
            force_remove_view_on_push: false,
            then_remove: Vec::new(),
        }
    }
}

/// A change whose handler has not completed yet.
pub(crate) struct PendingChange {
    pub(crate) key: u64,
    pub(crate) router: RouterId,
    pub(crate) to: Option<ControllerId>,
    pub(crate) from: Option<ControllerId>,
    pub(crate) is_push: bool,
    pub(crate) container: ViewId,
    pub(crate) handler: Box<dyn ChangeHandler>,
    listeners: Vec<SharedChangeListener>,
    pub(crate) to_view: Option<ViewId>,
    pub(crate) from_view: Option<ViewId>,
    force_remove: bool,
    then_remove: Vec<ControllerId>,
}

impl PendingChange {
    pub(crate) fn references(&self, controller: ControllerId) -> bool {
        self.to == Some(controller)
            || self.from == Some(controller)
            || self.then_remove.contains(&controller)
    }

    fn event(&self) -> ChangeEvent<'_> {
        ChangeEvent {
            to: self.to,
            from: self.from,
            is_push: self.is_push,
            container: self.container,
            handler: self.handler.as_ref(),
        }
    }
}

impl LifecycleHandler {
    /// Run `request` against its router's container.
    ///
    /// Without a container there is nothing to show and the change is dropped.
    pub(crate) fn execute_change(&mut self, request: ChangeRequest) {
        let ChangeRequest {
            router,
            to,
            from,
            is_push,
            handler,
            force_remove_view_on_push,
            then_remove,
        } = request;
        let Some((container, listeners, host)) = self.routers.get(router).and_then(|r| {
            r.container
                .map(|c| (c, r.change_listeners.clone(), r.host.clone()))
        }) else {
            trace!(?router, "change dropped: router has no container");
            return;
        };
        let handler = handler.unwrap_or_else(|| Box::new(SimpleSwapChangeHandler::default()));

        if let Some(to) = to {
            self.complete_pending_push(to);
        }
        if let Some(from) = from {
            if is_push {
                self.complete_pending_push(from);
            } else {
                self.abort_or_complete(from, to, handler.as_ref());
            }
        }

        trace!(?router, ?to, ?from, is_push, handler = handler.type_name(), "change started");
        {
            let event = ChangeEvent {
                to,
                from,
                is_push,
                container,
                handler: handler.as_ref(),
            };
            for listener in &listeners {
                listener.borrow_mut().on_change_started(&event);
            }
        }
        if let (Some(to), true, RouterHost::Controller { host: Some(parent), .. }) =
            (to, is_push, &host)
        {
            self.on_child_controller_pushed(*parent, to);
        }

        let to_type = ChangeType::new(is_push, true);
        let from_type = ChangeType::new(is_push, false);
        let to_view = to.and_then(|c| self.inflate(c, container));
        if let Some(to) = to {
            self.change_started(to, handler.as_ref(), to_type);
        }
        let from_view = from.and_then(|c| self.controller_state(c).and_then(|s| s.view()));
        if let Some(from) = from {
            self.change_started(from, handler.as_ref(), from_type);
        }

        let mut change = PendingChange {
            key: self.next_change_key,
            router,
            to,
            from,
            is_push,
            container,
            handler,
            listeners,
            to_view,
            from_view,
            force_remove: force_remove_view_on_push,
            then_remove,
        };
        self.next_change_key += 1;
        let status = {
            let mut cx =
                ChangeContext::new(&mut self.views, container, from_view, to_view, is_push);
            change.handler.perform_change(&mut cx)
        };
        match status {
            ChangeStatus::Pending => {
                self.pending.push(change);
                self.flush_attach_events();
            }
            ChangeStatus::Completed => {
                self.flush_attach_events();
                self.finish_change(change);
            }
        }
    }

    /// The handler reported completion; wrap up.
    pub(crate) fn finish_change(&mut self, change: PendingChange) {
        let to_type = ChangeType::new(change.is_push, true);
        let from_type = ChangeType::new(change.is_push, false);
        if let Some(from) = change.from {
            self.change_ended(from, change.handler.as_ref(), from_type);
        }
        if let Some(to) = change.to {
            self.change_ended(to, change.handler.as_ref(), to_type);
        }
        {
            let event = change.event();
            for listener in &change.listeners {
                listener.borrow_mut().on_change_completed(&event);
            }
        }
        if change.force_remove {
            if let Some(view) = change.from_view {
                self.views.detach_from_parent(view);
            }
        }
        if change.handler.removes_from_view_on_push() {
            if let Some(entry) = change.from.and_then(|c| self.controllers.get_mut(c)) {
                entry.state.set(ControllerFlags::NEEDS_ATTACH, false);
            }
        }
        trace!(router = ?change.router, to = ?change.to, from = ?change.from, "change completed");
        self.flush_attach_events();
        for controller in change.then_remove {
            self.execute_change(ChangeRequest::new(
                change.router,
                None,
                Some(controller),
                true,
                None,
            ));
        }
    }

    /// Snap a pending push towards `controller` to its end state. Returns whether there was one.
    pub(crate) fn complete_pending_push(&mut self, controller: ControllerId) -> bool {
        let Some(pos) = self
            .pending
            .iter()
            .position(|p| p.to == Some(controller))
        else {
            return false;
        };
        let mut change = self.pending.remove(pos);
        {
            let mut cx = ChangeContext::new(
                &mut self.views,
                change.container,
                change.from_view,
                change.to_view,
                change.is_push,
            );
            change.handler.complete_immediately(&mut cx);
        }
        self.flush_attach_events();
        self.finish_change(change);
        true
    }

    /// A pop is leaving `from` while a push towards it may still be running: abort that push
    /// if its handler removes views, complete it otherwise.
    fn abort_or_complete(
        &mut self,
        from: ControllerId,
        new_top: Option<ControllerId>,
        new_handler: &dyn ChangeHandler,
    ) {
        let Some(pos) = self.pending.iter().position(|p| p.to == Some(from)) else {
            return;
        };
        let mut change = self.pending.remove(pos);
        {
            let mut cx = ChangeContext::new(
                &mut self.views,
                change.container,
                change.from_view,
                change.to_view,
                change.is_push,
            );
            if change.handler.removes_from_view_on_push() {
                change.handler.on_abort_push(&mut cx, new_handler, new_top);
            } else {
                change.handler.complete_immediately(&mut cx);
            }
        }
        self.flush_attach_events();
        self.finish_change(change);
    }

    fn on_child_controller_pushed(&mut self, parent: ControllerId, child: ControllerId) {
        if let Some(entry) = self.controllers.get_mut(parent) {
            if !entry.state.child_backstack.contains(&child) {
                entry.state.child_backstack.push(child);
            }
        }
    }
}
