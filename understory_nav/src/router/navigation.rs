// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Navigation operations.
//!
//! Each operation mutates the backstack first, then drives the changes that bring the
//! container in line with it. Controllers that leave the backstack are destroyed; they
//! finish destroying once their views are gone.

use std::rc::Rc;

use tracing::debug;
use understory_view::ViewId;

use crate::arena::{ControllerId, RouterId};
use crate::change::{ChangeHandler, NoOpChangeHandler, SimpleSwapChangeHandler};
use crate::error::NavError;
use crate::lifecycle_handler::LifecycleHandler;
use crate::router::change::ChangeRequest;
use crate::router::{Router, RouterHost, SharedChangeListener, UnownedViewPolicy};
use crate::transaction::{RouterTransaction, TransactionIndexer};

/// Mutable access to one router.
///
/// Obtained from [`LifecycleHandler::router`]. Operations on a stale router id fail with
/// [`NavError::StaleRouter`] or do nothing.
pub struct RouterMut<'a> {
    handler: &'a mut LifecycleHandler,
    id: RouterId,
}

impl core::fmt::Debug for RouterMut<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RouterMut").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<'a> RouterMut<'a> {
    pub(crate) fn new(handler: &'a mut LifecycleHandler, id: RouterId) -> Self {
        Self { handler, id }
    }

    /// The router being operated on.
    pub fn id(&self) -> RouterId {
        self.id
    }

    /// Push `transaction` on top and change to it.
    ///
    /// Fails with [`NavError::AlreadyPushed`] if the controller is already on a backstack
    /// of this host.
    pub fn push_controller(&mut self, transaction: RouterTransaction) -> Result<(), NavError> {
        let result = self.handler.push_controller(self.id, transaction);
        self.handler.settle();
        result
    }

    /// Pop the top controller. Returns whether the router still shows something afterwards.
    pub fn pop_current_controller(&mut self) -> Result<bool, NavError> {
        let top = self
            .handler
            .live_router(self.id)?
            .backstack
            .peek()
            .map(RouterTransaction::controller)
            .ok_or(NavError::EmptyStack)?;
        self.pop_controller(top)
    }

    /// Pop `controller`, changing away from it if it is the top.
    pub fn pop_controller(&mut self, controller: ControllerId) -> Result<bool, NavError> {
        let result = self.handler.pop_controller(self.id, controller);
        self.handler.settle();
        result
    }

    /// Replace the top controller with `transaction`.
    pub fn replace_top_controller(&mut self, transaction: RouterTransaction) -> Result<(), NavError> {
        let result = self.handler.replace_top_controller(self.id, transaction);
        self.handler.settle();
        result
    }

    /// Make `transaction` the only entry, using its push handler.
    pub fn set_root(&mut self, transaction: RouterTransaction) -> Result<(), NavError> {
        let handler = self.handler.resolve_push_handler(&transaction);
        self.set_backstack(vec![transaction], handler)
    }

    /// Replace the backstack with `transactions` (root first).
    ///
    /// Controllers not in the new list are destroyed. The container is brought in line with
    /// the new visible transactions; `handler` drives the root change and removals.
    pub fn set_backstack(
        &mut self,
        transactions: Vec<RouterTransaction>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<(), NavError> {
        let result = self.handler.set_backstack(self.id, transactions, handler);
        self.handler.settle();
        result
    }

    /// Pop everything above the root. Returns whether anything was popped.
    pub fn pop_to_root(&mut self) -> bool {
        self.pop_to_root_with(None)
    }

    /// [`RouterMut::pop_to_root`] with an explicit handler.
    pub fn pop_to_root_with(&mut self, handler: Option<Box<dyn ChangeHandler>>) -> bool {
        let Some(router) = self.handler.routers.get(self.id) else {
            return false;
        };
        let root = match router.backstack.root() {
            Some(root) if router.backstack.len() > 1 => root.controller(),
            _ => return false,
        };
        let popped = self.handler.pop_to(self.id, root, handler).is_ok();
        self.handler.settle();
        popped
    }

    /// Pop until the topmost controller tagged `tag` is on top. Returns whether one was found.
    pub fn pop_to_tag(&mut self, tag: &str) -> bool {
        self.pop_to_tag_with(tag, None)
    }

    /// [`RouterMut::pop_to_tag`] with an explicit handler.
    pub fn pop_to_tag_with(&mut self, tag: &str, handler: Option<Box<dyn ChangeHandler>>) -> bool {
        let Some(target) = self
            .handler
            .routers
            .get(self.id)
            .and_then(|r| r.controller_with_tag(tag))
        else {
            return false;
        };
        let found = self.handler.pop_to(self.id, target, handler).is_ok();
        self.handler.settle();
        found
    }

    /// Offer back to the top controller, popping it if it does not consume it.
    pub fn handle_back(&mut self) -> bool {
        let handled = self.handler.router_handle_back(self.id);
        self.handler.settle();
        handled
    }

    /// Re-show controllers that were attached when their views were last torn down.
    pub fn rebind_if_needed(&mut self) {
        self.handler.rebind_if_needed(self.id);
        self.handler.settle();
    }

    /// Whether popping the last controller animates its view out.
    pub fn set_pops_last_view(&mut self, pops_last_view: bool) -> &mut Self {
        if let Some(router) = self.handler.routers.get_mut(self.id) {
            router.pops_last_view = pops_last_view;
        }
        self
    }

    /// What `set_backstack` does with container children no controller owns.
    pub fn set_unowned_view_policy(&mut self, policy: UnownedViewPolicy) -> &mut Self {
        if let Some(router) = self.handler.routers.get_mut(self.id) {
            router.unowned_view_policy = policy;
        }
        self
    }

    /// Observe every change this router runs. Adding a listener twice has no effect.
    pub fn add_change_listener(&mut self, listener: SharedChangeListener) {
        if let Some(router) = self.handler.routers.get_mut(self.id) {
            if !router
                .change_listeners
                .iter()
                .any(|l| same_listener(l, &listener))
            {
                router.change_listeners.push(listener);
            }
        }
    }

    /// Stop observing.
    pub fn remove_change_listener(&mut self, listener: &SharedChangeListener) {
        if let Some(router) = self.handler.routers.get_mut(self.id) {
            router.change_listeners.retain(|l| !same_listener(l, listener));
        }
    }

    /// Controller with `instance_id` on this router or any router below it.
    pub fn controller_with_instance_id(&self, instance_id: &str) -> Option<ControllerId> {
        self.handler.find_controller_in_router(self.id, instance_id)
    }

    /// Pop everything and, with `pop_views`, animate the top view out and remove the rest.
    pub fn destroy(&mut self, pop_views: bool) {
        self.handler.destroy_router(self.id, pop_views);
        self.handler.settle();
    }
}

fn same_listener(a: &SharedChangeListener, b: &SharedChangeListener) -> bool {
    core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

impl LifecycleHandler {
    pub(crate) fn live_router(&self, id: RouterId) -> Result<&Router, NavError> {
        self.routers.get(id).ok_or(NavError::StaleRouter)
    }

    /// The controller must be alive and on no backstack yet.
    fn check_pushable(&self, controller: ControllerId) -> Result<(), NavError> {
        self.controller_state(controller)
            .filter(|s| !s.is_destroyed() && !s.is_being_destroyed())
            .ok_or(NavError::StaleController)?;
        if self
            .routers
            .values()
            .any(|r| r.backstack.contains(controller))
        {
            return Err(NavError::AlreadyPushed);
        }
        Ok(())
    }

    /// Push handler of `transaction`, preferring the controller's override.
    pub(crate) fn resolve_push_handler(
        &self,
        transaction: &RouterTransaction,
    ) -> Option<Box<dyn ChangeHandler>> {
        self.controller_state(transaction.controller())
            .and_then(|s| s.overridden_push_handler())
            .or_else(|| transaction.own_push_change_handler())
            .map(|h| h.copy())
    }

    /// Pop handler of `transaction`, preferring the controller's override.
    pub(crate) fn resolve_pop_handler(
        &self,
        transaction: &RouterTransaction,
    ) -> Option<Box<dyn ChangeHandler>> {
        self.controller_state(transaction.controller())
            .and_then(|s| s.overridden_pop_handler())
            .or_else(|| transaction.own_pop_change_handler())
            .map(|h| h.copy())
    }

    fn push_removes_views(&self, transaction: &RouterTransaction) -> bool {
        self.controller_state(transaction.controller())
            .and_then(|s| s.overridden_push_handler())
            .or_else(|| transaction.own_push_change_handler())
            .is_none_or(|h| h.removes_from_view_on_push())
    }

    /// Visible transactions of `top_first`, root first.
    pub(crate) fn visible_transactions<'t>(
        &self,
        top_first: impl Iterator<Item = &'t RouterTransaction>,
    ) -> Vec<RouterTransaction> {
        let mut visible = Vec::new();
        for transaction in top_first {
            visible.push(transaction.clone());
            if self.push_removes_views(transaction) {
                break;
            }
        }
        visible.reverse();
        visible
    }

    /// Run `f` with the indexer of `router`'s tree.
    fn with_indexer<R>(&mut self, router: RouterId, f: impl FnOnce(&mut TransactionIndexer) -> R) -> R {
        let root = self.root_router(router).unwrap_or(router);
        let mut indexer = self
            .routers
            .get_mut(root)
            .map(|r| core::mem::take(&mut r.indexer))
            .unwrap_or_default();
        let result = f(&mut indexer);
        if let Some(r) = self.routers.get_mut(root) {
            r.indexer = indexer;
        }
        result
    }

    fn track_destroying(&mut self, router: RouterId, controller: ControllerId) {
        let destroyed = self
            .controller_state(controller)
            .is_none_or(|s| s.is_destroyed());
        if destroyed {
            return;
        }
        if let Some(r) = self.routers.get_mut(router) {
            if !r.destroying.contains(&controller) {
                r.destroying.push(controller);
            }
        }
    }

    fn destroy_and_track(&mut self, router: RouterId, controller: ControllerId, remove_views: bool) {
        self.destroy_controller(controller, remove_views);
        self.track_destroying(router, controller);
    }

    /// Start one change, substituting a no-op when the backstack empties and the router
    /// keeps its last view.
    pub(crate) fn perform_change(&mut self, mut request: ChangeRequest) {
        let router = request.router;
        if let Some(to) = request.to {
            self.set_controller_router(to, router);
        } else if self
            .routers
            .get(router)
            .is_some_and(|r| r.backstack.is_empty() && !r.pops_last_view)
        {
            request.handler = Some(Box::new(NoOpChangeHandler));
        }
        self.execute_change(request);
    }

    pub(crate) fn push_controller(
        &mut self,
        router: RouterId,
        mut transaction: RouterTransaction,
    ) -> Result<(), NavError> {
        let from = self
            .live_router(router)?
            .backstack
            .peek()
            .map(RouterTransaction::controller);
        let to = transaction.controller();
        self.check_pushable(to)?;
        debug!(?router, ?to, ?from, tag = transaction.tag(), "push");
        transaction.on_attached_to_router();
        self.with_indexer(router, |indexer| transaction.ensure_valid_index(indexer));
        let handler = self.resolve_push_handler(&transaction);
        if let Some(r) = self.routers.get_mut(router) {
            r.backstack.push(transaction);
        }
        self.perform_change(ChangeRequest::new(router, Some(to), from, true, handler));
        Ok(())
    }

    pub(crate) fn pop_controller(
        &mut self,
        router: RouterId,
        controller: ControllerId,
    ) -> Result<bool, NavError> {
        let r = self.live_router(router)?;
        let top = r.backstack.peek().cloned();
        let popping_top = top.as_ref().map(RouterTransaction::controller) == Some(controller);
        debug!(?router, ?controller, popping_top, "pop");
        if popping_top {
            if let Some(r) = self.routers.get_mut(router) {
                r.backstack.pop()?;
            }
            self.destroy_and_track(router, controller, false);
        } else {
            let removed = self
                .routers
                .get_mut(router)
                .and_then(|r| r.backstack.remove(controller));
            if removed.is_none() {
                return Err(NavError::NotOnStack);
            }
            self.destroy_and_track(router, controller, true);
        }

        if let (true, Some(top)) = (popping_top, &top) {
            let new_top = self
                .routers
                .get(router)
                .and_then(|r| r.backstack.peek())
                .map(RouterTransaction::controller);
            let handler = self.resolve_pop_handler(top);
            self.perform_change(ChangeRequest::new(
                router,
                new_top,
                Some(controller),
                false,
                handler,
            ));
        }

        let r = self.live_router(router)?;
        Ok(if r.pops_last_view {
            top.is_some()
        } else {
            !r.backstack.is_empty()
        })
    }

    pub(crate) fn replace_top_controller(
        &mut self,
        router: RouterId,
        mut transaction: RouterTransaction,
    ) -> Result<(), NavError> {
        let top = self.live_router(router)?.backstack.peek().cloned();
        let to = transaction.controller();
        self.check_pushable(to)?;
        debug!(?router, ?to, from = ?top.as_ref().map(RouterTransaction::controller), "replace top");

        if let Some(top) = &top {
            if let Some(r) = self.routers.get_mut(router) {
                r.backstack.pop()?;
            }
            self.destroy_and_track(router, top.controller(), false);
        }

        let handler = self.resolve_push_handler(&transaction);
        if let Some(top) = &top {
            let old_removed_views = self.push_removes_views(top);
            let new_removes_views = handler
                .as_ref()
                .is_none_or(|h| h.removes_from_view_on_push());
            if !old_removed_views && new_removes_views {
                let remaining = self.live_router(router)?.backstack.clone();
                for visible in self.visible_transactions(remaining.iter()) {
                    self.perform_change(ChangeRequest::new(
                        router,
                        None,
                        Some(visible.controller()),
                        true,
                        handler.clone(),
                    ));
                }
            }
        }

        transaction.on_attached_to_router();
        self.with_indexer(router, |indexer| transaction.ensure_valid_index(indexer));
        if let Some(r) = self.routers.get_mut(router) {
            r.backstack.push(transaction);
        }
        let mut request = ChangeRequest::new(
            router,
            Some(to),
            top.as_ref().map(RouterTransaction::controller),
            true,
            handler,
        );
        request.force_remove_view_on_push = request.handler.is_some();
        self.perform_change(request);
        Ok(())
    }

    pub(crate) fn set_backstack(
        &mut self,
        router: RouterId,
        mut transactions: Vec<RouterTransaction>,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<(), NavError> {
        let old = self.live_router(router)?.backstack.clone();
        for (i, transaction) in transactions.iter().enumerate() {
            let controller = transaction.controller();
            if transactions[..i].iter().any(|t| t.controller() == controller) {
                return Err(NavError::AlreadyPushed);
            }
            if !old.contains(controller) {
                self.check_pushable(controller)?;
            }
        }
        debug!(?router, old = old.len(), new = transactions.len(), "set backstack");

        let old_visible = self.visible_transactions(old.iter());
        self.remove_all_except_visible_and_unowned(router, &old_visible);
        for transaction in &mut transactions {
            transaction.on_attached_to_router();
        }
        self.ensure_ordered_indices(router, &mut transactions);

        let new_root_requires_push = transactions
            .first()
            .is_some_and(|t| !old.contains(t.controller()));
        let orphans = match self.routers.get_mut(router) {
            Some(r) => r.backstack.set_backstack(transactions),
            None => Vec::new(),
        };
        for orphan in orphans {
            self.destroy_and_track(router, orphan.controller(), false);
        }

        let new = self.live_router(router)?.backstack.clone();
        let new_visible = self.visible_transactions(new.iter());
        self.transition_visible(router, &old_visible, &new_visible, handler, new_root_requires_push);

        for transaction in new.reverse_iter() {
            self.set_controller_router(transaction.controller(), router);
        }
        Ok(())
    }

    /// Pop everything above `target`, changing from the old visible set to the new one.
    pub(crate) fn pop_to(
        &mut self,
        router: RouterId,
        target: ControllerId,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<(), NavError> {
        let old = self.live_router(router)?.backstack.clone();
        let old_visible = self.visible_transactions(old.iter());
        let popped = match self.routers.get_mut(router) {
            Some(r) => r.backstack.pop_to(target)?,
            None => return Err(NavError::StaleRouter),
        };
        debug!(?router, ?target, popped = popped.len(), "pop to");
        if popped.is_empty() {
            return Ok(());
        }
        let handler = handler.or_else(|| old.peek().and_then(|t| self.resolve_pop_handler(t)));
        for transaction in &popped {
            self.destroy_and_track(router, transaction.controller(), false);
        }
        let new = self.live_router(router)?.backstack.clone();
        let new_visible = self.visible_transactions(new.iter());
        self.transition_visible(router, &old_visible, &new_visible, handler, false);
        Ok(())
    }

    /// Drive the changes that turn `old_visible` into `new_visible` (both root first).
    fn transition_visible(
        &mut self,
        router: RouterId,
        old_visible: &[RouterTransaction],
        new_visible: &[RouterTransaction],
        handler: Option<Box<dyn ChangeHandler>>,
        root_is_push: bool,
    ) {
        let same = old_visible.len() == new_visible.len()
            && old_visible
                .iter()
                .zip(new_visible)
                .all(|(a, b)| a.controller() == b.controller());
        if same {
            return;
        }
        let contains = |list: &[RouterTransaction], c: ControllerId| {
            list.iter().any(|t| t.controller() == c)
        };

        let Some(new_root) = new_visible.first() else {
            for transaction in old_visible.iter().rev() {
                self.perform_change(ChangeRequest::new(
                    router,
                    None,
                    Some(transaction.controller()),
                    false,
                    handler.clone(),
                ));
            }
            return;
        };

        let old_root = old_visible.first().map(RouterTransaction::controller);
        if old_root != Some(new_root.controller()) {
            self.perform_change(ChangeRequest::new(
                router,
                Some(new_root.controller()),
                old_root,
                root_is_push,
                handler.clone(),
            ));
        }

        for transaction in old_visible.iter().skip(1).rev() {
            if contains(new_visible, transaction.controller()) {
                continue;
            }
            let mut request = ChangeRequest::new(
                router,
                None,
                Some(transaction.controller()),
                true,
                Some(
                    handler
                        .as_ref()
                        .map(|h| h.copy())
                        .unwrap_or_else(|| Box::new(SimpleSwapChangeHandler::default())),
                ),
            );
            request.force_remove_view_on_push = true;
            self.perform_change(request);
        }

        for pair in new_visible.windows(2) {
            let [below, transaction] = pair else {
                continue;
            };
            if contains(old_visible, transaction.controller()) {
                continue;
            }
            let push_handler = self.resolve_push_handler(transaction);
            self.perform_change(ChangeRequest::new(
                router,
                Some(transaction.controller()),
                Some(below.controller()),
                true,
                push_handler,
            ));
        }
    }

    /// Strip container children that are neither views of `visible` transactions nor owned
    /// by sibling routers sharing the container.
    fn remove_all_except_visible_and_unowned(
        &mut self,
        router: RouterId,
        visible: &[RouterTransaction],
    ) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        let Some(container) = r.container else {
            return;
        };
        let policy = r.unowned_view_policy;
        let mut keep: Vec<ViewId> = visible
            .iter()
            .filter_map(|t| self.controller_state(t.controller())?.view())
            .collect();
        for sibling in self.sibling_routers(router) {
            if self.routers.get(sibling).and_then(|s| s.container) == Some(container) {
                self.collect_router_views(sibling, &mut keep);
            }
        }
        let owned: Vec<ViewId> = self
            .controllers
            .values()
            .filter_map(|e| e.state.view())
            .collect();
        let children = self.views.children(container).to_vec();
        for child in children {
            let removable = !keep.contains(&child)
                && (policy == UnownedViewPolicy::Remove || owned.contains(&child));
            if removable {
                self.views.remove_child(container, child);
            }
        }
        self.flush_attach_events();
    }

    fn collect_router_views(&self, router: RouterId, out: &mut Vec<ViewId>) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        for controller in r.backstack.controllers() {
            let Some(state) = self.controller_state(controller) else {
                continue;
            };
            out.extend(state.view());
            for &child in state.child_routers() {
                self.collect_router_views(child, out);
            }
        }
    }

    /// Give every transaction an index, then hand the sorted indices out in list order so
    /// a reordered backstack keeps increasing indices.
    fn ensure_ordered_indices(&mut self, router: RouterId, transactions: &mut [RouterTransaction]) {
        self.with_indexer(router, |indexer| {
            for transaction in transactions.iter_mut() {
                transaction.ensure_valid_index(indexer);
            }
        });
        let mut indices: Vec<u32> = transactions
            .iter()
            .filter_map(RouterTransaction::transaction_index)
            .collect();
        indices.sort_unstable();
        for (transaction, index) in transactions.iter_mut().zip(indices) {
            transaction.set_transaction_index(index);
        }
    }

    pub(crate) fn router_handle_back(&mut self, router: RouterId) -> bool {
        let Some(top) = self
            .routers
            .get(router)
            .and_then(|r| r.backstack.peek())
            .map(RouterTransaction::controller)
        else {
            return false;
        };
        if self.controller_handle_back(top) {
            return true;
        }
        self.pop_controller(router, top).unwrap_or(false)
    }

    pub(crate) fn rebind_if_needed(&mut self, router: RouterId) {
        let Some(r) = self.routers.get(router) else {
            return;
        };
        if r.container.is_none() {
            return;
        }
        let bottom_up: Vec<ControllerId> = r
            .backstack
            .reverse_iter()
            .map(RouterTransaction::controller)
            .collect();
        for controller in bottom_up {
            if self.controller_state(controller).is_some_and(|s| s.needs_attach()) {
                debug!(?router, ?controller, "rebind");
                self.perform_change(ChangeRequest::new(
                    router,
                    Some(controller),
                    None,
                    true,
                    Some(Box::new(SimpleSwapChangeHandler::new(false))),
                ));
            }
        }
    }

    pub(crate) fn destroy_router(&mut self, router: RouterId, pop_views: bool) {
        if matches!(
            self.routers.get(router).map(|r| &r.host),
            Some(RouterHost::Controller { .. })
        ) {
            self.router_set_detach_frozen(router, false);
        }
        let Some(r) = self.routers.get_mut(router) else {
            return;
        };
        r.pops_last_view = true;
        let popped = r.backstack.pop_all();
        debug!(?router, pop_views, popped = popped.len(), "destroy router");
        for transaction in &popped {
            self.destroy_and_track(router, transaction.controller(), false);
        }
        if let (true, Some((top, rest))) = (pop_views, popped.split_first()) {
            let handler = self.resolve_pop_handler(top);
            let mut request =
                ChangeRequest::new(router, None, Some(top.controller()), false, handler);
            request.then_remove = rest.iter().map(RouterTransaction::controller).collect();
            self.perform_change(request);
        }
    }
}
