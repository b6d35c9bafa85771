// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change handlers: strategies that swap an outgoing view for an incoming one.
//!
//! A router never touches container children itself during navigation. It resolves the
//! handler for a change, gives it a [`ChangeContext`] and waits for the change to report
//! [`ChangeStatus::Completed`], either straight from [`ChangeHandler::perform_change`] or
//! later from [`ChangeHandler::advance`] as the host ticks frames.
//!
//! Contract for implementors:
//!
//! - Exactly one completion per change. The router finishes the change when
//!   `perform_change` or `advance` returns `Completed`, or right after it calls
//!   `complete_immediately` or `on_abort_push`; it never calls the handler again afterwards.
//! - The incoming view (if any) must be a child of the container when the change completes.
//! - The outgoing view is removed iff the change is a pop or
//!   [`removes_from_view_on_push`](ChangeHandler::removes_from_view_on_push) is true.

use core::fmt::Debug;
use std::any::Any;
use std::time::Duration;

use understory_view::{ViewId, ViewTree};

use crate::arena::ControllerId;
use crate::bundle::Bundle;
use crate::error::NavError;
use crate::registry::ClassRegistry;

mod animator;
mod no_op;
mod simple_swap;

pub use animator::{Animation, AnimatorChangeHandler};
pub use no_op::NoOpChangeHandler;
pub use simple_swap::SimpleSwapChangeHandler;

const KEY_CLASS_NAME: &str = "className";
const KEY_SAVED_STATE: &str = "savedState";

/// Progress of a change.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChangeStatus {
    /// The change has finished; the router completes it now.
    Completed,
    /// The change continues on later [`ChangeHandler::advance`] ticks.
    Pending,
}

/// Which side of a change a controller is on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// Incoming controller of a push.
    PushEnter,
    /// Outgoing controller of a push.
    PushExit,
    /// Incoming controller of a pop.
    PopEnter,
    /// Outgoing controller of a pop.
    PopExit,
}

impl ChangeType {
    /// The change type for a controller entering (`is_enter`) or leaving a push or pop.
    pub fn new(is_push: bool, is_enter: bool) -> Self {
        match (is_push, is_enter) {
            (true, true) => Self::PushEnter,
            (true, false) => Self::PushExit,
            (false, true) => Self::PopEnter,
            (false, false) => Self::PopExit,
        }
    }

    /// Whether this is part of a push.
    pub fn is_push(self) -> bool {
        matches!(self, Self::PushEnter | Self::PushExit)
    }

    /// Whether the controller is the incoming one.
    pub fn is_enter(self) -> bool {
        matches!(self, Self::PushEnter | Self::PopEnter)
    }
}

/// What a change handler may see and mutate while performing a change.
#[derive(Debug)]
pub struct ChangeContext<'a> {
    views: &'a mut ViewTree,
    container: ViewId,
    from: Option<ViewId>,
    to: Option<ViewId>,
    is_push: bool,
}

impl<'a> ChangeContext<'a> {
    pub(crate) fn new(
        views: &'a mut ViewTree,
        container: ViewId,
        from: Option<ViewId>,
        to: Option<ViewId>,
        is_push: bool,
    ) -> Self {
        Self {
            views,
            container,
            from,
            to,
            is_push,
        }
    }

    /// The view tree.
    pub fn views(&self) -> &ViewTree {
        self.views
    }

    /// The view tree, mutably.
    pub fn views_mut(&mut self) -> &mut ViewTree {
        self.views
    }

    /// Container whose children are being swapped.
    pub fn container(&self) -> ViewId {
        self.container
    }

    /// Outgoing view.
    pub fn from(&self) -> Option<ViewId> {
        self.from
    }

    /// Incoming view.
    pub fn to(&self) -> Option<ViewId> {
        self.to
    }

    /// Whether this is a push (as opposed to a pop).
    pub fn is_push(&self) -> bool {
        self.is_push
    }

    /// Remove `view` from the container if it is a child of it.
    pub fn remove_from_container(&mut self, view: ViewId) {
        if self.views.parent(view) == Some(self.container) {
            self.views.remove_child(self.container, view);
        }
    }
}

/// A strategy for swapping container children during a change.
pub trait ChangeHandler: Any + Debug {
    /// Start the change.
    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus;

    /// Advance a pending change by `elapsed`.
    fn advance(&mut self, cx: &mut ChangeContext<'_>, elapsed: Duration) -> ChangeStatus {
        let _ = elapsed;
        self.complete_immediately(cx);
        ChangeStatus::Completed
    }

    /// Snap a pending change to its end state.
    fn complete_immediately(&mut self, cx: &mut ChangeContext<'_>) {
        let _ = cx;
    }

    /// A pending push is being superseded by a change driven by `new_handler` towards
    /// `new_top`. The change is complete once this returns.
    fn on_abort_push(
        &mut self,
        cx: &mut ChangeContext<'_>,
        new_handler: &dyn ChangeHandler,
        new_top: Option<ControllerId>,
    ) {
        let _ = (new_handler, new_top);
        self.complete_immediately(cx);
    }

    /// Whether the outgoing view leaves the container on push. `false` makes the incoming
    /// controller an overlay.
    fn removes_from_view_on_push(&self) -> bool {
        true
    }

    /// Whether one instance may serve several changes. Routers always run a
    /// [`copy`](ChangeHandler::copy), so this only informs handler authors and listeners.
    fn is_reusable(&self) -> bool {
        false
    }

    /// A fresh instance with the same configuration and no in-flight state.
    fn copy(&self) -> Box<dyn ChangeHandler>;

    /// Write configuration into `bundle`.
    fn save_to_bundle(&self, bundle: &mut Bundle) {
        let _ = bundle;
    }

    /// Read configuration written by [`save_to_bundle`](ChangeHandler::save_to_bundle).
    fn restore_from_bundle(&mut self, bundle: &Bundle) {
        let _ = bundle;
    }

    /// Registry key of this handler's class.
    fn type_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl Clone for Box<dyn ChangeHandler> {
    fn clone(&self) -> Self {
        self.copy()
    }
}

/// A change as seen by a [`ControllerChangeListener`].
#[derive(Debug)]
pub struct ChangeEvent<'a> {
    /// Incoming controller.
    pub to: Option<ControllerId>,
    /// Outgoing controller.
    pub from: Option<ControllerId>,
    /// Whether this is a push.
    pub is_push: bool,
    /// Container hosting the change.
    pub container: ViewId,
    /// Handler running the change.
    pub handler: &'a dyn ChangeHandler,
}

/// Observer of every change a router runs.
pub trait ControllerChangeListener {
    /// Called before the handler starts.
    fn on_change_started(&mut self, event: &ChangeEvent<'_>) {
        let _ = event;
    }

    /// Called once the change has completed.
    fn on_change_completed(&mut self, event: &ChangeEvent<'_>) {
        let _ = event;
    }
}

pub(crate) fn handler_to_bundle(handler: &dyn ChangeHandler, registry: &ClassRegistry) -> Bundle {
    let mut saved = Bundle::new();
    handler.save_to_bundle(&mut saved);
    let mut bundle = Bundle::new();
    bundle
        .put_string(KEY_CLASS_NAME, registry.change_handler_class(handler))
        .put_bundle(KEY_SAVED_STATE, saved);
    bundle
}

pub(crate) fn handler_from_bundle(
    bundle: &Bundle,
    registry: &ClassRegistry,
) -> Result<Option<Box<dyn ChangeHandler>>, NavError> {
    let Some(class) = bundle.get_string(KEY_CLASS_NAME) else {
        return Ok(None);
    };
    let mut handler = registry.new_change_handler(class)?;
    if let Some(saved) = bundle.get_bundle(KEY_SAVED_STATE) {
        handler.restore_from_bundle(saved);
    }
    Ok(Some(handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_axes() {
        assert_eq!(ChangeType::new(true, true), ChangeType::PushEnter);
        assert_eq!(ChangeType::new(false, false), ChangeType::PopExit);
        assert!(ChangeType::PushExit.is_push());
        assert!(!ChangeType::PushExit.is_enter());
        assert!(ChangeType::PopEnter.is_enter());
    }

    #[test]
    fn handler_bags_round_trip_through_registry() {
        let registry = ClassRegistry::new();
        let original = SimpleSwapChangeHandler::new(false);
        let bag = handler_to_bundle(&original, &registry);
        let restored = handler_from_bundle(&bag, &registry).unwrap().unwrap();
        assert_eq!(restored.type_name(), original.type_name());
        assert!(!restored.removes_from_view_on_push());
    }

    #[test]
    fn handler_bags_use_registered_names() {
        let mut registry = ClassRegistry::new();
        registry.register_change_handler_named::<SimpleSwapChangeHandler>("swap");
        let bag = handler_to_bundle(&SimpleSwapChangeHandler::new(false), &registry);
        assert_eq!(bag.get_string(KEY_CLASS_NAME), Some("swap"));
        let restored = handler_from_bundle(&bag, &registry).unwrap().unwrap();
        assert!(!restored.removes_from_view_on_push());
    }

    #[test]
    fn empty_bag_is_no_handler() {
        let registry = ClassRegistry::new();
        assert!(handler_from_bundle(&Bundle::new(), &registry)
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_handler_class_is_missing_constructor() {
        let registry = ClassRegistry::new();
        let mut bag = Bundle::new();
        bag.put_string(KEY_CLASS_NAME, "nowhere::Handler");
        assert!(matches!(
            handler_from_bundle(&bag, &registry),
            Err(NavError::MissingConstructor { .. })
        ));
    }
}
