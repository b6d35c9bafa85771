// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Nav: view-controller navigation over an [`understory_view`] tree.
//!
//! ## Overview
//!
//! A *controller* owns a piece of UI: it creates a view on demand, is told when that view
//! attaches to and detaches from a window, and may drop the view while it sits deeper in a
//! backstack. Controllers live on the backstack of a *router*, which swaps their views in
//! and out of one container view through *change handlers*.
//!
//! Routers nest: a controller can host child routers inside groups of its own view. Back
//! presses, activity lifecycle callbacks, options menus and host results travel down this
//! tree.
//!
//! ## Ownership
//!
//! Everything lives in one [`LifecycleHandler`] per host activity: the view tree, the
//! controller and router arenas, and in-flight changes. Controllers and routers are named
//! by generational handles ([`ControllerId`], [`RouterId`]); operations go through short
//! lived handles ([`ControllerMut`], [`RouterMut`]) borrowed from the handler. A
//! [`Conductor`] keeps handlers alive across activity re-creation.
//!
//! ## Lifecycle
//!
//! - Pushing a controller inflates its view and hands it to the change handler, which places
//!   it in the container. The controller attaches when the view reaches a window.
//! - Controllers covered by a push detach; by default ([`RetainViewMode::ReleaseDetach`])
//!   they also release their view after saving its state, and rebuild it when shown again.
//! - Popping a controller destroys it. Destruction finishes once its view is gone, so a
//!   controller whose view is still animating out stays around until the change completes.
//! - [`LifecycleHandler::on_save_instance_state`] captures every router and controller in a
//!   [`Bundle`]; handing that bag back to [`LifecycleHandler::attach_router`] rebuilds the
//!   backstacks, re-creating controllers through the [`ClassRegistry`].
//!
//! ## Changes
//!
//! [`SimpleSwapChangeHandler`] swaps views at once, [`AnimatorChangeHandler`] animates them
//! over frames delivered through [`LifecycleHandler::advance`], and [`NoOpChangeHandler`]
//! leaves the container alone. A change that is still running when another one starts is
//! completed immediately or, for a pop of the controller it was pushing, aborted.
//!
//! ## Example
//!
//! ```rust
//! use understory_nav::{
//!     ClassRegistry, Conductor, Controller, ControllerContext, HostKey, RouterTransaction,
//! };
//! use understory_view::{LocalView, ViewId, ViewTree};
//!
//! #[derive(Debug)]
//! struct NoActivity;
//! impl understory_nav::Activity for NoActivity {}
//!
//! #[derive(Default)]
//! struct Page;
//! impl Controller for Page {
//!     fn on_create_view(&mut self, cx: &mut ControllerContext<'_>, _container: ViewId) -> ViewId {
//!         cx.views_mut().insert(None, LocalView::default())
//!     }
//! }
//!
//! let mut registry = ClassRegistry::new();
//! registry.register_controller::<Page>();
//! let mut conductor = Conductor::new(registry);
//!
//! let key = HostKey(1);
//! let window_container = |views: &mut ViewTree| {
//!     let window = views.insert(None, LocalView::default());
//!     let container = views.insert(Some(window), LocalView::with_element_id(1));
//!     views.attach_to_window(window);
//!     container
//! };
//! let router = conductor
//!     .attach_router(key, Box::new(NoActivity), window_container, None)
//!     .unwrap();
//!
//! let handler = conductor.handler_mut(key).unwrap();
//! let page = handler.create_controller(Page).unwrap();
//! handler.router(router).push_controller(RouterTransaction::with(page)).unwrap();
//! assert!(handler.controller_state(page).unwrap().is_attached());
//!
//! // Popping the last page leaves the router empty, so the host handles back itself.
//! assert!(!handler.router(router).handle_back());
//! ```

mod arena;
mod attach;
mod backstack;
mod bundle;
mod change;
mod conductor;
mod controller;
mod error;
mod host;
mod lifecycle_handler;
mod registry;
mod router;
mod transaction;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
mod test_support;

pub use arena::{ControllerId, RouterId};
pub use attach::{AttachSignal, ViewAttachHandler};
pub use backstack::Backstack;
pub use bundle::{Bundle, BundleValue};
pub use change::{
    Animation, AnimatorChangeHandler, ChangeContext, ChangeEvent, ChangeHandler, ChangeStatus,
    ChangeType, ControllerChangeListener, NoOpChangeHandler, SimpleSwapChangeHandler,
};
pub use conductor::Conductor;
pub use controller::{
    Controller, ControllerContext, ControllerFlags, ControllerMut, ControllerState,
    LifecycleListener, RetainViewMode, SharedLifecycleListener,
};
pub use error::NavError;
pub use host::{Activity, HostKey, Intent, Menu, MenuItem};
pub use lifecycle_handler::LifecycleHandler;
pub use registry::ClassRegistry;
pub use router::{Router, RouterMut, SharedChangeListener, UnownedViewPolicy};
pub use transaction::{RouterTransaction, TransactionBuilder, TransactionIndexer};
