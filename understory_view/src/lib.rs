// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory View: a generational view tree with window attachment signals.
//!
//! This crate models the small slice of a host windowing runtime that a navigation layer
//! needs to reason about:
//!
//! - A hierarchy of views with ordered children, parent links and optional element ids.
//! - A window model: a parentless view becomes a window root through
//!   [`ViewTree::attach_to_window`], and every view beneath it is *attached*.
//! - Attach and detach signals, queued as [`AttachEvent`]s in the order a real runtime would
//!   dispatch them (parents before children on attach, children before parents on detach).
//! - Per-view state and hierarchy state capture keyed by element id, for saving and
//!   restoring view state across view re-creation.
//!
//! ## Not a renderer
//!
//! Views carry bounds, a render-time translation and an opacity so that transitions have
//! something to animate, but nothing here draws, measures or lays out.
//!
//! ## API overview
//!
//! - [`ViewTree`]: container managing views and the attach signal queue.
//! - [`LocalView`]: per-view local data (bounds, translation, alpha, element id, flags).
//! - [`ViewFlags`]: visibility, grouping and state-saving controls.
//! - [`ViewId`]: generational handle of a view.
//!
//! ## Example
//!
//! ```rust
//! use understory_view::{AttachEvent, LocalView, ViewTree};
//!
//! let mut views = ViewTree::new();
//! let window = views.insert(None, LocalView::default());
//! let container = views.insert(Some(window), LocalView::with_element_id(1));
//! views.attach_to_window(window);
//!
//! let page = views.insert(None, LocalView::default());
//! views.add_child(container, page);
//!
//! let mut events = Vec::new();
//! while let Some(e) = views.pop_attach_event() {
//!     events.push(e);
//! }
//! assert_eq!(events.last(), Some(&AttachEvent::Attached(page)));
//! assert_eq!(views.find_by_element_id(window, 1), Some(container));
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod state;
mod tree;
mod types;

pub use tree::ViewTree;
pub use types::{AttachEvent, HierarchyState, LocalView, ViewFlags, ViewId};
