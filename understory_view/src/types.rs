// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the view tree: view identifiers, flags, local properties and attach events.

use alloc::collections::BTreeMap;
use kurbo::{Rect, Vec2};

/// Identifier for a view in the tree.
///
/// This is a small, copyable handle that stays stable while the view is alive but becomes
/// invalid when the underlying slot is reused.
/// It consists of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On insert, a fresh slot is allocated with generation `1`.
/// - On remove, the slot is freed; any existing `ViewId` that pointed to that slot is now stale.
/// - On reuse of a freed slot, its generation is incremented, producing a new, distinct `ViewId`.
///
/// Every [`ViewTree`](crate::ViewTree) operation ignores stale ids: mutations become no-ops
/// and queries return `None`, `false` or an empty slice.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ViewId(pub(crate) u32, pub(crate) u32);

impl ViewId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// View flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ViewFlags: u8 {
        /// View is visible.
        const VISIBLE      = 0b0000_0001;
        /// View may host children (a view group).
        const GROUP        = 0b0000_0010;
        /// View state participates in hierarchy state capture.
        const SAVE_ENABLED = 0b0000_0100;
    }
}

impl Default for ViewFlags {
    fn default() -> Self {
        Self::VISIBLE | Self::GROUP | Self::SAVE_ENABLED
    }
}

/// Local properties of a view.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalView {
    /// Layout bounds in parent space. Computed upstream; the tree never lays out.
    pub bounds: Rect,
    /// Render-time translation applied on top of `bounds`.
    pub translation: Vec2,
    /// Opacity in `0.0..=1.0`.
    pub alpha: f64,
    /// Stable identifier used to find containers and key saved hierarchy state.
    pub element_id: Option<u32>,
    /// Visibility, grouping and state-saving flags.
    pub flags: ViewFlags,
}

impl Default for LocalView {
    fn default() -> Self {
        Self {
            bounds: Rect::ZERO,
            translation: Vec2::ZERO,
            alpha: 1.0,
            element_id: None,
            flags: ViewFlags::default(),
        }
    }
}

impl LocalView {
    /// A group view carrying `element_id`.
    pub fn with_element_id(element_id: u32) -> Self {
        Self {
            element_id: Some(element_id),
            ..Self::default()
        }
    }

    /// A leaf view that cannot host children.
    pub fn leaf() -> Self {
        Self {
            flags: ViewFlags::VISIBLE | ViewFlags::SAVE_ENABLED,
            ..Self::default()
        }
    }
}

/// A window attachment signal for a single view.
///
/// Queued by [`ViewTree`](crate::ViewTree) whenever a view enters or leaves an attached
/// window and drained with [`ViewTree::pop_attach_event`](crate::ViewTree::pop_attach_event).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttachEvent {
    /// The view became attached to a window.
    Attached(ViewId),
    /// The view was detached from its window.
    Detached(ViewId),
}

impl AttachEvent {
    /// The view this signal concerns.
    pub fn view(self) -> ViewId {
        match self {
            Self::Attached(v) | Self::Detached(v) => v,
        }
    }
}

/// Saved per-view state of a hierarchy, keyed by element id.
pub type HierarchyState = BTreeMap<u32, serde_json::Value>;
