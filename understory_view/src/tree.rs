// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: structure, window attachment, queries.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use kurbo::{Rect, Vec2};

use crate::types::{AttachEvent, LocalView, ViewFlags, ViewId};

impl Default for ViewTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Top-level view tree.
///
/// Holds any number of root views. A root becomes a window root through
/// [`ViewTree::attach_to_window`]; every view beneath an attached window root is attached.
pub struct ViewTree {
    nodes: Vec<Option<Node>>, // slots
    generations: Vec<u32>,    // last generation per slot (persists across frees)
    free_list: Vec<usize>,
    events: VecDeque<AttachEvent>,
}

impl core::fmt::Debug for ViewTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        let free = self.free_list.len();
        f.debug_struct("ViewTree")
            .field("views_total", &total)
            .field("views_alive", &alive)
            .field("free_list", &free)
            .field("pending_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    generation: u32,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
    pub(crate) local: LocalView,
    attached: bool,
    window_root: bool,
    pub(crate) state: Option<serde_json::Value>,
}

impl Node {
    fn new(generation: u32, local: LocalView) -> Self {
        Self {
            generation,
            parent: None,
            children: Vec::new(),
            local,
            attached: false,
            window_root: false,
            state: None,
        }
    }
}

impl ViewTree {
    /// Create a new empty tree.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Insert a new view as the last child of `parent` (or as a root if `None`).
    ///
    /// If `parent` is stale or not a group, the view is created as a root.
    pub fn insert(&mut self, parent: Option<ViewId>, local: LocalView) -> ViewId {
        let (idx, generation) = if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.nodes[idx] = Some(Node::new(generation, local));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ViewId uses 32-bit indices by design."
            )]
            (idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.nodes.push(Some(Node::new(generation, local)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "ViewId uses 32-bit indices by design."
            )]
            ((self.nodes.len() - 1) as u32, generation)
        };
        let id = ViewId::new(idx, generation);
        if let Some(p) = parent {
            self.add_child(p, id);
        }
        id
    }

    /// Remove a view and its subtree, detaching it from its window first.
    pub fn remove(&mut self, id: ViewId) {
        if !self.is_alive(id) {
            return;
        }
        self.detach_subtree(id);
        if let Some(parent) = self.node(id).and_then(|n| n.parent) {
            if let Some(p) = self.node_opt_mut(parent) {
                p.children.retain(|c| *c != id);
            }
        }
        self.free_subtree(id);
    }

    fn free_subtree(&mut self, id: ViewId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.free_subtree(child);
        }
        self.nodes[id.idx()] = None;
        self.free_list.push(id.idx());
    }

    /// Append `child` to `parent`.
    ///
    /// Returns `false` and leaves the tree unchanged if either id is stale, `parent` is not a
    /// group, `child` already has a parent, or the link would create a cycle.
    pub fn add_child(&mut self, parent: ViewId, child: ViewId) -> bool {
        let index = self.child_count(parent);
        self.insert_child(parent, index, child)
    }

    /// Insert `child` at `index` among `parent`'s children (clamped to the child count).
    ///
    /// Same preconditions as [`ViewTree::add_child`]. Attaches `child`'s subtree when
    /// `parent` is attached.
    pub fn insert_child(&mut self, parent: ViewId, index: usize, child: ViewId) -> bool {
        if !self.is_alive(child) || !self.is_group(parent) || self.parent(child).is_some() {
            return false;
        }
        if self.is_ancestor_or_self(child, parent) {
            return false;
        }
        if self.node(child).is_some_and(|n| n.window_root) {
            return false;
        }
        let parent_attached = self.is_attached(parent);
        if let Some(p) = self.node_opt_mut(parent) {
            let index = index.min(p.children.len());
            p.children.insert(index, child);
        }
        if let Some(c) = self.node_opt_mut(child) {
            c.parent = Some(parent);
        }
        if parent_attached {
            self.attach_subtree(child);
        }
        true
    }

    /// Remove `child` from `parent`, detaching it from the window. The child stays alive as a root.
    ///
    /// Returns `false` if `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: ViewId, child: ViewId) -> bool {
        if self.parent(child) != Some(parent) {
            return false;
        }
        self.detach_subtree(child);
        if let Some(p) = self.node_opt_mut(parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.node_opt_mut(child) {
            c.parent = None;
        }
        true
    }

    /// Remove `child` from whatever parent it has. No-op for roots.
    pub fn detach_from_parent(&mut self, child: ViewId) {
        if let Some(parent) = self.parent(child) {
            self.remove_child(parent, child);
        }
    }

    /// Mark a parentless view as a window root and attach its subtree.
    pub fn attach_to_window(&mut self, root: ViewId) {
        if self.parent(root).is_some() {
            return;
        }
        let Some(n) = self.node_opt_mut(root) else {
            return;
        };
        n.window_root = true;
        self.attach_subtree(root);
    }

    /// Detach a window root and its subtree from the window.
    pub fn detach_from_window(&mut self, root: ViewId) {
        let Some(n) = self.node_opt_mut(root) else {
            return;
        };
        if !n.window_root {
            return;
        }
        n.window_root = false;
        self.detach_subtree(root);
    }

    // Parents before children.
    fn attach_subtree(&mut self, id: ViewId) {
        let Some(n) = self.node_opt_mut(id) else {
            return;
        };
        if !n.attached {
            n.attached = true;
            self.events.push_back(AttachEvent::Attached(id));
        }
        let children = self.children(id).to_vec();
        for child in children {
            self.attach_subtree(child);
        }
    }

    // Children before parents.
    fn detach_subtree(&mut self, id: ViewId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.detach_subtree(child);
        }
        if let Some(n) = self.node_opt_mut(id) {
            if n.attached {
                n.attached = false;
                self.events.push_back(AttachEvent::Detached(id));
            }
        }
    }

    /// Take the oldest queued attach signal.
    pub fn pop_attach_event(&mut self) -> Option<AttachEvent> {
        self.events.pop_front()
    }

    /// Whether attach signals are waiting to be delivered.
    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Returns true if `id` refers to a live view.
    ///
    /// A view is live if its slot exists and the generation matches.
    pub fn is_alive(&self, id: ViewId) -> bool {
        self.node(id).is_some()
    }

    /// Whether the view is currently attached to a window.
    pub fn is_attached(&self, id: ViewId) -> bool {
        self.node(id).is_some_and(|n| n.attached)
    }

    /// Whether the view can host children.
    pub fn is_group(&self, id: ViewId) -> bool {
        self.node(id)
            .is_some_and(|n| n.local.flags.contains(ViewFlags::GROUP))
    }

    /// Parent of a view.
    pub fn parent(&self, id: ViewId) -> Option<ViewId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of a view, in order. Empty for stale ids.
    pub fn children(&self, id: ViewId) -> &[ViewId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Number of children of a view.
    pub fn child_count(&self, id: ViewId) -> usize {
        self.children(id).len()
    }

    /// Position of `child` among `parent`'s children.
    pub fn index_of_child(&self, parent: ViewId, child: ViewId) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// Element id of a view.
    pub fn element_id(&self, id: ViewId) -> Option<u32> {
        self.node(id).and_then(|n| n.local.element_id)
    }

    /// Local properties of a view.
    pub fn local(&self, id: ViewId) -> Option<&LocalView> {
        self.node(id).map(|n| &n.local)
    }

    /// Find the first view under `root` (inclusive, pre-order) carrying `element_id`.
    pub fn find_by_element_id(&self, root: ViewId, element_id: u32) -> Option<ViewId> {
        let n = self.node(root)?;
        if n.local.element_id == Some(element_id) {
            return Some(root);
        }
        n.children
            .iter()
            .find_map(|c| self.find_by_element_id(*c, element_id))
    }

    /// Walk the last-child chain of `id` through groups and return the deepest view reached.
    pub fn deepest_last_child(&self, id: ViewId) -> ViewId {
        let mut current = id;
        while self.is_group(current) {
            match self.children(current).last() {
                Some(last) => current = *last,
                None => break,
            }
        }
        current
    }

    /// Update render-time translation.
    pub fn set_translation(&mut self, id: ViewId, translation: Vec2) {
        if let Some(n) = self.node_opt_mut(id) {
            n.local.translation = translation;
        }
    }

    /// Render-time translation, `Vec2::ZERO` for stale ids.
    pub fn translation(&self, id: ViewId) -> Vec2 {
        self.node(id).map(|n| n.local.translation).unwrap_or(Vec2::ZERO)
    }

    /// Update opacity.
    pub fn set_alpha(&mut self, id: ViewId, alpha: f64) {
        if let Some(n) = self.node_opt_mut(id) {
            n.local.alpha = alpha;
        }
    }

    /// Opacity, `0.0` for stale ids.
    pub fn alpha(&self, id: ViewId) -> f64 {
        self.node(id).map(|n| n.local.alpha).unwrap_or(0.0)
    }

    /// Update layout bounds.
    pub fn set_bounds(&mut self, id: ViewId, bounds: Rect) {
        if let Some(n) = self.node_opt_mut(id) {
            n.local.bounds = bounds;
        }
    }

    /// Layout bounds, `Rect::ZERO` for stale ids.
    pub fn bounds(&self, id: ViewId) -> Rect {
        self.node(id).map(|n| n.local.bounds).unwrap_or(Rect::ZERO)
    }

    /// Update view flags.
    pub fn set_flags(&mut self, id: ViewId, flags: ViewFlags) {
        if let Some(n) = self.node_opt_mut(id) {
            n.local.flags = flags;
        }
    }

    fn is_ancestor_or_self(&self, ancestor: ViewId, mut id: ViewId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    pub(crate) fn node(&self, id: ViewId) -> Option<&Node> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }

    pub(crate) fn node_opt_mut(&mut self, id: ViewId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        if n.generation != id.1 {
            return None;
        }
        Some(n)
    }
}
