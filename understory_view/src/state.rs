// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-view state and hierarchy state capture.

use crate::tree::ViewTree;
use crate::types::{HierarchyState, ViewFlags, ViewId};

impl ViewTree {
    /// Store arbitrary state on a view (scroll position, text, checked state, ...).
    pub fn set_state(&mut self, id: ViewId, state: serde_json::Value) {
        if let Some(n) = self.node_opt_mut(id) {
            n.state = Some(state);
        }
    }

    /// State previously stored with [`ViewTree::set_state`].
    pub fn state(&self, id: ViewId) -> Option<&serde_json::Value> {
        self.node(id).and_then(|n| n.state.as_ref())
    }

    /// Capture the state of every view under `root` (inclusive) that has an element id and
    /// [`ViewFlags::SAVE_ENABLED`].
    ///
    /// When element ids repeat, the first view in pre-order wins.
    pub fn save_hierarchy_state(&self, root: ViewId) -> HierarchyState {
        let mut out = HierarchyState::new();
        self.collect_state(root, &mut out);
        out
    }

    fn collect_state(&self, id: ViewId, out: &mut HierarchyState) {
        let Some(n) = self.node(id) else {
            return;
        };
        if n.local.flags.contains(ViewFlags::SAVE_ENABLED) {
            if let (Some(element_id), Some(state)) = (n.local.element_id, n.state.as_ref()) {
                out.entry(element_id).or_insert_with(|| state.clone());
            }
        }
        for child in self.children(id) {
            self.collect_state(*child, out);
        }
    }

    /// Put captured state back onto the views under `root` with matching element ids.
    pub fn restore_hierarchy_state(&mut self, root: ViewId, state: &HierarchyState) {
        let Some(n) = self.node_opt_mut(root) else {
            return;
        };
        if n.local.flags.contains(ViewFlags::SAVE_ENABLED) {
            if let Some(saved) = n.local.element_id.and_then(|e| state.get(&e)) {
                n.state = Some(saved.clone());
            }
        }
        let children = self.children(root).to_vec();
        for child in children {
            self.restore_hierarchy_state(child, state);
        }
    }
}
