// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical attach tracking for a controller's root view.
//!
//! A group view can reach the window before its children do. A view counts as *logically*
//! attached once both its root and the deepest descendant along the last-child chain have
//! been attached, and detached when the root leaves again. [`ViewAttachHandler`] folds raw
//! [`AttachEvent`]s into exactly one [`AttachSignal::Attached`] / [`AttachSignal::Detached`]
//! pair per cycle.

use understory_view::{AttachEvent, ViewId, ViewTree};

/// A logical attach transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttachSignal {
    /// Root and deepest descendant are attached.
    Attached,
    /// The root detached after a logical attach.
    Detached,
}

/// Per-view attach state machine.
#[derive(Clone, Debug)]
pub struct ViewAttachHandler {
    root: ViewId,
    deep_child: Option<ViewId>,
    root_attached: bool,
    children_attached: bool,
    listening: bool,
}

impl ViewAttachHandler {
    /// Start listening to attach signals of `root`.
    pub fn listen_for_attach(root: ViewId) -> Self {
        Self {
            root,
            deep_child: None,
            root_attached: false,
            children_attached: false,
            listening: true,
        }
    }

    /// The view being watched.
    pub fn root(&self) -> ViewId {
        self.root
    }

    /// Whether `view` is one this handler reacts to.
    pub fn watches(&self, view: ViewId) -> bool {
        self.listening && (view == self.root || Some(view) == self.deep_child)
    }

    /// Whether the last emitted signal was [`AttachSignal::Attached`].
    pub fn is_attached(&self) -> bool {
        self.root_attached && self.children_attached
    }

    /// Stop reacting to signals. Idempotent.
    pub fn unregister(&mut self) {
        self.listening = false;
        self.deep_child = None;
    }

    /// Feed one raw signal; returns the logical transition it causes, if any.
    pub fn handle_event(&mut self, views: &ViewTree, event: AttachEvent) -> Option<AttachSignal> {
        if !self.listening {
            return None;
        }
        match event {
            AttachEvent::Attached(v) if v == self.root => {
                if self.root_attached {
                    return None;
                }
                self.root_attached = true;
                if !views.is_group(v) || views.child_count(v) == 0 {
                    self.deep_child = None;
                    return self.children_did_attach();
                }
                self.deep_child = Some(views.deepest_last_child(v));
                None
            }
            AttachEvent::Attached(v) if Some(v) == self.deep_child => {
                self.deep_child = None;
                if self.root_attached {
                    self.children_did_attach()
                } else {
                    None
                }
            }
            AttachEvent::Detached(v) if v == self.root => {
                self.root_attached = false;
                self.deep_child = None;
                if self.children_attached {
                    self.children_attached = false;
                    Some(AttachSignal::Detached)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn children_did_attach(&mut self) -> Option<AttachSignal> {
        if self.children_attached {
            return None;
        }
        self.children_attached = true;
        Some(AttachSignal::Attached)
    }
}
