// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::bundle::Bundle;
use crate::change::{ChangeContext, ChangeHandler, ChangeStatus};

const KEY_REMOVES_FROM_ON_PUSH: &str = "removesFromViewOnPush";

/// Synchronous swap: optionally remove the outgoing view, add the incoming one if it is
/// parentless, complete.
///
/// This is the handler used when a transaction has none.
#[derive(Clone, Debug)]
pub struct SimpleSwapChangeHandler {
    removes_from_view_on_push: bool,
}

impl Default for SimpleSwapChangeHandler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SimpleSwapChangeHandler {
    /// A swap that keeps the outgoing view on push when `removes_from_view_on_push` is false.
    pub fn new(removes_from_view_on_push: bool) -> Self {
        Self {
            removes_from_view_on_push,
        }
    }
}

impl ChangeHandler for SimpleSwapChangeHandler {
    fn perform_change(&mut self, cx: &mut ChangeContext<'_>) -> ChangeStatus {
        if let Some(from) = cx.from() {
            if !cx.is_push() || self.removes_from_view_on_push {
                cx.remove_from_container(from);
            }
        }
        if let Some(to) = cx.to() {
            if cx.views().parent(to).is_none() {
                let container = cx.container();
                cx.views_mut().add_child(container, to);
            }
        }
        ChangeStatus::Completed
    }

    fn removes_from_view_on_push(&self) -> bool {
        self.removes_from_view_on_push
    }

    fn is_reusable(&self) -> bool {
        true
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(self.clone())
    }

    fn save_to_bundle(&self, bundle: &mut Bundle) {
        bundle.put_bool(KEY_REMOVES_FROM_ON_PUSH, self.removes_from_view_on_push);
    }

    fn restore_from_bundle(&mut self, bundle: &Bundle) {
        self.removes_from_view_on_push = bundle.get_bool(KEY_REMOVES_FROM_ON_PUSH).unwrap_or(true);
    }
}
