// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::change::{ChangeContext, ChangeHandler, ChangeStatus};

/// Completes without touching the container.
///
/// Routers use it when the last controller is popped and the router does not pop the last
/// view, so the final view stays on screen while the host goes away.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpChangeHandler;

impl ChangeHandler for NoOpChangeHandler {
    fn perform_change(&mut self, _cx: &mut ChangeContext<'_>) -> ChangeStatus {
        ChangeStatus::Completed
    }

    fn is_reusable(&self) -> bool {
        true
    }

    fn copy(&self) -> Box<dyn ChangeHandler> {
        Box::new(*self)
    }
}
