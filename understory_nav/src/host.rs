// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The host activity seen from the navigation core.

use core::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;

/// Stable identity of a host activity across configuration changes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct HostKey(pub u64);

/// A request to start another activity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// What to do.
    pub action: String,
    /// Extra data.
    pub extras: Bundle,
}

impl Intent {
    /// An intent with no extras.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            extras: Bundle::new(),
        }
    }
}

/// An options menu entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuItem {
    /// Item id.
    pub id: i32,
    /// Display title.
    pub title: String,
}

/// The host options menu.
pub trait Menu: Debug {
    /// Append an item.
    fn add_item(&mut self, item: MenuItem);
    /// Remove the item with `id`, if present.
    fn remove_item(&mut self, id: i32);
    /// Current items.
    fn items(&self) -> &[MenuItem];
}

impl Menu for Vec<MenuItem> {
    fn add_item(&mut self, item: MenuItem) {
        self.push(item);
    }

    fn remove_item(&mut self, id: i32) {
        self.retain(|i| i.id != id);
    }

    fn items(&self) -> &[MenuItem] {
        self
    }
}

/// Services the host activity provides.
///
/// Every method has a do-nothing default so embedders only implement what they support.
pub trait Activity: Debug {
    /// Whether the activity is being torn down to be recreated with a new configuration.
    fn is_changing_configurations(&self) -> bool {
        false
    }

    /// Rebuild the options menu.
    fn invalidate_options_menu(&mut self) {}

    /// Start another activity.
    fn start_activity(&mut self, intent: &Intent) {
        let _ = intent;
    }

    /// Start another activity and deliver its result under `request_code`.
    fn start_activity_for_result(
        &mut self,
        intent: &Intent,
        request_code: i32,
        options: Option<&Bundle>,
    ) {
        let _ = (intent, request_code, options);
    }

    /// Ask the user for permissions; the answer arrives under `request_code`.
    fn request_permissions(&mut self, permissions: &[String], request_code: i32) {
        let _ = (permissions, request_code);
    }

    /// Platform default for showing a permission rationale.
    fn should_show_request_permission_rationale(&self, permission: &str) -> bool {
        let _ = permission;
        false
    }
}

/// Host calls a controller issues; queued until the controller has a router.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum HostRequest {
    StartActivity(Intent),
    StartActivityForResult {
        intent: Intent,
        request_code: i32,
        options: Option<Bundle>,
    },
    RegisterForActivityResult(i32),
    RequestPermissions {
        permissions: Vec<String>,
        request_code: i32,
    },
}
