// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type shared by every fallible navigation operation.

use thiserror::Error;

/// Errors surfaced by routers, controllers and state restoration.
///
/// Superseding a pending change is not an error; it is delivered to the pending
/// [`ChangeHandler`](crate::ChangeHandler) through `on_abort_push`.
#[derive(Debug, Error)]
pub enum NavError {
    /// A transaction was modified after being attached to a router, or a target
    /// controller was set twice.
    #[error("invalid modification: {0}")]
    InvalidModification(&'static str),
    /// No constructor is registered for a controller or change handler class.
    #[error("no constructor registered for `{class}`")]
    MissingConstructor {
        /// Registered class name that failed to resolve.
        class: String,
    },
    /// A registered constructor failed.
    #[error("failed to construct `{class}`: {reason}")]
    ReflectiveFailure {
        /// Class being constructed.
        class: String,
        /// Failure reported by the constructor.
        reason: String,
    },
    /// `pop_to` was asked for a controller that is not on the backstack.
    #[error("controller is not on the backstack")]
    NotOnStack,
    /// A pop was requested on an empty backstack.
    #[error("backstack is empty")]
    EmptyStack,
    /// The controller is already on a backstack of this host.
    #[error("controller is already on a backstack")]
    AlreadyPushed,
    /// The controller id is stale or belongs to another host.
    #[error("controller id is stale")]
    StaleController,
    /// The router id is stale or belongs to another host.
    #[error("router id is stale")]
    StaleRouter,
    /// A router container (or child router container) has no element id to key it by.
    #[error("container view has no element id")]
    MissingElementId,
    /// A saved state bag could not be encoded or decoded.
    #[error("state serialization failed")]
    Serialization(#[from] serde_json::Error),
    /// A saved state bag is missing a required entry.
    #[error("saved state is missing `{0}`")]
    MissingState(&'static str),
}
