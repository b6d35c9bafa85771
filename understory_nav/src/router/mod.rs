// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Routers: a backstack projected into a container view.
//!
//! ## Overview
//!
//! A [`Router`] owns a [`Backstack`] and the container its controllers' views are placed
//! in. Every navigation operation mutates the backstack first and then drives the change
//! handlers that swap views; see [`RouterMut`] for the operations.
//!
//! ## Hosts
//!
//! - Activity-hosted routers are created by
//!   [`LifecycleHandler::attach_router`](crate::LifecycleHandler::attach_router), one per
//!   container, and form the roots of router trees.
//! - Controller-hosted routers are created by
//!   [`ControllerMut::child_router`](crate::ControllerMut::child_router) and live in a
//!   container inside their host controller's view. They lose their host whenever that view
//!   is released and get it back when the view is recreated.
//!
//! ## Visibility
//!
//! A transaction is visible if it is the top, or every transaction above it was pushed
//! with a handler that keeps the outgoing view (an overlay). The visible transactions'
//! views are exactly the container's controller-owned children once changes settle.

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;

use understory_view::ViewId;

use crate::arena::{ControllerId, RouterId};
use crate::backstack::Backstack;
use crate::change::ControllerChangeListener;
use crate::transaction::{RouterTransaction, TransactionIndexer};

pub(crate) mod change;
mod hosting;
mod navigation;
mod state;

pub use navigation::RouterMut;

/// Shared handle to a [`ControllerChangeListener`].
pub type SharedChangeListener = Rc<RefCell<dyn ControllerChangeListener>>;

/// What `set_backstack` does with container children no controller owns.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UnownedViewPolicy {
    /// Leave them in place.
    #[default]
    Preserve,
    /// Remove every child that is neither visible nor owned by a sibling router.
    Remove,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RouterHost {
    Activity {
        attached: bool,
    },
    Controller {
        host_id: u32,
        tag: Option<String>,
        host: Option<ControllerId>,
    },
}

/// A backstack bound to a container. Read-only view; navigate through [`RouterMut`].
pub struct Router {
    pub(crate) id: RouterId,
    pub(crate) backstack: Backstack,
    pub(crate) container: Option<ViewId>,
    pub(crate) change_listeners: Vec<SharedChangeListener>,
    pub(crate) destroying: Vec<ControllerId>,
    pub(crate) pops_last_view: bool,
    pub(crate) host: RouterHost,
    /// Controller whose child router this is; kept while the host is unbound.
    pub(crate) owner: Option<ControllerId>,
    pub(crate) indexer: TransactionIndexer,
    pub(crate) unowned_view_policy: UnownedViewPolicy,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("backstack", &self.backstack.controllers())
            .field("container", &self.container)
            .field("host", &self.host)
            .field("pops_last_view", &self.pops_last_view)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub(crate) fn new(id: RouterId, host: RouterHost, owner: Option<ControllerId>) -> Self {
        Self {
            id,
            backstack: Backstack::new(),
            container: None,
            change_listeners: Vec::new(),
            destroying: Vec::new(),
            pops_last_view: false,
            host,
            owner,
            indexer: TransactionIndexer::default(),
            unowned_view_policy: UnownedViewPolicy::default(),
        }
    }

    /// Handle of this router.
    pub fn id(&self) -> RouterId {
        self.id
    }

    /// Whether the backstack is non-empty.
    pub fn has_root_controller(&self) -> bool {
        !self.backstack.is_empty()
    }

    /// Number of transactions on the backstack.
    pub fn backstack_size(&self) -> usize {
        self.backstack.len()
    }

    /// The backstack.
    pub fn backstack(&self) -> &Backstack {
        &self.backstack
    }

    /// Copies of the transactions, root first.
    pub fn transactions(&self) -> Vec<RouterTransaction> {
        self.backstack.reverse_iter().cloned().collect()
    }

    /// Controller pushed with `tag`, searching from the top.
    pub fn controller_with_tag(&self, tag: &str) -> Option<ControllerId> {
        self.backstack
            .find_by_tag(tag)
            .map(RouterTransaction::controller)
    }

    /// The container, while bound.
    pub fn container(&self) -> Option<ViewId> {
        self.container
    }

    /// Whether popping the last controller animates its view out.
    pub fn pops_last_view(&self) -> bool {
        self.pops_last_view
    }

    /// Policy for container children nobody owns.
    pub fn unowned_view_policy(&self) -> UnownedViewPolicy {
        self.unowned_view_policy
    }

    /// Whether this router is the root of a router tree.
    pub fn is_activity_hosted(&self) -> bool {
        matches!(self.host, RouterHost::Activity { .. })
    }

    /// Whether the router is bound to a live host.
    pub fn has_host(&self) -> bool {
        match &self.host {
            RouterHost::Activity { attached } => *attached,
            RouterHost::Controller { host, .. } => host.is_some(),
        }
    }

    /// Element id of the container inside the host controller's view.
    pub fn host_id(&self) -> Option<u32> {
        match &self.host {
            RouterHost::Controller { host_id, .. } => Some(*host_id),
            RouterHost::Activity { .. } => None,
        }
    }

    /// Tag distinguishing child routers sharing a container.
    pub fn tag(&self) -> Option<&str> {
        match &self.host {
            RouterHost::Controller { tag, .. } => tag.as_deref(),
            RouterHost::Activity { .. } => None,
        }
    }

    /// Host controller of a child router, while bound.
    pub fn host_controller(&self) -> Option<ControllerId> {
        match &self.host {
            RouterHost::Controller { host, .. } => *host,
            RouterHost::Activity { .. } => None,
        }
    }

    /// Controllers popped but not yet finished destroying.
    pub fn destroying_controllers(&self) -> &[ControllerId] {
        &self.destroying
    }

    /// The transaction indexer; only meaningful on activity-hosted routers.
    pub fn transaction_indexer(&self) -> &TransactionIndexer {
        &self.indexer
    }
}
