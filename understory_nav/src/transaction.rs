// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Router transactions and the per-tree transaction indexer.

use crate::arena::ControllerId;
use crate::bundle::Bundle;
use crate::change::{ChangeHandler, handler_from_bundle, handler_to_bundle};
use crate::error::NavError;
use crate::registry::ClassRegistry;

const KEY_CONTROLLER_BUNDLE: &str = "controller.bundle";
const KEY_PUSH_TRANSITION: &str = "pushTransition";
const KEY_POP_TRANSITION: &str = "popTransition";
const KEY_TAG: &str = "tag";
const KEY_ATTACHED_TO_ROUTER: &str = "attachedToRouter";
const KEY_INDEX: &str = "index";
const KEY_CURRENT_INDEX: &str = "currentIndex";

/// A controller plus how it enters and leaves, a tag and an ordering index.
///
/// Tag and handlers are frozen once the transaction is attached to a router.
#[derive(Clone, Debug)]
pub struct RouterTransaction {
    controller: ControllerId,
    tag: Option<String>,
    push_change_handler: Option<Box<dyn ChangeHandler>>,
    pop_change_handler: Option<Box<dyn ChangeHandler>>,
    attached_to_router: bool,
    transaction_index: Option<u32>,
}

impl RouterTransaction {
    /// A transaction for `controller` with no tag and default handlers.
    pub fn with(controller: ControllerId) -> Self {
        Self {
            controller,
            tag: None,
            push_change_handler: None,
            pop_change_handler: None,
            attached_to_router: false,
            transaction_index: None,
        }
    }

    /// Start building a transaction for `controller`.
    pub fn builder(controller: ControllerId) -> TransactionBuilder {
        TransactionBuilder {
            transaction: Self::with(controller),
        }
    }

    /// The wrapped controller.
    pub fn controller(&self) -> ControllerId {
        self.controller
    }

    /// The tag.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Handler given to this transaction for pushes, ignoring controller overrides.
    pub fn own_push_change_handler(&self) -> Option<&dyn ChangeHandler> {
        self.push_change_handler.as_deref()
    }

    /// Handler given to this transaction for pops, ignoring controller overrides.
    pub fn own_pop_change_handler(&self) -> Option<&dyn ChangeHandler> {
        self.pop_change_handler.as_deref()
    }

    /// Whether a router has taken this transaction.
    pub fn is_attached_to_router(&self) -> bool {
        self.attached_to_router
    }

    /// Ordering index, assigned on first attachment.
    pub fn transaction_index(&self) -> Option<u32> {
        self.transaction_index
    }

    /// Replace the tag.
    pub fn set_tag(&mut self, tag: Option<String>) -> Result<&mut Self, NavError> {
        self.check_modifiable()?;
        self.tag = tag;
        Ok(self)
    }

    /// Replace the push handler.
    pub fn set_push_change_handler(
        &mut self,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<&mut Self, NavError> {
        self.check_modifiable()?;
        self.push_change_handler = handler;
        Ok(self)
    }

    /// Replace the pop handler.
    pub fn set_pop_change_handler(
        &mut self,
        handler: Option<Box<dyn ChangeHandler>>,
    ) -> Result<&mut Self, NavError> {
        self.check_modifiable()?;
        self.pop_change_handler = handler;
        Ok(self)
    }

    fn check_modifiable(&self) -> Result<(), NavError> {
        if self.attached_to_router {
            return Err(NavError::InvalidModification(
                "transactions can not be modified after being added to a router",
            ));
        }
        Ok(())
    }

    pub(crate) fn on_attached_to_router(&mut self) {
        self.attached_to_router = true;
    }

    /// Assign an index from `indexer` unless one is already set.
    pub(crate) fn ensure_valid_index(&mut self, indexer: &mut TransactionIndexer) {
        if self.transaction_index.is_none() {
            self.transaction_index = Some(indexer.next_index());
        }
    }

    pub(crate) fn set_transaction_index(&mut self, index: u32) {
        self.transaction_index = Some(index);
    }

    pub(crate) fn save_instance_state(&self, controller_bundle: Bundle, registry: &ClassRegistry) -> Bundle {
        let mut bundle = Bundle::new();
        bundle
            .put_bundle(KEY_CONTROLLER_BUNDLE, controller_bundle)
            .put_bool(KEY_ATTACHED_TO_ROUTER, self.attached_to_router);
        if let Some(handler) = &self.push_change_handler {
            bundle.put_bundle(KEY_PUSH_TRANSITION, handler_to_bundle(handler.as_ref(), registry));
        }
        if let Some(handler) = &self.pop_change_handler {
            bundle.put_bundle(KEY_POP_TRANSITION, handler_to_bundle(handler.as_ref(), registry));
        }
        if let Some(tag) = &self.tag {
            bundle.put_string(KEY_TAG, tag.clone());
        }
        if let Some(index) = self.transaction_index {
            bundle.put_int(KEY_INDEX, i64::from(index));
        }
        bundle
    }

    /// Rebuild a transaction around an already restored `controller`.
    pub(crate) fn restore_instance_state(
        bundle: &Bundle,
        controller: ControllerId,
        registry: &ClassRegistry,
    ) -> Result<Self, NavError> {
        let push_change_handler = match bundle.get_bundle(KEY_PUSH_TRANSITION) {
            Some(bag) => handler_from_bundle(bag, registry)?,
            None => None,
        };
        let pop_change_handler = match bundle.get_bundle(KEY_POP_TRANSITION) {
            Some(bag) => handler_from_bundle(bag, registry)?,
            None => None,
        };
        Ok(Self {
            controller,
            tag: bundle.get_string(KEY_TAG).map(str::to_owned),
            push_change_handler,
            pop_change_handler,
            attached_to_router: bundle.get_bool(KEY_ATTACHED_TO_ROUTER).unwrap_or(false),
            transaction_index: bundle
                .get_int(KEY_INDEX)
                .and_then(|i| u32::try_from(i).ok()),
        })
    }

    pub(crate) fn controller_bundle(bundle: &Bundle) -> Option<&Bundle> {
        bundle.get_bundle(KEY_CONTROLLER_BUNDLE)
    }
}

/// Builder for fresh transactions.
///
/// ```
/// # use understory_nav::{RouterTransaction, SimpleSwapChangeHandler, ControllerId};
/// # fn build(controller: ControllerId) -> RouterTransaction {
/// RouterTransaction::builder(controller)
///     .tag("details")
///     .push_change_handler(SimpleSwapChangeHandler::new(false))
///     .build()
/// # }
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    transaction: RouterTransaction,
}

impl TransactionBuilder {
    /// Set the tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.transaction.tag = Some(tag.into());
        self
    }

    /// Set the push handler.
    pub fn push_change_handler(mut self, handler: impl ChangeHandler) -> Self {
        self.transaction.push_change_handler = Some(Box::new(handler));
        self
    }

    /// Set the pop handler.
    pub fn pop_change_handler(mut self, handler: impl ChangeHandler) -> Self {
        self.transaction.pop_change_handler = Some(Box::new(handler));
        self
    }

    /// Finish.
    pub fn build(self) -> RouterTransaction {
        self.transaction
    }
}

/// Monotonic source of transaction indices, one per root router tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionIndexer {
    current_index: u32,
}

impl TransactionIndexer {
    /// The next index. Starts at zero and stops growing at `u32::MAX`.
    pub fn next_index(&mut self) -> u32 {
        let index = self.current_index;
        self.current_index = self.current_index.saturating_add(1);
        index
    }

    pub(crate) fn save_instance_state(&self) -> Bundle {
        let mut bundle = Bundle::new();
        bundle.put_int(KEY_CURRENT_INDEX, i64::from(self.current_index));
        bundle
    }

    pub(crate) fn restore_instance_state(bundle: &Bundle) -> Self {
        Self {
            current_index: bundle
                .get_int(KEY_CURRENT_INDEX)
                .and_then(|i| u32::try_from(i).ok())
                .unwrap_or(0),
        }
    }
}
