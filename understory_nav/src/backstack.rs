// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The ordered stack of transactions owned by a router.
//!
//! The backstack only orders transactions. Destroying controllers is the router's job:
//! every operation that drops transactions hands them back so the router can destroy the
//! controllers they wrap.

use std::collections::VecDeque;

use crate::arena::ControllerId;
use crate::bundle::Bundle;
use crate::error::NavError;
use crate::transaction::RouterTransaction;

const KEY_ENTRIES: &str = "entries";

/// Transactions from root (bottom) to top.
#[derive(Clone, Debug, Default)]
pub struct Backstack {
    entries: VecDeque<RouterTransaction>,
}

impl Backstack {
    /// An empty backstack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backstack is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Put a transaction on top.
    pub fn push(&mut self, transaction: RouterTransaction) {
        self.entries.push_back(transaction);
    }

    /// Take the top transaction.
    pub fn pop(&mut self) -> Result<RouterTransaction, NavError> {
        self.entries.pop_back().ok_or(NavError::EmptyStack)
    }

    /// The top transaction.
    pub fn peek(&self) -> Option<&RouterTransaction> {
        self.entries.back()
    }

    /// The bottom transaction.
    pub fn root(&self) -> Option<&RouterTransaction> {
        self.entries.front()
    }

    /// Pop until the transaction of `controller` is on top; returns the popped ones, top first.
    pub fn pop_to(&mut self, controller: ControllerId) -> Result<Vec<RouterTransaction>, NavError> {
        if !self.contains(controller) {
            return Err(NavError::NotOnStack);
        }
        let mut popped = Vec::new();
        while let Some(top) = self.entries.back() {
            if top.controller() == controller {
                break;
            }
            popped.extend(self.entries.pop_back());
        }
        Ok(popped)
    }

    /// Pop everything; returns the popped transactions, top first.
    pub fn pop_all(&mut self) -> Vec<RouterTransaction> {
        self.entries.drain(..).rev().collect()
    }

    /// Remove the transaction of `controller`, wherever it is.
    pub fn remove(&mut self, controller: ControllerId) -> Option<RouterTransaction> {
        let position = self.position(controller)?;
        self.entries.remove(position)
    }

    /// Replace the contents with `transactions` (bottom to top); returns the old transactions
    /// whose controllers are absent from the new list.
    pub fn set_backstack(&mut self, transactions: Vec<RouterTransaction>) -> Vec<RouterTransaction> {
        let old = core::mem::take(&mut self.entries);
        self.entries = transactions.into();
        old.into_iter()
            .rev()
            .filter(|t| !self.contains(t.controller()))
            .collect()
    }

    /// Whether `controller` has a transaction here.
    pub fn contains(&self, controller: ControllerId) -> bool {
        self.position(controller).is_some()
    }

    /// Transaction of `controller`.
    pub fn find(&self, controller: ControllerId) -> Option<&RouterTransaction> {
        self.entries.iter().find(|t| t.controller() == controller)
    }

    pub(crate) fn find_mut(&mut self, controller: ControllerId) -> Option<&mut RouterTransaction> {
        self.entries.iter_mut().find(|t| t.controller() == controller)
    }

    /// Topmost transaction carrying `tag`.
    pub fn find_by_tag(&self, tag: &str) -> Option<&RouterTransaction> {
        self.iter().find(|t| t.tag() == Some(tag))
    }

    /// Top to bottom.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RouterTransaction> + '_ {
        self.entries.iter().rev()
    }

    /// Bottom to top.
    pub fn reverse_iter(&self) -> impl DoubleEndedIterator<Item = &RouterTransaction> + '_ {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RouterTransaction> + '_ {
        self.entries.iter_mut()
    }

    /// Controllers from top to bottom.
    pub fn controllers(&self) -> Vec<ControllerId> {
        self.iter().map(RouterTransaction::controller).collect()
    }

    fn position(&self, controller: ControllerId) -> Option<usize> {
        self.entries.iter().position(|t| t.controller() == controller)
    }

    /// Save every transaction (bottom to top) under `entries`.
    pub(crate) fn save_instance_state(
        &self,
        mut save_transaction: impl FnMut(&RouterTransaction) -> Bundle,
    ) -> Bundle {
        let entries = self.entries.iter().map(&mut save_transaction).collect();
        let mut bundle = Bundle::new();
        bundle.put_bundle_list(KEY_ENTRIES, entries);
        bundle
    }

    /// Rebuild a backstack saved with [`Backstack::save_instance_state`].
    pub(crate) fn restore_instance_state(
        bundle: &Bundle,
        mut restore_transaction: impl FnMut(&Bundle) -> Result<RouterTransaction, NavError>,
    ) -> Result<Self, NavError> {
        let mut backstack = Self::new();
        for entry in bundle.get_bundle_list(KEY_ENTRIES).unwrap_or_default() {
            backstack.push(restore_transaction(entry)?);
        }
        Ok(backstack)
    }
}
