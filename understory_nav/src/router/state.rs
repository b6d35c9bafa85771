// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Router state bags.

use std::rc::Rc;

use tracing::debug;

use crate::arena::RouterId;
use crate::backstack::Backstack;
use crate::bundle::Bundle;
use crate::error::NavError;
use crate::lifecycle_handler::LifecycleHandler;
use crate::router::RouterHost;
use crate::transaction::{RouterTransaction, TransactionIndexer};

const KEY_BACKSTACK: &str = "backstack";
const KEY_POPS_LAST_VIEW: &str = "popsLastView";
const KEY_HOST_ID: &str = "hostId";
const KEY_TAG: &str = "tag";
const KEY_TRANSACTION_INDEXER: &str = "transactionIndexer";

impl LifecycleHandler {
    /// Save `router`, marking everything currently shown for re-attachment.
    pub(crate) fn save_router(&mut self, router: RouterId) -> Bundle {
        self.prepare_router_for_host_detach(router);
        let Some(r) = self.routers.get(router) else {
            return Bundle::new();
        };
        let backstack = r.backstack.clone();
        let pops_last_view = r.pops_last_view;
        let host = r.host.clone();
        let indexer = r.indexer.save_instance_state();

        let registry = Rc::clone(&self.registry);
        let entries = backstack.save_instance_state(|transaction| {
            let controller = self.save_controller(transaction.controller());
            transaction.save_instance_state(controller, &registry)
        });
        let mut out = Bundle::new();
        out.put_bundle(KEY_BACKSTACK, entries)
            .put_bool(KEY_POPS_LAST_VIEW, pops_last_view);
        match host {
            RouterHost::Activity { .. } => {
                out.put_bundle(KEY_TRANSACTION_INDEXER, indexer);
            }
            RouterHost::Controller { host_id, tag, .. } => {
                out.put_int(KEY_HOST_ID, i64::from(host_id));
                if let Some(tag) = tag {
                    out.put_string(KEY_TAG, tag);
                }
            }
        }
        debug!(?router, controllers = backstack.len(), "router saved");
        out
    }

    /// Rebuild `router`'s backstack from `saved`, recreating its controllers.
    pub(crate) fn restore_router_state(
        &mut self,
        router: RouterId,
        saved: &Bundle,
    ) -> Result<(), NavError> {
        let registry = Rc::clone(&self.registry);
        let entries = saved
            .get_bundle(KEY_BACKSTACK)
            .ok_or(NavError::MissingState(KEY_BACKSTACK))?;
        let backstack = Backstack::restore_instance_state(entries, |bag| {
            let controller_bag = RouterTransaction::controller_bundle(bag)
                .ok_or(NavError::MissingState("controller.bundle"))?;
            let controller = self.restore_controller(controller_bag)?;
            RouterTransaction::restore_instance_state(bag, controller, &registry)
        })?;

        let r = self.routers.get_mut(router).ok_or(NavError::StaleRouter)?;
        r.backstack = backstack;
        r.pops_last_view = saved.get_bool(KEY_POPS_LAST_VIEW).unwrap_or(false);
        match &mut r.host {
            RouterHost::Activity { .. } => {
                if let Some(bag) = saved.get_bundle(KEY_TRANSACTION_INDEXER) {
                    r.indexer = TransactionIndexer::restore_instance_state(bag);
                }
            }
            RouterHost::Controller { host_id, tag, .. } => {
                if let Some(id) = saved.get_int(KEY_HOST_ID).and_then(|i| u32::try_from(i).ok()) {
                    *host_id = id;
                }
                *tag = saved.get_string(KEY_TAG).map(str::to_owned);
            }
        }
        let bottom_up: Vec<_> = r
            .backstack
            .reverse_iter()
            .map(RouterTransaction::controller)
            .collect();
        debug!(?router, controllers = bottom_up.len(), "router restored");
        for controller in bottom_up {
            self.set_controller_router(controller, router);
        }
        Ok(())
    }
}
