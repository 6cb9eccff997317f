// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Confirmation Poller
//!
//! Background task that moves `pending` transfers to `confirmed` or `failed`
//! even when no client is polling `/v1/transfers/{signature}`.
//!
//! Every `poll_interval` (default 10 s) the poller takes the next window of
//! pending signatures from the ledger and asks the chain for each one's
//! status once. Windows advance through the pending set and wrap at its end,
//! so a block of transfers that never settles cannot starve the rest.
//! Transfers on chains without a configured client are skipped. Transfers
//! the chain has never seen are marked failed once they are known dropped.
//!
//! Each sweep also purges expired sign-in challenges.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::relay::TransactionRelay;
use super::rpc::RpcRegistry;
use crate::storage::{ChallengeRepository, Store, TransactionLedger, TransferStatus};

/// Default interval between polling sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on transfers checked per sweep.
const SWEEP_LIMIT: usize = 200;

pub struct ConfirmationPoller {
    store: Arc<Store>,
    rpc: Arc<RpcRegistry>,
    poll_interval: Duration,
    /// Last signature checked; the next sweep starts after it.
    cursor: Option<String>,
}

impl ConfirmationPoller {
    pub fn new(store: Arc<Store>, rpc: Arc<RpcRegistry>) -> Self {
        Self {
            store,
            rpc,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cursor: None,
        }
    }

    pub fn with_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the poller loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(poller.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Confirmation poller starting"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Confirmation poller shutting down");
                return;
            }

            self.poll_step().await;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Confirmation poller shutting down");
                    return;
                }
            }
        }
    }

    /// One sweep: purge expired challenges, then check the next window of
    /// pending transfers. Returns how many transfers settled.
    pub async fn poll_step(&mut self) -> usize {
        match ChallengeRepository::new(&self.store).purge_expired(Utc::now()) {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged expired challenges"),
            Err(e) => warn!(error = %e, "Confirmation poller: failed to purge challenges"),
        }

        let rpc = &self.rpc;
        let page = match TransactionLedger::new(&self.store).list_pending_after(
            self.cursor.as_deref(),
            SWEEP_LIMIT,
            |chain| rpc.get(chain).is_some(),
        ) {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "Confirmation poller: failed to list pending transfers");
                return 0;
            }
        };
        self.cursor = page.next_cursor;
        let pending = page.items;
        if pending.is_empty() {
            return 0;
        }

        let relay = TransactionRelay::new(&self.store, &self.rpc);
        let mut settled = 0;
        for record in &pending {
            match relay.refresh(&record.signature).await {
                Ok(updated) if updated.status != TransferStatus::Pending => {
                    settled += 1;
                    info!(
                        signature = %updated.signature,
                        status = updated.status.as_str(),
                        "Confirmation poller: transfer settled"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        signature = %record.signature,
                        error = %e,
                        "Confirmation poller: failed to refresh transfer"
                    );
                }
            }
        }
        settled
    }
}
