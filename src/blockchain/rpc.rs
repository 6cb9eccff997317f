// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Chain RPC abstraction shared by the builder, relay and confirmation poller.
//!
//! ## Failure classes
//!
//! | Variant | Meaning | Retried |
//! |---------|---------|---------|
//! | `Unavailable` | request never reached a node (connect failure, 429, 503) | yes |
//! | `Timeout` | request may have been processed (timeout, other 5xx) | yes |
//! | `Rejected` | node answered and refused the request | no |
//! | `InvalidResponse` | node answered with something unparseable | no |
//!
//! The distinction between `Unavailable` and `Timeout` matters for broadcasts:
//! only the former proves the transaction was never seen.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::solana::wire::Blockhash;
use super::types::ChainFamily;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("RPC endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("RPC request timed out: {0}")]
    Timeout(String),

    #[error("RPC request rejected: {0}")]
    Rejected(String),

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

impl RpcError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Unavailable(_) | RpcError::Timeout(_))
    }

    /// Classify a transport error from `reqwest`.
    pub fn from_transport(context: &str, err: &reqwest::Error) -> Self {
        if err.is_connect() {
            RpcError::Unavailable(format!("{context}: {err}"))
        } else if err.is_timeout() {
            RpcError::Timeout(format!("{context}: {err}"))
        } else if err.is_decode() {
            RpcError::InvalidResponse(format!("{context}: {err}"))
        } else {
            // The request may have been written before the failure.
            RpcError::Timeout(format!("{context}: {err}"))
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(context: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("{context} returned {status}: {body}");
        match status.as_u16() {
            429 | 502 | 503 => RpcError::Unavailable(detail),
            500..=599 => RpcError::Timeout(detail),
            _ => RpcError::Rejected(detail),
        }
    }
}

/// Confirmation state as reported by the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OnChainStatus {
    /// Node has never heard of the transaction.
    Unknown,
    /// Seen but not yet at the confirmation level we accept.
    Pending,
    Confirmed,
    Failed,
}

/// Transfer shape used to estimate gas on EVM chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedCall {
    pub from: String,
    pub to: String,
    pub value: u128,
    pub data: Vec<u8>,
}

/// Chain state needed to assemble an unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    Solana {
        recent_blockhash: Blockhash,
    },
    Evm {
        chain_id: u64,
        nonce: u64,
        gas_limit: u64,
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

/// Read and broadcast access to one chain family.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Decimals of an SPL mint or ERC-20 contract.
    async fn token_decimals(&self, token: &str) -> Result<u8, RpcError>;

    async fn chain_state(&self, call: &UnsignedCall) -> Result<ChainState, RpcError>;

    /// Broadcast a fully signed transaction; returns the chain's transaction id.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, RpcError>;

    async fn transaction_status(&self, signature: &str) -> Result<OnChainStatus, RpcError>;

    /// Count of transactions from `address` included in the latest block.
    ///
    /// `None` on chains without account nonces.
    async fn mined_nonce(&self, _address: &str) -> Result<Option<u64>, RpcError> {
        Ok(None)
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Bounded exponential backoff for transient RPC failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
///
/// If any attempt timed out the final error is reported as `Timeout`, whatever
/// later attempts returned: the request may already have landed, and a later
/// rejection is often the node refusing a duplicate of it.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let attempts = policy.attempts.max(1);
    let mut ambiguous = None;
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                tracing::warn!(
                    operation,
                    attempt = attempt + 1,
                    error = %e,
                    "Transient RPC failure, retrying"
                );
                if matches!(e, RpcError::Timeout(_)) {
                    ambiguous = Some(e);
                }
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(ambiguous.unwrap_or(e)),
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One RPC client per configured chain family.
#[derive(Clone, Default)]
pub struct RpcRegistry {
    clients: HashMap<ChainFamily, Arc<dyn ChainRpc>>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, client: Arc<dyn ChainRpc>) {
        self.clients.insert(client.family(), client);
    }

    pub fn with(mut self, client: Arc<dyn ChainRpc>) -> Self {
        self.insert(client);
        self
    }

    pub fn get(&self, family: ChainFamily) -> Option<Arc<dyn ChainRpc>> {
        self.clients.get(&family).cloned()
    }

    pub fn families(&self) -> impl Iterator<Item = ChainFamily> + '_ {
        self.clients.keys().copied()
    }
}

impl std::fmt::Debug for RpcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcRegistry")
            .field("families", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RpcError::Unavailable("down".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::Rejected("bad".into()))
        })
        .await;
        assert!(matches!(result, Err(RpcError::Rejected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn earlier_timeout_taints_final_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RpcError::Timeout("slow".into()))
            } else {
                Err(RpcError::Unavailable("down".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(RpcError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejection_after_timeout_stays_ambiguous() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RpcError::Timeout("slow".into()))
            } else {
                Err(RpcError::Rejected("nonce too low".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(RpcError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            RpcError::from_status("x", StatusCode::TOO_MANY_REQUESTS, ""),
            RpcError::Unavailable(_)
        ));
        assert!(matches!(
            RpcError::from_status("x", StatusCode::GATEWAY_TIMEOUT, ""),
            RpcError::Timeout(_)
        ));
        assert!(matches!(
            RpcError::from_status("x", StatusCode::BAD_REQUEST, ""),
            RpcError::Rejected(_)
        ));
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }
}
