// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed transaction re-validation, broadcast and confirmation.
//!
//! ## Submit
//!
//! 1. Decode the signed payload (base64 for Solana, hex for EVM).
//! 2. Resolve the expected transfer again from the request fields.
//! 3. Check the transaction against it (signer, recipient, amount, token, memo).
//! 4. A signature already in the ledger is returned as-is, never re-broadcast.
//! 5. Broadcast with bounded retries and record the transfer as `pending`.
//!
//! ## Broadcast outcomes
//!
//! | RPC result | Ledger | Response |
//! |------------|--------|----------|
//! | accepted | pending | `broadcast` |
//! | rejected | nothing | `BroadcastRejected` |
//! | unreachable | nothing | `RelayUnavailable` (safe to retry) |
//! | timed out | pending | `unconfirmed` (poll for status) |

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::builder::{BuildError, TransactionBuilder, TransferIntent};
use super::rpc::{with_retry, ChainRpc, OnChainStatus, RetryPolicy, RpcError, RpcRegistry};
use super::types::{ChainAddress, ChainFamily, ChainKind};
use super::{evm, solana};
use crate::storage::{
    LedgerError, RecordOutcome, Store, StoreError, TransactionLedger, TransferRecord,
    TransferStatus,
};

/// Transfers the chain has never heard of after this long are marked failed.
const DROP_AFTER: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Transaction does not match the request: {0}")]
    TransactionMismatch(String),

    #[error(transparent)]
    InvalidRequest(BuildError),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<BuildError> for SubmitError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::RelayUnavailable(msg) => SubmitError::RelayUnavailable(msg),
            BuildError::Store(e) => SubmitError::Store(e),
            other => SubmitError::InvalidRequest(other),
        }
    }
}

/// What happened to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmitState {
    /// Accepted by the node
    Broadcast,
    /// Signature already known; nothing was sent
    Duplicate,
    /// Broadcast timed out; the transfer may or may not land
    Unconfirmed,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub record: TransferRecord,
    pub state: SubmitState,
}

/// Expected transfer, as requested by the client.
#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'r> {
    pub signed_transaction: &'r str,
    pub recipient_username: &'r str,
    pub amount: &'r str,
    pub token: &'r str,
    pub memo: Option<&'r str>,
}

/// Decode a signed payload for `chain`.
pub fn decode_payload(chain: ChainFamily, payload: &str) -> Result<Vec<u8>, SubmitError> {
    let payload = payload.trim();
    let decoded = match chain.kind() {
        ChainKind::Solana => base64::engine::general_purpose::STANDARD
            .decode(payload)
            .or_else(|_| bs58::decode(payload).into_vec())
            .map_err(|_| "expected base64"),
        ChainKind::Evm => {
            let hex = payload.strip_prefix("0x").unwrap_or(payload);
            alloy::hex::decode(hex).map_err(|_| "expected hex")
        }
    };
    match decoded {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        Ok(_) => Err(SubmitError::MalformedTransaction("empty payload".to_string())),
        Err(reason) => Err(SubmitError::MalformedTransaction(reason.to_string())),
    }
}

/// Check `raw` against `intent`; returns the transaction id and, for EVM,
/// the account nonce it consumes.
fn verify_against(raw: &[u8], intent: &TransferIntent) -> Result<(String, Option<u64>), SubmitError> {
    match intent.chain.kind() {
        ChainKind::Solana => {
            let tx = solana::Transaction::deserialize(raw)
                .map_err(|e| SubmitError::MalformedTransaction(e.to_string()))?;
            solana::transfer::check_transfer(&tx, intent)?;
            let id = tx
                .id()
                .ok_or_else(|| SubmitError::MalformedTransaction("no signatures".to_string()))?;
            Ok((id, None))
        }
        ChainKind::Evm => {
            let checked = evm::transfer::check_transfer(raw, intent)?;
            Ok((checked.hash, Some(checked.nonce)))
        }
    }
}

pub struct TransactionRelay<'a> {
    store: &'a Store,
    rpc: &'a RpcRegistry,
    retry: RetryPolicy,
}

impl<'a> TransactionRelay<'a> {
    pub fn new(store: &'a Store, rpc: &'a RpcRegistry) -> Self {
        Self {
            store,
            rpc,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn client(&self, chain: ChainFamily) -> Result<Arc<dyn ChainRpc>, SubmitError> {
        self.rpc
            .get(chain)
            .ok_or_else(|| SubmitError::RelayUnavailable(format!("no RPC configured for {chain}")))
    }

    /// Validate a signed transfer from `sender` and broadcast it.
    pub async fn submit(
        &self,
        sender: &ChainAddress,
        request: SubmitRequest<'_>,
    ) -> Result<SubmitOutcome, SubmitError> {
        let raw = decode_payload(sender.chain, request.signed_transaction)?;
        let intent = TransactionBuilder::new(self.store, self.rpc)
            .with_retry_policy(self.retry)
            .resolve_intent(
                sender,
                request.recipient_username,
                request.amount,
                request.token,
                request.memo,
            )
            .await?;

        let (signature, nonce) = match verify_against(&raw, &intent) {
            Ok(checked) => checked,
            Err(e) => {
                tracing::warn!(
                    chain = %intent.chain,
                    from = %intent.from,
                    error = %e,
                    "Rejected submitted transaction"
                );
                return Err(e);
            }
        };

        let ledger = TransactionLedger::new(self.store);
        if let Some(existing) = ledger.get(&signature)? {
            tracing::info!(signature = %signature, "Duplicate submission, not re-broadcasting");
            return Ok(SubmitOutcome {
                record: existing,
                state: SubmitState::Duplicate,
            });
        }

        let client = self.client(intent.chain)?;
        let sent = with_retry(&self.retry, "send_raw_transaction", || {
            client.send_raw_transaction(&raw)
        })
        .await;

        let state = match sent {
            Ok(returned) => {
                if returned != signature {
                    tracing::warn!(
                        signature = %signature,
                        returned = %returned,
                        "Node returned a different transaction id"
                    );
                }
                SubmitState::Broadcast
            }
            Err(RpcError::Timeout(msg)) => {
                tracing::warn!(signature = %signature, error = %msg, "Broadcast outcome unknown");
                SubmitState::Unconfirmed
            }
            Err(RpcError::Unavailable(msg)) => {
                tracing::warn!(signature = %signature, error = %msg, "Relay unavailable");
                return Err(SubmitError::RelayUnavailable(msg));
            }
            Err(e @ (RpcError::Rejected(_) | RpcError::InvalidResponse(_))) => {
                tracing::warn!(signature = %signature, error = %e, "Broadcast rejected");
                return Err(SubmitError::BroadcastRejected(e.to_string()));
            }
        };

        let now = Utc::now();
        let record = TransferRecord {
            explorer_url: intent.chain.explorer_tx_url(&signature),
            signature,
            chain: intent.chain,
            from_address: intent.from,
            to_address: intent.to,
            to_username: intent.to_username,
            amount: intent.amount,
            token: intent.token.token.identifier().to_string(),
            token_symbol: intent.token.symbol,
            memo: intent.memo,
            status: TransferStatus::Pending,
            nonce,
            created_at: now,
            updated_at: now,
        };

        let (record, state) = match ledger.record(&record)? {
            RecordOutcome::Inserted(record) => (record, state),
            RecordOutcome::Duplicate(existing) => (existing, SubmitState::Duplicate),
        };
        tracing::info!(
            signature = %record.signature,
            chain = %record.chain,
            from = %record.from_address,
            to = %record.to_address,
            amount = %record.amount,
            state = ?state,
            "Transfer relayed"
        );
        Ok(SubmitOutcome { record, state })
    }

    /// Query the chain once and move the record out of `pending` if settled.
    pub async fn refresh(&self, signature: &str) -> Result<TransferRecord, SubmitError> {
        let record = TransactionLedger::new(self.store)
            .get(signature)?
            .ok_or_else(|| SubmitError::NotFound(signature.to_string()))?;
        if record.status.is_terminal() {
            return Ok(record);
        }
        let client = self.client(record.chain)?;
        match client.transaction_status(signature).await {
            Ok(OnChainStatus::Unknown) => {
                let dropped = is_dropped(&record, client.as_ref(), Utc::now()).await;
                self.apply(record, OnChainStatus::Unknown, dropped)
            }
            Ok(status) => self.apply(record, status, false),
            Err(e) => {
                tracing::debug!(signature, error = %e, "Status check failed");
                Ok(record)
            }
        }
    }

    /// Poll with bounded backoff until the transfer settles.
    ///
    /// Running out of attempts leaves the record `pending`.
    pub async fn confirm(&self, signature: &str) -> Result<TransferRecord, SubmitError> {
        let attempts = self.retry.attempts.max(1);
        let mut record = self.refresh(signature).await?;
        for attempt in 1..attempts {
            if record.status.is_terminal() {
                break;
            }
            tokio::time::sleep(self.retry.delay_for(attempt - 1)).await;
            record = self.refresh(signature).await?;
        }
        Ok(record)
    }

    fn apply(
        &self,
        record: TransferRecord,
        status: OnChainStatus,
        dropped: bool,
    ) -> Result<TransferRecord, SubmitError> {
        let next = match status {
            OnChainStatus::Confirmed => TransferStatus::Confirmed,
            OnChainStatus::Failed => TransferStatus::Failed,
            OnChainStatus::Unknown if dropped => TransferStatus::Failed,
            OnChainStatus::Unknown | OnChainStatus::Pending => return Ok(record),
        };
        match TransactionLedger::new(self.store).update_status(&record.signature, next) {
            Ok(updated) => Ok(updated),
            // Another task settled it first
            Err(LedgerError::TerminalState { .. }) => TransactionLedger::new(self.store)
                .get(&record.signature)?
                .ok_or_else(|| SubmitError::NotFound(record.signature.clone())),
            Err(LedgerError::NotFound(sig)) => Err(SubmitError::NotFound(sig)),
            Err(LedgerError::Store(e)) => Err(SubmitError::Store(e)),
        }
    }
}

fn outlived_drop_window(record: &TransferRecord, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(DROP_AFTER)
        .map(|window| now - record.created_at > window)
        .unwrap_or(false)
}

/// Whether a transfer the node no longer knows about can be written off.
///
/// EVM transactions can sit unseen in a mempool and still be mined, so they
/// only count as dropped once the sender's mined nonce has moved past the
/// one they consume.
async fn is_dropped(record: &TransferRecord, client: &dyn ChainRpc, now: DateTime<Utc>) -> bool {
    if !outlived_drop_window(record, now) {
        return false;
    }
    match record.chain.kind() {
        ChainKind::Solana => true,
        ChainKind::Evm => {
            let Some(nonce) = record.nonce else {
                return false;
            };
            match client.mined_nonce(&record.from_address).await {
                Ok(Some(mined)) => mined > nonce,
                Ok(None) => false,
                Err(e) => {
                    tracing::debug!(signature = %record.signature, error = %e, "Nonce check failed");
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::{Signer, SigningKey};

    use super::*;
    use crate::blockchain::builder::test_support::*;
    use crate::blockchain::solana::wire::Pubkey;
    use crate::storage::database::test_support::temp_store;

    struct Fixture {
        store: Store,
        rpc: RpcRegistry,
        mock: Arc<MockRpc>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let (store, dir) = temp_store();
        register(&store, ChainFamily::Solana, ALICE, "alice");
        register(&store, ChainFamily::Solana, BOB, "bob");
        let mock = Arc::new(MockRpc::new(ChainFamily::Solana));
        let rpc = RpcRegistry::new().with(mock.clone());
        Fixture {
            store,
            rpc,
            mock,
            _dir: dir,
        }
    }

    fn alice() -> ChainAddress {
        ChainAddress::parse(ChainFamily::Solana, ALICE).unwrap()
    }

    async fn signed_transfer(f: &Fixture, amount: &str, memo: Option<&str>) -> String {
        let prepared = TransactionBuilder::new(&f.store, &f.rpc)
            .prepare(&alice(), "bob", amount, "SOL", memo)
            .await
            .unwrap();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&prepared.transaction)
            .unwrap();
        let mut tx = solana::Transaction::deserialize(&raw).unwrap();
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let sig = key.sign(&tx.message_bytes()).to_bytes();
        tx.add_signature(&Pubkey::new(key.verifying_key().to_bytes()), sig)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(tx.serialize())
    }

    fn request<'r>(payload: &'r str, amount: &'r str, memo: Option<&'r str>) -> SubmitRequest<'r> {
        SubmitRequest {
            signed_transaction: payload,
            recipient_username: "bob",
            amount,
            token: "SOL",
            memo,
        }
    }

    fn relay(f: &Fixture) -> TransactionRelay<'_> {
        TransactionRelay::new(&f.store, &f.rpc).with_retry_policy(fast_retry())
    }

    #[tokio::test]
    async fn submit_broadcasts_and_records_pending() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", Some("rent")).await;

        let outcome = relay(&f)
            .submit(&alice(), request(&payload, "1", Some("rent")))
            .await
            .unwrap();
        assert_eq!(outcome.state, SubmitState::Broadcast);
        assert_eq!(outcome.record.status, TransferStatus::Pending);
        assert_eq!(outcome.record.to_address, BOB);
        assert_eq!(outcome.record.memo.as_deref(), Some("rent"));
        assert_eq!(f.mock.broadcast_count(), 1);
    }

    #[tokio::test]
    async fn duplicate_submission_is_not_rebroadcast() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        let first = relay(&f)
            .submit(&alice(), request(&payload, "1", None))
            .await
            .unwrap();
        let second = relay(&f)
            .submit(&alice(), request(&payload, "1", None))
            .await
            .unwrap();

        assert_eq!(second.state, SubmitState::Duplicate);
        assert_eq!(second.record, first.record);
        assert_eq!(f.mock.broadcast_count(), 1);
        assert_eq!(
            TransactionLedger::new(&f.store)
                .list_for(&alice(), None, 10)
                .unwrap()
                .items
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn mismatched_amount_is_rejected_without_broadcast() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        let result = relay(&f)
            .submit(&alice(), request(&payload, "2", None))
            .await;
        assert!(matches!(result, Err(SubmitError::TransactionMismatch(_))));
        assert_eq!(f.mock.broadcast_count(), 0);
    }

    #[tokio::test]
    async fn payload_for_another_sender_is_rejected() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        let bob = ChainAddress::parse(ChainFamily::Solana, BOB).unwrap();
        // bob sending to bob with alice's transaction
        let result = relay(&f).submit(&bob, request(&payload, "1", None)).await;
        assert!(matches!(result, Err(SubmitError::TransactionMismatch(_))));
    }

    #[tokio::test]
    async fn garbage_payload_is_malformed() {
        let f = fixture();
        let result = relay(&f)
            .submit(&alice(), request("!!notbase64!!", "1", None))
            .await;
        assert!(matches!(result, Err(SubmitError::MalformedTransaction(_))));
    }

    #[tokio::test]
    async fn rejected_broadcast_records_nothing() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        f.mock
            .fail_sends(vec![Err(RpcError::Rejected("insufficient funds".into()))]);

        let result = relay(&f).submit(&alice(), request(&payload, "1", None)).await;
        assert!(matches!(result, Err(SubmitError::BroadcastRejected(_))));
        assert!(TransactionLedger::new(&f.store)
            .list_pending(10)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unreachable_node_is_relay_unavailable() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        f.mock.fail_sends(vec![
            Err(RpcError::Unavailable("down".into())),
            Err(RpcError::Unavailable("down".into())),
            Err(RpcError::Unavailable("down".into())),
        ]);

        let result = relay(&f).submit(&alice(), request(&payload, "1", None)).await;
        assert!(matches!(result, Err(SubmitError::RelayUnavailable(_))));
        assert_eq!(f.mock.broadcast_count(), 3);
        assert!(TransactionLedger::new(&f.store)
            .list_pending(10)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn timeout_records_unconfirmed_pending() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        f.mock.fail_sends(vec![
            Err(RpcError::Timeout("slow".into())),
            Err(RpcError::Timeout("slow".into())),
            Err(RpcError::Timeout("slow".into())),
        ]);

        let outcome = relay(&f)
            .submit(&alice(), request(&payload, "1", None))
            .await
            .unwrap();
        assert_eq!(outcome.state, SubmitState::Unconfirmed);
        assert_eq!(outcome.record.status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn rejection_after_timeout_records_unconfirmed_pending() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        f.mock.fail_sends(vec![
            Err(RpcError::Timeout("slow".into())),
            Err(RpcError::Rejected("already processed".into())),
        ]);

        let outcome = relay(&f)
            .submit(&alice(), request(&payload, "1", None))
            .await
            .unwrap();
        assert_eq!(outcome.state, SubmitState::Unconfirmed);
        assert_eq!(outcome.record.status, TransferStatus::Pending);
        assert_eq!(f.mock.broadcast_count(), 2);
        assert_eq!(
            TransactionLedger::new(&f.store).list_pending(10).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn transient_failure_then_success_is_broadcast() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        f.mock
            .fail_sends(vec![Err(RpcError::Unavailable("blip".into()))]);

        let outcome = relay(&f)
            .submit(&alice(), request(&payload, "1", None))
            .await
            .unwrap();
        assert_eq!(outcome.state, SubmitState::Broadcast);
        assert_eq!(f.mock.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn confirm_settles_or_stays_pending() {
        let f = fixture();
        let payload = signed_transfer(&f, "1", None).await;
        let outcome = relay(&f)
            .submit(&alice(), request(&payload, "1", None))
            .await
            .unwrap();
        let signature = outcome.record.signature;

        f.mock.set_status(OnChainStatus::Pending);
        let still = relay(&f).confirm(&signature).await.unwrap();
        assert_eq!(still.status, TransferStatus::Pending);

        f.mock.set_status(OnChainStatus::Confirmed);
        let done = relay(&f).confirm(&signature).await.unwrap();
        assert_eq!(done.status, TransferStatus::Confirmed);

        // terminal states do not move
        f.mock.set_status(OnChainStatus::Failed);
        let again = relay(&f).refresh(&signature).await.unwrap();
        assert_eq!(again.status, TransferStatus::Confirmed);
    }

    fn stale_record(chain: ChainFamily, from: &str, to: &str, nonce: Option<u64>) -> TransferRecord {
        let now = Utc::now();
        TransferRecord {
            signature: format!("stale-{chain}"),
            chain,
            from_address: from.into(),
            to_address: to.into(),
            to_username: "bob".into(),
            amount: "1".into(),
            token: "native".into(),
            token_symbol: chain.capabilities().native_symbol.into(),
            memo: None,
            status: TransferStatus::Pending,
            explorer_url: String::new(),
            nonce,
            created_at: now - chrono::Duration::minutes(30),
            updated_at: now,
        }
    }

    #[test]
    fn drop_window_is_measured_from_creation() {
        let record = stale_record(ChainFamily::Solana, ALICE, BOB, None);
        let now = Utc::now();
        assert!(outlived_drop_window(&record, now));
        assert!(!outlived_drop_window(&record, now - chrono::Duration::minutes(20)));
    }

    #[tokio::test]
    async fn stale_unknown_solana_transfers_are_dropped() {
        let f = fixture();
        let record = stale_record(ChainFamily::Solana, ALICE, BOB, None);
        TransactionLedger::new(&f.store).record(&record).unwrap();
        f.mock.set_status(OnChainStatus::Unknown);

        let refreshed = relay(&f).refresh(&record.signature).await.unwrap();
        assert_eq!(refreshed.status, TransferStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_evm_transfer_stays_pending_until_its_nonce_is_used() {
        let (store, _dir) = temp_store();
        let mock = Arc::new(MockRpc::new(ChainFamily::Base));
        let rpc = RpcRegistry::new().with(mock.clone());
        let relay = TransactionRelay::new(&store, &rpc).with_retry_policy(fast_retry());
        let record = stale_record(ChainFamily::Base, ALICE_EVM, BOB_EVM, Some(3));
        TransactionLedger::new(&store).record(&record).unwrap();
        mock.set_status(OnChainStatus::Unknown);

        // Still in a mempool somewhere: nonce 3 not mined yet
        mock.set_mined_nonce(3);
        let refreshed = relay.refresh(&record.signature).await.unwrap();
        assert_eq!(refreshed.status, TransferStatus::Pending);

        mock.set_status(OnChainStatus::Confirmed);
        let refreshed = relay.refresh(&record.signature).await.unwrap();
        assert_eq!(refreshed.status, TransferStatus::Confirmed);
    }

    #[tokio::test]
    async fn unknown_evm_transfer_fails_once_its_nonce_is_replaced() {
        let (store, _dir) = temp_store();
        let mock = Arc::new(MockRpc::new(ChainFamily::Base));
        let rpc = RpcRegistry::new().with(mock.clone());
        let relay = TransactionRelay::new(&store, &rpc).with_retry_policy(fast_retry());
        let record = stale_record(ChainFamily::Base, ALICE_EVM, BOB_EVM, Some(3));
        TransactionLedger::new(&store).record(&record).unwrap();
        mock.set_status(OnChainStatus::Unknown);

        let refreshed = relay.refresh(&record.signature).await.unwrap();
        assert_eq!(refreshed.status, TransferStatus::Pending, "no nonce reading yet");

        mock.set_mined_nonce(4);
        let refreshed = relay.refresh(&record.signature).await.unwrap();
        assert_eq!(refreshed.status, TransferStatus::Failed);
    }
}
