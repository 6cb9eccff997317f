// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction ledger: durable record of relayed transfers.
//!
//! ## Storage Layout
//!
//! ```text
//! transfers:         signature → TransferRecord (JSON)
//! transfer_index:    family:address | !timestamp_ms_be | signature → direction
//! pending_transfers: signature → family
//! ```
//!
//! The signature is the idempotence key: `record` is insert-if-absent inside
//! one write transaction. Status only moves out of `pending`, never out of a
//! terminal state.

use std::ops::Bound;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{ChainAddress, ChainFamily};
use crate::storage::database::{
    prefix_end, Store, StoreError, StoreResult, PENDING_TRANSFERS, TRANSFERS, TRANSFER_INDEX,
};

/// Transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Broadcast (or possibly broadcast) but not yet confirmed
    Pending,
    /// Confirmed on chain
    Confirmed,
    /// Landed and failed, or was dropped
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Confirmed => "confirmed",
            TransferStatus::Failed => "failed",
        }
    }
}

/// Which side of a transfer an address was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }

    fn parse(raw: &str) -> Self {
        if raw == "received" {
            Direction::Received
        } else {
            Direction::Sent
        }
    }
}

/// Persisted transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransferRecord {
    /// Chain transaction id (Solana signature or EVM tx hash)
    pub signature: String,
    pub chain: ChainFamily,
    pub from_address: String,
    pub to_address: String,
    /// Recipient username at the time of the transfer
    pub to_username: String,
    /// Normalised decimal amount, e.g. "1.5"
    pub amount: String,
    /// `native` or the mint / contract address
    pub token: String,
    pub token_symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub status: TransferStatus,
    pub explorer_url: String,
    /// Sender account nonce the transaction consumes (EVM only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransferRecord {
    fn directions(&self) -> Vec<(String, Direction)> {
        let from = format!("{}:{}", self.chain, self.from_address);
        let to = format!("{}:{}", self.chain, self.to_address);
        let mut directions = vec![(from.clone(), Direction::Sent)];
        if to != from {
            directions.push((to, Direction::Received));
        }
        directions
    }
}

/// Outcome of `record`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted(TransferRecord),
    /// A record with this signature already existed; it is returned unchanged.
    Duplicate(TransferRecord),
}

impl RecordOutcome {
    pub fn into_record(self) -> TransferRecord {
        match self {
            RecordOutcome::Inserted(record) | RecordOutcome::Duplicate(record) => record,
        }
    }
}

/// A window of the pending set; `next_cursor` is `None` at the end.
#[derive(Debug, Clone)]
pub struct PendingPage {
    pub items: Vec<TransferRecord>,
    pub next_cursor: Option<String>,
}

/// A page of history, newest first.
#[derive(Debug, Clone)]
pub struct TransferPage {
    pub items: Vec<(TransferRecord, Direction)>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Transfer not found: {0}")]
    NotFound(String),

    #[error("Transfer {signature} is already {current}")]
    TerminalState {
        signature: String,
        current: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Format: `family:address | inverted_timestamp_ms_be | signature`.
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(address_key: &str, timestamp_ms: i64, signature: &str) -> Vec<u8> {
    let mut key = make_prefix(address_key);
    key.extend_from_slice(&(!timestamp_ms as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(signature.as_bytes());
    key
}

fn make_prefix(address_key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(address_key.len() + 1 + 8 + 1 + 88);
    prefix.extend_from_slice(address_key.as_bytes());
    prefix.push(b'|');
    prefix
}

fn encode_cursor(key: &[u8]) -> String {
    alloy::hex::encode(key)
}

fn decode_cursor(cursor: &str) -> Option<Vec<u8>> {
    alloy::hex::decode(cursor).ok()
}

// =============================================================================
// TransactionLedger
// =============================================================================

pub struct TransactionLedger<'a> {
    store: &'a Store,
}

impl<'a> TransactionLedger<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert `record` unless its signature is already known.
    pub fn record(&self, record: &TransferRecord) -> StoreResult<RecordOutcome> {
        let json = serde_json::to_vec(record)?;
        let timestamp_ms = record.created_at.timestamp_millis();

        let write_txn = self.store.db().begin_write()?;
        let existing = {
            let mut transfers = write_txn.open_table(TRANSFERS)?;
            let existing_bytes = transfers
                .get(record.signature.as_str())?
                .map(|value| value.value().to_vec());
            match existing_bytes {
                Some(bytes) => Some(serde_json::from_slice::<TransferRecord>(&bytes)?),
                None => {
                    transfers.insert(record.signature.as_str(), json.as_slice())?;

                    let mut index = write_txn.open_table(TRANSFER_INDEX)?;
                    for (address_key, direction) in record.directions() {
                        let key = make_index_key(&address_key, timestamp_ms, &record.signature);
                        index.insert(key.as_slice(), direction.as_str())?;
                    }

                    if record.status == TransferStatus::Pending {
                        let mut pending = write_txn.open_table(PENDING_TRANSFERS)?;
                        pending.insert(record.signature.as_str(), record.chain.as_str())?;
                    }
                    None
                }
            }
        };

        match existing {
            Some(existing) => {
                write_txn.abort()?;
                Ok(RecordOutcome::Duplicate(existing))
            }
            None => {
                write_txn.commit()?;
                Ok(RecordOutcome::Inserted(record.clone()))
            }
        }
    }

    pub fn get(&self, signature: &str) -> StoreResult<Option<TransferRecord>> {
        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(TRANSFERS)?;
        match table.get(signature)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Sent and received transfers for `address`, newest first.
    pub fn list_for(
        &self,
        address: &ChainAddress,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<TransferPage> {
        let read_txn = self.store.db().begin_read()?;
        let index = read_txn.open_table(TRANSFER_INDEX)?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let prefix = make_prefix(&address.key());
        let end = prefix_end(&prefix);
        let start = cursor
            .and_then(decode_cursor)
            .filter(|key| key.starts_with(&prefix))
            .unwrap_or_else(|| prefix.clone());
        let skip_cursor = start != prefix;

        let mut items = Vec::with_capacity(limit.min(100));
        let mut last_key: Option<Vec<u8>> = None;
        let signature_offset = prefix.len() + 8 + 1;

        for entry in index.range(start.as_slice()..end.as_slice())? {
            if items.len() >= limit {
                break;
            }
            let (key, direction) = entry?;
            let key_bytes = key.value().to_vec();
            if skip_cursor && key_bytes == start {
                continue;
            }
            let Some(signature) = key_bytes
                .get(signature_offset..)
                .and_then(|raw| std::str::from_utf8(raw).ok())
                .map(str::to_owned)
            else {
                continue;
            };
            if let Some(value) = transfers.get(signature.as_str())? {
                let record: TransferRecord = serde_json::from_slice(value.value())?;
                items.push((record, Direction::parse(direction.value())));
                last_key = Some(key_bytes);
            }
        }

        let next_cursor = if items.len() >= limit {
            last_key.map(|k| encode_cursor(&k))
        } else {
            None
        };
        Ok(TransferPage { items, next_cursor })
    }

    /// Move a transfer to `status`.
    ///
    /// Same-status updates are a no-op. Leaving `confirmed` or `failed` is
    /// rejected with `TerminalState`.
    pub fn update_status(
        &self,
        signature: &str,
        status: TransferStatus,
    ) -> Result<TransferRecord, LedgerError> {
        let write_txn = self.store.db().begin_write().map_err(StoreError::from)?;
        let result = {
            let mut transfers = write_txn.open_table(TRANSFERS).map_err(StoreError::from)?;
            let existing_bytes = transfers
                .get(signature)
                .map_err(StoreError::from)?
                .map(|value| value.value().to_vec());
            let Some(bytes) = existing_bytes else {
                return Err(LedgerError::NotFound(signature.to_string()));
            };
            let mut record: TransferRecord =
                serde_json::from_slice(&bytes).map_err(StoreError::from)?;

            if record.status == status {
                Ok(None)
            } else if record.status.is_terminal() {
                Err(LedgerError::TerminalState {
                    signature: signature.to_string(),
                    current: record.status.as_str(),
                })
            } else {
                record.status = status;
                record.updated_at = Utc::now();
                let json = serde_json::to_vec(&record).map_err(StoreError::from)?;
                transfers
                    .insert(signature, json.as_slice())
                    .map_err(StoreError::from)?;
                if status.is_terminal() {
                    let mut pending = write_txn
                        .open_table(PENDING_TRANSFERS)
                        .map_err(StoreError::from)?;
                    pending.remove(signature).map_err(StoreError::from)?;
                }
                Ok(Some(record))
            }
        };

        match result {
            Ok(Some(record)) => {
                write_txn.commit().map_err(StoreError::from)?;
                tracing::info!(
                    signature,
                    status = record.status.as_str(),
                    "Transfer status updated"
                );
                Ok(record)
            }
            Ok(None) => {
                write_txn.abort().map_err(StoreError::from)?;
                self.get(signature)?
                    .ok_or_else(|| LedgerError::NotFound(signature.to_string()))
            }
            Err(e) => {
                write_txn.abort().map_err(StoreError::from)?;
                Err(e)
            }
        }
    }

    /// Pending transfers in signature order, up to `limit`.
    pub fn list_pending(&self, limit: usize) -> StoreResult<Vec<TransferRecord>> {
        Ok(self.list_pending_after(None, limit, |_| true)?.items)
    }

    /// Pending transfers on chains accepted by `include`, in signature order,
    /// starting after the `after` signature.
    ///
    /// `next_cursor` is the last signature returned when the page is full, so
    /// a sweep can resume there instead of rereading the same window.
    pub fn list_pending_after(
        &self,
        after: Option<&str>,
        limit: usize,
        include: impl Fn(ChainFamily) -> bool,
    ) -> StoreResult<PendingPage> {
        let read_txn = self.store.db().begin_read()?;
        let pending = read_txn.open_table(PENDING_TRANSFERS)?;
        let transfers = read_txn.open_table(TRANSFERS)?;

        let start: Bound<&str> = match after {
            Some(signature) => Bound::Excluded(signature),
            None => Bound::Unbounded,
        };
        let mut items = Vec::new();
        for entry in pending.range::<&str>((start, Bound::Unbounded))? {
            if items.len() >= limit {
                break;
            }
            let (signature, chain) = entry?;
            match ChainFamily::from_str(chain.value()) {
                Ok(chain) if include(chain) => {}
                _ => continue,
            }
            if let Some(value) = transfers.get(signature.value())? {
                items.push(serde_json::from_slice::<TransferRecord>(value.value())?);
            }
        }
        let next_cursor = if items.len() >= limit {
            items.last().map(|record| record.signature.clone())
        } else {
            None
        };
        Ok(PendingPage { items, next_cursor })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::temp_store;

    const ALICE: &str = "GmaDrppBC7P5ARKV8g3djiwP89vz1jLK23V2GBjuAEGB";
    const BOB: &str = "J2xccRtuG43drESLYznHhLhQkLTdfepcKYbiQ9BsJVaf";

    fn sample(signature: &str, from: &str, to: &str) -> TransferRecord {
        let now = Utc::now();
        TransferRecord {
            signature: signature.to_string(),
            chain: ChainFamily::Solana,
            from_address: from.to_string(),
            to_address: to.to_string(),
            to_username: "bob".to_string(),
            amount: "1.5".to_string(),
            token: "native".to_string(),
            token_symbol: "SOL".to_string(),
            memo: Some("lunch".to_string()),
            status: TransferStatus::Pending,
            explorer_url: format!("https://solscan.io/tx/{signature}"),
            nonce: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn addr(address: &str) -> ChainAddress {
        ChainAddress::parse(ChainFamily::Solana, address).unwrap()
    }

    #[test]
    fn record_is_insert_if_absent() {
        let (store, _dir) = temp_store();
        let ledger = TransactionLedger::new(&store);
        let first = sample("sig1", ALICE, BOB);
        assert!(matches!(ledger.record(&first).unwrap(), RecordOutcome::Inserted(_)));

        let mut replay = first.clone();
        replay.amount = "999".to_string();
        match ledger.record(&replay).unwrap() {
            RecordOutcome::Duplicate(existing) => assert_eq!(existing, first),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ledger.get("sig1").unwrap().unwrap().amount, "1.5");
        assert_eq!(ledger.list_for(&addr(ALICE), None, 10).unwrap().items.len(), 1);
    }

    #[test]
    fn history_has_both_directions_newest_first() {
        let (store, _dir) = temp_store();
        let ledger = TransactionLedger::new(&store);

        let mut older = sample("sig-old", ALICE, BOB);
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        let newer = sample("sig-new", BOB, ALICE);
        ledger.record(&older).unwrap();
        ledger.record(&newer).unwrap();

        let page = ledger.list_for(&addr(ALICE), None, 10).unwrap();
        let listed: Vec<_> = page
            .items
            .iter()
            .map(|(record, direction)| (record.signature.as_str(), *direction))
            .collect();
        assert_eq!(
            listed,
            vec![("sig-new", Direction::Received), ("sig-old", Direction::Sent)]
        );
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn list_for_with_pagination() {
        let (store, _dir) = temp_store();
        let ledger = TransactionLedger::new(&store);
        for i in 0..5 {
            let mut record = sample(&format!("sig{i}"), ALICE, BOB);
            record.created_at = Utc::now() - chrono::Duration::seconds(5 - i);
            ledger.record(&record).unwrap();
        }

        let page1 = ledger.list_for(&addr(ALICE), None, 2).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert_eq!(page1.items[0].0.signature, "sig4");
        let page2 = ledger
            .list_for(&addr(ALICE), page1.next_cursor.as_deref(), 2)
            .unwrap();
        assert_eq!(page2.items.len(), 2);
        assert_eq!(page2.items[0].0.signature, "sig2");
        let page3 = ledger
            .list_for(&addr(ALICE), page2.next_cursor.as_deref(), 2)
            .unwrap();
        assert_eq!(page3.items.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[test]
    fn status_is_monotonic() {
        let (store, _dir) = temp_store();
        let ledger = TransactionLedger::new(&store);
        ledger.record(&sample("sig1", ALICE, BOB)).unwrap();
        assert_eq!(ledger.list_pending(10).unwrap().len(), 1);

        let confirmed = ledger.update_status("sig1", TransferStatus::Confirmed).unwrap();
        assert_eq!(confirmed.status, TransferStatus::Confirmed);
        assert!(ledger.list_pending(10).unwrap().is_empty());

        // idempotent
        assert_eq!(
            ledger
                .update_status("sig1", TransferStatus::Confirmed)
                .unwrap()
                .status,
            TransferStatus::Confirmed
        );

        assert!(matches!(
            ledger.update_status("sig1", TransferStatus::Failed),
            Err(LedgerError::TerminalState { current: "confirmed", .. })
        ));
        assert!(matches!(
            ledger.update_status("sig1", TransferStatus::Pending),
            Err(LedgerError::TerminalState { .. })
        ));
        assert!(matches!(
            ledger.update_status("nope", TransferStatus::Failed),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn pending_listing_resumes_after_cursor_and_filters_chains() {
        let (store, _dir) = temp_store();
        let ledger = TransactionLedger::new(&store);
        for sig in ["a1", "a2", "a3"] {
            ledger.record(&sample(sig, ALICE, BOB)).unwrap();
        }
        let mut base = sample(
            "a0",
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
        );
        base.chain = ChainFamily::Base;
        ledger.record(&base).unwrap();

        let solana_only = |chain: ChainFamily| chain == ChainFamily::Solana;
        let first = ledger.list_pending_after(None, 2, solana_only).unwrap();
        let sigs: Vec<_> = first.items.iter().map(|r| r.signature.as_str()).collect();
        assert_eq!(sigs, ["a1", "a2"]);
        assert_eq!(first.next_cursor.as_deref(), Some("a2"));

        let rest = ledger
            .list_pending_after(first.next_cursor.as_deref(), 2, solana_only)
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].signature, "a3");
        assert!(rest.next_cursor.is_none());

        assert_eq!(ledger.list_pending(10).unwrap().len(), 4);
    }

    #[test]
    fn index_key_ordering() {
        // Newer timestamps should produce smaller composite keys (descending)
        let key_old = make_index_key("solana:addr", 1000, "tx1");
        let key_new = make_index_key("solana:addr", 2000, "tx2");
        assert!(key_new < key_old, "Newer timestamps should sort first");
    }
}
