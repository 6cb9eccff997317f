// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `challenges`: nonce → StoredChallenge
//! - `sessions`: session_id → StoredSession
//! - `identities`: identity_id → StoredIdentity
//! - `usernames`: lowercase username → identity_id
//! - `addresses`: `family:address` → identity_id
//! - `contacts`: `owner_id|lowercase username` → StoredContact
//! - `transfers`: signature → TransferRecord
//! - `transfer_index`: composite key (`family:address|!timestamp|signature`) → direction
//! - `pending_transfers`: signature → chain family
//!
//! Values are JSON. redb allows one writer at a time, so every
//! check-and-set below runs inside a single write transaction.

use std::path::Path;

use redb::{Database, ReadableDatabase, TableDefinition};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const CHALLENGES: TableDefinition<&str, &[u8]> = TableDefinition::new("challenges");

pub(crate) const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

pub(crate) const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");

/// Lowercase username → identity_id.
pub(crate) const USERNAMES: TableDefinition<&str, &str> = TableDefinition::new("usernames");

/// `family:address` → identity_id, for every primary and linked address.
pub(crate) const ADDRESSES: TableDefinition<&str, &str> = TableDefinition::new("addresses");

/// `owner_id|lowercase username` → StoredContact.
pub(crate) const CONTACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("contacts");

pub(crate) const TRANSFERS: TableDefinition<&str, &[u8]> = TableDefinition::new("transfers");

/// Index: composite key → direction ("sent"|"received").
/// Key format: `family:address|!timestamp_be|signature` for descending-time range scans.
pub(crate) const TRANSFER_INDEX: TableDefinition<&[u8], &str> =
    TableDefinition::new("transfer_index");

/// Signatures whose status is still `pending`, for the confirmation poller.
pub(crate) const PENDING_TRANSFERS: TableDefinition<&str, &str> =
    TableDefinition::new("pending_transfers");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Store
// =============================================================================

/// Shared handle to the service database.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CHALLENGES)?;
            let _ = write_txn.open_table(SESSIONS)?;
            let _ = write_txn.open_table(IDENTITIES)?;
            let _ = write_txn.open_table(USERNAMES)?;
            let _ = write_txn.open_table(ADDRESSES)?;
            let _ = write_txn.open_table(CONTACTS)?;
            let _ = write_txn.open_table(TRANSFERS)?;
            let _ = write_txn.open_table(TRANSFER_INDEX)?;
            let _ = write_txn.open_table(PENDING_TRANSFERS)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Database opened");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    /// Cheap liveness probe: a read transaction can be opened.
    pub fn is_healthy(&self) -> bool {
        self.db.begin_read().is_ok()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

// =============================================================================
// Key Helpers
// =============================================================================

/// Upper bound for a prefix range scan.
pub(crate) fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = Vec::with_capacity(prefix.len() + 20);
    end.extend_from_slice(prefix);
    // Append enough 0xFF bytes to be past any valid key with this prefix
    end.extend_from_slice(&[0xFF; 20]);
    end
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nakama.redb");
        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.is_healthy());
    }

    #[test]
    fn reopen_keeps_data() {
        use redb::ReadableTable;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nakama.redb");
        {
            let store = Store::open(&path).unwrap();
            let txn = store.db().begin_write().unwrap();
            {
                let mut table = txn.open_table(USERNAMES).unwrap();
                table.insert("alice", "solana:abc").unwrap();
            }
            txn.commit().unwrap();
        }
        let store = Store::open(&path).unwrap();
        let txn = store.db().begin_read().unwrap();
        let table = txn.open_table(USERNAMES).unwrap();
        assert_eq!(table.get("alice").unwrap().unwrap().value(), "solana:abc");
    }
}
