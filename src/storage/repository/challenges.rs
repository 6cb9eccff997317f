// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Challenge repository: one-time sign-in nonces.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::blockchain::ChainFamily;
use crate::storage::database::{Store, StoreResult, CHALLENGES};

/// Persisted challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChallenge {
    /// 32 random bytes, hex encoded
    pub nonce: String,
    /// Exact text the wallet signs
    pub message: String,
    /// Canonical address the client claims it will sign with
    pub address: String,
    pub chain: ChainFamily,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl StoredChallenge {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

pub struct ChallengeRepository<'a> {
    store: &'a Store,
}

impl<'a> ChallengeRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn create(&self, challenge: &StoredChallenge) -> StoreResult<()> {
        let json = serde_json::to_vec(challenge)?;
        let write_txn = self.store.db().begin_write()?;
        {
            let mut table = write_txn.open_table(CHALLENGES)?;
            table.insert(challenge.nonce.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, nonce: &str) -> StoreResult<Option<StoredChallenge>> {
        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(CHALLENGES)?;
        match table.get(nonce)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Atomically mark a challenge consumed.
    ///
    /// Returns the challenge only to the caller that flipped `consumed` from
    /// false to true; absent or already-consumed challenges yield `None`.
    pub fn consume(&self, nonce: &str) -> StoreResult<Option<StoredChallenge>> {
        let write_txn = self.store.db().begin_write()?;
        let claimed = {
            let mut table = write_txn.open_table(CHALLENGES)?;
            let existing_bytes = match table.get(nonce)? {
                Some(value) => value.value().to_vec(),
                None => return Ok(None),
            };
            let mut challenge: StoredChallenge = serde_json::from_slice(&existing_bytes)?;
            if challenge.consumed {
                None
            } else {
                challenge.consumed = true;
                let json = serde_json::to_vec(&challenge)?;
                table.insert(nonce, json.as_slice())?;
                Some(challenge)
            }
        };
        write_txn.commit()?;
        Ok(claimed)
    }

    /// Delete challenges that expired before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let write_txn = self.store.db().begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(CHALLENGES)?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let challenge: StoredChallenge = serde_json::from_slice(value.value())?;
                if challenge.is_expired_at(now) {
                    stale.push(key.value().to_string());
                }
            }
            for nonce in &stale {
                table.remove(nonce.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
