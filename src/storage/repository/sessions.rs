// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session repository.
//!
//! The bearer token carries the session id; the row here is what makes
//! logout and renewal take effect immediately.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::blockchain::{ChainAddress, ChainFamily};
use crate::storage::database::{Store, StoreResult, SESSIONS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_id: String,
    /// Canonical address the session is bound to
    pub address: String,
    pub chain: ChainFamily,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked: bool,
}

impl StoredSession {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now <= self.expires_at
    }

    pub fn chain_address(&self) -> ChainAddress {
        ChainAddress {
            chain: self.chain,
            address: self.address.clone(),
        }
    }
}

pub struct SessionRepository<'a> {
    store: &'a Store,
}

impl<'a> SessionRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn create(&self, session: &StoredSession) -> StoreResult<()> {
        let json = serde_json::to_vec(session)?;
        let write_txn = self.store.db().begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            table.insert(session.session_id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, session_id: &str) -> StoreResult<Option<StoredSession>> {
        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;
        match table.get(session_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Apply `f` to an existing session row and persist the result.
    fn modify(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut StoredSession),
    ) -> StoreResult<Option<StoredSession>> {
        let write_txn = self.store.db().begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(SESSIONS)?;
            let existing_bytes = match table.get(session_id)? {
                Some(value) => value.value().to_vec(),
                None => return Ok(None),
            };
            let mut session: StoredSession = serde_json::from_slice(&existing_bytes)?;
            f(&mut session);
            let json = serde_json::to_vec(&session)?;
            table.insert(session_id, json.as_slice())?;
            session
        };
        write_txn.commit()?;
        Ok(Some(updated))
    }

    /// Mark a session revoked. Returns `false` if it did not exist.
    pub fn revoke(&self, session_id: &str) -> StoreResult<bool> {
        Ok(self
            .modify(session_id, |session| session.revoked = true)?
            .is_some())
    }

    /// Move a session's expiry forward.
    pub fn extend(
        &self,
        session_id: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<Option<StoredSession>> {
        self.modify(session_id, |session| session.expires_at = expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::temp_store;

    fn sample(id: &str) -> StoredSession {
        let now = Utc::now();
        StoredSession {
            session_id: id.to_string(),
            address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
            chain: ChainFamily::Base,
            issued_at: now,
            expires_at: now + chrono::Duration::hours(24),
            revoked: false,
        }
    }

    #[test]
    fn revoke_deactivates() {
        let (store, _dir) = temp_store();
        let repo = SessionRepository::new(&store);
        repo.create(&sample("s1")).unwrap();
        assert!(repo.get("s1").unwrap().unwrap().is_active_at(Utc::now()));

        assert!(repo.revoke("s1").unwrap());
        assert!(!repo.get("s1").unwrap().unwrap().is_active_at(Utc::now()));
        assert!(!repo.revoke("missing").unwrap());
    }

    #[test]
    fn extend_moves_expiry() {
        let (store, _dir) = temp_store();
        let repo = SessionRepository::new(&store);
        repo.create(&sample("s2")).unwrap();

        let later = Utc::now() + chrono::Duration::hours(48);
        let extended = repo.extend("s2", later).unwrap().unwrap();
        assert_eq!(extended.expires_at, later);
        assert!(repo.extend("missing", later).unwrap().is_none());
    }
}
