// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contact book repository.
//!
//! Keys are `owner_id|lowercase username`, so one prefix scan lists an
//! owner's contacts in alphabetical order.

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::storage::database::{Store, StoreResult, CONTACTS};

/// Contact saved by an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredContact {
    /// Identity id of the owner
    pub owner_id: String,
    /// Contact's username as registered
    pub username: String,
    /// Private label chosen by the owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn contact_key(owner_id: &str, username: &str) -> String {
    format!("{owner_id}|{}", username.to_lowercase())
}

pub struct ContactRepository<'a> {
    store: &'a Store,
}

impl<'a> ContactRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert unless the owner already has this username. Returns `false` on duplicate.
    pub fn add(&self, contact: &StoredContact) -> StoreResult<bool> {
        let key = contact_key(&contact.owner_id, &contact.username);
        let json = serde_json::to_vec(contact)?;

        let write_txn = self.store.db().begin_write()?;
        let inserted = {
            let mut table = write_txn.open_table(CONTACTS)?;
            if table.get(key.as_str())?.is_some() {
                false
            } else {
                table.insert(key.as_str(), json.as_slice())?;
                true
            }
        };
        if inserted {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(inserted)
    }

    /// Returns `false` if there was nothing to remove.
    pub fn remove(&self, owner_id: &str, username: &str) -> StoreResult<bool> {
        let key = contact_key(owner_id, username);
        let write_txn = self.store.db().begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(CONTACTS)?;
            let existed = table.remove(key.as_str())?.is_some();
            existed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn list(&self, owner_id: &str) -> StoreResult<Vec<StoredContact>> {
        // '}' is the byte after '|', so this covers exactly the owner's keys
        let prefix = format!("{owner_id}|");
        let end = format!("{owner_id}}}");

        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(CONTACTS)?;
        let mut contacts = Vec::new();
        for entry in table.range(prefix.as_str()..end.as_str())? {
            let (_, value) = entry?;
            contacts.push(serde_json::from_slice(value.value())?);
        }
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::test_support::temp_store;

    fn contact(owner: &str, username: &str) -> StoredContact {
        StoredContact {
            owner_id: owner.to_string(),
            username: username.to_string(),
            nickname: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn add_list_remove() {
        let (store, _dir) = temp_store();
        let repo = ContactRepository::new(&store);
        assert!(repo.add(&contact("solana:alice", "Bob")).unwrap());
        assert!(repo.add(&contact("solana:alice", "carol")).unwrap());
        assert!(repo.add(&contact("solana:alicex", "dave")).unwrap());

        let listed = repo.list("solana:alice").unwrap();
        let names: Vec<_> = listed.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(names, vec!["Bob", "carol"]);
        assert_eq!(listed[0].owner_id, "solana:alice");

        assert!(repo.remove("solana:alice", "BOB").unwrap());
        assert!(!repo.remove("solana:alice", "bob").unwrap());
        assert_eq!(repo.list("solana:alice").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_is_rejected_case_insensitively() {
        let (store, _dir) = temp_store();
        let repo = ContactRepository::new(&store);
        assert!(repo.add(&contact("solana:alice", "bob")).unwrap());
        assert!(!repo.add(&contact("solana:alice", "BOB")).unwrap());
    }
}
