// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity repository.
//!
//! ## Storage Layout
//!
//! ```text
//! identities: identity_id        → StoredIdentity (JSON)
//! usernames:  lowercase username → identity_id
//! addresses:  family:address     → identity_id
//! ```
//!
//! Registration and address linking check the secondary indexes and write
//! all three tables inside one redb write transaction, so two racing
//! requests for the same username or address cannot both succeed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use redb::{ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};

use crate::blockchain::{ChainAddress, ChainFamily};
use crate::storage::database::{Store, StoreResult, ADDRESSES, IDENTITIES, USERNAMES};

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    /// `family:address` of the primary address
    pub id: String,
    /// Wallet that created the account (immutable)
    pub primary_address: ChainAddress,
    /// Display casing as registered; uniqueness is case-insensitive
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Opaque URL produced by the media pipeline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    /// One address per chain family, primary included
    pub linked_addresses: BTreeMap<ChainFamily, String>,
    /// Set only by administrative tooling
    #[serde(default)]
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredIdentity {
    pub fn new(primary_address: ChainAddress, username: String) -> Self {
        let now = Utc::now();
        let mut linked_addresses = BTreeMap::new();
        linked_addresses.insert(primary_address.chain, primary_address.address.clone());
        Self {
            id: primary_address.key(),
            primary_address,
            username,
            display_name: None,
            bio: None,
            profile_picture: None,
            linked_addresses,
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn address_for(&self, chain: ChainFamily) -> Option<&str> {
        self.linked_addresses.get(&chain).map(String::as_str)
    }
}

/// Result of an atomic registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    UsernameTaken,
    AddressTaken,
}

/// Result of an atomic link attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked(StoredIdentity),
    /// The identity already had exactly this address for the family.
    Unchanged(StoredIdentity),
    /// Another identity owns the address.
    AddressTaken,
    /// The identity already has a different address for the family.
    ChainTaken { existing: String },
    NotFound,
}

pub struct IdentityRepository<'a> {
    store: &'a Store,
}

impl<'a> IdentityRepository<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Insert a new identity if neither its username nor any of its
    /// addresses are already claimed.
    pub fn create(&self, identity: &StoredIdentity) -> StoreResult<RegisterOutcome> {
        let json = serde_json::to_vec(identity)?;
        let username_key = identity.username.to_lowercase();

        let write_txn = self.store.db().begin_write()?;
        let outcome = {
            let mut usernames = write_txn.open_table(USERNAMES)?;
            let mut addresses = write_txn.open_table(ADDRESSES)?;
            let mut identities = write_txn.open_table(IDENTITIES)?;

            let address_keys: Vec<String> = identity
                .linked_addresses
                .iter()
                .map(|(chain, address)| format!("{chain}:{address}"))
                .collect();

            if usernames.get(username_key.as_str())?.is_some() {
                RegisterOutcome::UsernameTaken
            } else if identities.get(identity.id.as_str())?.is_some()
                || address_keys
                    .iter()
                    .map(|key| addresses.get(key.as_str()).map(|v| v.is_some()))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .any(|taken| taken)
            {
                RegisterOutcome::AddressTaken
            } else {
                identities.insert(identity.id.as_str(), json.as_slice())?;
                usernames.insert(username_key.as_str(), identity.id.as_str())?;
                for key in &address_keys {
                    addresses.insert(key.as_str(), identity.id.as_str())?;
                }
                RegisterOutcome::Created
            }
        };

        if outcome == RegisterOutcome::Created {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(outcome)
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<StoredIdentity>> {
        let read_txn = self.store.db().begin_read()?;
        let table = read_txn.open_table(IDENTITIES)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Identity owning `address` (primary or linked).
    pub fn get_by_address(&self, address: &ChainAddress) -> StoreResult<Option<StoredIdentity>> {
        let id = {
            let read_txn = self.store.db().begin_read()?;
            let table = read_txn.open_table(ADDRESSES)?;
            let found = table.get(address.key().as_str())?;
            match found {
                Some(value) => value.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get(&id)
    }

    /// Case-insensitive exact username lookup.
    pub fn get_by_username(&self, username: &str) -> StoreResult<Option<StoredIdentity>> {
        let id = {
            let read_txn = self.store.db().begin_read()?;
            let table = read_txn.open_table(USERNAMES)?;
            let found = table.get(username.to_lowercase().as_str())?;
            match found {
                Some(value) => value.value().to_string(),
                None => return Ok(None),
            }
        };
        self.get(&id)
    }

    /// Overwrite the mutable profile fields of an existing identity.
    ///
    /// Username, primary address and linked addresses are taken from the
    /// stored row, never from `identity`.
    pub fn update_profile(&self, identity: &StoredIdentity) -> StoreResult<Option<StoredIdentity>> {
        self.modify(&identity.id, |stored| {
            stored.display_name = identity.display_name.clone();
            stored.bio = identity.bio.clone();
            stored.profile_picture = identity.profile_picture.clone();
            stored.updated_at = Utc::now();
        })
    }

    /// Administrative verification flag.
    pub fn set_verified(&self, id: &str, verified: bool) -> StoreResult<Option<StoredIdentity>> {
        self.modify(id, |stored| {
            stored.is_verified = verified;
            stored.updated_at = Utc::now();
        })
    }

    fn modify(
        &self,
        id: &str,
        f: impl FnOnce(&mut StoredIdentity),
    ) -> StoreResult<Option<StoredIdentity>> {
        let write_txn = self.store.db().begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(IDENTITIES)?;
            let existing_bytes = match table.get(id)? {
                Some(value) => value.value().to_vec(),
                None => return Ok(None),
            };
            let mut identity: StoredIdentity = serde_json::from_slice(&existing_bytes)?;
            f(&mut identity);
            let json = serde_json::to_vec(&identity)?;
            table.insert(id, json.as_slice())?;
            identity
        };
        write_txn.commit()?;
        Ok(Some(updated))
    }

    /// Link `address` to identity `id`, enforcing one address per family
    /// per identity and one identity per address.
    pub fn link(&self, id: &str, address: &ChainAddress) -> StoreResult<LinkOutcome> {
        let address_key = address.key();
        let write_txn = self.store.db().begin_write()?;
        let outcome = {
            let mut identities = write_txn.open_table(IDENTITIES)?;
            let mut addresses = write_txn.open_table(ADDRESSES)?;

            let existing_bytes = identities.get(id)?.map(|value| value.value().to_vec());
            let owner = addresses
                .get(address_key.as_str())?
                .map(|value| value.value().to_string());

            match existing_bytes {
                None => LinkOutcome::NotFound,
                Some(bytes) => {
                    let mut identity: StoredIdentity = serde_json::from_slice(&bytes)?;
                    match (identity.address_for(address.chain), owner) {
                        (Some(current), _) if current == address.address => {
                            LinkOutcome::Unchanged(identity)
                        }
                        (Some(current), _) => LinkOutcome::ChainTaken {
                            existing: current.to_string(),
                        },
                        (None, Some(_)) => LinkOutcome::AddressTaken,
                        (None, None) => {
                            identity
                                .linked_addresses
                                .insert(address.chain, address.address.clone());
                            identity.updated_at = Utc::now();
                            let json = serde_json::to_vec(&identity)?;
                            identities.insert(id, json.as_slice())?;
                            addresses.insert(address_key.as_str(), id)?;
                            LinkOutcome::Linked(identity)
                        }
                    }
                }
            }
        };

        if matches!(outcome, LinkOutcome::Linked(_)) {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(outcome)
    }
}
