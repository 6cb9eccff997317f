// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contact book: usernames an identity sends to often.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use super::{IdentityError, IdentityResolver};
use crate::blockchain::ChainFamily;
use crate::storage::{ContactRepository, Store, StoredContact, StoredIdentity};

pub const NICKNAME_MAX_CHARS: usize = 50;

/// A contact joined with the contact's current public profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactEntry {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    /// Chain family → address; empty if the contact no longer resolves
    #[schema(value_type = Object)]
    pub wallets: BTreeMap<ChainFamily, String>,
    pub created_at: DateTime<Utc>,
}

impl ContactEntry {
    fn new(contact: StoredContact, profile: Option<StoredIdentity>) -> Self {
        let mut entry = Self {
            username: contact.username,
            nickname: contact.nickname,
            display_name: None,
            profile_picture: None,
            is_verified: false,
            wallets: BTreeMap::new(),
            created_at: contact.created_at,
        };
        if let Some(profile) = profile {
            entry.username = profile.username;
            entry.display_name = profile.display_name;
            entry.profile_picture = profile.profile_picture;
            entry.is_verified = profile.is_verified;
            entry.wallets = profile.linked_addresses;
        }
        entry
    }
}

pub struct ContactBook<'a> {
    store: &'a Store,
}

impl<'a> ContactBook<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Save `username` to `owner`'s contacts. The username must resolve.
    pub fn add(
        &self,
        owner: &StoredIdentity,
        username: &str,
        nickname: Option<&str>,
    ) -> Result<ContactEntry, IdentityError> {
        let nickname = match nickname.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) if n.chars().count() > NICKNAME_MAX_CHARS => {
                return Err(IdentityError::InvalidProfile(format!(
                    "nickname must be at most {NICKNAME_MAX_CHARS} characters"
                )));
            }
            other => other.map(str::to_string),
        };

        let target = IdentityResolver::new(self.store).resolve_username(username)?;
        if target.id == owner.id {
            return Err(IdentityError::SelfContact);
        }

        let contact = StoredContact {
            owner_id: owner.id.clone(),
            username: target.username.clone(),
            nickname,
            created_at: Utc::now(),
        };
        if !ContactRepository::new(self.store).add(&contact)? {
            return Err(IdentityError::ContactExists);
        }

        info!(owner_id = %owner.id, contact = %contact.username, "Added contact");
        Ok(ContactEntry::new(contact, Some(target)))
    }

    pub fn remove(&self, owner: &StoredIdentity, username: &str) -> Result<(), IdentityError> {
        if !ContactRepository::new(self.store).remove(&owner.id, username.trim())? {
            return Err(IdentityError::NotFound);
        }
        info!(owner_id = %owner.id, contact = username, "Removed contact");
        Ok(())
    }

    /// Contacts in alphabetical order with their current profiles.
    pub fn list(&self, owner: &StoredIdentity) -> Result<Vec<ContactEntry>, IdentityError> {
        let resolver = IdentityResolver::new(self.store);
        ContactRepository::new(self.store)
            .list(&owner.id)?
            .into_iter()
            .map(|contact| {
                let profile = match resolver.resolve_username(&contact.username) {
                    Ok(profile) => Some(profile),
                    Err(IdentityError::NotFound) => None,
                    Err(e) => return Err(e),
                };
                Ok(ContactEntry::new(contact, profile))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::builder::test_support::{register, ALICE, BOB};
    use crate::storage::database::test_support::temp_store;

    #[test]
    fn add_resolves_and_lists_contacts() {
        let (store, _dir) = temp_store();
        let alice = register(&store, ChainFamily::Solana, ALICE, "alice");
        register(&store, ChainFamily::Solana, BOB, "Bob");

        let book = ContactBook::new(&store);
        let entry = book.add(&alice, "bob", Some("  lunch buddy ")).unwrap();
        assert_eq!(entry.username, "Bob");
        assert_eq!(entry.nickname.as_deref(), Some("lunch buddy"));
        assert_eq!(entry.wallets.get(&ChainFamily::Solana).map(String::as_str), Some(BOB));

        let listed = book.list(&alice).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].username, "Bob");
    }

    #[test]
    fn add_rejects_unknown_self_and_duplicates() {
        let (store, _dir) = temp_store();
        let alice = register(&store, ChainFamily::Solana, ALICE, "alice");
        register(&store, ChainFamily::Solana, BOB, "bob");
        let book = ContactBook::new(&store);

        assert!(matches!(book.add(&alice, "ghost", None), Err(IdentityError::NotFound)));
        assert!(matches!(book.add(&alice, "ALICE", None), Err(IdentityError::SelfContact)));
        book.add(&alice, "bob", None).unwrap();
        assert!(matches!(book.add(&alice, "BOB", None), Err(IdentityError::ContactExists)));
        assert!(matches!(
            book.add(&alice, "bob", Some(&"n".repeat(NICKNAME_MAX_CHARS + 1))),
            Err(IdentityError::InvalidProfile(_))
        ));
    }

    #[test]
    fn remove_is_case_insensitive() {
        let (store, _dir) = temp_store();
        let alice = register(&store, ChainFamily::Solana, ALICE, "alice");
        register(&store, ChainFamily::Solana, BOB, "bob");
        let book = ContactBook::new(&store);
        book.add(&alice, "bob", None).unwrap();

        book.remove(&alice, "BOB").unwrap();
        assert!(book.list(&alice).unwrap().is_empty());
        assert!(matches!(book.remove(&alice, "bob"), Err(IdentityError::NotFound)));
    }
}
