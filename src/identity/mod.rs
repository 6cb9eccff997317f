// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Resolution
//!
//! Maps usernames to wallet addresses and back.
//!
//! ## Rules
//!
//! - Usernames are 3–20 characters of `[A-Za-z0-9_]`, unique
//!   case-insensitively and immutable once registered
//! - An address belongs to at most one identity
//! - An identity holds at most one address per chain family
//!
//! Uniqueness is enforced inside single redb write transactions (see
//! `storage::repository::identities`), so of two racing registrations for
//! the same username exactly one succeeds.

pub mod contacts;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::blockchain::{ChainAddress, ChainFamily};
use crate::storage::{
    IdentityRepository, LinkOutcome, RegisterOutcome, Store, StoreError, StoredIdentity,
};

pub use contacts::{ContactBook, ContactEntry};

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 20;
pub const DISPLAY_NAME_MAX_CHARS: usize = 50;
pub const BIO_MAX_CHARS: usize = 500;
pub const PROFILE_PICTURE_MAX_CHARS: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),
    #[error("invalid profile: {0}")]
    InvalidProfile(String),
    #[error("username is already taken")]
    UsernameTaken,
    #[error("address is already linked to another profile")]
    AddressAlreadyLinked,
    #[error("profile already has a {chain} wallet ({existing})")]
    ChainAlreadyLinked { chain: ChainFamily, existing: String },
    #[error("profile not found")]
    NotFound,
    #[error("contact already exists")]
    ContactExists,
    #[error("cannot add yourself as a contact")]
    SelfContact,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Check a username against the registration rules.
pub fn validate_username(username: &str) -> Result<(), IdentityError> {
    let len = username.chars().count();
    if !(USERNAME_MIN_CHARS..=USERNAME_MAX_CHARS).contains(&len) {
        return Err(IdentityError::InvalidUsername(format!(
            "must be {USERNAME_MIN_CHARS}-{USERNAME_MAX_CHARS} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(IdentityError::InvalidUsername(
            "only letters, digits and underscores are allowed".to_string(),
        ));
    }
    Ok(())
}

/// Editable profile fields.
///
/// `None` leaves a field unchanged; an empty string clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileFields {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    /// HTTP(S) image URL
    #[serde(default)]
    pub profile_picture: Option<String>,
}

fn bounded(field: &str, value: &str, max: usize) -> Result<Option<String>, IdentityError> {
    let trimmed = value.trim();
    if trimmed.chars().count() > max {
        return Err(IdentityError::InvalidProfile(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

impl ProfileFields {
    /// Validate and apply onto `identity`.
    fn apply(&self, identity: &mut StoredIdentity) -> Result<(), IdentityError> {
        if let Some(name) = &self.display_name {
            identity.display_name = bounded("display_name", name, DISPLAY_NAME_MAX_CHARS)?;
        }
        if let Some(bio) = &self.bio {
            identity.bio = bounded("bio", bio, BIO_MAX_CHARS)?;
        }
        if let Some(picture) = &self.profile_picture {
            let picture = bounded("profile_picture", picture, PROFILE_PICTURE_MAX_CHARS)?;
            if let Some(raw) = &picture {
                let parsed = url::Url::parse(raw).map_err(|_| {
                    IdentityError::InvalidProfile("profile_picture must be a URL".to_string())
                })?;
                if !matches!(parsed.scheme(), "https" | "http") {
                    return Err(IdentityError::InvalidProfile(
                        "profile_picture must be an http(s) URL".to_string(),
                    ));
                }
            }
            identity.profile_picture = picture;
        }
        Ok(())
    }
}

/// Public, read-only view of a profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicProfile {
    pub found: bool,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    /// Chain family → address
    #[schema(value_type = Object)]
    pub wallets: BTreeMap<ChainFamily, String>,
}

impl PublicProfile {
    pub fn not_found() -> Self {
        Self {
            found: false,
            username: None,
            display_name: None,
            bio: None,
            profile_picture: None,
            is_verified: false,
            wallets: BTreeMap::new(),
        }
    }
}

impl From<StoredIdentity> for PublicProfile {
    fn from(identity: StoredIdentity) -> Self {
        Self {
            found: true,
            username: Some(identity.username),
            display_name: identity.display_name,
            bio: identity.bio,
            profile_picture: identity.profile_picture,
            is_verified: identity.is_verified,
            wallets: identity.linked_addresses,
        }
    }
}

pub struct IdentityResolver<'a> {
    store: &'a Store,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Register `username` for `primary` with optional profile fields.
    pub fn register(
        &self,
        primary: &ChainAddress,
        username: &str,
        profile: &ProfileFields,
    ) -> Result<StoredIdentity, IdentityError> {
        let username = username.trim();
        validate_username(username)?;

        let mut identity = StoredIdentity::new(primary.clone(), username.to_string());
        profile.apply(&mut identity)?;

        match IdentityRepository::new(self.store).create(&identity)? {
            RegisterOutcome::Created => {
                info!(
                    identity_id = %identity.id,
                    username = %identity.username,
                    "Registered profile"
                );
                Ok(identity)
            }
            RegisterOutcome::UsernameTaken => Err(IdentityError::UsernameTaken),
            RegisterOutcome::AddressTaken => Err(IdentityError::AddressAlreadyLinked),
        }
    }

    /// Case-insensitive exact username lookup.
    pub fn resolve_username(&self, username: &str) -> Result<StoredIdentity, IdentityError> {
        IdentityRepository::new(self.store)
            .get_by_username(username.trim())?
            .ok_or(IdentityError::NotFound)
    }

    pub fn get_by_address(&self, address: &ChainAddress) -> Result<Option<StoredIdentity>, IdentityError> {
        Ok(IdentityRepository::new(self.store).get_by_address(address)?)
    }

    /// Identity owning `address`, or `NotFound`.
    pub fn require_by_address(&self, address: &ChainAddress) -> Result<StoredIdentity, IdentityError> {
        self.get_by_address(address)?.ok_or(IdentityError::NotFound)
    }

    /// Attach a further wallet to an identity.
    pub fn link_address(
        &self,
        identity_id: &str,
        address: &ChainAddress,
    ) -> Result<StoredIdentity, IdentityError> {
        match IdentityRepository::new(self.store).link(identity_id, address)? {
            LinkOutcome::Linked(identity) => {
                info!(
                    identity_id,
                    chain = %address.chain,
                    address = %address.address,
                    "Linked wallet"
                );
                Ok(identity)
            }
            LinkOutcome::Unchanged(identity) => Ok(identity),
            LinkOutcome::AddressTaken => Err(IdentityError::AddressAlreadyLinked),
            LinkOutcome::ChainTaken { existing } => Err(IdentityError::ChainAlreadyLinked {
                chain: address.chain,
                existing,
            }),
            LinkOutcome::NotFound => Err(IdentityError::NotFound),
        }
    }

    pub fn update_profile(
        &self,
        identity_id: &str,
        fields: &ProfileFields,
    ) -> Result<StoredIdentity, IdentityError> {
        let repo = IdentityRepository::new(self.store);
        let mut identity = repo.get(identity_id)?.ok_or(IdentityError::NotFound)?;
        fields.apply(&mut identity)?;
        repo.update_profile(&identity)?
            .ok_or(IdentityError::NotFound)
    }

    /// Public lookup; unknown usernames yield `found: false`.
    pub fn public_profile(&self, username: &str) -> Result<PublicProfile, IdentityError> {
        Ok(IdentityRepository::new(self.store)
            .get_by_username(username.trim())?
            .map(PublicProfile::from)
            .unwrap_or_else(PublicProfile::not_found))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blockchain::builder::test_support::{ALICE, ALICE_EVM, BOB, BOB_EVM};
    use crate::storage::database::test_support::temp_store;

    fn sol(address: &str) -> ChainAddress {
        ChainAddress::parse(ChainFamily::Solana, address).unwrap()
    }

    fn base(address: &str) -> ChainAddress {
        ChainAddress::parse(ChainFamily::Base, address).unwrap()
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("Alice_99").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("a".repeat(21).as_str()).is_err());
        assert!(validate_username("bad-name").is_err());
        assert!(validate_username("héllo").is_err());
    }

    #[test]
    fn register_and_resolve_case_insensitively() {
        let (store, _dir) = temp_store();
        let resolver = IdentityResolver::new(&store);
        let profile = ProfileFields {
            display_name: Some("Alice".to_string()),
            ..Default::default()
        };
        let alice = resolver.register(&sol(ALICE), "Alice", &profile).unwrap();
        assert_eq!(alice.display_name.as_deref(), Some("Alice"));

        let found = resolver.resolve_username("ALICE").unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(found.address_for(ChainFamily::Solana), Some(ALICE));
        assert!(matches!(
            resolver.resolve_username("nobody"),
            Err(IdentityError::NotFound)
        ));
    }

    #[test]
    fn username_and_address_conflicts() {
        let (store, _dir) = temp_store();
        let resolver = IdentityResolver::new(&store);
        resolver
            .register(&sol(ALICE), "alice", &ProfileFields::default())
            .unwrap();

        assert!(matches!(
            resolver.register(&sol(BOB), "ALICE", &ProfileFields::default()),
            Err(IdentityError::UsernameTaken)
        ));
        assert!(matches!(
            resolver.register(&sol(ALICE), "alice2", &ProfileFields::default()),
            Err(IdentityError::AddressAlreadyLinked)
        ));
    }

    #[test]
    fn racing_registrations_have_one_winner() {
        let (store, _dir) = temp_store();
        let store = Arc::new(store);
        let handles: Vec<_> = [ALICE, BOB]
            .into_iter()
            .map(|address| {
                let store = store.clone();
                std::thread::spawn(move || {
                    IdentityResolver::new(&store)
                        .register(&sol(address), "satoshi", &ProfileFields::default())
                        .is_ok()
                })
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn link_address_rules() {
        let (store, _dir) = temp_store();
        let resolver = IdentityResolver::new(&store);
        let alice = resolver
            .register(&sol(ALICE), "alice", &ProfileFields::default())
            .unwrap();
        let bob = resolver
            .register(&base(BOB_EVM), "bob", &ProfileFields::default())
            .unwrap();

        let linked = resolver.link_address(&alice.id, &base(ALICE_EVM)).unwrap();
        assert_eq!(linked.address_for(ChainFamily::Base), Some(ALICE_EVM));
        assert_eq!(
            resolver.resolve_username("alice").unwrap().address_for(ChainFamily::Base),
            Some(ALICE_EVM)
        );
        // Relinking the same address is a no-op.
        resolver.link_address(&alice.id, &base(ALICE_EVM)).unwrap();

        assert!(matches!(
            resolver.link_address(&alice.id, &base(BOB_EVM)),
            Err(IdentityError::ChainAlreadyLinked { .. })
        ));
        assert!(matches!(
            resolver.link_address(&bob.id, &base(ALICE_EVM)),
            Err(IdentityError::AddressAlreadyLinked)
        ));
    }

    #[test]
    fn update_profile_validates_fields() {
        let (store, _dir) = temp_store();
        let resolver = IdentityResolver::new(&store);
        let alice = resolver
            .register(&sol(ALICE), "alice", &ProfileFields::default())
            .unwrap();

        let updated = resolver
            .update_profile(
                &alice.id,
                &ProfileFields {
                    bio: Some("gm".to_string()),
                    profile_picture: Some("https://example.com/a.png".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("gm"));
        assert_eq!(updated.username, "alice");

        let cleared = resolver
            .update_profile(
                &alice.id,
                &ProfileFields {
                    bio: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.bio, None);
        assert!(cleared.profile_picture.is_some());

        for bad in [
            ProfileFields {
                bio: Some("x".repeat(BIO_MAX_CHARS + 1)),
                ..Default::default()
            },
            ProfileFields {
                display_name: Some("x".repeat(DISPLAY_NAME_MAX_CHARS + 1)),
                ..Default::default()
            },
            ProfileFields {
                profile_picture: Some("javascript:alert(1)".to_string()),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                resolver.update_profile(&alice.id, &bad),
                Err(IdentityError::InvalidProfile(_))
            ));
        }
    }

    #[test]
    fn public_profile_exposes_only_public_fields() {
        let (store, _dir) = temp_store();
        let resolver = IdentityResolver::new(&store);
        resolver
            .register(&sol(ALICE), "alice", &ProfileFields::default())
            .unwrap();

        let profile = resolver.public_profile("Alice").unwrap();
        assert!(profile.found);
        assert_eq!(profile.wallets.get(&ChainFamily::Solana).map(String::as_str), Some(ALICE));

        let json = serde_json::to_value(&profile).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            ["bio", "display_name", "found", "is_verified", "profile_picture", "username", "wallets"]
        );

        let missing = resolver.public_profile("ghost").unwrap();
        assert!(!missing.found);
        assert!(missing.wallets.is_empty());
    }
}
