// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-in challenge issuance.
//!
//! A challenge is a single-use nonce embedded in a human-readable message
//! the wallet shows the user before signing. It is persisted so any
//! server process can later verify it.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use tracing::info;

use super::{AuthConfig, AuthError};
use crate::blockchain::ChainFamily;
use crate::storage::{ChallengeRepository, Store, StoredChallenge};

/// Nonce entropy in bytes.
const NONCE_BYTES: usize = 32;

/// Render the message the wallet signs.
pub fn challenge_message(
    domain: &str,
    chain: ChainFamily,
    address: &str,
    nonce: &str,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> String {
    format!(
        "{domain} wants you to sign in with your {} account:\n\
         {address}\n\
         \n\
         Sign this message to prove you own this wallet. \
         This request will not trigger a blockchain transaction or cost any fees.\n\
         \n\
         Nonce: {nonce}\n\
         Issued At: {}\n\
         Expiration Time: {}",
        chain.capabilities().name,
        issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn random_nonce() -> Result<String, AuthError> {
    let mut bytes = [0u8; NONCE_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AuthError::InternalError("system RNG unavailable".to_string()))?;
    Ok(alloy::hex::encode(bytes))
}

pub struct ChallengeIssuer<'a> {
    store: &'a Store,
    domain: &'a str,
    ttl: Duration,
}

impl<'a> ChallengeIssuer<'a> {
    pub fn new(store: &'a Store, config: &'a AuthConfig) -> Self {
        Self {
            store,
            domain: &config.domain,
            ttl: config.challenge_ttl,
        }
    }

    /// Issue a challenge for `address` on `chain`.
    pub fn issue(&self, chain: ChainFamily, address: &str) -> Result<StoredChallenge, AuthError> {
        self.issue_at(chain, address, Utc::now())
    }

    pub fn issue_at(
        &self,
        chain: ChainFamily,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<StoredChallenge, AuthError> {
        let address = chain.normalize_address(address)?;
        let nonce = random_nonce()?;
        let expires_at = now + self.ttl;

        let challenge = StoredChallenge {
            message: challenge_message(self.domain, chain, &address, &nonce, now, expires_at),
            nonce,
            address,
            chain,
            issued_at: now,
            expires_at,
            consumed: false,
        };

        ChallengeRepository::new(self.store).create(&challenge)?;

        info!(
            chain = %chain,
            address = %challenge.address,
            expires_at = %challenge.expires_at,
            "Issued sign-in challenge"
        );
        Ok(challenge)
    }
}
