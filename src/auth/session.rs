// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Authentication
//!
//! Turns a signed challenge into a session and checks sessions on later
//! requests.
//!
//! ## Flow
//!
//! 1. Consume the challenge (single atomic write). Unknown or already-used
//!    nonces fail with `ChallengeNotFound`.
//! 2. Reject challenges past their expiry (`ChallengeExpired`).
//! 3. Verify the wallet signature over the stored message
//!    (`InvalidSignature`).
//! 4. Persist a session row and hand out an HS256 JWT naming it.
//!
//! The challenge is spent by the first attempt whether or not the signature
//! verifies, so a nonce can succeed at most once.
//!
//! ## Token
//!
//! Claims are `sub` (address), `chain`, `sid`, `iat` and `exp`. The session
//! row is authoritative: logout revokes it and renewal moves its expiry, so
//! every request checks the row as well as the token signature.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::verifier::{decode_signature, verify};
use super::{AuthConfig, AuthError};
use crate::blockchain::{ChainAddress, ChainFamily};
use crate::storage::{ChallengeRepository, SessionRepository, Store, StoredSession};

/// JWT claims.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// Wallet address the session is bound to
    sub: String,
    chain: ChainFamily,
    /// Session row id
    sid: String,
    iat: i64,
    exp: i64,
}

/// A freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub session_id: String,
    pub address: ChainAddress,
    pub expires_at: DateTime<Utc>,
}

/// The wallet behind a valid bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedWallet {
    pub session_id: String,
    pub address: ChainAddress,
    pub expires_at: DateTime<Utc>,
}

impl AuthenticatedWallet {
    /// Reject requests that assert an address other than the session's.
    pub fn ensure_address(&self, asserted: &str) -> Result<(), AuthError> {
        if self.address.matches(asserted) {
            return Ok(());
        }
        warn!(
            session_address = %self.address,
            asserted_address = asserted,
            "Address mismatch on authenticated request"
        );
        Err(AuthError::AddressMismatch)
    }
}

pub struct SessionAuthenticator<'a> {
    store: &'a Store,
    config: &'a AuthConfig,
}

impl<'a> SessionAuthenticator<'a> {
    pub fn new(store: &'a Store, config: &'a AuthConfig) -> Self {
        Self { store, config }
    }

    /// Exchange a signed challenge for a session.
    pub fn authenticate(&self, nonce: &str, signature: &str) -> Result<IssuedSession, AuthError> {
        self.authenticate_at(nonce, signature, Utc::now())
    }

    pub fn authenticate_at(
        &self,
        nonce: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, AuthError> {
        let address = self.verify_challenge_at(nonce, signature, now)?;
        let session = StoredSession {
            session_id: Uuid::new_v4().to_string(),
            address: address.address.clone(),
            chain: address.chain,
            issued_at: now,
            expires_at: now + self.config.session_ttl,
            revoked: false,
        };
        SessionRepository::new(self.store).create(&session)?;

        info!(
            chain = %address.chain,
            address = %address.address,
            session_id = %session.session_id,
            "Wallet authenticated"
        );
        self.issue_token(&session, now)
    }

    /// Consume a challenge and check its signature without opening a session.
    ///
    /// Used both for login and to prove ownership of an address being linked.
    pub fn verify_challenge(&self, nonce: &str, signature: &str) -> Result<ChainAddress, AuthError> {
        self.verify_challenge_at(nonce, signature, Utc::now())
    }

    pub fn verify_challenge_at(
        &self,
        nonce: &str,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<ChainAddress, AuthError> {
        let challenge = ChallengeRepository::new(self.store)
            .consume(nonce)?
            .ok_or_else(|| {
                warn!(nonce, "Unknown or reused challenge");
                AuthError::ChallengeNotFound
            })?;

        if challenge.is_expired_at(now) {
            warn!(
                address = %challenge.address,
                expired_at = %challenge.expires_at,
                "Expired challenge presented"
            );
            return Err(AuthError::ChallengeExpired);
        }

        let verified = decode_signature(challenge.chain, signature)
            .map(|bytes| verify(&challenge.message, &bytes, &challenge.address, challenge.chain))
            .unwrap_or(false);
        if !verified {
            warn!(
                chain = %challenge.chain,
                address = %challenge.address,
                "Challenge signature rejected"
            );
            return Err(AuthError::InvalidSignature);
        }

        Ok(ChainAddress {
            chain: challenge.chain,
            address: challenge.address,
        })
    }

    /// Check a bearer token and its session row.
    pub fn validate(&self, token: &str) -> Result<AuthenticatedWallet, AuthError> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<AuthenticatedWallet, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the session row, which renewals move.
        validation.validate_exp = false;

        let claims = decode::<SessionClaims>(token, &self.config.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => AuthError::InvalidToken,
                _ => AuthError::MalformedToken,
            })?
            .claims;

        let session = SessionRepository::new(self.store)
            .get(&claims.sid)?
            .ok_or(AuthError::InvalidToken)?;
        if session.address != claims.sub || session.chain != claims.chain {
            return Err(AuthError::InvalidToken);
        }
        if !session.is_active_at(now) {
            return Err(AuthError::SessionExpired);
        }

        Ok(AuthenticatedWallet {
            address: session.chain_address(),
            session_id: session.session_id,
            expires_at: session.expires_at,
        })
    }

    /// Extend a live session and hand out a token with the new expiry.
    pub fn renew(&self, wallet: &AuthenticatedWallet) -> Result<IssuedSession, AuthError> {
        self.renew_at(wallet, Utc::now())
    }

    pub fn renew_at(
        &self,
        wallet: &AuthenticatedWallet,
        now: DateTime<Utc>,
    ) -> Result<IssuedSession, AuthError> {
        let session = SessionRepository::new(self.store)
            .extend(&wallet.session_id, now + self.config.session_ttl)?
            .ok_or(AuthError::SessionExpired)?;
        info!(session_id = %session.session_id, expires_at = %session.expires_at, "Session renewed");
        self.issue_token(&session, now)
    }

    /// Revoke the session immediately.
    pub fn logout(&self, wallet: &AuthenticatedWallet) -> Result<(), AuthError> {
        SessionRepository::new(self.store).revoke(&wallet.session_id)?;
        info!(session_id = %wallet.session_id, address = %wallet.address, "Session revoked");
        Ok(())
    }

    fn issue_token(&self, session: &StoredSession, now: DateTime<Utc>) -> Result<IssuedSession, AuthError> {
        let claims = SessionClaims {
            sub: session.address.clone(),
            chain: session.chain,
            sid: session.session_id.clone(),
            iat: now.timestamp(),
            exp: session.expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.config.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("failed to sign session token: {e}")))?;

        Ok(IssuedSession {
            token,
            session_id: session.session_id.clone(),
            address: session.chain_address(),
            expires_at: session.expires_at,
        })
    }
}
