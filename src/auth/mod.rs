// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Password-less wallet sign-in for the NAKAMA API.
//!
//! ## Auth Flow
//!
//! 1. Client asks for a challenge for its wallet address (`POST /v1/auth/challenge`)
//! 2. Wallet signs the challenge message
//! 3. Server consumes the challenge, verifies the signature and returns a
//!    bearer token (`POST /v1/auth/verify`)
//! 4. Client sends `Authorization: Bearer <token>`; the `Auth` extractor
//!    checks the token and its session row on every request
//!
//! ## Security
//!
//! - Challenges are single use and expire after a short TTL
//! - Sessions are bound to one address; requests asserting another
//!   address are rejected with `address_mismatch`
//! - Logout revokes the session row immediately

pub mod challenge;
pub mod error;
pub mod extractor;
pub mod session;
pub mod verifier;

use chrono::Duration;
use jsonwebtoken::{DecodingKey, EncodingKey};

pub use challenge::ChallengeIssuer;
pub use error::AuthError;
pub use extractor::{Auth, WALLET_ADDRESS_HEADER};
pub use session::{AuthenticatedWallet, IssuedSession, SessionAuthenticator};

/// Default challenge lifetime (5 minutes).
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 300;

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Domain named in the sign-in message
    pub domain: String,
    pub challenge_ttl: Duration,
    pub session_ttl: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthConfig {
    /// Create an auth configuration signing session tokens with `secret`.
    pub fn new(secret: &[u8], domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            challenge_ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
            session_ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("domain", &self.domain)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}
