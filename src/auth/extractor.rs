// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated wallets.
//!
//! Use the `Auth` extractor in handlers to require a session:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(wallet): Auth) -> impl IntoResponse {
//!     // wallet is AuthenticatedWallet
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::{AuthError, AuthenticatedWallet, SessionAuthenticator};
use crate::state::AppState;

/// Optional header naming the wallet a request acts for.
pub const WALLET_ADDRESS_HEADER: &str = "x-wallet-address";

/// Extractor for authenticated wallets.
///
/// Validates the bearer token and its session row. When the request also
/// carries `X-Wallet-Address`, it must name the session's address.
pub struct Auth(pub AuthenticatedWallet);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        let wallet = SessionAuthenticator::new(&state.store, &state.auth).validate(token)?;

        if let Some(asserted) = parts.headers.get(WALLET_ADDRESS_HEADER) {
            let asserted = asserted.to_str().map_err(|_| AuthError::AddressMismatch)?;
            wallet.ensure_address(asserted)?;
        }

        Ok(Auth(wallet))
    }
}
