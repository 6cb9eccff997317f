// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet sign-in endpoints.
//!
//! Challenge and verify are public; the rest act on the caller's session.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, ChallengeIssuer, IssuedSession, SessionAuthenticator},
    blockchain::ChainFamily,
    error::ApiError,
    identity::IdentityResolver,
    state::AppState,
};

/// Request a sign-in challenge for a wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// Wallet address to authenticate.
    pub address: String,
    /// Chain family of the address.
    pub chain: ChainFamily,
}

/// A challenge for the wallet to sign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChallengeResponse {
    /// Single-use nonce; send it back with the signature.
    pub nonce: String,
    /// Exact text the wallet must sign.
    pub message: String,
    /// Canonical form of the address.
    pub address: String,
    pub chain: ChainFamily,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signed challenge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub nonce: String,
    /// Wallet signature of the challenge message (base58/base64 for
    /// Solana, hex for EVM).
    pub signature: String,
}

/// Bearer token for a new or renewed session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    /// Always `Bearer`.
    pub token_type: String,
    pub session_id: String,
    pub address: String,
    pub chain: ChainFamily,
    pub expires_at: DateTime<Utc>,
    /// Whether the wallet already has a registered profile.
    pub has_profile: bool,
}

/// Current session details.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionInfoResponse {
    pub session_id: String,
    pub address: String,
    pub chain: ChainFamily,
    pub expires_at: DateTime<Utc>,
    pub has_profile: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

fn session_response(state: &AppState, session: IssuedSession) -> Result<SessionResponse, ApiError> {
    let has_profile = IdentityResolver::new(&state.store)
        .get_by_address(&session.address)?
        .is_some();
    Ok(SessionResponse {
        token: session.token,
        token_type: "Bearer".to_string(),
        session_id: session.session_id,
        address: session.address.address,
        chain: session.address.chain,
        expires_at: session.expires_at,
        has_profile,
    })
}

/// Issue a sign-in challenge.
#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    tag = "Auth",
    request_body = ChallengeRequest,
    responses(
        (status = 201, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Invalid address for the chain")
    )
)]
pub async fn create_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<(StatusCode, Json<ChallengeResponse>), ApiError> {
    let challenge =
        ChallengeIssuer::new(&state.store, &state.auth).issue(request.chain, &request.address)?;
    Ok((
        StatusCode::CREATED,
        Json(ChallengeResponse {
            nonce: challenge.nonce,
            message: challenge.message,
            address: challenge.address,
            chain: challenge.chain,
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
        }),
    ))
}

/// Exchange a signed challenge for a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    tag = "Auth",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Authenticated", body = SessionResponse),
        (status = 401, description = "Challenge expired or signature invalid"),
        (status = 404, description = "Challenge unknown or already used")
    )
)]
pub async fn verify_challenge(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = SessionAuthenticator::new(&state.store, &state.auth)
        .authenticate(&request.nonce, &request.signature)?;
    Ok(Json(session_response(&state, session)?))
}

/// Describe the current session.
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session details", body = SessionInfoResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_session(
    Auth(wallet): Auth,
    State(state): State<AppState>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let identity = IdentityResolver::new(&state.store).get_by_address(&wallet.address)?;
    Ok(Json(SessionInfoResponse {
        session_id: wallet.session_id,
        address: wallet.address.address,
        chain: wallet.address.chain,
        expires_at: wallet.expires_at,
        has_profile: identity.is_some(),
        username: identity.map(|i| i.username),
    }))
}

/// Extend the current session.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session renewed", body = SessionResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn refresh_session(
    Auth(wallet): Auth,
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = SessionAuthenticator::new(&state.store, &state.auth).renew(&wallet)?;
    Ok(Json(session_response(&state, session)?))
}

/// Revoke the current session.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn logout(
    Auth(wallet): Auth,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    SessionAuthenticator::new(&state.store, &state.auth).logout(&wallet)?;
    Ok(StatusCode::NO_CONTENT)
}
