// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Profile endpoints: registration, own profile, linked wallets and the
//! public lookup used by the embeddable widget.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{Auth, SessionAuthenticator},
    blockchain::{ChainAddress, ChainFamily},
    error::ApiError,
    identity::{IdentityResolver, ProfileFields, PublicProfile},
    state::AppState,
    storage::StoredIdentity,
};

/// Register a username for the session wallet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterProfileRequest {
    /// 3–20 characters of letters, digits and underscores.
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// Prove ownership of another wallet and link it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinkWalletRequest {
    /// Nonce of a challenge issued for the wallet being linked.
    pub nonce: String,
    /// That wallet's signature of the challenge message.
    pub signature: String,
}

/// The caller's own profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
    pub is_verified: bool,
    pub primary_address: ChainAddress,
    /// Chain family → address
    #[schema(value_type = Object)]
    pub wallets: BTreeMap<ChainFamily, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredIdentity> for ProfileResponse {
    fn from(identity: StoredIdentity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            display_name: identity.display_name,
            bio: identity.bio,
            profile_picture: identity.profile_picture,
            is_verified: identity.is_verified,
            primary_address: identity.primary_address,
            wallets: identity.linked_addresses,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

/// Register a profile for the session wallet.
#[utoipa::path(
    post,
    path = "/v1/profile",
    tag = "Profiles",
    security(("bearer_auth" = [])),
    request_body = RegisterProfileRequest,
    responses(
        (status = 201, description = "Profile registered", body = ProfileResponse),
        (status = 400, description = "Invalid username or profile field"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Username taken or wallet already registered")
    )
)]
pub async fn register_profile(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Json(request): Json<RegisterProfileRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>), ApiError> {
    let fields = ProfileFields {
        display_name: request.display_name,
        bio: request.bio,
        profile_picture: request.profile_picture,
    };
    let identity =
        IdentityResolver::new(&state.store).register(&wallet.address, &request.username, &fields)?;
    Ok((StatusCode::CREATED, Json(identity.into())))
}

/// Get the session wallet's profile.
#[utoipa::path(
    get,
    path = "/v1/profile",
    tag = "Profiles",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No profile registered")
    )
)]
pub async fn get_profile(
    Auth(wallet): Auth,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let identity = IdentityResolver::new(&state.store).require_by_address(&wallet.address)?;
    Ok(Json(identity.into()))
}

/// Update display name, bio or picture. Omitted fields are unchanged.
#[utoipa::path(
    put,
    path = "/v1/profile",
    tag = "Profiles",
    security(("bearer_auth" = [])),
    request_body = ProfileFields,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 400, description = "Invalid profile field"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No profile registered")
    )
)]
pub async fn update_profile(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Json(fields): Json<ProfileFields>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let resolver = IdentityResolver::new(&state.store);
    let identity = resolver.require_by_address(&wallet.address)?;
    let updated = resolver.update_profile(&identity.id, &fields)?;
    Ok(Json(updated.into()))
}

/// Link another wallet to the caller's profile.
///
/// The new wallet proves ownership by signing a challenge issued for it.
#[utoipa::path(
    post,
    path = "/v1/profile/wallets",
    tag = "Profiles",
    security(("bearer_auth" = [])),
    request_body = LinkWalletRequest,
    responses(
        (status = 200, description = "Wallet linked", body = ProfileResponse),
        (status = 401, description = "Unauthorized or signature invalid"),
        (status = 404, description = "No profile or challenge not found"),
        (status = 409, description = "Wallet or chain already linked")
    )
)]
pub async fn link_wallet(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Json(request): Json<LinkWalletRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let resolver = IdentityResolver::new(&state.store);
    let identity = resolver.require_by_address(&wallet.address)?;
    let proven = SessionAuthenticator::new(&state.store, &state.auth)
        .verify_challenge(&request.nonce, &request.signature)?;
    let updated = resolver.link_address(&identity.id, &proven)?;
    Ok(Json(updated.into()))
}

/// Public profile lookup.
///
/// Always 200; unknown usernames return `found: false`.
#[utoipa::path(
    get,
    path = "/v1/profiles/{username}",
    tag = "Profiles",
    params(("username" = String, Path, description = "Username (case-insensitive)")),
    responses(
        (status = 200, description = "Lookup result", body = PublicProfile)
    )
)]
pub async fn public_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicProfile>, ApiError> {
    Ok(Json(IdentityResolver::new(&state.store).public_profile(&username)?))
}
