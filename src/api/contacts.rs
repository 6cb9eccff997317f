// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Contact book endpoints. All require a registered profile.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::Auth,
    error::ApiError,
    identity::{ContactBook, ContactEntry, IdentityResolver},
    state::AppState,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddContactRequest {
    /// Username to save.
    pub username: String,
    /// Private label, at most 50 characters.
    #[serde(default)]
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ContactListResponse {
    pub contacts: Vec<ContactEntry>,
    pub total: usize,
}

#[utoipa::path(
    get,
    path = "/v1/contacts",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Contacts in alphabetical order", body = ContactListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No profile registered")
    )
)]
pub async fn list_contacts(
    Auth(wallet): Auth,
    State(state): State<AppState>,
) -> Result<Json<ContactListResponse>, ApiError> {
    let owner = IdentityResolver::new(&state.store).require_by_address(&wallet.address)?;
    let contacts = ContactBook::new(&state.store).list(&owner)?;
    let total = contacts.len();
    Ok(Json(ContactListResponse { contacts, total }))
}

#[utoipa::path(
    post,
    path = "/v1/contacts",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    request_body = AddContactRequest,
    responses(
        (status = 201, description = "Contact added", body = ContactEntry),
        (status = 400, description = "Self-add or invalid nickname"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown username"),
        (status = 409, description = "Already a contact")
    )
)]
pub async fn add_contact(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Json(request): Json<AddContactRequest>,
) -> Result<(StatusCode, Json<ContactEntry>), ApiError> {
    let owner = IdentityResolver::new(&state.store).require_by_address(&wallet.address)?;
    let entry = ContactBook::new(&state.store).add(
        &owner,
        &request.username,
        request.nickname.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    delete,
    path = "/v1/contacts/{username}",
    tag = "Contacts",
    security(("bearer_auth" = [])),
    params(("username" = String, Path, description = "Contact username")),
    responses(
        (status = 204, description = "Contact removed"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not a contact")
    )
)]
pub async fn remove_contact(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    let owner = IdentityResolver::new(&state.store).require_by_address(&wallet.address)?;
    ContactBook::new(&state.store).remove(&owner, &username)?;
    Ok(StatusCode::NO_CONTENT)
}
