// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    blockchain::{
        builder::{EvmTransactionFields, PayloadEncoding},
        ChainAddress, ChainFamily, PreparedTransfer, ResolvedToken, SubmitState, TokenKind,
    },
    identity::{contacts::ContactEntry, ProfileFields, PublicProfile},
    state::AppState,
    storage::{Direction, TransferRecord, TransferStatus},
};

pub mod auth;
pub mod contacts;
pub mod health;
pub mod profiles;
pub mod transfers;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/challenge", post(auth::create_challenge))
        .route("/auth/verify", post(auth::verify_challenge))
        .route("/auth/session", get(auth::get_session))
        .route("/auth/refresh", post(auth::refresh_session))
        .route("/auth/logout", post(auth::logout))
        .route(
            "/profile",
            get(profiles::get_profile)
                .post(profiles::register_profile)
                .put(profiles::update_profile),
        )
        .route("/profile/wallets", post(profiles::link_wallet))
        .route("/profiles/{username}", get(profiles::public_profile))
        .route(
            "/contacts",
            get(contacts::list_contacts).post(contacts::add_contact),
        )
        .route("/contacts/{username}", delete(contacts::remove_contact))
        .route("/transfers", get(transfers::list_transfers))
        .route("/transfers/prepare", post(transfers::prepare_transfer))
        .route("/transfers/submit", post(transfers::submit_transfer))
        .route("/transfers/{signature}", get(transfers::get_transfer));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        auth::create_challenge,
        auth::verify_challenge,
        auth::get_session,
        auth::refresh_session,
        auth::logout,
        profiles::register_profile,
        profiles::get_profile,
        profiles::update_profile,
        profiles::link_wallet,
        profiles::public_profile,
        contacts::list_contacts,
        contacts::add_contact,
        contacts::remove_contact,
        transfers::prepare_transfer,
        transfers::submit_transfer,
        transfers::list_transfers,
        transfers::get_transfer
    ),
    components(
        schemas(
            ChainFamily,
            ChainAddress,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            auth::ChallengeRequest,
            auth::ChallengeResponse,
            auth::VerifyRequest,
            auth::SessionResponse,
            auth::SessionInfoResponse,
            profiles::RegisterProfileRequest,
            profiles::LinkWalletRequest,
            profiles::ProfileResponse,
            ProfileFields,
            PublicProfile,
            ContactEntry,
            contacts::AddContactRequest,
            contacts::ContactListResponse,
            transfers::PrepareTransferRequest,
            transfers::SubmitTransferRequest,
            transfers::SubmitTransferResponse,
            transfers::TransferHistoryItem,
            transfers::TransferHistoryResponse,
            PreparedTransfer,
            PayloadEncoding,
            EvmTransactionFields,
            ResolvedToken,
            TokenKind,
            SubmitState,
            TransferRecord,
            TransferStatus,
            Direction
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Wallet sign-in and sessions"),
        (name = "Profiles", description = "Usernames, profiles and linked wallets"),
        (name = "Contacts", description = "Saved recipients"),
        (name = "Transfers", description = "Prepare, relay and track transfers")
    )
)]
pub struct ApiDoc;
