// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transfer endpoints.
//!
//! Prepare returns an unsigned transaction for the session wallet; submit
//! re-checks the signed result against the same request before relaying it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::Auth,
    blockchain::{PreparedTransfer, SubmitRequest, SubmitState, TransactionBuilder, TransactionRelay},
    error::ApiError,
    state::AppState,
    storage::{Direction, TransactionLedger, TransferRecord, TransferStatus},
};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

fn native() -> String {
    "native".to_string()
}

/// Transfer to a username.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PrepareTransferRequest {
    pub recipient_username: String,
    /// Decimal amount in whole tokens, e.g. `"1.5"`.
    pub amount: String,
    /// `native`, a known symbol (`USDC`), or a mint/contract address.
    #[serde(default = "native")]
    pub token: String,
    /// Optional note, at most 280 characters.
    #[serde(default)]
    pub memo: Option<String>,
    /// Sending wallet; must be the session's when present.
    #[serde(default)]
    pub from_address: Option<String>,
}

/// Signed transaction plus the request it was prepared for.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitTransferRequest {
    /// Signed transaction (base64 for Solana, hex for EVM).
    pub signed_transaction: String,
    pub recipient_username: String,
    pub amount: String,
    #[serde(default = "native")]
    pub token: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub from_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitTransferResponse {
    pub transfer: TransferRecord,
    /// `broadcast`, `duplicate`, or `unconfirmed` (broadcast timed out; poll
    /// the transfer for its outcome).
    pub state: SubmitState,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferHistoryItem {
    pub direction: Direction,
    pub transfer: TransferRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransferHistoryResponse {
    pub items: Vec<TransferHistoryItem>,
    /// Pass as `cursor` to fetch the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Cursor from a previous page
    pub cursor: Option<String>,
    /// Page size (default 20, max 100)
    pub limit: Option<usize>,
}

/// Build an unsigned transfer for the session wallet to sign.
#[utoipa::path(
    post,
    path = "/v1/transfers/prepare",
    tag = "Transfers",
    security(("bearer_auth" = [])),
    request_body = PrepareTransferRequest,
    responses(
        (status = 200, description = "Unsigned transaction", body = PreparedTransfer),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "from_address is not the session wallet"),
        (status = 404, description = "Recipient has no wallet on this chain"),
        (status = 422, description = "Invalid amount, token or memo"),
        (status = 503, description = "Chain RPC unavailable")
    )
)]
pub async fn prepare_transfer(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Json(request): Json<PrepareTransferRequest>,
) -> Result<Json<PreparedTransfer>, ApiError> {
    if let Some(from) = &request.from_address {
        wallet.ensure_address(from)?;
    }
    let prepared = TransactionBuilder::new(&state.store, &state.rpc)
        .with_retry_policy(state.retry)
        .prepare(
            &wallet.address,
            &request.recipient_username,
            &request.amount,
            &request.token,
            request.memo.as_deref(),
        )
        .await?;
    Ok(Json(prepared))
}

/// Verify a signed transfer against the request and broadcast it.
#[utoipa::path(
    post,
    path = "/v1/transfers/submit",
    tag = "Transfers",
    security(("bearer_auth" = [])),
    request_body = SubmitTransferRequest,
    responses(
        (status = 201, description = "Broadcast; transfer recorded as pending", body = SubmitTransferResponse),
        (status = 202, description = "Broadcast outcome unknown; poll the transfer", body = SubmitTransferResponse),
        (status = 200, description = "Already submitted; existing record", body = SubmitTransferResponse),
        (status = 400, description = "Malformed transaction"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "from_address is not the session wallet"),
        (status = 422, description = "Transaction does not match the request, or the chain rejected it"),
        (status = 503, description = "Chain RPC unavailable; safe to retry")
    )
)]
pub async fn submit_transfer(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Json(request): Json<SubmitTransferRequest>,
) -> Result<(StatusCode, Json<SubmitTransferResponse>), ApiError> {
    if let Some(from) = &request.from_address {
        wallet.ensure_address(from)?;
    }
    let outcome = TransactionRelay::new(&state.store, &state.rpc)
        .with_retry_policy(state.retry)
        .submit(
            &wallet.address,
            SubmitRequest {
                signed_transaction: &request.signed_transaction,
                recipient_username: &request.recipient_username,
                amount: &request.amount,
                token: &request.token,
                memo: request.memo.as_deref(),
            },
        )
        .await?;

    if outcome.state != SubmitState::Duplicate {
        spawn_confirmation(&state, outcome.record.signature.clone());
    }

    let status = match outcome.state {
        SubmitState::Broadcast => StatusCode::CREATED,
        SubmitState::Unconfirmed => StatusCode::ACCEPTED,
        SubmitState::Duplicate => StatusCode::OK,
    };
    Ok((
        status,
        Json(SubmitTransferResponse {
            transfer: outcome.record,
            state: outcome.state,
        }),
    ))
}

/// Follow a fresh broadcast with a short confirmation loop. Whatever is
/// still pending afterwards is left to the background poller.
fn spawn_confirmation(state: &AppState, signature: String) {
    let store = state.store.clone();
    let rpc = state.rpc.clone();
    let retry = state.retry;
    tokio::spawn(async move {
        match TransactionRelay::new(&store, &rpc)
            .with_retry_policy(retry)
            .confirm(&signature)
            .await
        {
            Ok(record) => debug!(%signature, status = record.status.as_str(), "Confirmation loop finished"),
            Err(e) => warn!(%signature, error = %e, "Confirmation loop failed"),
        }
    });
}

/// Sent and received transfers of the session wallet, newest first.
#[utoipa::path(
    get,
    path = "/v1/transfers",
    tag = "Transfers",
    security(("bearer_auth" = [])),
    params(HistoryQuery),
    responses(
        (status = 200, description = "Transfer history", body = TransferHistoryResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_transfers(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<TransferHistoryResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let page = TransactionLedger::new(&state.store).list_for(
        &wallet.address,
        query.cursor.as_deref(),
        limit,
    )?;
    Ok(Json(TransferHistoryResponse {
        items: page
            .items
            .into_iter()
            .map(|(transfer, direction)| TransferHistoryItem {
                direction,
                transfer,
            })
            .collect(),
        next_cursor: page.next_cursor,
    }))
}

/// Status of one transfer. Pending transfers are re-checked on-chain.
#[utoipa::path(
    get,
    path = "/v1/transfers/{signature}",
    tag = "Transfers",
    security(("bearer_auth" = [])),
    params(("signature" = String, Path, description = "Chain transaction id")),
    responses(
        (status = 200, description = "Transfer", body = TransferRecord),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown transfer, or not one of the caller's")
    )
)]
pub async fn get_transfer(
    Auth(wallet): Auth,
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> Result<Json<TransferRecord>, ApiError> {
    let record = TransactionLedger::new(&state.store)
        .get(&signature)?
        .filter(|r| {
            r.chain == wallet.address.chain
                && (wallet.address.matches(&r.from_address) || wallet.address.matches(&r.to_address))
        })
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "transfer_not_found", "Transfer not found"))?;

    if record.status != TransferStatus::Pending {
        return Ok(Json(record));
    }
    match TransactionRelay::new(&state.store, &state.rpc)
        .refresh(&record.signature)
        .await
    {
        Ok(updated) => Ok(Json(updated)),
        Err(e) => {
            warn!(signature = %record.signature, error = %e, "Status refresh failed");
            Ok(Json(record))
        }
    }
}
