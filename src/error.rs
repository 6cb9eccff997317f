// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP error type shared by every handler.
//!
//! Component errors convert into `ApiError` here, so the status and
//! `error_code` for each failure are decided in one place.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::auth::AuthError;
use crate::blockchain::{BuildError, SubmitError};
use crate::identity::IdentityError;
use crate::storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    /// Opaque 500; the cause is logged, not returned.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::internal(err)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InternalError(cause) => ApiError::internal(cause),
            other => ApiError::new(other.status_code(), other.error_code(), other.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        let message = err.to_string();
        match err {
            IdentityError::InvalidUsername(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_username", message)
            }
            IdentityError::InvalidProfile(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid_profile", message)
            }
            IdentityError::SelfContact => {
                ApiError::new(StatusCode::BAD_REQUEST, "self_contact", message)
            }
            IdentityError::UsernameTaken => ApiError::conflict("username_taken", message),
            IdentityError::AddressAlreadyLinked => {
                ApiError::conflict("address_already_linked", message)
            }
            IdentityError::ChainAlreadyLinked { .. } => {
                ApiError::conflict("chain_already_linked", message)
            }
            IdentityError::ContactExists => ApiError::conflict("contact_exists", message),
            IdentityError::NotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "profile_not_found", message)
            }
            IdentityError::Store(e) => ApiError::internal(e),
        }
    }
}

impl From<BuildError> for ApiError {
    fn from(err: BuildError) -> Self {
        let (status, code) = match &err {
            BuildError::RecipientNotFound(_) => (StatusCode::NOT_FOUND, "recipient_not_found"),
            BuildError::InvalidAmount(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount"),
            BuildError::UnsupportedToken(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unsupported_token")
            }
            BuildError::InvalidMemo => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_memo"),
            BuildError::ChainRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, "chain_rejected"),
            BuildError::InvalidAddress(_) => (StatusCode::BAD_REQUEST, "invalid_address"),
            BuildError::RelayUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "relay_unavailable")
            }
            BuildError::Store(_) => return ApiError::internal(err),
        };
        ApiError::new(status, code, err.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        let message = err.to_string();
        match err {
            SubmitError::MalformedTransaction(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "malformed_transaction", message)
            }
            SubmitError::TransactionMismatch(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "transaction_mismatch", message)
            }
            SubmitError::InvalidRequest(inner) => inner.into(),
            SubmitError::BroadcastRejected(_) => {
                ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "broadcast_rejected", message)
            }
            SubmitError::RelayUnavailable(_) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "relay_unavailable", message)
            }
            SubmitError::NotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "transfer_not_found", message)
            }
            SubmitError::Store(e) => ApiError::internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    use crate::blockchain::amount::AmountError;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.message, "bad");

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(unp.message, "oops");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"bad_request"}"#);
    }

    #[test]
    fn component_errors_map_to_statuses() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (
                BuildError::InvalidAmount(AmountError::Zero).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_amount",
            ),
            (
                BuildError::RecipientNotFound("bob".into()).into(),
                StatusCode::NOT_FOUND,
                "recipient_not_found",
            ),
            (
                SubmitError::TransactionMismatch("amount".into()).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "transaction_mismatch",
            ),
            (
                SubmitError::InvalidRequest(BuildError::InvalidMemo).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_memo",
            ),
            (
                SubmitError::RelayUnavailable("down".into()).into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "relay_unavailable",
            ),
            (
                IdentityError::UsernameTaken.into(),
                StatusCode::CONFLICT,
                "username_taken",
            ),
            (
                AuthError::ChallengeExpired.into(),
                StatusCode::UNAUTHORIZED,
                "challenge_expired",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status, status, "{code}");
            assert_eq!(err.code, code);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err: ApiError = AuthError::InternalError("disk on fire".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("disk"));
    }
}
