// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::blockchain::AddressError;
use crate::storage::StoreError;

/// Authentication error type.
///
/// Covers both halves of wallet auth: the challenge/signature exchange
/// and bearer-token checks on later requests.
#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Token is malformed
    MalformedToken,
    /// Token signature is invalid or the session is unknown
    InvalidToken,
    /// Session expired or was revoked
    SessionExpired,
    /// Address is not valid for its chain family
    InvalidAddress(String),
    /// Nonce was never issued or has already been used
    ChallengeNotFound,
    /// Challenge TTL elapsed before verification
    ChallengeExpired,
    /// Wallet signature does not verify against the challenge address
    InvalidSignature,
    /// Request names an address other than the session's
    AddressMismatch,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::SessionExpired => "session_expired",
            AuthError::InvalidAddress(_) => "invalid_address",
            AuthError::ChallengeNotFound => "challenge_not_found",
            AuthError::ChallengeExpired => "challenge_expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::AddressMismatch => "address_mismatch",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::MalformedToken
            | AuthError::InvalidToken
            | AuthError::SessionExpired
            | AuthError::ChallengeExpired
            | AuthError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AuthError::ChallengeNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            AuthError::AddressMismatch => StatusCode::FORBIDDEN,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::MalformedToken => write!(f, "Token is malformed"),
            AuthError::InvalidToken => write!(f, "Token is invalid"),
            AuthError::SessionExpired => write!(f, "Session has expired"),
            AuthError::InvalidAddress(msg) => write!(f, "Invalid address: {msg}"),
            AuthError::ChallengeNotFound => write!(f, "Challenge not found or already used"),
            AuthError::ChallengeExpired => write!(f, "Challenge has expired"),
            AuthError::InvalidSignature => write!(f, "Signature does not match the wallet address"),
            AuthError::AddressMismatch => {
                write!(f, "Address does not match the authenticated wallet")
            }
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::InternalError(err.to_string())
    }
}

impl From<AddressError> for AuthError {
    fn from(err: AddressError) -> Self {
        AuthError::InvalidAddress(err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn missing_auth_returns_401() {
        let response = AuthError::MissingAuthHeader.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "missing_auth_header");
    }

    #[tokio::test]
    async fn address_mismatch_returns_403() {
        let response = AuthError::AddressMismatch.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn used_challenge_returns_404() {
        let response = AuthError::ChallengeNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "challenge_not_found");
    }
}
