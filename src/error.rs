// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::cipher::CipherError;

/// Why a caller is not authorized to proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotAuthorizedReason {
    /// The user never completed the Oura authorization flow.
    NotConnected,
    /// Stored credentials are expired or revoked and cannot be refreshed.
    ReconnectRequired,
    /// The two users are not friends, so their data cannot be compared.
    NotFriends,
}

impl NotAuthorizedReason {
    /// Whether the user can fix this by reconnecting their Oura account.
    pub fn requires_reconnect(self) -> bool {
        matches!(self, Self::NotConnected | Self::ReconnectRequired)
    }
}

impl std::fmt::Display for NotAuthorizedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "Oura account not connected"),
            Self::ReconnectRequired => write!(f, "Oura account must be reconnected"),
            Self::NotFriends => write!(f, "users are not friends"),
        }
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Not authorized: {0}")]
    NotAuthorized(NotAuthorizedReason),

    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    #[error("Temporarily unavailable: {0}")]
    TemporarilyUnavailable(String),

    #[error("Rate limited by Oura, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Oura rejected the access token")]
    TokenRejected,

    #[error("Authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("Oura API error: {0}")]
    ProviderApi(String),

    #[error("Credential decryption failed: {0}")]
    Decryption(#[from] CipherError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotAuthorized(reason) if reason.requires_reconnect() => (
                StatusCode::UNAUTHORIZED,
                "reconnect_required",
                Some(reason.to_string()),
            ),
            AppError::NotAuthorized(reason) => (
                StatusCode::FORBIDDEN,
                "not_authorized",
                Some(reason.to_string()),
            ),
            AppError::InvalidRelation(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_relation",
                Some(msg.clone()),
            ),
            AppError::TemporarilyUnavailable(msg) => {
                tracing::warn!(error = %msg, "Temporarily unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "temporarily_unavailable",
                    None,
                )
            }
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", None),
            AppError::TokenRejected => (StatusCode::BAD_GATEWAY, "oura_token_rejected", None),
            AppError::AuthExchange(msg) => (
                StatusCode::BAD_REQUEST,
                "auth_exchange_failed",
                Some(msg.clone()),
            ),
            AppError::ProviderApi(msg) => {
                (StatusCode::BAD_GATEWAY, "oura_error", Some(msg.clone()))
            }
            AppError::Decryption(err) => {
                tracing::error!(error = %err, "Credential decryption failed, check TOKEN_ENCRYPTION_KEY");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let retry_after = match &self {
            AppError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
