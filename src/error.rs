//! Ledger error types.
//!
//! Every failure that reaches a caller maps to a stable numeric code, a
//! machine-readable name and an HTTP status. Storage and transport failures
//! collapse into [`LedgerError::Internal`], whose detail is logged but never
//! rendered.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::api_auth::Capability;

/// Error codes exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// 1001: Amount non-positive, below minimum or too precise
    InvalidAmount = 1001,
    /// 1002: Sender balance lower than the requested amount
    InsufficientBalance = 1002,
    /// 1003: Sender and recipient are the same account
    SelfTransfer = 1003,
    /// 1004: Reference already used by another record
    DuplicateReference = 1004,
    /// 1005: Active API key cap reached
    KeyQuotaExceeded = 1005,
    /// 1006: Malformed request field
    InvalidRequest = 1006,
    /// 4001: No or invalid credential
    Unauthenticated = 4001,
    /// 4003: Valid credential, missing capability
    Forbidden = 4003,
    /// 4004: Resource absent or not owned by caller
    NotFound = 4004,
    /// 4010: Webhook signature missing or wrong
    SignatureInvalid = 4010,
    /// 5000: Internal failure
    Internal = 5000,
    /// 5003: Payment provider timed out or rejected the call
    ProviderUnavailable = 5003,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::InsufficientBalance => "INSUFFICIENT_BALANCE",
            Self::SelfTransfer => "SELF_TRANSFER",
            Self::DuplicateReference => "DUPLICATE_REFERENCE",
            Self::KeyQuotaExceeded => "KEY_QUOTA_EXCEEDED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::SignatureInvalid => "SIGNATURE_INVALID",
            Self::Internal => "INTERNAL_ERROR",
            Self::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
        }
    }

    pub fn http_status(self) -> StatusCode {
        match self {
            Self::Unauthenticated | Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateReference => StatusCode::CONFLICT,
            Self::ProviderUnavailable => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("Missing required permission: {0}")]
    Forbidden(Capability),

    #[error("API key management requires a bearer token session")]
    TokenRequired,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidAmount(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Cannot transfer to your own account")]
    SelfTransfer,

    #[error("Reference already exists: {0}")]
    DuplicateReference(String),

    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Maximum {0} active API keys allowed")]
    KeyQuotaExceeded(usize),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::Forbidden(_) | Self::TokenRequired => ErrorCode::Forbidden,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidAmount(_) => ErrorCode::InvalidAmount,
            Self::InsufficientBalance => ErrorCode::InsufficientBalance,
            Self::SelfTransfer => ErrorCode::SelfTransfer,
            Self::DuplicateReference(_) => ErrorCode::DuplicateReference,
            Self::ProviderUnavailable(_) => ErrorCode::ProviderUnavailable,
            Self::SignatureInvalid => ErrorCode::SignatureInvalid,
            Self::KeyQuotaExceeded(_) => ErrorCode::KeyQuotaExceeded,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Message safe to show a caller. Provider and storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::ProviderUnavailable(_) => "Payment provider unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database: {}", err))
    }
}

impl From<JsonRejection> for LedgerError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        match rejection {
            // serde_path_to_error prefixes the failing field path
            JsonRejection::JsonDataError(_) if detail.contains("target type: amount:") => {
                Self::InvalidAmount(detail)
            }
            _ => Self::InvalidRequest(detail),
        }
    }
}

/// JSON response body for ledger errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let code = self.code();
        match &self {
            Self::Internal(detail) => tracing::error!(detail = %detail, "Request failed"),
            Self::ProviderUnavailable(detail) => {
                tracing::warn!(detail = %detail, "Payment provider call failed")
            }
            _ => {}
        }
        let body = ErrorResponse {
            code: code.code(),
            error: code.name(),
            message: self.public_message(),
        };
        (code.http_status(), Json(body)).into_response()
    }
}
