use axum::{
    Json,
    extract::{FromRequest, Request},
};
use rust_decimal::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::LedgerError;

// ============================================================================
// RequestAmount: Format-Validated Decimal at Serde Layer
// ============================================================================

/// Amount as sent by a client, JSON number or string.
///
/// Only the textual format is checked here:
/// - Rejects `.5` (must be `0.5`)
/// - Rejects `5.` (must be `5.0` or `5`)
/// - Rejects empty strings
///
/// Sign, precision and minimum are checked by `AmountPolicy`, so a negative
/// amount reaches the ledger and fails there as `INVALID_AMOUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestAmount(Decimal);

impl RequestAmount {
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for RequestAmount {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl<'de> Deserialize<'de> for RequestAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum DecimalOrString {
            String(String),
            Number(Decimal),
        }

        match DecimalOrString::deserialize(deserializer)? {
            DecimalOrString::String(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return Err(D::Error::custom("Amount cannot be empty"));
                }
                let digits = s.trim_start_matches('-');
                if digits.starts_with('.') {
                    return Err(D::Error::custom("Invalid format: use 0.5 not .5"));
                }
                if digits.ends_with('.') {
                    return Err(D::Error::custom("Invalid format: use 5.0 not 5."));
                }
                Decimal::from_str(s)
                    .map(RequestAmount)
                    .map_err(|e| D::Error::custom(format!("Invalid decimal: {}", e)))
            }
            DecimalOrString::Number(d) => Ok(RequestAmount(d)),
        }
    }
}

impl Serialize for RequestAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified success envelope
///
/// - code: always 0
/// - msg: short message description
/// - data: payload
///
/// Failures are rendered by `LedgerError` as `{code, error, message}`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn with_message(data: T, msg: impl Into<String>) -> Self {
        Self {
            code: 0,
            msg: msg.into(),
            data: Some(data),
        }
    }
}

// ============================================================================
// JSON Body Extractor
// ============================================================================

/// JSON request body. Malformed bodies are rejected as `LedgerError`, in the
/// `{code, error, message}` shape, instead of axum's plain-text 422.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = LedgerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Run `validator` rules on a request body.
pub fn validated<T: Validate>(request: T) -> Result<T, LedgerError> {
    request
        .validate()
        .map_err(|e| LedgerError::invalid_request(e.to_string()))?;
    Ok(request)
}
