//! Internal session endpoint.
//!
//! Stands in for the external identity flow during development: records the
//! owner, opens their wallet and issues a bearer token. Only compiled with the
//! `mock-api` feature and gated by `X-Internal-Secret`.

use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiResponse, JsonBody, validated};
use crate::ledger::OwnerIdentity;

pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SessionRequest {
    /// Identity provider subject; a fresh id is assigned when absent
    pub owner_id: Option<Uuid>,
    #[validate(email)]
    #[schema(example = "ada@example.com")]
    pub email: String,
    #[validate(length(max = 100))]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionData {
    pub owner_id: Uuid,
    pub access_token: String,
    pub token_type: String,
    pub account_number: String,
}

fn check_internal_secret(expected: Option<&str>, headers: &HeaderMap) -> Result<(), LedgerError> {
    let presented = headers
        .get(INTERNAL_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    match (expected, presented) {
        (Some(expected), Some(presented))
            if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) =>
        {
            Ok(())
        }
        _ => Err(LedgerError::unauthenticated(
            "Missing or invalid X-Internal-Secret",
        )),
    }
}

/// Open an internal session
///
/// POST /internal/session
#[utoipa::path(
    post,
    path = "/internal/session",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Wallet ready, token issued", body = ApiResponse<SessionData>),
        (status = 400, description = "Invalid identity"),
        (status = 401, description = "Missing or invalid internal secret")
    ),
    tag = "Internal"
)]
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<SessionRequest>,
) -> Result<Json<ApiResponse<SessionData>>, LedgerError> {
    check_internal_secret(state.internal_secret.as_deref(), &headers)?;
    let req = validated(req)?;

    let identity = OwnerIdentity {
        owner_id: req.owner_id.unwrap_or_else(Uuid::new_v4),
        email: req.email,
        display_name: req.display_name,
    };
    let account = state.ledger.establish_owner(&identity).await?;
    let access_token = state.tokens.issue(identity.owner_id, &identity.email)?;

    tracing::info!(owner_id = %identity.owner_id, account_number = %account.account_number, "Session opened");

    Ok(Json(ApiResponse::success(SessionData {
        owner_id: identity.owner_id,
        access_token,
        token_type: "bearer".to_string(),
        account_number: account.account_number,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_internal_secret_gate() {
        let mut headers = HeaderMap::new();
        assert!(check_internal_secret(Some("s3cret"), &headers).is_err());

        headers.insert(INTERNAL_SECRET_HEADER, HeaderValue::from_static("wrong"));
        assert!(check_internal_secret(Some("s3cret"), &headers).is_err());

        headers.insert(INTERNAL_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(check_internal_secret(Some("s3cret"), &headers).is_ok());
        // Unconfigured secret closes the endpoint
        assert!(check_internal_secret(None, &headers).is_err());
    }

    #[test]
    fn test_session_request_requires_email() {
        let req: SessionRequest =
            serde_json::from_value(serde_json::json!({"email": "not-an-email"})).unwrap();
        assert!(validated(req).is_err());
    }
}
