//! API key management endpoints. Bearer-token sessions only.

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::api_key::{ExpiryChoice, IssuedApiKey};
use super::capability::{Capability, CapabilitySet};
use super::repository::ApiKeyRecord;
use super::resolver::{CredentialKind, Principal};
use crate::core_types::ApiKeyId;
use crate::error::LedgerError;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiResponse, JsonBody, validated};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100))]
    #[schema(example = "payouts-bot")]
    pub name: String,
    /// Any of `deposit`, `transfer`, `read`
    #[validate(length(min = 1))]
    #[schema(example = json!(["read", "transfer"]))]
    pub permissions: Vec<String>,
    /// One of `1H`, `1D`, `1M`, `1Y`
    #[schema(example = "1M")]
    pub expiry: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RolloverApiKeyRequest {
    pub expired_key_id: Uuid,
    #[schema(example = "1M")]
    pub expiry: String,
}

/// Returned once at creation or rollover; the plaintext is never stored.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyCreatedData {
    pub key_id: Uuid,
    pub api_key: String,
    pub name: String,
    pub permissions: Vec<Capability>,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedApiKey> for ApiKeyCreatedData {
    fn from(issued: IssuedApiKey) -> Self {
        Self {
            key_id: issued.key_id,
            api_key: issued.api_key,
            name: issued.name,
            permissions: issued.permissions.to_vec(),
            expires_at: issued.expires_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyInfo {
    pub key_id: Uuid,
    pub name: String,
    pub permissions: Vec<Capability>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<ApiKeyRecord> for ApiKeyInfo {
    fn from(record: ApiKeyRecord) -> Self {
        Self {
            key_id: record.key_id,
            name: record.name,
            permissions: record.permissions.to_vec(),
            is_active: record.is_active,
            expires_at: record.expires_at,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokedData {
    pub key_id: Uuid,
    pub revoked: bool,
}

/// A scoped key must not be able to mint a broader one.
fn require_session(principal: &Principal) -> Result<(), LedgerError> {
    match principal.kind {
        CredentialKind::BearerToken => Ok(()),
        CredentialKind::ApiKey => Err(LedgerError::TokenRequired),
    }
}

/// Create API key
///
/// POST /api/v1/keys
#[utoipa::path(
    post,
    path = "/api/v1/keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 200, description = "Key created; plaintext shown once", body = ApiResponse<ApiKeyCreatedData>),
        (status = 400, description = "Invalid name, permission or expiry, or key quota reached"),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Bearer token required")
    ),
    security(("bearer_auth" = [])),
    tag = "API Keys"
)]
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<CreateApiKeyRequest>,
) -> Result<Json<ApiResponse<ApiKeyCreatedData>>, LedgerError> {
    require_session(&principal)?;
    let req = validated(req)?;
    let permissions = CapabilitySet::parse_names(&req.permissions)?;
    let expiry: ExpiryChoice = req.expiry.parse()?;

    let issued = state
        .api_keys
        .issue(principal.owner_id, &req.name, permissions, expiry)
        .await?;
    Ok(Json(ApiResponse::with_message(
        issued.into(),
        "Store this key now; it will not be shown again",
    )))
}

/// List API keys
///
/// GET /api/v1/keys
#[utoipa::path(
    get,
    path = "/api/v1/keys",
    responses(
        (status = 200, description = "Key metadata, newest first", body = ApiResponse<Vec<ApiKeyInfo>>),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Bearer token required")
    ),
    security(("bearer_auth" = [])),
    tag = "API Keys"
)]
pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<ApiKeyInfo>>>, LedgerError> {
    require_session(&principal)?;
    let keys = state.api_keys.list(principal.owner_id).await?;
    Ok(Json(ApiResponse::success(
        keys.into_iter().map(ApiKeyInfo::from).collect(),
    )))
}

/// Revoke API key
///
/// POST /api/v1/keys/{key_id}/revoke
#[utoipa::path(
    post,
    path = "/api/v1/keys/{key_id}/revoke",
    params(("key_id" = uuid::Uuid, Path, description = "Key to revoke")),
    responses(
        (status = 200, description = "Key revoked", body = ApiResponse<RevokedData>),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Bearer token required"),
        (status = 404, description = "Key absent or already inactive")
    ),
    security(("bearer_auth" = [])),
    tag = "API Keys"
)]
pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(key_id): Path<ApiKeyId>,
) -> Result<Json<ApiResponse<RevokedData>>, LedgerError> {
    require_session(&principal)?;
    state.api_keys.revoke(principal.owner_id, key_id).await?;
    Ok(Json(ApiResponse::success(RevokedData {
        key_id,
        revoked: true,
    })))
}

/// Roll over an expired API key
///
/// POST /api/v1/keys/rollover
#[utoipa::path(
    post,
    path = "/api/v1/keys/rollover",
    request_body = RolloverApiKeyRequest,
    responses(
        (status = 200, description = "Replacement key; plaintext shown once", body = ApiResponse<ApiKeyCreatedData>),
        (status = 400, description = "Key not expired, bad expiry or key quota reached"),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Bearer token required"),
        (status = 404, description = "Key not found")
    ),
    security(("bearer_auth" = [])),
    tag = "API Keys"
)]
pub async fn rollover_api_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<RolloverApiKeyRequest>,
) -> Result<Json<ApiResponse<ApiKeyCreatedData>>, LedgerError> {
    require_session(&principal)?;
    let expiry: ExpiryChoice = req.expiry.parse()?;
    let issued = state
        .api_keys
        .rollover(principal.owner_id, req.expired_key_id, expiry)
        .await?;
    Ok(Json(ApiResponse::with_message(
        issued.into(),
        "Store this key now; it will not be shown again",
    )))
}
