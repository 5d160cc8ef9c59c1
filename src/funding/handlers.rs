//! Wallet HTTP handlers: balance, deposits, transfers, history and the
//! provider webhook.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::signature::SIGNATURE_HEADER;
use crate::api_auth::{Capability, Principal};
use crate::error::LedgerError;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiResponse, JsonBody, RequestAmount, validated};
use crate::ledger::{TransactionKind, TransactionRecord, TransactionStatus};
use crate::money::at_minor_scale;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 500;

// --- Requests ---

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    #[schema(value_type = String, example = "5000.00")]
    pub amount: RequestAmount,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "4566678954356")]
    pub recipient_account_number: String,
    #[schema(value_type = String, example = "2500.00")]
    pub amount: RequestAmount,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Ask the provider about a pending deposit
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Newest first, default 100, capped at 500
    pub limit: Option<usize>,
}

impl HistoryQuery {
    fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

// --- Responses ---

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceData {
    pub account_number: String,
    #[schema(value_type = String, example = "7500.00")]
    pub balance: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DepositData {
    pub reference: String,
    pub authorization_url: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DepositStatusData {
    pub reference: String,
    pub status: TransactionStatus,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferData {
    pub status: String,
    pub reference: String,
    pub recipient_account_number: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionData {
    pub transaction_id: uuid::Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TransactionRecord> for TransactionData {
    fn from(record: TransactionRecord) -> Self {
        Self {
            transaction_id: record.transaction_id,
            kind: record.kind,
            amount: at_minor_scale(record.amount),
            currency: record.currency,
            status: record.status,
            reference: record.reference,
            description: record.description,
            created_at: record.created_at,
        }
    }
}

/// Webhook acknowledgment. Carries no balances.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub status: String,
}

// --- Handlers ---

/// Get wallet balance
///
/// GET /api/v1/wallet/balance
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance",
    responses(
        (status = 200, description = "Current balance", body = ApiResponse<BalanceData>),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Missing read permission")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    tag = "Wallet"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<BalanceData>>, LedgerError> {
    principal.require(&[Capability::Read])?;
    let account = state
        .ledger
        .account_for_owner(principal.owner_id)
        .await?
        .ok_or(LedgerError::NotFound("Wallet"))?;
    Ok(Json(ApiResponse::success(BalanceData {
        account_number: account.account_number,
        balance: at_minor_scale(account.balance),
    })))
}

/// Start a deposit
///
/// POST /api/v1/wallet/deposit
#[utoipa::path(
    post,
    path = "/api/v1/wallet/deposit",
    request_body = DepositRequest,
    responses(
        (status = 200, description = "Checkout session opened", body = ApiResponse<DepositData>),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Missing deposit permission"),
        (status = 502, description = "Payment provider unavailable")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    tag = "Wallet"
)]
pub async fn initiate_deposit(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<DepositRequest>,
) -> Result<Json<ApiResponse<DepositData>>, LedgerError> {
    principal.require(&[Capability::Deposit])?;
    let session = state
        .deposits
        .initiate(principal.owner_id, req.amount.inner())
        .await?;
    Ok(Json(ApiResponse::success(DepositData {
        reference: session.reference,
        authorization_url: session.authorization_url,
        amount: at_minor_scale(session.amount),
    })))
}

/// Deposit status
///
/// GET /api/v1/wallet/deposit/{reference}/status
#[utoipa::path(
    get,
    path = "/api/v1/wallet/deposit/{reference}/status",
    params(
        ("reference" = String, Path, description = "Deposit reference"),
        StatusQuery
    ),
    responses(
        (status = 200, description = "Deposit status", body = ApiResponse<DepositStatusData>),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Missing read permission"),
        (status = 404, description = "No such deposit for this caller")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    tag = "Wallet"
)]
pub async fn deposit_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(reference): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<ApiResponse<DepositStatusData>>, LedgerError> {
    principal.require(&[Capability::Read])?;
    let status = state
        .deposits
        .status(principal.owner_id, &reference, query.refresh)
        .await?;
    Ok(Json(ApiResponse::success(DepositStatusData {
        reference: status.reference,
        status: status.status,
        amount: at_minor_scale(status.amount),
    })))
}

/// Transfer to another wallet
///
/// POST /api/v1/wallet/transfer
#[utoipa::path(
    post,
    path = "/api/v1/wallet/transfer",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer committed", body = ApiResponse<TransferData>),
        (status = 400, description = "Invalid amount, self transfer or insufficient balance"),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Missing transfer permission"),
        (status = 404, description = "Recipient account not found")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    tag = "Wallet"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    JsonBody(req): JsonBody<TransferRequest>,
) -> Result<Json<ApiResponse<TransferData>>, LedgerError> {
    principal.require(&[Capability::Transfer])?;
    let req = validated(req)?;
    let receipt = state
        .transfers
        .transfer(
            principal.owner_id,
            &req.recipient_account_number,
            req.amount.inner(),
        )
        .await?;
    Ok(Json(ApiResponse::with_message(
        TransferData {
            status: "success".to_string(),
            reference: receipt.reference,
            recipient_account_number: receipt.recipient_account_number,
            amount: at_minor_scale(receipt.amount),
        },
        "Transfer completed",
    )))
}

/// Transaction history, newest first
///
/// GET /api/v1/wallet/transactions
#[utoipa::path(
    get,
    path = "/api/v1/wallet/transactions",
    params(HistoryQuery),
    responses(
        (status = 200, description = "Caller's transactions", body = ApiResponse<Vec<TransactionData>>),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Missing read permission")
    ),
    security(("bearer_auth" = []), ("api_key" = [])),
    tag = "Wallet"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<TransactionData>>>, LedgerError> {
    principal.require(&[Capability::Read])?;
    let records: Vec<TransactionRecord> = state
        .ledger
        .list_for_owner(principal.owner_id)
        .take(query.effective_limit())
        .try_collect()
        .await?;
    Ok(Json(ApiResponse::success(
        records.into_iter().map(TransactionData::from).collect(),
    )))
}

/// Payment provider webhook
///
/// POST /api/v1/wallet/paystack/webhook
///
/// Authenticated by `x-paystack-signature` over the raw body only.
#[utoipa::path(
    post,
    path = "/api/v1/wallet/paystack/webhook",
    request_body(content = String, description = "Raw provider notification", content_type = "application/json"),
    responses(
        (status = 200, description = "Notification acknowledged", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Malformed notification"),
        (status = 401, description = "Signature invalid"),
        (status = 404, description = "Unknown reference")
    ),
    tag = "Webhook"
)]
pub async fn paystack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, LedgerError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state.settlement.handle(&body, signature).await?;
    Ok(Json(ApiResponse::success(WebhookAck {
        status: outcome.label().to_string(),
    })))
}
