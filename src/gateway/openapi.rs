//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api_auth::handlers::{
    ApiKeyCreatedData, ApiKeyInfo, CreateApiKeyRequest, RevokedData, RolloverApiKeyRequest,
};
use crate::api_auth::{Capability, ExpiryChoice};
use crate::funding::handlers::{
    BalanceData, DepositData, DepositRequest, DepositStatusData, TransactionData, TransferData,
    TransferRequest, WebhookAck,
};
use crate::gateway::handlers::HealthResponse;
use crate::ledger::{TransactionKind, TransactionStatus};

/// Bearer session tokens and `x-api-key` service keys
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
                        .description(Some(
                            "Session token. A value starting with the API key prefix is treated as an API key.",
                        ))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-api-key",
                    "Service key: sk_live_... with deposit/transfer/read permissions",
                ))),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Wallet Ledger API",
        version = "0.1.0",
        description = "Custodial wallet ledger: transfers, provider-funded deposits and API key management.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::funding::handlers::get_balance,
        crate::funding::handlers::initiate_deposit,
        crate::funding::handlers::deposit_status,
        crate::funding::handlers::create_transfer,
        crate::funding::handlers::list_transactions,
        crate::funding::handlers::paystack_webhook,
        crate::api_auth::handlers::create_api_key,
        crate::api_auth::handlers::list_api_keys,
        crate::api_auth::handlers::revoke_api_key,
        crate::api_auth::handlers::rollover_api_key,
    ),
    components(
        schemas(
            HealthResponse,
            BalanceData,
            DepositRequest,
            DepositData,
            DepositStatusData,
            TransferRequest,
            TransferData,
            TransactionData,
            WebhookAck,
            CreateApiKeyRequest,
            RolloverApiKeyRequest,
            ApiKeyCreatedData,
            ApiKeyInfo,
            RevokedData,
            Capability,
            ExpiryChoice,
            TransactionKind,
            TransactionStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Wallet", description = "Balance, deposits, transfers and history (auth required)"),
        (name = "Webhook", description = "Payment provider callbacks (signature auth)"),
        (name = "API Keys", description = "Service key lifecycle (bearer session required)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::OpenApi;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Wallet Ledger API");
        let json = spec.to_json().unwrap();
        assert!(json.contains("bearer_auth"));
        assert!(json.contains("x-api-key"));
    }

    #[test]
    fn test_wallet_endpoints_registered() {
        let spec = ApiDoc::openapi();
        let paths = spec.paths.paths;
        for path in [
            "/api/v1/health",
            "/api/v1/wallet/balance",
            "/api/v1/wallet/deposit",
            "/api/v1/wallet/deposit/{reference}/status",
            "/api/v1/wallet/transfer",
            "/api/v1/wallet/transactions",
            "/api/v1/wallet/paystack/webhook",
            "/api/v1/keys",
            "/api/v1/keys/rollover",
            "/api/v1/keys/{key_id}/revoke",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_key_ids_documented_as_uuid_strings() {
        let spec = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let schemas = &spec["components"]["schemas"];
        for (schema, field) in [
            ("ApiKeyInfo", "key_id"),
            ("ApiKeyCreatedData", "key_id"),
            ("RevokedData", "key_id"),
            ("RolloverApiKeyRequest", "expired_key_id"),
        ] {
            let property = &schemas[schema]["properties"][field];
            assert_eq!(property["type"], "string", "{}.{}", schema, field);
            assert_eq!(property["format"], "uuid", "{}.{}", schema, field);
        }
    }
}
