pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_auth::auth_middleware;
use state::AppState;

/// Build the complete router over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Wallet Routes (bearer token or API key)
    // ==========================================================================
    let wallet_routes = Router::new()
        .route("/balance", get(crate::funding::handlers::get_balance))
        .route("/deposit", post(crate::funding::handlers::initiate_deposit))
        .route(
            "/deposit/{reference}/status",
            get(crate::funding::handlers::deposit_status),
        )
        .route("/transfer", post(crate::funding::handlers::create_transfer))
        .route(
            "/transactions",
            get(crate::funding::handlers::list_transactions),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    // ==========================================================================
    // Key Management Routes (bearer token only, enforced per handler)
    // ==========================================================================
    let key_routes = Router::new()
        .route(
            "/api/v1/keys",
            post(crate::api_auth::handlers::create_api_key)
                .get(crate::api_auth::handlers::list_api_keys),
        )
        .route(
            "/api/v1/keys/rollover",
            post(crate::api_auth::handlers::rollover_api_key),
        )
        .route(
            "/api/v1/keys/{key_id}/revoke",
            post(crate::api_auth::handlers::revoke_api_key),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        // Signature-authenticated, outside the credential layer
        .route(
            "/api/v1/wallet/paystack/webhook",
            post(crate::funding::handlers::paystack_webhook),
        )
        .nest("/api/v1/wallet", wallet_routes)
        .merge(key_routes);

    // [SECURITY] Internal session route - only compiled when 'mock-api' feature is enabled.
    // Production builds MUST be compiled with `--no-default-features` to exclude this.
    #[cfg(feature = "mock-api")]
    let app = app.route(
        "/internal/session",
        post(crate::user_auth::handlers::open_session),
    );

    app.with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Start HTTP Gateway server
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.inspect_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind; port may already be in use");
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app).await
}
