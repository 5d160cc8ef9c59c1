//! Authentication middleware for Axum.
//!
//! Resolves the presented credential into a `Principal` and injects it into
//! request extensions. Capability checks happen in the handlers, which know
//! what each operation requires.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::sync::Arc;

use super::resolver::PresentedCredentials;
use crate::error::LedgerError;
use crate::gateway::state::AppState;

/// Must be applied to every wallet and key-management route.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, LedgerError> {
    let presented = PresentedCredentials::from_headers(request.headers());
    let principal = state.resolver.resolve(presented).await?;

    tracing::debug!(
        owner_id = %principal.owner_id,
        kind = ?principal.kind,
        path = %request.uri().path(),
        "Request authenticated"
    );

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
