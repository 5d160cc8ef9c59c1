//! Credential resolution: presented secret → owner identity + capabilities.

use axum::http::{HeaderMap, header};
use chrono::Utc;
use std::sync::Arc;

use super::api_key::digest_api_key;
use super::capability::{CapabilitySet, check};
use super::repository::ApiKeyStore;
use super::Capability;
use crate::core_types::OwnerId;
use crate::error::LedgerError;
use crate::user_auth::TokenService;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Raw credential material pulled off a request. Either slot may be empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentedCredentials<'a> {
    pub api_key: Option<&'a str>,
    pub bearer: Option<&'a str>,
}

impl<'a> PresentedCredentials<'a> {
    /// Read `x-api-key` and `Authorization: Bearer <value>`.
    pub fn from_headers(headers: &'a HeaderMap) -> Self {
        let api_key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|v| !v.is_empty());
        Self { api_key, bearer }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    ApiKey,
    BearerToken,
}

/// Authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct Principal {
    pub owner_id: OwnerId,
    pub capabilities: CapabilitySet,
    pub kind: CredentialKind,
}

impl Principal {
    /// Permission gate for this caller.
    pub fn require(&self, required: &[Capability]) -> Result<(), LedgerError> {
        check(required, self.capabilities)
    }
}

pub struct CredentialResolver {
    keys: Arc<dyn ApiKeyStore>,
    tokens: Arc<TokenService>,
    api_key_prefix: String,
}

impl CredentialResolver {
    pub fn new(
        keys: Arc<dyn ApiKeyStore>,
        tokens: Arc<TokenService>,
        api_key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            keys,
            tokens,
            api_key_prefix: api_key_prefix.into(),
        }
    }

    /// Resolution order:
    /// 1. bearer value with the API key prefix → API key
    /// 2. other bearer value → signed token, never falling through on failure
    /// 3. `x-api-key` value → API key
    /// 4. nothing → `Unauthenticated`
    pub async fn resolve(
        &self,
        presented: PresentedCredentials<'_>,
    ) -> Result<Principal, LedgerError> {
        if let Some(bearer) = presented.bearer {
            if bearer.starts_with(&self.api_key_prefix) {
                return self.resolve_api_key(bearer).await;
            }
            return self.resolve_token(bearer);
        }
        if let Some(api_key) = presented.api_key {
            return self.resolve_api_key(api_key).await;
        }
        Err(LedgerError::unauthenticated(
            "Authentication required: provide a Bearer token or an x-api-key header",
        ))
    }

    fn resolve_token(&self, token: &str) -> Result<Principal, LedgerError> {
        let claims = self.tokens.verify(token)?;
        Ok(Principal {
            owner_id: claims.owner_id()?,
            capabilities: CapabilitySet::baseline(),
            kind: CredentialKind::BearerToken,
        })
    }

    async fn resolve_api_key(&self, api_key: &str) -> Result<Principal, LedgerError> {
        let digest = digest_api_key(api_key);
        let record = self
            .keys
            .find_usable_by_digest(&digest, Utc::now())
            .await?
            .ok_or_else(|| LedgerError::unauthenticated("Invalid or expired API key"))?;
        Ok(Principal {
            owner_id: record.owner_id,
            capabilities: record.permissions,
            kind: CredentialKind::ApiKey,
        })
    }
}
