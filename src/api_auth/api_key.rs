//! API key issuance, revocation and rollover.
//!
//! A key is `<prefix>` + base64url(32 random bytes). The plaintext is
//! returned exactly once from [`ApiKeyService::issue`] or
//! [`ApiKeyService::rollover`]; only its SHA-256 hex digest is stored.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::capability::CapabilitySet;
use super::repository::{ApiKeyRecord, ApiKeyStore};
use crate::core_types::{ApiKeyId, OwnerId};
use crate::error::LedgerError;

const KEY_ENTROPY_BYTES: usize = 32;
const MAX_NAME_LEN: usize = 100;

/// Allowed key lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum ExpiryChoice {
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "1Y")]
    OneYear,
}

impl ExpiryChoice {
    /// A month is 30 days and a year 365.
    pub fn duration(self) -> Duration {
        match self {
            ExpiryChoice::OneHour => Duration::hours(1),
            ExpiryChoice::OneDay => Duration::days(1),
            ExpiryChoice::OneMonth => Duration::days(30),
            ExpiryChoice::OneYear => Duration::days(365),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryChoice::OneHour => "1H",
            ExpiryChoice::OneDay => "1D",
            ExpiryChoice::OneMonth => "1M",
            ExpiryChoice::OneYear => "1Y",
        }
    }
}

impl fmt::Display for ExpiryChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpiryChoice {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1H" => Ok(ExpiryChoice::OneHour),
            "1D" => Ok(ExpiryChoice::OneDay),
            "1M" => Ok(ExpiryChoice::OneMonth),
            "1Y" => Ok(ExpiryChoice::OneYear),
            _ => Err(LedgerError::InvalidRequest(format!(
                "Invalid expiry '{}', expected one of 1H, 1D, 1M, 1Y",
                s
            ))),
        }
    }
}

/// Fresh plaintext key with the given prefix.
pub fn generate_api_key(prefix: &str) -> String {
    let bytes: [u8; KEY_ENTROPY_BYTES] = rand::random();
    format!("{}{}", prefix, URL_SAFE_NO_PAD.encode(bytes))
}

/// One-way digest stored in place of the key.
pub fn digest_api_key(api_key: &str) -> String {
    hex::encode(Sha256::digest(api_key.as_bytes()))
}

/// Returned once at issuance; carries the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key_id: ApiKeyId,
    pub api_key: String,
    pub name: String,
    pub permissions: CapabilitySet,
    pub expires_at: DateTime<Utc>,
}

pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
    prefix: String,
    max_active: usize,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn ApiKeyStore>, prefix: impl Into<String>, max_active: usize) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            max_active,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn issue(
        &self,
        owner_id: OwnerId,
        name: &str,
        permissions: CapabilitySet,
        expiry: ExpiryChoice,
    ) -> Result<IssuedApiKey, LedgerError> {
        let name = validate_name(name)?;
        if permissions.is_empty() {
            return Err(LedgerError::invalid_request(
                "At least one permission is required",
            ));
        }
        self.create(owner_id, name, permissions, expiry, None).await
    }

    /// # Errors
    /// * `NotFound` - key absent, not owned, or already inactive
    pub async fn revoke(&self, owner_id: OwnerId, key_id: ApiKeyId) -> Result<(), LedgerError> {
        if !self.store.deactivate_key(owner_id, key_id).await? {
            return Err(LedgerError::NotFound("API key"));
        }
        tracing::info!(owner_id = %owner_id, key_id = %key_id, "API key revoked");
        Ok(())
    }

    /// Replace an expired key with a new one carrying the same name and
    /// permissions.
    ///
    /// # Errors
    /// * `NotFound` - key absent, not owned, revoked or already rolled over
    /// * `InvalidRequest` - key has not expired yet
    /// * `KeyQuotaExceeded` - owner already at the cap
    pub async fn rollover(
        &self,
        owner_id: OwnerId,
        expired_key_id: ApiKeyId,
        expiry: ExpiryChoice,
    ) -> Result<IssuedApiKey, LedgerError> {
        let old = self
            .store
            .get_key(owner_id, expired_key_id)
            .await?
            .filter(|key| key.is_active)
            .ok_or(LedgerError::NotFound("API key"))?;
        if old.expires_at > Utc::now() {
            return Err(LedgerError::invalid_request("API key has not expired yet"));
        }
        self.create(owner_id, old.name, old.permissions, expiry, Some(old.key_id))
            .await
    }

    pub async fn list(&self, owner_id: OwnerId) -> Result<Vec<ApiKeyRecord>, LedgerError> {
        self.store.list_keys(owner_id).await
    }

    async fn create(
        &self,
        owner_id: OwnerId,
        name: String,
        permissions: CapabilitySet,
        expiry: ExpiryChoice,
        retire: Option<ApiKeyId>,
    ) -> Result<IssuedApiKey, LedgerError> {
        let now = Utc::now();
        let api_key = generate_api_key(&self.prefix);
        let record = ApiKeyRecord {
            key_id: Uuid::new_v4(),
            owner_id,
            name,
            key_digest: digest_api_key(&api_key),
            permissions,
            is_active: true,
            expires_at: now + expiry.duration(),
            created_at: now,
        };

        self.store
            .insert_key(&record, self.max_active, retire)
            .await?;

        tracing::info!(
            owner_id = %owner_id,
            key_id = %record.key_id,
            expiry = %expiry,
            rollover = retire.is_some(),
            "API key issued"
        );

        Ok(IssuedApiKey {
            key_id: record.key_id,
            api_key,
            name: record.name,
            permissions: record.permissions,
            expires_at: record.expires_at,
        })
    }
}

fn validate_name(name: &str) -> Result<String, LedgerError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid_request("Key name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(LedgerError::InvalidRequest(format!(
            "Key name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}
