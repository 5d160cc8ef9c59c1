use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_types::OwnerId;
use crate::error::LedgerError;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (owner id)
    pub email: String,
    pub exp: usize, // Expiration time (as UTC timestamp)
    pub iat: usize, // Issued at
}

impl Claims {
    pub fn owner_id(&self) -> Result<OwnerId, LedgerError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| LedgerError::unauthenticated("Invalid token subject"))
    }
}

/// Issues and verifies HS256 bearer tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(jwt_secret: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    pub fn issue(&self, owner_id: OwnerId, email: &str) -> Result<String, LedgerError> {
        let now = Utc::now();
        let claims = Claims {
            sub: owner_id.to_string(),
            email: email.to_string(),
            exp: (now + self.ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| LedgerError::internal(format!("token encoding failed: {}", e)))
    }

    /// Signature and expiry are both checked; any failure is `Unauthenticated`.
    pub fn verify(&self, token: &str) -> Result<Claims, LedgerError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Bearer token rejected");
                LedgerError::unauthenticated("Invalid or expired token")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let tokens = TokenService::new("secret", 30);
        let owner_id = Uuid::new_v4();
        let token = tokens.issue(owner_id, "ada@example.com").unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.owner_id().unwrap(), owner_id);
        assert_eq!(claims.email, "ada@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenService::new("secret-a", 30)
            .issue(Uuid::new_v4(), "a@example.com")
            .unwrap();
        let err = TokenService::new("secret-b", 30).verify(&token).unwrap_err();
        assert!(matches!(err, LedgerError::Unauthenticated(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Beyond jsonwebtoken's default 60s leeway
        let tokens = TokenService::new("secret", -5);
        let token = tokens.issue(Uuid::new_v4(), "a@example.com").unwrap();
        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let tokens = TokenService::new("secret", 30);
        assert!(tokens.verify("not-a-jwt").is_err());
    }
}
