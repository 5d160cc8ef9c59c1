use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

use crate::money::DEFAULT_MIN_AMOUNT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL for the ledger store
    #[serde(default)]
    pub postgres_url: Option<String>,
    pub auth: AuthConfig,
    pub paystack: PaystackConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
    #[serde(default = "default_api_key_prefix")]
    pub api_key_prefix: String,
    #[serde(default = "default_max_api_keys")]
    pub max_api_keys_per_user: usize,
    /// Shared secret for the internal session endpoint (mock-api builds only)
    #[serde(default)]
    pub internal_secret: Option<String>,
}

fn default_token_ttl_minutes() -> i64 {
    30
}

fn default_api_key_prefix() -> String {
    "sk_live_".to_string()
}

fn default_max_api_keys() -> usize {
    5
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    /// HMAC key for `x-paystack-signature`. Paystack signs with the secret key
    /// unless a separate one is configured.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_paystack_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl PaystackConfig {
    pub fn webhook_secret(&self) -> &str {
        self.webhook_secret.as_deref().unwrap_or(&self.secret_key)
    }
}

fn default_paystack_base_url() -> String {
    "https://api.paystack.co".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LedgerConfig {
    pub currency: String,
    pub min_amount: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            min_amount: DEFAULT_MIN_AMOUNT,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Bearer values starting with the prefix are treated as API keys.
        if self.auth.api_key_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "auth.api_key_prefix",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: wallet.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
auth:
  jwt_secret: test-secret
paystack:
  secret_key: sk_test_abc
"#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.auth.token_ttl_minutes, 30);
        assert_eq!(config.auth.api_key_prefix, "sk_live_");
        assert_eq!(config.auth.max_api_keys_per_user, 5);
        assert_eq!(config.paystack.base_url, "https://api.paystack.co");
        assert_eq!(config.paystack.timeout_ms, 10_000);
        assert_eq!(config.ledger.currency, "NGN");
        assert_eq!(config.ledger.min_amount, DEFAULT_MIN_AMOUNT);
        assert!(config.postgres_url.is_none());
    }

    #[test]
    fn test_webhook_secret_falls_back_to_secret_key() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.paystack.webhook_secret(), "sk_test_abc");

        let mut paystack = config.paystack.clone();
        paystack.webhook_secret = Some("whsec".to_string());
        assert_eq!(paystack.webhook_secret(), "whsec");
    }

    #[test]
    fn test_missing_section_is_error() {
        let err = AppConfig::from_yaml("log_level: info").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_empty_api_key_prefix_is_rejected() {
        for prefix in ["\"\"", "\"  \""] {
            let yaml = MINIMAL.replace(
                "  jwt_secret: test-secret\n",
                &format!("  jwt_secret: test-secret\n  api_key_prefix: {}\n", prefix),
            );
            let err = AppConfig::from_yaml(&yaml).unwrap_err();
            assert!(matches!(
                err,
                ConfigError::Invalid {
                    field: "auth.api_key_prefix",
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AppConfig::load("does-not-exist").unwrap_err();
        assert!(err.to_string().contains("config/does-not-exist.yaml"));
    }

    #[test]
    fn test_dev_config_parses() {
        let config = AppConfig::from_yaml(include_str!("../config/dev.yaml")).unwrap();
        assert_eq!(config.gateway.port, 8080);
    }
}
