//! Payment provider seam.
//!
//! [`PaystackClient`] talks to the real API; [`MockProvider`] backs local
//! development and tests. Both are built once at start and shared by the
//! deposit initiator and the settlement reconciler.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::signature::{compute_signature, verify_signature};
use crate::config::PaystackConfig;
use crate::error::LedgerError;
use crate::money::{from_minor_units, to_minor_units};

/// Hosted payment page opened for a deposit.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
}

/// Provider's view of a payment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderVerification {
    pub reference: String,
    /// Provider status string, `success` when paid
    pub status: String,
    pub amount: Decimal,
    pub raw: serde_json::Value,
}

impl ProviderVerification {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync + Debug {
    /// Open a hosted payment session for `amount` (ledger units).
    async fn create_session(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<PaymentSession, LedgerError>;

    async fn verify(&self, reference: &str) -> Result<ProviderVerification, LedgerError>;

    /// Check a webhook signature against the raw body. Pure, no I/O.
    fn verify_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> bool;
}

// ============================================================================
// Paystack
// ============================================================================

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    /// Minor units (kobo)
    amount: i64,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    #[serde(default)]
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    reference: String,
}

/// Paystack REST client with a bounded per-request timeout.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    config: PaystackConfig,
}

impl Debug for PaystackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // secrets stay out of Debug output
        f.debug_struct("PaystackClient")
            .field("base_url", &self.config.base_url)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish()
    }
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| LedgerError::internal(format!("http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<(T, serde_json::Value), LedgerError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(format!("{}: {}", operation, e)))?;

        tracing::debug!(status = %status, operation, "Paystack response");

        if !status.is_success() {
            return Err(LedgerError::ProviderUnavailable(format!(
                "{} returned HTTP {}",
                operation, status
            )));
        }

        let raw: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            LedgerError::ProviderUnavailable(format!("{}: malformed body: {}", operation, e))
        })?;
        let envelope: Envelope<T> = serde_json::from_value(raw.clone()).map_err(|e| {
            LedgerError::ProviderUnavailable(format!("{}: unexpected body: {}", operation, e))
        })?;
        if !envelope.status {
            return Err(LedgerError::ProviderUnavailable(format!(
                "{} rejected: {}",
                operation, envelope.message
            )));
        }
        let data = envelope.data.ok_or_else(|| {
            LedgerError::ProviderUnavailable(format!("{}: missing data", operation))
        })?;
        Ok((data, raw))
    }
}

#[async_trait]
impl PaymentProvider for PaystackClient {
    async fn create_session(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<PaymentSession, LedgerError> {
        let request = InitializeRequest {
            email,
            amount: to_minor_units(amount)?,
            reference,
            callback_url: self.config.callback_url.as_deref(),
        };

        let response = self
            .client
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(format!("initialize: {}", e)))?;

        let (data, _raw) = Self::read_envelope::<InitializeData>(response, "initialize").await?;

        tracing::info!(reference = %data.reference, amount = %amount, "Paystack session created");
        Ok(PaymentSession {
            reference: data.reference,
            authorization_url: data.authorization_url,
            access_code: data.access_code,
        })
    }

    async fn verify(&self, reference: &str) -> Result<ProviderVerification, LedgerError> {
        let response = self
            .client
            .get(self.url(&format!("/transaction/verify/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(|e| LedgerError::ProviderUnavailable(format!("verify: {}", e)))?;

        let (data, raw) = Self::read_envelope::<VerifyData>(response, "verify").await?;
        Ok(ProviderVerification {
            reference: data.reference,
            status: data.status,
            amount: from_minor_units(data.amount),
            raw: raw.get("data").cloned().unwrap_or(serde_json::Value::Null),
        })
    }

    fn verify_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> bool {
        verify_signature(self.config.webhook_secret(), raw_body, signature)
    }
}

// ============================================================================
// Mock
// ============================================================================

/// In-process provider. Sessions always succeed unless told to fail;
/// verification answers come from [`MockProvider::set_verification`].
#[derive(Debug)]
pub struct MockProvider {
    webhook_secret: String,
    unavailable: AtomicBool,
    sessions_created: AtomicUsize,
    verifications: Mutex<HashMap<String, (String, Decimal)>>,
}

impl MockProvider {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            unavailable: AtomicBool::new(false),
            sessions_created: AtomicUsize::new(0),
            verifications: Mutex::new(HashMap::new()),
        }
    }

    /// Make every outbound call fail with `ProviderUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }

    pub fn set_verification(&self, reference: &str, status: &str, amount: Decimal) {
        if let Ok(mut map) = self.verifications.lock() {
            map.insert(reference.to_string(), (status.to_string(), amount));
        }
    }

    /// Signature a genuine delivery of `body` would carry.
    pub fn sign(&self, body: &[u8]) -> Result<String, LedgerError> {
        compute_signature(&self.webhook_secret, body)
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::ProviderUnavailable(
                "mock provider offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    async fn create_session(
        &self,
        _email: &str,
        _amount: Decimal,
        reference: &str,
    ) -> Result<PaymentSession, LedgerError> {
        self.check_available()?;
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession {
            reference: reference.to_string(),
            authorization_url: format!("https://checkout.mock.local/{}", reference),
            access_code: None,
        })
    }

    async fn verify(&self, reference: &str) -> Result<ProviderVerification, LedgerError> {
        self.check_available()?;
        let (status, amount) = self
            .verifications
            .lock()
            .ok()
            .and_then(|map| map.get(reference).cloned())
            .unwrap_or_else(|| ("pending".to_string(), Decimal::ZERO));
        Ok(ProviderVerification {
            reference: reference.to_string(),
            raw: serde_json::json!({ "reference": reference, "status": status }),
            status,
            amount,
        })
    }

    fn verify_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> bool {
        verify_signature(&self.webhook_secret, raw_body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, timeout_ms: u64) -> PaystackConfig {
        PaystackConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: None,
            base_url: base_url.to_string(),
            callback_url: None,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn test_create_session_sends_kobo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_json(serde_json::json!({
                "email": "ada@example.com",
                "amount": 500000,
                "reference": "dep_abc"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Authorization URL created",
                "data": {
                    "authorization_url": "https://checkout.paystack.com/xyz",
                    "access_code": "xyz",
                    "reference": "dep_abc"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = PaystackClient::new(config(&server.uri(), 2_000)).unwrap();
        let session = client
            .create_session("ada@example.com", Decimal::from(5000), "dep_abc")
            .await
            .unwrap();
        assert_eq!(session.authorization_url, "https://checkout.paystack.com/xyz");
        assert_eq!(session.reference, "dep_abc");
    }

    #[tokio::test]
    async fn test_create_session_http_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = PaystackClient::new(config(&server.uri(), 2_000)).unwrap();
        let err = client
            .create_session("ada@example.com", Decimal::from(5000), "dep_abc")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_create_session_rejected_status_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": false,
                "message": "Duplicate Transaction Reference"
            })))
            .mount(&server)
            .await;

        let client = PaystackClient::new(config(&server.uri(), 2_000)).unwrap();
        let err = client
            .create_session("ada@example.com", Decimal::from(5000), "dep_abc")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate Transaction Reference"));
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transaction/initialize"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({"status": true})),
            )
            .mount(&server)
            .await;

        let client = PaystackClient::new(config(&server.uri(), 50)).unwrap();
        let err = client
            .create_session("ada@example.com", Decimal::from(5000), "dep_abc")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_verify_converts_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transaction/verify/dep_abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": true,
                "message": "Verification successful",
                "data": {
                    "status": "success",
                    "amount": 500000,
                    "reference": "dep_abc",
                    "gateway_response": "Successful"
                }
            })))
            .mount(&server)
            .await;

        let client = PaystackClient::new(config(&server.uri(), 2_000)).unwrap();
        let verification = client.verify("dep_abc").await.unwrap();
        assert!(verification.is_success());
        assert_eq!(verification.amount, Decimal::from(5000));
        assert_eq!(verification.raw["gateway_response"], "Successful");
    }

    #[test]
    fn test_webhook_uses_secret_key_by_default() {
        let client = PaystackClient::new(config("http://localhost", 1_000)).unwrap();
        let body = br#"{"event":"charge.success"}"#;
        let signature = compute_signature("sk_test_123", body).unwrap();
        assert!(client.verify_webhook(body, Some(&signature)));
        assert!(!client.verify_webhook(body, Some("deadbeef")));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let client = PaystackClient::new(config("http://localhost", 1_000)).unwrap();
        assert!(!format!("{:?}", client).contains("sk_test_123"));
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let mock = MockProvider::new("whsec");
        let session = mock
            .create_session("a@example.com", Decimal::from(100), "dep_1")
            .await
            .unwrap();
        assert!(session.authorization_url.ends_with("dep_1"));
        assert_eq!(mock.sessions_created(), 1);

        assert_eq!(mock.verify("dep_1").await.unwrap().status, "pending");
        mock.set_verification("dep_1", "success", Decimal::from(100));
        assert!(mock.verify("dep_1").await.unwrap().is_success());

        mock.set_unavailable(true);
        assert!(mock.verify("dep_1").await.is_err());
    }
}
