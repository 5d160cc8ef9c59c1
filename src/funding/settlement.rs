//! Settlement of provider webhook notifications.
//!
//! The signature is checked against the raw body before anything is parsed.
//! Only `charge.success` moves money; every other event is acknowledged and
//! dropped. Redelivery of a settled reference is absorbed by the store.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use super::provider::PaymentProvider;
use crate::error::LedgerError;
use crate::ledger::{LedgerStore, SettleOutcome};
use crate::money::{ensure_positive, from_minor_units};

pub const CHARGE_SUCCESS: &str = "charge.success";

#[derive(Debug, Deserialize)]
struct Notification {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    /// Minor units
    amount: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    Settled { reference: String, amount: Decimal },
    AlreadySettled { reference: String },
    Ignored { event: String },
}

impl SettlementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SettlementOutcome::Settled { .. } => "settled",
            SettlementOutcome::AlreadySettled { .. } => "already_settled",
            SettlementOutcome::Ignored { .. } => "ignored",
        }
    }
}

pub struct SettlementReconciler {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
}

impl SettlementReconciler {
    pub fn new(ledger: Arc<dyn LedgerStore>, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { ledger, provider }
    }

    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<SettlementOutcome, LedgerError> {
        if !self.provider.verify_webhook(raw_body, signature) {
            tracing::warn!(
                signature_present = signature.is_some(),
                "Webhook rejected: bad signature"
            );
            return Err(LedgerError::SignatureInvalid);
        }

        let notification: Notification = serde_json::from_slice(raw_body)
            .map_err(|e| LedgerError::InvalidRequest(format!("Malformed webhook payload: {}", e)))?;

        if notification.event != CHARGE_SUCCESS {
            tracing::info!(event = %notification.event, "Webhook event ignored");
            return Ok(SettlementOutcome::Ignored {
                event: notification.event,
            });
        }

        let charge: ChargeData = serde_json::from_value(notification.data.clone())
            .map_err(|e| LedgerError::InvalidRequest(format!("Malformed charge data: {}", e)))?;
        let amount = from_minor_units(charge.amount);
        ensure_positive(amount)?;

        match self
            .ledger
            .settle_deposit(&charge.reference, amount, notification.data)
            .await?
        {
            SettleOutcome::Settled {
                owner_id,
                amount: credited,
                ..
            } => {
                tracing::info!(
                    owner_id = %owner_id,
                    reference = %charge.reference,
                    amount = %credited,
                    "Deposit settled"
                );
                Ok(SettlementOutcome::Settled {
                    reference: charge.reference,
                    amount: credited,
                })
            }
            SettleOutcome::AlreadySettled => {
                tracing::info!(reference = %charge.reference, "Duplicate settlement absorbed");
                Ok(SettlementOutcome::AlreadySettled {
                    reference: charge.reference,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::provider::MockProvider;
    use crate::ledger::{
        Account, MemoryStore, OwnerIdentity, PendingDeposit, TransactionStatus,
    };
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        provider: Arc<MockProvider>,
        reconciler: SettlementReconciler,
        account: Account,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new("NGN"));
        let provider = Arc::new(MockProvider::new("whsec"));
        let account = store
            .establish_owner(&OwnerIdentity {
                owner_id: Uuid::new_v4(),
                email: "ada@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        store
            .open_pending_deposit(PendingDeposit {
                owner_id: account.owner_id,
                account_id: account.account_id,
                amount: Decimal::from(5000),
                reference: "dep_abc".to_string(),
                provider_metadata: None,
            })
            .await
            .unwrap();
        Fixture {
            reconciler: SettlementReconciler::new(store.clone(), provider.clone()),
            store,
            provider,
            account,
        }
    }

    fn charge_success(reference: &str, kobo: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event": "charge.success",
            "data": { "reference": reference, "amount": kobo, "status": "success" }
        }))
        .unwrap()
    }

    async fn balance(f: &Fixture) -> Decimal {
        f.store
            .account_for_owner(f.account.owner_id)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    #[tokio::test]
    async fn test_charge_success_settles_once() {
        let f = fixture().await;
        let body = charge_success("dep_abc", 500_000);
        let signature = f.provider.sign(&body).unwrap();

        let first = f.reconciler.handle(&body, Some(&signature)).await.unwrap();
        assert_eq!(
            first,
            SettlementOutcome::Settled {
                reference: "dep_abc".to_string(),
                amount: Decimal::from(5000)
            }
        );
        assert_eq!(balance(&f).await, Decimal::from(5000));

        let second = f.reconciler.handle(&body, Some(&signature)).await.unwrap();
        assert_eq!(second.label(), "already_settled");
        assert_eq!(balance(&f).await, Decimal::from(5000));

        let record = f.store.find_by_reference("dep_abc").await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Success);
        assert_eq!(record.provider_metadata.unwrap()["amount"], 500_000);
    }

    #[tokio::test]
    async fn test_provider_amount_is_authoritative() {
        let f = fixture().await;
        let body = charge_success("dep_abc", 450_050);
        let signature = f.provider.sign(&body).unwrap();
        f.reconciler.handle(&body, Some(&signature)).await.unwrap();
        assert_eq!(balance(&f).await, Decimal::new(450_050, 2));
    }

    #[tokio::test]
    async fn test_bad_signature_rejected_before_parsing() {
        let f = fixture().await;
        // not even JSON: a parse-first implementation would fail differently
        let err = f
            .reconciler
            .handle(b"not json at all", Some("00ff"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SignatureInvalid));

        let body = charge_success("dep_abc", 500_000);
        let err = f.reconciler.handle(&body, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::SignatureInvalid));

        let forged = MockProvider::new("attacker").sign(&body).unwrap();
        let err = f.reconciler.handle(&body, Some(&forged)).await.unwrap_err();
        assert!(matches!(err, LedgerError::SignatureInvalid));

        assert_eq!(balance(&f).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_other_events_ignored() {
        let f = fixture().await;
        let body = serde_json::to_vec(&serde_json::json!({
            "event": "transfer.success",
            "data": { "reference": "dep_abc", "amount": 500000 }
        }))
        .unwrap();
        let signature = f.provider.sign(&body).unwrap();
        let outcome = f.reconciler.handle(&body, Some(&signature)).await.unwrap();
        assert_eq!(
            outcome,
            SettlementOutcome::Ignored {
                event: "transfer.success".to_string()
            }
        );
        assert_eq!(balance(&f).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_not_found() {
        let f = fixture().await;
        let body = charge_success("dep_unknown", 500_000);
        let signature = f.provider.sign(&body).unwrap();
        let err = f.reconciler.handle(&body, Some(&signature)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_signed_payload() {
        let f = fixture().await;
        let body = br#"{"event":"charge.success","data":{"reference":"dep_abc"}}"#;
        let signature = f.provider.sign(body).unwrap();
        let err = f.reconciler.handle(body, Some(&signature)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));
    }
}
