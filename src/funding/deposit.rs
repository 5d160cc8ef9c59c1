//! Deposit initiation and status queries.

use rust_decimal::Decimal;
use std::sync::Arc;

use super::provider::PaymentProvider;
use crate::core_types::OwnerId;
use crate::error::LedgerError;
use crate::ledger::models::DEPOSIT_REFERENCE_PREFIX;
use crate::ledger::{
    LedgerStore, PendingDeposit, SettleOutcome, TransactionKind, TransactionRecord,
    TransactionStatus, new_reference,
};
use crate::money::{AmountPolicy, ensure_positive};

/// Hosted checkout opened for a pending deposit.
#[derive(Debug, Clone)]
pub struct DepositSession {
    pub reference: String,
    pub authorization_url: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct DepositStatus {
    pub reference: String,
    pub status: TransactionStatus,
    pub amount: Decimal,
}

impl From<&TransactionRecord> for DepositStatus {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            reference: record.reference.clone(),
            status: record.status,
            amount: record.amount,
        }
    }
}

pub struct DepositInitiator {
    ledger: Arc<dyn LedgerStore>,
    provider: Arc<dyn PaymentProvider>,
    policy: AmountPolicy,
}

impl DepositInitiator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        provider: Arc<dyn PaymentProvider>,
        policy: AmountPolicy,
    ) -> Self {
        Self {
            ledger,
            provider,
            policy,
        }
    }

    /// Open a provider session, then record the pending deposit. A provider
    /// failure leaves no record behind.
    pub async fn initiate(
        &self,
        owner_id: OwnerId,
        amount: Decimal,
    ) -> Result<DepositSession, LedgerError> {
        let amount = self.policy.validate(amount)?;
        let account = self
            .ledger
            .account_for_owner(owner_id)
            .await?
            .ok_or(LedgerError::NotFound("Wallet"))?;
        let owner = self
            .ledger
            .owner(owner_id)
            .await?
            .ok_or(LedgerError::NotFound("Owner"))?;

        let reference = new_reference(DEPOSIT_REFERENCE_PREFIX);
        let session = self
            .provider
            .create_session(&owner.email, amount, &reference)
            .await?;

        self.ledger
            .open_pending_deposit(PendingDeposit {
                owner_id,
                account_id: account.account_id,
                amount,
                reference: reference.clone(),
                provider_metadata: Some(serde_json::json!({
                    "authorization_url": session.authorization_url,
                    "access_code": session.access_code,
                })),
            })
            .await?;

        tracing::info!(owner_id = %owner_id, reference = %reference, amount = %amount, "Deposit initiated");

        Ok(DepositSession {
            reference,
            authorization_url: session.authorization_url,
            amount,
        })
    }

    /// Status of one of the caller's deposits. With `refresh`, a pending
    /// deposit is checked with the provider and settled if it reports success.
    pub async fn status(
        &self,
        owner_id: OwnerId,
        reference: &str,
        refresh: bool,
    ) -> Result<DepositStatus, LedgerError> {
        let record = self.owned_deposit(owner_id, reference).await?;
        if !refresh || record.status != TransactionStatus::Pending {
            return Ok(DepositStatus::from(&record));
        }

        let verification = self.provider.verify(reference).await?;
        if !verification.is_success() {
            return Ok(DepositStatus::from(&record));
        }
        ensure_positive(verification.amount)?;

        let outcome = self
            .ledger
            .settle_deposit(reference, verification.amount, verification.raw)
            .await?;
        if let SettleOutcome::Settled { amount, .. } = outcome {
            tracing::info!(reference = %reference, amount = %amount, "Deposit settled by verification");
        }

        let record = self.owned_deposit(owner_id, reference).await?;
        Ok(DepositStatus::from(&record))
    }

    async fn owned_deposit(
        &self,
        owner_id: OwnerId,
        reference: &str,
    ) -> Result<TransactionRecord, LedgerError> {
        self.ledger
            .find_by_reference(reference)
            .await?
            .filter(|r| r.owner_id == owner_id && r.kind == TransactionKind::Deposit)
            .ok_or(LedgerError::NotFound("Deposit"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funding::provider::MockProvider;
    use crate::ledger::{MemoryStore, OwnerIdentity};
    use futures::TryStreamExt;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryStore>,
        provider: Arc<MockProvider>,
        deposits: DepositInitiator,
        owner_id: OwnerId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new("NGN"));
        let provider = Arc::new(MockProvider::new("whsec"));
        let owner_id = Uuid::new_v4();
        store
            .establish_owner(&OwnerIdentity {
                owner_id,
                email: "ada@example.com".to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        Fixture {
            deposits: DepositInitiator::new(store.clone(), provider.clone(), AmountPolicy::default()),
            store,
            provider,
            owner_id,
        }
    }

    #[tokio::test]
    async fn test_initiate_opens_pending_record() {
        let f = fixture().await;
        let session = f.deposits.initiate(f.owner_id, Decimal::from(5000)).await.unwrap();

        assert!(session.reference.starts_with("dep_"));
        assert!(session.authorization_url.contains(&session.reference));

        let record = f.store.find_by_reference(&session.reference).await.unwrap().unwrap();
        assert_eq!(record.status, TransactionStatus::Pending);
        assert_eq!(record.amount, Decimal::from(5000));
        assert_eq!(record.kind, TransactionKind::Deposit);

        let account = f.store.account_for_owner(f.owner_id).await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_initiate_invalid_amount_never_calls_provider() {
        let f = fixture().await;
        for amount in [Decimal::ZERO, Decimal::from(-1), Decimal::from(99)] {
            let err = f.deposits.initiate(f.owner_id, amount).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount(_)));
        }
        assert_eq!(f.provider.sessions_created(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_no_record() {
        let f = fixture().await;
        f.provider.set_unavailable(true);
        let err = f.deposits.initiate(f.owner_id, Decimal::from(5000)).await.unwrap_err();
        assert!(matches!(err, LedgerError::ProviderUnavailable(_)));

        let records: Vec<_> = f.store.list_for_owner(f.owner_id).try_collect().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_status_is_owner_scoped() {
        let f = fixture().await;
        let session = f.deposits.initiate(f.owner_id, Decimal::from(5000)).await.unwrap();

        let status = f.deposits.status(f.owner_id, &session.reference, false).await.unwrap();
        assert_eq!(status.status, TransactionStatus::Pending);

        let err = f
            .deposits
            .status(Uuid::new_v4(), &session.reference, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound("Deposit")));
    }

    #[tokio::test]
    async fn test_refresh_settles_with_provider_amount() {
        let f = fixture().await;
        let session = f.deposits.initiate(f.owner_id, Decimal::from(5000)).await.unwrap();

        // provider still pending → nothing changes
        let status = f.deposits.status(f.owner_id, &session.reference, true).await.unwrap();
        assert_eq!(status.status, TransactionStatus::Pending);

        f.provider
            .set_verification(&session.reference, "success", Decimal::from(5000));
        let status = f.deposits.status(f.owner_id, &session.reference, true).await.unwrap();
        assert_eq!(status.status, TransactionStatus::Success);

        // a second refresh does not credit again
        f.deposits.status(f.owner_id, &session.reference, true).await.unwrap();
        let account = f.store.account_for_owner(f.owner_id).await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(5000));
    }
}
