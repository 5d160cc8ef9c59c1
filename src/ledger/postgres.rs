//! PostgreSQL ledger store
//!
//! Balance mutations lock account rows with `SELECT ... FOR UPDATE` in
//! `account_id` order, so two transfers touching the same pair of accounts
//! in opposite directions cannot deadlock. Settlement locks the deposit row
//! by reference; the `transactions_reference_key` unique constraint backs
//! reference uniqueness across concurrent inserts.

use async_trait::async_trait;
use futures::StreamExt;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use sqlx::postgres::PgRow;
use std::sync::Arc;

use super::models::{
    Account, Owner, OwnerIdentity, PendingDeposit, SettleOutcome, TransactionKind,
    TransactionRecord, TransactionStatus, TransferLegs, generate_account_number,
};
use super::store::{LedgerStore, TransactionStream};
use crate::core_types::{AccountId, OwnerId};
use crate::db::{Database, SafeRow};
use crate::error::LedgerError;
use crate::money::ensure_positive;

const REFERENCE_UNIQUE_CONSTRAINT: &str = "transactions_reference_key";
const ACCOUNT_NUMBER_ATTEMPTS: usize = 5;

const UPSERT_OWNER: &str = r#"
    INSERT INTO owners (owner_id, email, display_name)
    VALUES ($1, $2, $3)
    ON CONFLICT (owner_id) DO UPDATE
    SET email = EXCLUDED.email,
        display_name = COALESCE(EXCLUDED.display_name, owners.display_name),
        updated_at = NOW()
"#;

const INSERT_ACCOUNT: &str = r#"
    INSERT INTO accounts (account_id, owner_id, account_number, balance, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT DO NOTHING
"#;

const SELECT_OWNER: &str = r#"
    SELECT owner_id, email, display_name, created_at FROM owners WHERE owner_id = $1
"#;

const SELECT_ACCOUNT_BY_OWNER: &str = r#"
    SELECT account_id, owner_id, account_number, balance, created_at, updated_at
    FROM accounts WHERE owner_id = $1
"#;

const SELECT_ACCOUNT_BY_NUMBER: &str = r#"
    SELECT account_id, owner_id, account_number, balance, created_at, updated_at
    FROM accounts WHERE account_number = $1
"#;

const LOCK_ACCOUNTS: &str = r#"
    SELECT account_id, owner_id, account_number, balance, created_at, updated_at
    FROM accounts WHERE account_id = ANY($1)
    ORDER BY account_id
    FOR UPDATE
"#;

const DEBIT_ACCOUNT: &str = r#"
    UPDATE accounts SET balance = balance - $1, updated_at = NOW() WHERE account_id = $2
"#;

const CREDIT_ACCOUNT: &str = r#"
    UPDATE accounts SET balance = balance + $1, updated_at = NOW() WHERE account_id = $2
"#;

const INSERT_TRANSACTION: &str = r#"
    INSERT INTO transactions (
        transaction_id, owner_id, account_id, amount, currency, kind, status,
        sender_account_id, recipient_account_id, description, reference,
        provider_metadata, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
"#;

const SELECT_TRANSACTION_BY_REFERENCE: &str = r#"
    SELECT transaction_id, owner_id, account_id, amount, currency, kind, status,
           sender_account_id, recipient_account_id, description, reference,
           provider_metadata, created_at, updated_at
    FROM transactions WHERE reference = $1
"#;

const LOCK_TRANSACTION_BY_REFERENCE: &str = r#"
    SELECT transaction_id, owner_id, account_id, amount, currency, kind, status,
           sender_account_id, recipient_account_id, description, reference,
           provider_metadata, created_at, updated_at
    FROM transactions WHERE reference = $1
    FOR UPDATE
"#;

const MARK_SETTLED: &str = r#"
    UPDATE transactions
    SET status = 'success', provider_metadata = $2, updated_at = NOW()
    WHERE transaction_id = $1 AND status <> 'success'
"#;

const LIST_FOR_OWNER: &str = r#"
    SELECT transaction_id, owner_id, account_id, amount, currency, kind, status,
           sender_account_id, recipient_account_id, description, reference,
           provider_metadata, created_at, updated_at
    FROM transactions WHERE owner_id = $1
    ORDER BY created_at DESC, transaction_id
"#;

pub struct PgLedgerStore {
    db: Arc<Database>,
    currency: String,
}

impl PgLedgerStore {
    pub fn new(db: Arc<Database>, currency: impl Into<String>) -> Self {
        Self {
            db,
            currency: currency.into(),
        }
    }
}

fn row_to_owner(row: &PgRow) -> Result<Owner, sqlx::Error> {
    Ok(Owner {
        owner_id: row.get_required("owner_id")?,
        email: row.get_required("email")?,
        display_name: row.get_required("display_name")?,
        created_at: row.get_required("created_at")?,
    })
}

fn row_to_account(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        account_id: row.get_required("account_id")?,
        owner_id: row.get_required("owner_id")?,
        account_number: row.get_required("account_number")?,
        balance: row.get_required("balance")?,
        created_at: row.get_required("created_at")?,
        updated_at: row.get_required("updated_at")?,
    })
}

fn row_to_transaction(row: &PgRow) -> Result<TransactionRecord, sqlx::Error> {
    let kind: String = row.get_required("kind")?;
    let status: String = row.get_required("status")?;
    Ok(TransactionRecord {
        transaction_id: row.get_required("transaction_id")?,
        owner_id: row.get_required("owner_id")?,
        account_id: row.get_required("account_id")?,
        amount: row.get_required("amount")?,
        currency: row.get_required("currency")?,
        kind: kind
            .parse::<TransactionKind>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        status: status
            .parse::<TransactionStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        sender_account_id: row.get_required("sender_account_id")?,
        recipient_account_id: row.get_required("recipient_account_id")?,
        description: row.get_required("description")?,
        reference: row.get_required("reference")?,
        provider_metadata: row.get_required("provider_metadata")?,
        created_at: row.get_required("created_at")?,
        updated_at: row.get_required("updated_at")?,
    })
}

async fn insert_transaction(
    conn: &mut PgConnection,
    record: &TransactionRecord,
) -> Result<(), LedgerError> {
    sqlx::query(INSERT_TRANSACTION)
        .bind(record.transaction_id)
        .bind(record.owner_id)
        .bind(record.account_id)
        .bind(record.amount)
        .bind(&record.currency)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(record.sender_account_id)
        .bind(record.recipient_account_id)
        .bind(&record.description)
        .bind(&record.reference)
        .bind(&record.provider_metadata)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(conn)
        .await
        .map_err(|e| map_insert_error(e, &record.reference))?;
    Ok(())
}

fn map_insert_error(err: sqlx::Error, reference: &str) -> LedgerError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() && db_err.constraint() == Some(REFERENCE_UNIQUE_CONSTRAINT) {
            return LedgerError::DuplicateReference(reference.to_string());
        }
    }
    err.into()
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn establish_owner(&self, identity: &OwnerIdentity) -> Result<Account, LedgerError> {
        let mut tx = self.db.pool().begin().await?;

        // Upsert takes the owner row lock; concurrent first logins serialize here.
        sqlx::query(UPSERT_OWNER)
            .bind(identity.owner_id)
            .bind(&identity.email)
            .bind(&identity.display_name)
            .execute(&mut *tx)
            .await?;

        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let candidate = Account::open(identity.owner_id, generate_account_number());
            sqlx::query(INSERT_ACCOUNT)
                .bind(candidate.account_id)
                .bind(candidate.owner_id)
                .bind(&candidate.account_number)
                .bind(candidate.balance)
                .bind(candidate.created_at)
                .bind(candidate.updated_at)
                .execute(&mut *tx)
                .await?;

            // Either our row, the owner's existing row, or nothing on a number clash.
            let row = sqlx::query(SELECT_ACCOUNT_BY_OWNER)
                .bind(identity.owner_id)
                .fetch_optional(&mut *tx)
                .await?;
            if let Some(row) = row {
                let account = row_to_account(&row)?;
                tx.commit().await?;
                return Ok(account);
            }
            tracing::warn!(owner_id = %identity.owner_id, "Account number collision, retrying");
        }

        Err(LedgerError::internal(
            "could not allocate a unique account number",
        ))
    }

    async fn owner(&self, owner_id: OwnerId) -> Result<Option<Owner>, LedgerError> {
        let row = sqlx::query(SELECT_OWNER)
            .bind(owner_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| row_to_owner(&r)).transpose()?)
    }

    async fn account_for_owner(&self, owner_id: OwnerId) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query(SELECT_ACCOUNT_BY_OWNER)
            .bind(owner_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| row_to_account(&r)).transpose()?)
    }

    async fn account_by_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, LedgerError> {
        let row = sqlx::query(SELECT_ACCOUNT_BY_NUMBER)
            .bind(account_number)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| row_to_account(&r)).transpose()?)
    }

    async fn debit_and_credit(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    ) -> Result<TransferLegs, LedgerError> {
        ensure_positive(amount)?;
        if sender == recipient {
            return Err(LedgerError::SelfTransfer);
        }

        // Dropping `tx` on any early return rolls back.
        let mut tx = self.db.pool().begin().await?;

        let rows = sqlx::query(LOCK_ACCOUNTS)
            .bind(vec![sender, recipient])
            .fetch_all(&mut *tx)
            .await?;
        let locked = rows
            .iter()
            .map(row_to_account)
            .collect::<Result<Vec<_>, _>>()?;

        let sender_account = locked
            .iter()
            .find(|a| a.account_id == sender)
            .ok_or(LedgerError::NotFound("Sender account"))?;
        let recipient_account = locked
            .iter()
            .find(|a| a.account_id == recipient)
            .ok_or(LedgerError::NotFound("Recipient account"))?;
        if sender_account.balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }

        sqlx::query(DEBIT_ACCOUNT)
            .bind(amount)
            .bind(sender)
            .execute(&mut *tx)
            .await?;
        sqlx::query(CREDIT_ACCOUNT)
            .bind(amount)
            .bind(recipient)
            .execute(&mut *tx)
            .await?;

        let legs = TransferLegs::new(sender_account, recipient_account, amount, &self.currency);
        insert_transaction(&mut tx, &legs.debit).await?;
        insert_transaction(&mut tx, &legs.credit).await?;

        tx.commit().await?;
        Ok(legs)
    }

    async fn open_pending_deposit(
        &self,
        deposit: PendingDeposit,
    ) -> Result<TransactionRecord, LedgerError> {
        ensure_positive(deposit.amount)?;
        let record = deposit.into_record(&self.currency);
        let mut conn = self.db.pool().acquire().await?;
        insert_transaction(&mut conn, &record).await?;
        Ok(record)
    }

    async fn settle_deposit(
        &self,
        reference: &str,
        settled_amount: Decimal,
        provider_metadata: serde_json::Value,
    ) -> Result<SettleOutcome, LedgerError> {
        ensure_positive(settled_amount)?;
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query(LOCK_TRANSACTION_BY_REFERENCE)
            .bind(reference)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::NotFound("Deposit"))?;
        let record = row_to_transaction(&row)?;
        if record.kind != TransactionKind::Deposit {
            return Err(LedgerError::NotFound("Deposit"));
        }
        if record.status == TransactionStatus::Success {
            return Ok(SettleOutcome::AlreadySettled);
        }

        let updated = sqlx::query(MARK_SETTLED)
            .bind(record.transaction_id)
            .bind(&provider_metadata)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Ok(SettleOutcome::AlreadySettled);
        }

        let credited = sqlx::query(CREDIT_ACCOUNT)
            .bind(settled_amount)
            .bind(record.account_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if credited == 0 {
            return Err(LedgerError::NotFound("Account"));
        }

        tx.commit().await?;
        Ok(SettleOutcome::Settled {
            owner_id: record.owner_id,
            account_id: record.account_id,
            amount: settled_amount,
        })
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let row = sqlx::query(SELECT_TRANSACTION_BY_REFERENCE)
            .bind(reference)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|r| row_to_transaction(&r)).transpose()?)
    }

    fn list_for_owner(&self, owner_id: OwnerId) -> TransactionStream<'_> {
        sqlx::query(LIST_FOR_OWNER)
            .bind(owner_id)
            .fetch(self.db.pool())
            .map(|row| -> Result<TransactionRecord, LedgerError> {
                let row = row?;
                Ok(row_to_transaction(&row)?)
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_database_url;
    use crate::ledger::models::DEPOSIT_REFERENCE_PREFIX;
    use crate::ledger::new_reference;
    use futures::TryStreamExt;
    use uuid::Uuid;

    async fn store() -> PgLedgerStore {
        let db = Database::connect(&test_database_url())
            .await
            .expect("Failed to connect");
        db.init_schema().await.expect("Failed to init schema");
        PgLedgerStore::new(Arc::new(db), "NGN")
    }

    async fn owner_with_balance(store: &PgLedgerStore, amount: i64) -> Account {
        let owner_id = Uuid::new_v4();
        let account = store
            .establish_owner(&OwnerIdentity {
                owner_id,
                email: format!("{}@example.com", owner_id),
                display_name: None,
            })
            .await
            .unwrap();
        if amount > 0 {
            let reference = new_reference(DEPOSIT_REFERENCE_PREFIX);
            store
                .open_pending_deposit(PendingDeposit {
                    owner_id,
                    account_id: account.account_id,
                    amount: Decimal::from(amount),
                    reference: reference.clone(),
                    provider_metadata: None,
                })
                .await
                .unwrap();
            store
                .settle_deposit(&reference, Decimal::from(amount), serde_json::json!({}))
                .await
                .unwrap();
        }
        store.account_for_owner(owner_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_establish_owner_idempotent() {
        let store = store().await;
        let identity = OwnerIdentity {
            owner_id: Uuid::new_v4(),
            email: "pg@example.com".to_string(),
            display_name: Some("Pg".to_string()),
        };
        let first = store.establish_owner(&identity).await.unwrap();
        let second = store.establish_owner(&identity).await.unwrap();
        assert_eq!(first.account_id, second.account_id);
        assert_eq!(first.account_number.len(), 13);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_transfer_conserves_balance() {
        let store = store().await;
        let sender = owner_with_balance(&store, 10_000).await;
        let recipient = owner_with_balance(&store, 0).await;

        let legs = store
            .debit_and_credit(sender.account_id, recipient.account_id, Decimal::from(2500))
            .await
            .unwrap();
        assert_ne!(legs.debit.reference, legs.credit.reference);

        let sender = store.account_for_owner(sender.owner_id).await.unwrap().unwrap();
        let recipient = store
            .account_for_owner(recipient.owner_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sender.balance, Decimal::from(7500));
        assert_eq!(recipient.balance, Decimal::from(2500));

        let err = store
            .debit_and_credit(sender.account_id, recipient.account_id, Decimal::from(7501))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL database"]
    async fn test_pg_settle_and_duplicate_reference() {
        let store = store().await;
        let account = owner_with_balance(&store, 0).await;
        let reference = new_reference(DEPOSIT_REFERENCE_PREFIX);
        let deposit = PendingDeposit {
            owner_id: account.owner_id,
            account_id: account.account_id,
            amount: Decimal::from(5000),
            reference: reference.clone(),
            provider_metadata: Some(serde_json::json!({"provider": "paystack"})),
        };
        store.open_pending_deposit(deposit.clone()).await.unwrap();

        let err = store.open_pending_deposit(deposit).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReference(_)));

        let first = store
            .settle_deposit(&reference, Decimal::from(5000), serde_json::json!({}))
            .await
            .unwrap();
        assert!(matches!(first, SettleOutcome::Settled { .. }));
        let second = store
            .settle_deposit(&reference, Decimal::from(5000), serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(second, SettleOutcome::AlreadySettled);

        let account = store.account_for_owner(account.owner_id).await.unwrap().unwrap();
        assert_eq!(account.balance, Decimal::from(5000));

        let records: Vec<_> = store
            .list_for_owner(account.owner_id)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TransactionStatus::Success);
    }
}
