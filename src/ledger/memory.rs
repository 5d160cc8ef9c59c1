//! In-memory store
//!
//! Backs the `--memory` development mode and the test suites. One async
//! mutex guards the whole state, so every operation is serializable, which
//! is the same guarantee the Postgres store gets from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::models::{
    Account, Owner, OwnerIdentity, PendingDeposit, SettleOutcome, TransactionKind,
    TransactionRecord, TransactionStatus, TransferLegs, generate_account_number,
};
use super::store::{LedgerStore, TransactionStream};
use crate::api_auth::{ApiKeyRecord, ApiKeyStore};
use crate::core_types::{AccountId, ApiKeyId, OwnerId};
use crate::error::LedgerError;
use crate::money::ensure_positive;

#[derive(Default)]
struct State {
    owners: HashMap<OwnerId, Owner>,
    accounts: HashMap<AccountId, Account>,
    account_by_owner: HashMap<OwnerId, AccountId>,
    account_by_number: HashMap<String, AccountId>,
    /// Insertion order == creation order
    transactions: Vec<TransactionRecord>,
    reference_index: HashMap<String, usize>,
    api_keys: Vec<ApiKeyRecord>,
}

impl State {
    fn ensure_reference_free(&self, reference: &str) -> Result<(), LedgerError> {
        if self.reference_index.contains_key(reference) {
            return Err(LedgerError::DuplicateReference(reference.to_string()));
        }
        Ok(())
    }

    fn push_record(&mut self, record: TransactionRecord) {
        self.reference_index
            .insert(record.reference.clone(), self.transactions.len());
        self.transactions.push(record);
    }

    fn active_key_count(&self, owner_id: OwnerId, now: DateTime<Utc>) -> usize {
        self.api_keys
            .iter()
            .filter(|k| k.owner_id == owner_id && k.is_usable(now))
            .count()
    }
}

pub struct MemoryStore {
    currency: String,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            state: Mutex::new(State::default()),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn establish_owner(&self, identity: &OwnerIdentity) -> Result<Account, LedgerError> {
        let mut state = self.state.lock().await;

        state
            .owners
            .entry(identity.owner_id)
            .and_modify(|owner| {
                owner.email = identity.email.clone();
                if identity.display_name.is_some() {
                    owner.display_name = identity.display_name.clone();
                }
            })
            .or_insert_with(|| Owner {
                owner_id: identity.owner_id,
                email: identity.email.clone(),
                display_name: identity.display_name.clone(),
                created_at: Utc::now(),
            });

        if let Some(account_id) = state.account_by_owner.get(&identity.owner_id) {
            if let Some(account) = state.accounts.get(account_id) {
                return Ok(account.clone());
            }
        }

        let mut number = generate_account_number();
        while state.account_by_number.contains_key(&number) {
            number = generate_account_number();
        }
        let account = Account::open(identity.owner_id, number);
        state
            .account_by_owner
            .insert(account.owner_id, account.account_id);
        state
            .account_by_number
            .insert(account.account_number.clone(), account.account_id);
        state.accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn owner(&self, owner_id: OwnerId) -> Result<Option<Owner>, LedgerError> {
        Ok(self.state.lock().await.owners.get(&owner_id).cloned())
    }

    async fn account_for_owner(&self, owner_id: OwnerId) -> Result<Option<Account>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .account_by_owner
            .get(&owner_id)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn account_by_number(
        &self,
        account_number: &str,
    ) -> Result<Option<Account>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .account_by_number
            .get(account_number)
            .and_then(|id| state.accounts.get(id))
            .cloned())
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

        let mut state = self.state.lock().await;
        let sender_account = state
            .accounts
            .get(&sender)
            .cloned()
            .ok_or(LedgerError::NotFound("Sender account"))?;
        let recipient_account = state
            .accounts
            .get(&recipient)
            .cloned()
            .ok_or(LedgerError::NotFound("Recipient account"))?;
        if sender_account.balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }

        let legs = TransferLegs::new(&sender_account, &recipient_account, amount, &self.currency);
        state.ensure_reference_free(&legs.debit.reference)?;
        state.ensure_reference_free(&legs.credit.reference)?;

        // All checks passed; nothing below can fail.
        let now = Utc::now();
        if let Some(account) = state.accounts.get_mut(&sender) {
            account.balance -= amount;
            account.updated_at = now;
        }
        if let Some(account) = state.accounts.get_mut(&recipient) {
            account.balance += amount;
            account.updated_at = now;
        }
        state.push_record(legs.debit.clone());
        state.push_record(legs.credit.clone());
        Ok(legs)
    }

    async fn open_pending_deposit(
        &self,
        deposit: PendingDeposit,
    ) -> Result<TransactionRecord, LedgerError> {
        ensure_positive(deposit.amount)?;
        let mut state = self.state.lock().await;
        state.ensure_reference_free(&deposit.reference)?;
        if !state.accounts.contains_key(&deposit.account_id) {
            return Err(LedgerError::NotFound("Account"));
        }
        let record = deposit.into_record(&self.currency);
        state.push_record(record.clone());
        Ok(record)
    }

    async fn settle_deposit(
        &self,
        reference: &str,
        settled_amount: Decimal,
        provider_metadata: serde_json::Value,
    ) -> Result<SettleOutcome, LedgerError> {
        ensure_positive(settled_amount)?;
        let mut state = self.state.lock().await;
        let index = *state
            .reference_index
            .get(reference)
            .ok_or(LedgerError::NotFound("Deposit"))?;

        let record = &state.transactions[index];
        if record.kind != TransactionKind::Deposit {
            return Err(LedgerError::NotFound("Deposit"));
        }
        if record.status == TransactionStatus::Success {
            return Ok(SettleOutcome::AlreadySettled);
        }
        let (owner_id, account_id) = (record.owner_id, record.account_id);

        let now = Utc::now();
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(LedgerError::NotFound("Account"))?;
        account.balance += settled_amount;
        account.updated_at = now;

        let record = &mut state.transactions[index];
        record.status = TransactionStatus::Success;
        record.provider_metadata = Some(provider_metadata);
        record.updated_at = now;

        Ok(SettleOutcome::Settled {
            owner_id,
            account_id,
            amount: settled_amount,
        })
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .reference_index
            .get(reference)
            .map(|&index| state.transactions[index].clone()))
    }

    fn list_for_owner(&self, owner_id: OwnerId) -> TransactionStream<'_> {
        stream::once(async move {
            let state = self.state.lock().await;
            state
                .transactions
                .iter()
                .rev()
                .filter(|record| record.owner_id == owner_id)
                .cloned()
                .collect::<Vec<_>>()
        })
        .flat_map(|records| stream::iter(records.into_iter().map(Ok)))
        .boxed()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert_key(
        &self,
        record: &ApiKeyRecord,
        max_active: usize,
        retire: Option<ApiKeyId>,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if !state.owners.contains_key(&record.owner_id) {
            return Err(LedgerError::NotFound("Owner"));
        }
        // A retired key is spent: it cannot be retired (rolled over) twice.
        let retired_index = match retire {
            Some(retired) => Some(
                state
                    .api_keys
                    .iter()
                    .position(|k| k.key_id == retired && k.owner_id == record.owner_id && k.is_active)
                    .ok_or(LedgerError::NotFound("API key"))?,
            ),
            None => None,
        };
        if state.active_key_count(record.owner_id, record.created_at) >= max_active {
            return Err(LedgerError::KeyQuotaExceeded(max_active));
        }
        if state
            .api_keys
            .iter()
            .any(|k| k.key_digest == record.key_digest)
        {
            return Err(LedgerError::internal("API key digest collision"));
        }
        if let Some(index) = retired_index {
            state.api_keys[index].is_active = false;
        }
        state.api_keys.push(record.clone());
        Ok(())
    }

    async fn find_usable_by_digest(
        &self,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ApiKeyRecord>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .api_keys
            .iter()
            .find(|k| k.key_digest == digest && k.is_usable(now))
            .cloned())
    }

    async fn get_key(
        &self,
        owner_id: OwnerId,
        key_id: ApiKeyId,
    ) -> Result<Option<ApiKeyRecord>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .api_keys
            .iter()
            .find(|k| k.key_id == key_id && k.owner_id == owner_id)
            .cloned())
    }

    async fn deactivate_key(&self, owner_id: OwnerId, key_id: ApiKeyId) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().await;
        match state
            .api_keys
            .iter_mut()
            .find(|k| k.key_id == key_id && k.owner_id == owner_id && k.is_active)
        {
            Some(key) => {
                key.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_keys(&self, owner_id: OwnerId) -> Result<Vec<ApiKeyRecord>, LedgerError> {
        let state = self.state.lock().await;
        let mut keys: Vec<ApiKeyRecord> = state
            .api_keys
            .iter()
            .filter(|k| k.owner_id == owner_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }
}
