//! Ledger store trait
//!
//! Every mutating method opens and commits its own storage transaction; a
//! caller never sees a half-applied transfer or settlement.

use async_trait::async_trait;
use futures::stream::BoxStream;
use rust_decimal::Decimal;

use super::models::{
    Account, Owner, OwnerIdentity, PendingDeposit, SettleOutcome, TransactionRecord, TransferLegs,
};
use crate::core_types::{AccountId, OwnerId};
use crate::error::LedgerError;

/// Owner's transaction records, newest first.
pub type TransactionStream<'a> = BoxStream<'a, Result<TransactionRecord, LedgerError>>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Record the owner and open its account on first sight. Idempotent:
    /// later calls refresh email/display name and return the existing account.
    async fn establish_owner(&self, identity: &OwnerIdentity) -> Result<Account, LedgerError>;

    async fn owner(&self, owner_id: OwnerId) -> Result<Option<Owner>, LedgerError>;

    async fn account_for_owner(&self, owner_id: OwnerId) -> Result<Option<Account>, LedgerError>;

    async fn account_by_number(&self, account_number: &str)
    -> Result<Option<Account>, LedgerError>;

    /// Atomically move `amount` from `sender` to `recipient` and write both
    /// `success` legs.
    ///
    /// # Errors
    /// * `InvalidAmount` - `amount <= 0`
    /// * `SelfTransfer` - same account on both sides
    /// * `NotFound` - either account missing
    /// * `InsufficientBalance` - sender balance below `amount`
    async fn debit_and_credit(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
    ) -> Result<TransferLegs, LedgerError>;

    /// Insert one `pending` deposit record. No balance effect.
    ///
    /// # Errors
    /// * `DuplicateReference` - the reference is already taken
    async fn open_pending_deposit(
        &self,
        deposit: PendingDeposit,
    ) -> Result<TransactionRecord, LedgerError>;

    /// Move a deposit to `success` and credit its account by
    /// `settled_amount`. A record already in `success` is left untouched.
    ///
    /// # Errors
    /// * `NotFound` - no deposit with this reference
    async fn settle_deposit(
        &self,
        reference: &str,
        settled_amount: Decimal,
        provider_metadata: serde_json::Value,
    ) -> Result<SettleOutcome, LedgerError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<TransactionRecord>, LedgerError>;

    /// Lazy listing; nothing is read until the stream is polled, and calling
    /// again starts over from the newest record.
    fn list_for_owner(&self, owner_id: OwnerId) -> TransactionStream<'_>;
}
