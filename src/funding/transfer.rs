//! Internal wallet-to-wallet transfers.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::core_types::OwnerId;
use crate::error::LedgerError;
use crate::ledger::{LedgerStore, TransferLegs};
use crate::money::AmountPolicy;

pub struct TransferEngine {
    ledger: Arc<dyn LedgerStore>,
    policy: AmountPolicy,
}

/// Acknowledgment for a committed transfer.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub amount: Decimal,
    pub recipient_account_number: String,
    /// Reference of the sender's debit leg
    pub reference: String,
    pub legs: TransferLegs,
}

impl TransferEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, policy: AmountPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Move `amount` from the caller's account to the account with
    /// `recipient_account_number`.
    ///
    /// Checks run in this order and stop at the first failure: caller has an
    /// account, amount policy, not to self, sufficient balance, recipient
    /// exists. The store re-checks balance under its row locks.
    pub async fn transfer(
        &self,
        owner_id: OwnerId,
        recipient_account_number: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, LedgerError> {
        let sender = self
            .ledger
            .account_for_owner(owner_id)
            .await?
            .ok_or(LedgerError::NotFound("Wallet"))?;

        let amount = self.policy.validate(amount)?;
        let recipient_account_number = recipient_account_number.trim();
        if recipient_account_number == sender.account_number {
            return Err(LedgerError::SelfTransfer);
        }
        if sender.balance < amount {
            return Err(LedgerError::InsufficientBalance);
        }

        let recipient = self
            .ledger
            .account_by_number(recipient_account_number)
            .await?
            .ok_or(LedgerError::NotFound("Recipient account"))?;

        let legs = self
            .ledger
            .debit_and_credit(sender.account_id, recipient.account_id, amount)
            .await?;

        tracing::info!(
            owner_id = %owner_id,
            recipient = %recipient.account_number,
            amount = %amount,
            reference = %legs.debit.reference,
            "Transfer committed"
        );

        Ok(TransferReceipt {
            amount,
            recipient_account_number: recipient.account_number,
            reference: legs.debit.reference.clone(),
            legs,
        })
    }
}
