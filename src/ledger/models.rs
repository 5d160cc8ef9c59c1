//! Ledger data models

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

use crate::core_types::{AccountId, OwnerId, TransactionId};

/// Digits in a public account number.
pub const ACCOUNT_NUMBER_LEN: usize = 13;

pub const DEPOSIT_REFERENCE_PREFIX: &str = "dep_";
pub const TRANSFER_REFERENCE_PREFIX: &str = "trf_";

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Transfer,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "transfer" => Ok(TransactionKind::Transfer),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            _ => Err(UnknownVariant(format!("transaction kind '{}'", s))),
        }
    }
}

/// Transaction status. `Success` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(UnknownVariant(format!("transaction status '{}'", s))),
        }
    }
}

/// Persisted enum text did not match any variant.
#[derive(Debug, thiserror::Error)]
#[error("Unknown {0}")]
pub struct UnknownVariant(pub String);

/// Identity handed over by the identity collaborator.
#[derive(Debug, Clone)]
pub struct OwnerIdentity {
    pub owner_id: OwnerId,
    pub email: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Owner {
    pub owner_id: OwnerId,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub account_id: AccountId,
    pub owner_id: OwnerId,
    pub account_number: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn open(owner_id: OwnerId, account_number: String) -> Self {
        let now = Utc::now();
        Self {
            account_id: Uuid::new_v4(),
            owner_id,
            account_number,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable audit entry. Only `status`, `provider_metadata` and
/// `updated_at` change, and only on settlement of a pending deposit.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub sender_account_id: Option<AccountId>,
    pub recipient_account_id: Option<AccountId>,
    pub description: Option<String>,
    pub reference: String,
    pub provider_metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input to `open_pending_deposit`.
#[derive(Debug, Clone)]
pub struct PendingDeposit {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub reference: String,
    pub provider_metadata: Option<serde_json::Value>,
}

impl PendingDeposit {
    pub fn into_record(self, currency: &str) -> TransactionRecord {
        let now = Utc::now();
        TransactionRecord {
            transaction_id: Uuid::new_v4(),
            owner_id: self.owner_id,
            account_id: self.account_id,
            amount: self.amount,
            currency: currency.to_string(),
            kind: TransactionKind::Deposit,
            status: TransactionStatus::Pending,
            sender_account_id: None,
            recipient_account_id: None,
            description: Some("Wallet deposit".to_string()),
            reference: self.reference,
            provider_metadata: self.provider_metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The two records written by one transfer.
#[derive(Debug, Clone)]
pub struct TransferLegs {
    /// Owned by the sender
    pub debit: TransactionRecord,
    /// Owned by the recipient
    pub credit: TransactionRecord,
}

impl TransferLegs {
    /// Build both `success` legs for a move from `sender` to `recipient`.
    pub fn new(sender: &Account, recipient: &Account, amount: Decimal, currency: &str) -> Self {
        let now = Utc::now();
        let leg = |owner: &Account, description: String| TransactionRecord {
            transaction_id: Uuid::new_v4(),
            owner_id: owner.owner_id,
            account_id: owner.account_id,
            amount,
            currency: currency.to_string(),
            kind: TransactionKind::Transfer,
            status: TransactionStatus::Success,
            sender_account_id: Some(sender.account_id),
            recipient_account_id: Some(recipient.account_id),
            description: Some(description),
            reference: new_reference(TRANSFER_REFERENCE_PREFIX),
            provider_metadata: None,
            created_at: now,
            updated_at: now,
        };
        Self {
            debit: leg(sender, format!("Transfer to {}", recipient.account_number)),
            credit: leg(recipient, format!("Transfer from {}", sender.account_number)),
        }
    }
}

/// Result of `settle_deposit`.
#[derive(Debug, Clone, PartialEq)]
pub enum SettleOutcome {
    /// Record moved to `success` and the account was credited
    Settled {
        owner_id: OwnerId,
        account_id: AccountId,
        amount: Decimal,
    },
    /// Record was already `success`; nothing changed
    AlreadySettled,
}

/// Random 13-digit account number with a non-zero leading digit.
pub fn generate_account_number() -> String {
    let mut rng = rand::thread_rng();
    let mut number = String::with_capacity(ACCOUNT_NUMBER_LEN);
    number.push(char::from(b'1' + rng.gen_range(0..9u8)));
    for _ in 1..ACCOUNT_NUMBER_LEN {
        number.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    number
}

/// Globally unique, lexicographically time-ordered reference.
pub fn new_reference(prefix: &str) -> String {
    format!("{}{}", prefix, Ulid::new().to_string().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_kind_and_status_round_trip_text() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::Transfer,
            TransactionKind::Withdrawal,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>().unwrap(), kind);
        }
        assert_eq!(
            "success".parse::<TransactionStatus>().unwrap(),
            TransactionStatus::Success
        );
        assert!("settled".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_account_number_shape() {
        for _ in 0..200 {
            let number = generate_account_number();
            assert_eq!(number.len(), ACCOUNT_NUMBER_LEN);
            assert!(number.chars().all(|c| c.is_ascii_digit()));
            assert!(!number.starts_with('0'));
        }
    }

    #[test]
    fn test_references_unique_and_prefixed() {
        let refs: HashSet<String> = (0..1000)
            .map(|_| new_reference(DEPOSIT_REFERENCE_PREFIX))
            .collect();
        assert_eq!(refs.len(), 1000);
        assert!(refs.iter().all(|r| r.starts_with("dep_")));
    }

    #[test]
    fn test_transfer_legs_share_amount_distinct_references() {
        let sender = Account::open(Uuid::new_v4(), "1000000000001".to_string());
        let recipient = Account::open(Uuid::new_v4(), "1000000000002".to_string());
        let amount = Decimal::new(2500, 0);

        let legs = TransferLegs::new(&sender, &recipient, amount, "NGN");

        assert_eq!(legs.debit.amount, legs.credit.amount);
        assert_ne!(legs.debit.reference, legs.credit.reference);
        assert_eq!(legs.debit.owner_id, sender.owner_id);
        assert_eq!(legs.credit.owner_id, recipient.owner_id);
        assert_eq!(legs.debit.status, TransactionStatus::Success);
        assert_eq!(legs.credit.sender_account_id, Some(sender.account_id));
        assert_eq!(legs.debit.recipient_account_id, Some(recipient.account_id));
        assert_eq!(
            legs.debit.description.as_deref(),
            Some("Transfer to 1000000000002")
        );
    }
}
