//! Money movement: transfers between wallets, provider-funded deposits and
//! webhook settlement.

pub mod deposit;
pub mod handlers;
pub mod provider;
pub mod settlement;
pub mod signature;
pub mod transfer;

pub use deposit::{DepositInitiator, DepositSession, DepositStatus};
pub use provider::{MockProvider, PaymentProvider, PaymentSession, PaystackClient, ProviderVerification};
pub use settlement::{SettlementOutcome, SettlementReconciler};
pub use transfer::{TransferEngine, TransferReceipt};
