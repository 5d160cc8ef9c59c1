//! Ledger store: accounts, transaction records and the atomic operations
//! that mutate balances.
//!
//! - [`store::LedgerStore`] - storage trait
//! - [`postgres::PgLedgerStore`] - PostgreSQL implementation
//! - [`memory::MemoryStore`] - in-process implementation (dev mode, tests)

pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use models::{
    Account, Owner, OwnerIdentity, PendingDeposit, SettleOutcome, TransactionKind,
    TransactionRecord, TransactionStatus, TransferLegs, generate_account_number, new_reference,
};
pub use postgres::PgLedgerStore;
pub use store::{LedgerStore, TransactionStream};
