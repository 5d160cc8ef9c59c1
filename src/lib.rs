//! Wallet Ledger - transactional core of a custodial wallet.
//!
//! Every balance change is paired with an immutable transaction record in the
//! same database transaction. Money moves by internal transfer or by settling
//! a provider-funded deposit; settlement is idempotent per reference.
//!
//! # Modules
//!
//! - [`core_types`] - Id aliases (OwnerId, AccountId, etc.)
//! - [`money`] - Amount policy and minor-unit conversion
//! - [`error`] - `LedgerError` taxonomy and HTTP rendering
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool and schema
//! - [`ledger`] - Accounts, transaction records and the `LedgerStore` seam
//! - [`api_auth`] - Capabilities, API keys and credential resolution
//! - [`user_auth`] - Bearer session tokens
//! - [`funding`] - Transfers, deposits, payment provider and webhook settlement
//! - [`gateway`] - Axum router, shared state and OpenAPI docs

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod error;
pub mod logging;
pub mod money;

// Persistence
pub mod db;
pub mod ledger;

// Credentials
pub mod api_auth;
pub mod user_auth;

// Money movement and HTTP surface
pub mod funding;
pub mod gateway;

pub use error::LedgerError;
