//! Core identifier types used throughout the ledger
//!
//! All identifiers are random v4 UUIDs assigned by this service, except
//! [`OwnerId`], which comes from the identity collaborator.

use uuid::Uuid;

/// Owner identity - stable across sessions, immutable after assignment.
pub type OwnerId = Uuid;

/// Account ID - one account per owner.
pub type AccountId = Uuid;

/// Transaction record ID
pub type TransactionId = Uuid;

/// API key row ID
pub type ApiKeyId = Uuid;
