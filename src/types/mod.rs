//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `account`: Account state and balance-at-time results
//! - `transaction`: Transaction records, kinds, and identifiers
//! - `money`: Fixed-scale amount helpers
//! - `error`: Error types for the store, the engine, and the facade

pub mod account;
pub mod error;
pub mod money;
pub mod transaction;

pub use account::{Account, BalanceAtTime};
pub use error::{EngineError, ErrorKind, LedgerError, StoreError};
pub use transaction::{AccountId, NewRecord, RecordId, TransactionKind, TransactionRecord};
