//! Rust Ledger Engine Library
//! # Overview
//!
//! This library provides a ledger core: account balances mutated by deposits,
//! withdrawals, and transfers, an append-only transaction log, and
//! reconstruction of any account's balance as of a past instant.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, TransactionRecord, errors, money helpers)
//! - [`core`] - Ledger components:
//!   - [`core::traits`] - The `LedgerStore` abstraction and its atomic unit
//!   - [`core::memory_store`] / [`core::sqlite_store`] - Store implementations
//!   - [`core::engine`] - Balance engine (mutating path)
//!   - [`core::history`] - History reconstructor (read path)
//!   - [`core::ledger`] - Facade and error taxonomy boundary
//! - [`io`] - CSV command input and balance output
//! - [`strategy`] - Sync and async replay pipelines
//! - [`cli`] - CLI arguments parsing
//!
//! # Guarantees
//!
//! - No balance is ever negative, for any reader at any time
//! - A transfer's debit and credit commit together or not at all
//! - Every account's balance equals the signed sum of the records touching it
//! - Units touching two accounts lock the lower id first

pub mod cli;
pub mod core;
pub mod io;
pub mod logging;
pub mod strategy;
pub mod types;

pub use core::{HistoryReconstructor, Ledger, LedgerStore, MemoryStore, SqliteStore};
pub use io::write_balances_csv;
pub use types::{
    Account, AccountId, BalanceAtTime, ErrorKind, LedgerError, RecordId, TransactionKind,
    TransactionRecord,
};
