//! Core ledger module
//!
//! This module contains the ledger core components:
//! - `traits` - The store abstraction and the balance sheet handed to atomic units
//! - `memory_store` - Thread-safe in-memory store
//! - `sqlite_store` - Durable SQLite store
//! - `clock` - Time sources for record timestamps
//! - `engine` - Deposits, withdrawals, and transfers
//! - `history` - Point-in-time balance reconstruction
//! - `ledger` - Facade composing the engine and the reconstructor

pub mod clock;
pub mod engine;
pub mod history;
pub mod ledger;
pub mod memory_store;
pub mod sqlite_store;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::BalanceEngine;
pub use history::{parse_timestamp, HistoryReconstructor};
pub use ledger::Ledger;
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
pub use traits::{AccountHistory, BalanceSheet, LedgerStore};
