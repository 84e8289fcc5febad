//! Ledger facade
//!
//! This module provides the `Ledger` struct, the single call surface consumed
//! by outer layers (CSV replay, an HTTP layer, tests). It composes the
//! [`BalanceEngine`] for the mutating path and the [`HistoryReconstructor`]
//! for the read path, and translates every failure into the caller-visible
//! [`LedgerError`] taxonomy.
//!
//! Internal failures are logged here with their full context and then
//! surfaced as an opaque [`LedgerError::Internal`].
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use rust_ledger_engine::core::{Ledger, MemoryStore};
//!
//! let ledger = Ledger::new(MemoryStore::new());
//! let alice = ledger.create_account().unwrap();
//! let bob = ledger.create_account().unwrap();
//!
//! ledger.deposit(alice.id, Decimal::new(10000, 2)).unwrap();
//! ledger.transfer(alice.id, bob.id, Decimal::new(2550, 2)).unwrap();
//!
//! assert_eq!(ledger.get_balance(alice.id).unwrap(), Decimal::new(7450, 2));
//! assert_eq!(ledger.get_balance(bob.id).unwrap(), Decimal::new(2550, 2));
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;

use super::engine::BalanceEngine;
use super::history::{parse_timestamp, HistoryReconstructor};
use super::traits::LedgerStore;
use crate::types::{
    Account, AccountId, BalanceAtTime, EngineError, LedgerError, TransactionRecord,
};

/// Entry point to the ledger core
///
/// Cheap to clone; clones share the same store and can be used from any
/// thread.
#[derive(Debug)]
pub struct Ledger<S> {
    store: Arc<S>,
    engine: BalanceEngine<S>,
    history: HistoryReconstructor<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            engine: self.engine.clone(),
            history: self.history.clone(),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Create a ledger that owns `store`
    pub fn new(store: S) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Create a ledger over a store that is also shared elsewhere
    pub fn with_store(store: Arc<S>) -> Self {
        Self {
            engine: BalanceEngine::new(Arc::clone(&store)),
            history: HistoryReconstructor::new(Arc::clone(&store)),
            store,
        }
    }

    /// Open a new account with a zero balance
    pub fn create_account(&self) -> Result<Account, LedgerError> {
        let account = self
            .store
            .create_account()
            .map_err(|error| surface("create_account", error.into()))?;
        tracing::debug!(account = account.id, "account opened");
        Ok(account)
    }

    /// Credit `amount` to `account`
    ///
    /// # Errors
    ///
    /// `InvalidAmount`, `AccountNotFound`, or `Internal`.
    pub fn deposit(
        &self,
        account: AccountId,
        amount: Decimal,
    ) -> Result<TransactionRecord, LedgerError> {
        self.engine
            .deposit(account, amount)
            .map_err(|error| surface("deposit", error))
    }

    /// Debit `amount` from `account`
    ///
    /// # Errors
    ///
    /// `InvalidAmount`, `AccountNotFound`, `InsufficientFunds`, or `Internal`.
    pub fn withdraw(
        &self,
        account: AccountId,
        amount: Decimal,
    ) -> Result<TransactionRecord, LedgerError> {
        self.engine
            .withdraw(account, amount)
            .map_err(|error| surface("withdraw", error))
    }

    /// Move `amount` from `from` to `to` atomically
    ///
    /// # Errors
    ///
    /// `InvalidAmount`, `AccountNotFound` (either endpoint),
    /// `InsufficientFunds`, or `Internal`.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<TransactionRecord, LedgerError> {
        self.engine
            .transfer(from, to, amount)
            .map_err(|error| surface("transfer", error))
    }

    /// Current balance of `account`
    pub fn get_balance(&self, account: AccountId) -> Result<Decimal, LedgerError> {
        self.store
            .get_balance(account)
            .map_err(|error| surface("get_balance", error.into()))
    }

    /// Every account with its balance, ordered by id
    pub fn list_balances(&self) -> Result<Vec<Account>, LedgerError> {
        self.store
            .list_balances()
            .map_err(|error| surface("list_balances", error.into()))
    }

    /// Balance of `account` as of the RFC3339 instant `timestamp`
    ///
    /// The timestamp is validated before the account is looked up, so a bad
    /// timestamp is reported even for a missing account.
    ///
    /// # Errors
    ///
    /// `InvalidTimestamp`, `AccountNotFound`, or `Internal`.
    pub fn balance_as_of(
        &self,
        account: AccountId,
        timestamp: &str,
    ) -> Result<BalanceAtTime, LedgerError> {
        let at = parse_timestamp(timestamp)
            .map_err(|error| surface("balance_as_of", error.into()))?;
        let balance = self
            .history
            .balance_as_of(account, at)
            .map_err(|error| surface("balance_as_of", error))?;

        Ok(BalanceAtTime {
            account,
            balance,
            timestamp: at,
        })
    }

    /// Every record touching `account`, in commit order
    pub fn history(&self, account: AccountId) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.store
            .list_records_for_account(account)
            .map_err(|error| surface("history", error.into()))
    }
}

/// Log an engine failure and convert it to the caller-visible taxonomy
fn surface(operation: &'static str, error: EngineError) -> LedgerError {
    if error.is_internal() {
        tracing::error!(operation, error = ?error, "internal ledger failure");
    } else {
        tracing::warn!(operation, %error, "operation rejected");
    }
    error.into()
}
