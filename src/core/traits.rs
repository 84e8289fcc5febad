//! Core traits for ledger storage
//!
//! This module defines the store abstraction the balance engine and history
//! reconstructor run against, so the in-memory and SQLite stores can be used
//! interchangeably.

use crate::types::{Account, AccountId, NewRecord, StoreError, TransactionRecord};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Storage for account balances and the append-only transaction log
///
/// Every mutation goes through [`LedgerStore::atomic_update`], which is the
/// single serialization point of the ledger. Callers never hold locks
/// themselves.
pub trait LedgerStore: Send + Sync {
    /// Create an account with a zero balance and return it
    fn create_account(&self) -> Result<Account, StoreError>;

    /// Current balance of an account
    fn get_balance(&self, account: AccountId) -> Result<Decimal, StoreError>;

    /// Every account ordered by id, read from one consistent view
    fn list_balances(&self) -> Result<Vec<Account>, StoreError>;

    /// Apply balance changes and append one record as an all-or-nothing unit
    ///
    /// The store locks `accounts` (deduplicated, lowest id first), loads their
    /// balances into a [`BalanceSheet`], and hands the sheet to `f`. If `f`
    /// returns a record, the staged balances are written and the record is
    /// appended with a store-assigned id and timestamp. If `f` or any store
    /// step fails, nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountNotFound` (converted into `E`) if any of
    /// `accounts` does not exist, or whatever error `f` returns.
    fn atomic_update<F, E>(&self, accounts: &[AccountId], f: F) -> Result<TransactionRecord, E>
    where
        F: FnOnce(&mut BalanceSheet) -> Result<NewRecord, E>,
        E: From<StoreError>;

    /// Every record touching an account, ordered by `created_at` then `id`
    fn list_records_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Current balance plus the records committed strictly after `after`
    ///
    /// Both parts come from the same consistent view, so no record is counted
    /// that the balance does not already include, and vice versa.
    fn account_history(
        &self,
        account: AccountId,
        after: DateTime<Utc>,
    ) -> Result<AccountHistory, StoreError>;
}

/// Balance plus the suffix of the log returned by [`LedgerStore::account_history`]
#[derive(Debug, Clone, PartialEq)]
pub struct AccountHistory {
    pub balance: Decimal,
    pub records: Vec<TransactionRecord>,
}

#[derive(Debug, Clone)]
struct SheetEntry {
    account: AccountId,
    current: Decimal,
    staged: Decimal,
}

/// Balances of the accounts locked by one atomic unit
///
/// Reads return the staged value, so a unit sees its own writes. Nothing
/// reaches the store until the unit returns successfully.
#[derive(Debug, Clone)]
pub struct BalanceSheet {
    entries: Vec<SheetEntry>,
}

impl BalanceSheet {
    /// Build a sheet from the balances read under the unit's locks
    pub fn new(balances: impl IntoIterator<Item = (AccountId, Decimal)>) -> Self {
        let entries = balances
            .into_iter()
            .map(|(account, balance)| SheetEntry {
                account,
                current: balance,
                staged: balance,
            })
            .collect();
        Self { entries }
    }

    /// Balance of a locked account, including changes staged by this unit
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if `account` was not locked by this unit.
    pub fn balance(&self, account: AccountId) -> Result<Decimal, StoreError> {
        self.entry(account).map(|entry| entry.staged)
    }

    /// Stage a new balance for a locked account
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if `account` was not locked by this unit
    /// or if `balance` is negative.
    pub fn set_balance(&mut self, account: AccountId, balance: Decimal) -> Result<(), StoreError> {
        if balance < Decimal::ZERO {
            return Err(StoreError::backend(format!(
                "balance of account {} would become negative ({})",
                account, balance
            )));
        }
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.account == account)
            .ok_or_else(|| not_in_unit(account))?;
        entry.staged = balance;
        Ok(())
    }

    /// Accounts whose balance differs from the value read at lock time
    pub fn changes(&self) -> impl Iterator<Item = (AccountId, Decimal)> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.staged != entry.current)
            .map(|entry| (entry.account, entry.staged))
    }

    fn entry(&self, account: AccountId) -> Result<&SheetEntry, StoreError> {
        self.entries
            .iter()
            .find(|entry| entry.account == account)
            .ok_or_else(|| not_in_unit(account))
    }
}

fn not_in_unit(account: AccountId) -> StoreError {
    StoreError::backend(format!("account {} is not locked by this unit", account))
}

/// Sort and deduplicate the accounts of a unit into lock order
pub(crate) fn lock_order(accounts: &[AccountId]) -> Vec<AccountId> {
    let mut ordered = accounts.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    ordered
}
