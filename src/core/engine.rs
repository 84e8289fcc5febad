//! Balance engine
//!
//! This module provides the `BalanceEngine`, which performs deposits,
//! withdrawals, and transfers against a [`LedgerStore`].
//!
//! The engine enforces the business rules:
//! - Amounts must be strictly positive with at most two decimal places
//! - No balance may go negative
//! - A transfer's debit and credit happen in the same atomic unit
//!
//! Every check that depends on a balance runs inside the store's atomic unit,
//! on the balance read under that unit's locks. The engine itself holds no
//! state between operations.

use std::sync::Arc;

use rust_decimal::Decimal;

use super::traits::LedgerStore;
use crate::types::money::{is_valid_amount, to_scale};
use crate::types::{AccountId, EngineError, LedgerError, NewRecord, TransactionRecord};

/// Mutating half of the ledger
///
/// Cheap to clone; clones share the same store.
#[derive(Debug)]
pub struct BalanceEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for BalanceEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> BalanceEngine<S> {
    /// Create a new BalanceEngine over a shared store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Credit `amount` to `account`
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionRecord)` - The appended `deposit` record
    /// * `Err(EngineError::Rejected(InvalidAmount))` - If `amount` is not a valid amount
    /// * `Err(EngineError::Rejected(AccountNotFound))` - If the account does not exist
    /// * `Err(EngineError::ArithmeticOverflow)` - If the new balance would overflow
    pub fn deposit(
        &self,
        account: AccountId,
        amount: Decimal,
    ) -> Result<TransactionRecord, EngineError> {
        let amount = validate_amount(amount)?;

        let record = self
            .store
            .atomic_update(&[account], |sheet| -> Result<NewRecord, EngineError> {
                let balance = sheet.balance(account)?;
                let updated = balance
                    .checked_add(amount)
                    .ok_or_else(|| EngineError::arithmetic_overflow("deposit", account))?;
                sheet.set_balance(account, to_scale(updated))?;
                Ok(NewRecord::deposit(account, amount))
            })?;

        tracing::debug!(account, %amount, record = record.id, "deposit committed");
        Ok(record)
    }

    /// Debit `amount` from `account`
    ///
    /// The balance check and the write happen in the same atomic unit, so two
    /// concurrent withdrawals can never both pass the check on the same funds.
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionRecord)` - The appended `withdrawal` record (negative amount)
    /// * `Err(EngineError::Rejected(InvalidAmount))` - If `amount` is not a valid amount
    /// * `Err(EngineError::Rejected(AccountNotFound))` - If the account does not exist
    /// * `Err(EngineError::Rejected(InsufficientFunds))` - If the balance is below `amount`
    pub fn withdraw(
        &self,
        account: AccountId,
        amount: Decimal,
    ) -> Result<TransactionRecord, EngineError> {
        let amount = validate_amount(amount)?;

        let record = self
            .store
            .atomic_update(&[account], |sheet| -> Result<NewRecord, EngineError> {
                let balance = sheet.balance(account)?;
                if balance < amount {
                    return Err(LedgerError::insufficient_funds(account, balance, amount).into());
                }
                sheet.set_balance(account, to_scale(balance - amount))?;
                Ok(NewRecord::withdrawal(account, amount))
            })?;

        tracing::debug!(account, %amount, record = record.id, "withdrawal committed");
        Ok(record)
    }

    /// Move `amount` from `from` to `to`
    ///
    /// Both accounts are locked for the whole unit (lowest id first, whatever
    /// the argument order). A self-transfer still requires `amount` to be
    /// covered by the balance, leaves the balance unchanged, and appends a
    /// record that nets to zero.
    ///
    /// # Returns
    ///
    /// * `Ok(TransactionRecord)` - The appended `transfer` record
    /// * `Err(EngineError::Rejected(InvalidAmount))` - If `amount` is not a valid amount
    /// * `Err(EngineError::Rejected(AccountNotFound))` - If either account does not exist
    /// * `Err(EngineError::Rejected(InsufficientFunds))` - If `from` cannot cover `amount`
    /// * `Err(EngineError::ArithmeticOverflow)` - If the credit would overflow
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    ) -> Result<TransactionRecord, EngineError> {
        let amount = validate_amount(amount)?;

        let record = self
            .store
            .atomic_update(&[from, to], |sheet| -> Result<NewRecord, EngineError> {
                let from_balance = sheet.balance(from)?;
                if from_balance < amount {
                    return Err(LedgerError::insufficient_funds(from, from_balance, amount).into());
                }

                if from != to {
                    let to_balance = sheet.balance(to)?;
                    let credited = to_balance
                        .checked_add(amount)
                        .ok_or_else(|| EngineError::arithmetic_overflow("transfer", to))?;
                    sheet.set_balance(from, to_scale(from_balance - amount))?;
                    sheet.set_balance(to, to_scale(credited))?;
                }

                Ok(NewRecord::transfer(from, to, amount))
            })?;

        tracing::debug!(from, to, %amount, record = record.id, "transfer committed");
        Ok(record)
    }
}

fn validate_amount(amount: Decimal) -> Result<Decimal, EngineError> {
    if is_valid_amount(amount) {
        Ok(to_scale(amount))
    } else {
        Err(LedgerError::invalid_amount(amount).into())
    }
}
