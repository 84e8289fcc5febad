//! Account-related types for the ledger
//!
//! This module defines the Account structure returned by balance queries and
//! the balance-at-time result produced by history reconstruction.

use super::transaction::AccountId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Account state
///
/// An account is created once with a zero balance and only ever mutated
/// through the balance engine. The balance is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    /// Store-assigned identifier (starts at 1)
    pub id: AccountId,

    /// Current balance with two fractional digits
    pub balance: Decimal,
}

impl Account {
    /// Create a new account with a zero balance
    ///
    /// # Arguments
    ///
    /// * `id` - The identifier assigned by the store
    pub fn new(id: AccountId) -> Self {
        Account {
            id,
            balance: Decimal::new(0, 2),
        }
    }
}

/// Balance of an account as of a past instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAtTime {
    pub account: AccountId,
    pub balance: Decimal,
    pub timestamp: DateTime<Utc>,
}
