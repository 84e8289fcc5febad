//! Transaction-related types for the ledger
//!
//! This module defines the append-only transaction record, the record kinds,
//! and the canonical signed encoding every consumer of the log relies on.
//!
//! # Signed encoding
//!
//! `amount` is always the signed delta applied to `to_account`. When
//! `from_account` is present it receives the negation of `amount`:
//!
//! | kind       | from_account | to_account | amount |
//! |------------|--------------|------------|--------|
//! | deposit    | absent       | account    | `+x`   |
//! | withdrawal | absent       | account    | `-x`   |
//! | transfer   | source       | target     | `+x`   |
//!
//! [`TransactionRecord::signed_effect`] is the only place that interprets
//! this layout, so no caller needs to branch on the record kind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account identifier
///
/// Ids are assigned by the store starting at 1. Zero and negative values are
/// never assigned.
pub type AccountId = i64;

/// Transaction record identifier, monotonically increasing in commit order
pub type RecordId = i64;

/// Kinds of balance-affecting events recorded in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credit funds to an account from outside the ledger
    Deposit,

    /// Debit funds from an account to outside the ledger
    ///
    /// Requires sufficient balance to succeed.
    Withdrawal,

    /// Move funds between two accounts in one atomic unit
    Transfer,
}

impl TransactionKind {
    /// Stable lowercase name, as persisted in the `kind` column
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(format!("Unknown transaction kind '{}'", other)),
        }
    }
}

/// Immutable entry of the transaction log
///
/// Created exactly once per successful mutating operation and never updated
/// or deleted afterwards. `created_at` is non-decreasing with `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique id assigned by the store inside the atomic unit
    pub id: RecordId,

    /// Account debited by a transfer; absent for deposits and withdrawals
    pub from_account: Option<AccountId>,

    /// Account the signed `amount` applies to
    pub to_account: AccountId,

    /// Signed delta applied to `to_account`
    pub amount: Decimal,

    /// What kind of event produced this record
    pub kind: TransactionKind,

    /// Commit timestamp stamped by the store
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Net change this record applied to `account`
    ///
    /// Both legs are summed, so a self-transfer nets to zero and a record that
    /// does not touch the account contributes nothing.
    pub fn signed_effect(&self, account: AccountId) -> Decimal {
        let mut effect = Decimal::ZERO;
        if self.to_account == account {
            effect += self.amount;
        }
        if self.from_account == Some(account) {
            effect -= self.amount;
        }
        effect
    }

    /// Whether this record references `account` on either leg
    pub fn touches(&self, account: AccountId) -> bool {
        self.to_account == account || self.from_account == Some(account)
    }
}

/// A record waiting to be appended by an atomic unit
///
/// Carries everything except the id and timestamp, which the store assigns at
/// commit so that both follow commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub from_account: Option<AccountId>,
    pub to_account: AccountId,
    pub amount: Decimal,
    pub kind: TransactionKind,
}

impl NewRecord {
    /// Deposit of `amount` into `account`
    pub fn deposit(account: AccountId, amount: Decimal) -> Self {
        NewRecord {
            from_account: None,
            to_account: account,
            amount,
            kind: TransactionKind::Deposit,
        }
    }

    /// Withdrawal of `amount` from `account`, stored as a negative delta
    pub fn withdrawal(account: AccountId, amount: Decimal) -> Self {
        NewRecord {
            from_account: None,
            to_account: account,
            amount: -amount,
            kind: TransactionKind::Withdrawal,
        }
    }

    /// Transfer of `amount` from `from` to `to`
    pub fn transfer(from: AccountId, to: AccountId, amount: Decimal) -> Self {
        NewRecord {
            from_account: Some(from),
            to_account: to,
            amount,
            kind: TransactionKind::Transfer,
        }
    }

    /// Attach the id and timestamp assigned by the store
    pub fn into_record(self, id: RecordId, created_at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id,
            from_account: self.from_account,
            to_account: self.to_account,
            amount: self.amount,
            kind: self.kind,
            created_at,
        }
    }
}
