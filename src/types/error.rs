//! Error types for the ledger
//!
//! Errors are layered the same way the components are:
//!
//! - [`StoreError`]: failures raised by a ledger store (missing rows, backend
//!   failures, corrupt persisted data)
//! - [`EngineError`]: what the balance engine and history reconstructor
//!   return; either an expected domain rejection or an internal failure with
//!   full context
//! - [`LedgerError`]: the caller-visible taxonomy returned by the facade.
//!   Internal failures are collapsed into an opaque [`LedgerError::Internal`]
//!   after being logged.

use super::transaction::AccountId;
use rust_decimal::Decimal;
use thiserror::Error;

/// Failure raised by a ledger store
///
/// Stores never retry; the engine treats every variant except
/// `AccountNotFound` as an internal failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// An account referenced by the operation does not exist
    #[error("Account {account} not found")]
    AccountNotFound {
        /// The account that was looked up
        account: AccountId,
    },

    /// The storage backend failed (I/O, lock poisoning, constraint violation)
    #[error("Store backend error: {message}")]
    Backend {
        /// Description of the backend failure
        message: String,
    },

    /// Persisted data could not be decoded
    #[error("Corrupt ledger data: {message}")]
    Corrupt {
        /// What could not be decoded
        message: String,
    },
}

impl StoreError {
    /// Create an AccountNotFound error
    pub fn account_not_found(account: AccountId) -> Self {
        StoreError::AccountNotFound { account }
    }

    /// Create a Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    /// Create a Corrupt error
    pub fn corrupt(message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(error: rusqlite::Error) -> Self {
        StoreError::Backend {
            message: error.to_string(),
        }
    }
}

/// Caller-visible error taxonomy returned by the ledger facade
///
/// The four domain variants are expected outcomes of a request and carry the
/// context a caller needs. `Internal` never carries storage detail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Amount is zero, negative, or has more than two fractional digits
    #[error("Invalid amount {amount}: amounts must be positive with at most two decimal places")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// An account referenced by the operation does not exist
    #[error("Account {account} not found")]
    AccountNotFound {
        /// The missing account
        account: AccountId,
    },

    /// The operation would make a balance negative
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// The account that would be overdrawn
        account: AccountId,
        /// Balance at the time of the check
        balance: Decimal,
        /// Amount requested
        requested: Decimal,
    },

    /// Timestamp is not valid RFC3339
    #[error("Invalid timestamp '{value}': expected RFC3339")]
    InvalidTimestamp {
        /// The rejected input
        value: String,
    },

    /// Store failure or any other unexpected condition
    #[error("Internal error")]
    Internal,
}

/// Stable classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    AccountNotFound,
    InsufficientFunds,
    InvalidTimestamp,
    Internal,
}

impl LedgerError {
    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: AccountId) -> Self {
        LedgerError::AccountNotFound { account }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: AccountId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account,
            balance,
            requested,
        }
    }

    /// Create an InvalidTimestamp error
    pub fn invalid_timestamp(value: &str) -> Self {
        LedgerError::InvalidTimestamp {
            value: value.to_string(),
        }
    }

    /// The stable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            LedgerError::AccountNotFound { .. } => ErrorKind::AccountNotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidTimestamp { .. } => ErrorKind::InvalidTimestamp,
            LedgerError::Internal => ErrorKind::Internal,
        }
    }
}

/// Error returned by the balance engine and the history reconstructor
///
/// Domain rejections are wrapped unchanged in `Rejected`; everything else is
/// internal and keeps its full context for logging.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Expected domain outcome (bad amount, missing account, overdraft, bad timestamp)
    #[error(transparent)]
    Rejected(LedgerError),

    /// Store failure
    #[error(transparent)]
    Store(StoreError),

    /// Balance arithmetic exceeded the decimal range
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        /// Operation that overflowed
        operation: String,
        /// Account whose balance overflowed
        account: AccountId,
    },
}

impl EngineError {
    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: AccountId) -> Self {
        EngineError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Whether this error is an internal failure rather than a domain rejection
    pub fn is_internal(&self) -> bool {
        !matches!(self, EngineError::Rejected(_))
    }
}

impl From<LedgerError> for EngineError {
    fn from(error: LedgerError) -> Self {
        EngineError::Rejected(error)
    }
}

// A missing account is a domain outcome even when the store detects it
impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AccountNotFound { account } => {
                EngineError::Rejected(LedgerError::account_not_found(account))
            }
            other => EngineError::Store(other),
        }
    }
}

impl From<EngineError> for LedgerError {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::Rejected(domain) => domain,
            EngineError::Store(_) | EngineError::ArithmeticOverflow { .. } => LedgerError::Internal,
        }
    }
}
