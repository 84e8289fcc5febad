//! CSV format handling for ledger commands and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to ledger commands
//! - Balance output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Input format
//!
//! ```text
//! op,account,counterparty,amount
//! open,,,
//! open,,,
//! deposit,1,,100.00
//! transfer,1,2,25.50
//! withdraw,2,,5
//! ```
//!
//! `open` creates the next account (ids start at 1). `transfer` moves funds
//! from `account` to `counterparty`.

use crate::types::{Account, AccountId};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: op, account, counterparty, amount.
/// Every column but `op` is optional because `open` carries none of them
/// and only `transfer` uses `counterparty`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    pub account: Option<AccountId>,
    pub counterparty: Option<AccountId>,
    pub amount: Option<String>,
}

/// One request to the ledger facade
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LedgerCommand {
    /// Open the next account
    Open,

    Deposit {
        account: AccountId,
        amount: Decimal,
    },

    Withdraw {
        account: AccountId,
        amount: Decimal,
    },

    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Decimal,
    },
}

impl LedgerCommand {
    /// Lowercase operation name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::Open => "open",
            LedgerCommand::Deposit { .. } => "deposit",
            LedgerCommand::Withdraw { .. } => "withdraw",
            LedgerCommand::Transfer { .. } => "transfer",
        }
    }
}

/// Convert a CsvRecord to a LedgerCommand
///
/// This function:
/// - Parses the op string (case-insensitive, `withdrawal` accepted for `withdraw`)
/// - Parses the amount string into a Decimal (if present)
/// - Validates that the columns each op needs are present
///
/// Amount *values* are not checked here; zero, negative, or sub-cent amounts
/// reach the ledger and are rejected there like any other request.
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(LedgerCommand) - Successfully converted command
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<LedgerCommand, String> {
    let op = csv_record.op.trim().to_lowercase();

    let amount = match csv_record.amount {
        Some(amount_str) if !amount_str.trim().is_empty() => {
            match Decimal::from_str(amount_str.trim()) {
                Ok(decimal) => Some(decimal),
                Err(_) => return Err(format!("Invalid amount '{}' for {}", amount_str, op)),
            }
        }
        _ => None,
    };

    let require_account = || {
        csv_record
            .account
            .ok_or_else(|| format!("{} requires an account", op))
    };
    let require_amount = || amount.ok_or_else(|| format!("{} requires an amount", op));

    match op.as_str() {
        "open" => Ok(LedgerCommand::Open),
        "deposit" => Ok(LedgerCommand::Deposit {
            account: require_account()?,
            amount: require_amount()?,
        }),
        "withdraw" | "withdrawal" => Ok(LedgerCommand::Withdraw {
            account: require_account()?,
            amount: require_amount()?,
        }),
        "transfer" => Ok(LedgerCommand::Transfer {
            from: require_account()?,
            to: csv_record
                .counterparty
                .ok_or_else(|| "transfer requires a counterparty".to_string())?,
            amount: require_amount()?,
        }),
        _ => Err(format!("Invalid operation: '{}'", csv_record.op)),
    }
}

/// Write balances to CSV format
///
/// Writes accounts in CSV format with columns: account, balance.
/// Accounts are sorted by id for deterministic output.
///
/// # Arguments
///
/// * `accounts` - Slice of account balances to write
/// * `output` - Mutable reference to a writer for outputting CSV
///
/// # Returns
///
/// * `Ok(())` if writing succeeded
/// * `Err(String)` if a write error occurred
pub fn write_balances_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by_key(|account| account.id);

    for account in sorted_accounts {
        writer
            .write_record(&[account.id.to_string(), format!("{:.2}", account.balance)])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
