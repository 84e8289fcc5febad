//! Replay strategy module
//!
//! This module defines the Strategy pattern for complete CSV replay pipelines,
//! encompassing CSV parsing, applying commands through the ledger facade, and
//! writing the resulting balances. Different implementations (sequential,
//! concurrent batches) can be selected at runtime.

use crate::cli::StrategyType;
use crate::core::{parse_timestamp, Ledger, LedgerStore};
use crate::io::csv_format::{write_balances_csv, LedgerCommand};
use crate::types::{Account, LedgerError};
use std::io::Write;
use std::path::{Path, PathBuf};

pub mod r#async;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use sync::SyncProcessingStrategy;

/// Replay strategy trait for complete processing pipelines
///
/// Each strategy reads ledger commands from a CSV file, applies them through
/// a [`Ledger`], and writes the final balances to output.
pub trait ProcessingStrategy: Send + Sync {
    /// Replay commands from `input_path` and write balances to `output`
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the replay completed (rejected commands are logged and skipped)
    /// * `Err(String)` if a fatal error occurred
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - The store cannot be opened or fails internally while listing balances
    /// - The `as_of` timestamp is not RFC3339
    /// - Output cannot be written
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Which store backs a replay
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StoreConfig {
    /// Fresh in-memory store, discarded at exit
    #[default]
    Memory,

    /// SQLite database file, created if missing
    Sqlite { path: PathBuf },
}

/// Settings shared by every strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayConfig {
    pub store: StoreConfig,

    /// Report balances as of this RFC3339 instant instead of current balances
    pub as_of: Option<String>,
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `batch_config` - Optional configuration for async batch processing (ignored for sync)
/// * `replay` - Store and output settings
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    batch_config: Option<BatchConfig>,
    replay: ReplayConfig,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy::new(replay)),
        StrategyType::Async => {
            let config = batch_config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config, replay))
        }
    }
}

/// Validate the `as_of` timestamp before any command is applied
pub(crate) fn check_as_of(replay: &ReplayConfig) -> Result<(), String> {
    match &replay.as_of {
        Some(timestamp) => parse_timestamp(timestamp)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        None => Ok(()),
    }
}

/// Apply one command through the facade
///
/// Rejections are already logged by the facade; callers only count them.
pub(crate) fn apply_command<S: LedgerStore>(
    ledger: &Ledger<S>,
    command: LedgerCommand,
) -> Result<(), LedgerError> {
    tracing::trace!(command = command.name(), "applying command");
    match command {
        LedgerCommand::Open => ledger.create_account().map(|_| ()),
        LedgerCommand::Deposit { account, amount } => ledger.deposit(account, amount).map(|_| ()),
        LedgerCommand::Withdraw { account, amount } => {
            ledger.withdraw(account, amount).map(|_| ())
        }
        LedgerCommand::Transfer { from, to, amount } => {
            ledger.transfer(from, to, amount).map(|_| ())
        }
    }
}

/// Write current balances, or balances as of `replay.as_of`
pub(crate) fn write_output<S: LedgerStore>(
    ledger: &Ledger<S>,
    replay: &ReplayConfig,
    output: &mut dyn Write,
) -> Result<(), String> {
    let accounts = ledger.list_balances().map_err(|e| e.to_string())?;

    let accounts = match &replay.as_of {
        Some(timestamp) => accounts
            .into_iter()
            .map(|account| {
                ledger
                    .balance_as_of(account.id, timestamp)
                    .map(|at| Account {
                        id: at.account,
                        balance: at.balance,
                    })
                    .map_err(|e| e.to_string())
            })
            .collect::<Result<Vec<_>, String>>()?,
        None => accounts,
    };

    write_balances_csv(&accounts, output)
}
