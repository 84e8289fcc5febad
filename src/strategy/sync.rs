//! Synchronous processing strategy
//!
//! This module provides a sequential implementation of the ProcessingStrategy
//! trait. Every row is applied through the ledger facade in file order, so
//! the result is fully deterministic.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Ledger rules to `Ledger` (facade over the balance engine)
//! - CSV output to `csv_format::write_balances_csv`

use crate::core::{Ledger, LedgerStore, MemoryStore, SqliteStore};
use crate::io::sync_reader::SyncReader;
use crate::strategy::{
    apply_command, check_as_of, write_output, ProcessingStrategy, ReplayConfig, StoreConfig,
};
use std::io::Write;
use std::path::Path;

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use rust_ledger_engine::strategy::{ProcessingStrategy, ReplayConfig, SyncProcessingStrategy};
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SyncProcessingStrategy::new(ReplayConfig::default());
/// let mut output = io::stdout();
///
/// strategy.process(Path::new("commands.csv"), &mut output)
///     .expect("Replay failed");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SyncProcessingStrategy {
    replay: ReplayConfig,
}

impl SyncProcessingStrategy {
    pub fn new(replay: ReplayConfig) -> Self {
        Self { replay }
    }

    fn run<S: LedgerStore>(
        &self,
        ledger: Ledger<S>,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), String> {
        let reader = SyncReader::new(input_path)?;

        let mut applied = 0usize;
        let mut rejected = 0usize;
        for result in reader {
            match result {
                Ok(command) => match apply_command(&ledger, command) {
                    Ok(()) => applied += 1,
                    Err(_) => rejected += 1,
                },
                Err(e) => tracing::warn!(error = %e, "skipping row"),
            }
        }
        tracing::info!(applied, rejected, "replay finished");

        write_output(&ledger, &self.replay, output)
    }
}

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Replay commands from input file and write balances to output
    ///
    /// 1. Validates the `as_of` timestamp, if any
    /// 2. Opens the configured store
    /// 3. Streams rows through `SyncReader` and applies each one in order
    /// 4. Writes balances using `csv_format::write_balances_csv`
    ///
    /// Individual row and command errors are logged and processing continues.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        check_as_of(&self.replay)?;

        match &self.replay.store {
            StoreConfig::Memory => self.run(Ledger::new(MemoryStore::new()), input_path, output),
            StoreConfig::Sqlite { path } => {
                let store = SqliteStore::open(path).map_err(|e| e.to_string())?;
                self.run(Ledger::new(store), input_path, output)
            }
        }
    }
}
