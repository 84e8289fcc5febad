//! Asynchronous batch processing strategy
//!
//! This module provides a concurrent implementation of the ProcessingStrategy
//! trait. Rows are read in batches and each batch is replayed as a burst of
//! independent requests against a shared ledger, the way an HTTP front end
//! would issue them.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── BatchConfig (batch_size, max_concurrent)
//!     ├── AsyncReader (batch CSV reading)
//!     └── Ledger (cloned into every blocking task)
//!         └── MemoryStore | SqliteStore
//! ```
//!
//! # Ordering
//!
//! - Batches are processed sequentially; a batch finishes before the next is read
//! - `open` rows run first and in file order, so account ids stay deterministic
//! - Every other row of the batch runs concurrently on the blocking pool,
//!   at most `max_concurrent` at a time
//!
//! Rows of one batch therefore have no ordering guarantee among themselves.
//! A batch size of 1 gives the same result as the sync strategy.

use crate::core::{Ledger, LedgerStore, MemoryStore, SqliteStore};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::LedgerCommand;
use crate::strategy::{
    apply_command, check_as_of, write_output, ProcessingStrategy, ReplayConfig, StoreConfig,
};
use futures::future::join_all;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Configuration for batch processing
#[derive(Clone, Debug, PartialEq)]
pub struct BatchConfig {
    /// Number of rows per batch
    pub batch_size: usize,
    /// Maximum number of requests running at once (also the worker thread count)
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                default = default.batch_size,
                "invalid batch_size 0, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            tracing::warn!(
                default = default.max_concurrent,
                "invalid max_concurrent 0, using default"
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}

/// Asynchronous batch processing strategy
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
    replay: ReplayConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy
    ///
    /// # Arguments
    ///
    /// * `config` - BatchConfig with batch_size and max_concurrent
    /// * `replay` - Store and output settings
    pub fn new(config: BatchConfig, replay: ReplayConfig) -> Self {
        Self { config, replay }
    }

    fn run<S: LedgerStore + 'static>(
        &self,
        ledger: Ledger<S>,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), String> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent)
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", input_path.display(), e))?;

            // csv-async reads futures::io, tokio files need the compat layer
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);
            let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));

            let mut batches = 0usize;
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }
                batches += 1;
                self.process_batch(&ledger, &semaphore, batch).await?;
            }
            tracing::info!(batches, "replay finished");

            Ok::<(), String>(())
        })?;

        write_output(&ledger, &self.replay, output)
    }

    /// Apply one batch and wait for every request in it
    async fn process_batch<S: LedgerStore + 'static>(
        &self,
        ledger: &Ledger<S>,
        semaphore: &Arc<Semaphore>,
        batch: Vec<LedgerCommand>,
    ) -> Result<(), String> {
        let (opens, requests): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|command| matches!(command, LedgerCommand::Open));

        // One at a time in file order so account ids follow the input.
        // Failures are logged by the facade.
        for command in opens {
            let ledger = ledger.clone();
            let _ = tokio::task::spawn_blocking(move || apply_command(&ledger, command))
                .await
                .map_err(|e| format!("Open task failed: {}", e))?;
        }

        let mut handles = Vec::with_capacity(requests.len());
        for command in requests {
            let permit = Arc::clone(semaphore)
                .acquire_owned()
                .await
                .map_err(|e| format!("Request semaphore closed: {}", e))?;
            let ledger = ledger.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                apply_command(&ledger, command)
            }));
        }

        let results = join_all(handles).await;
        let rejected = results
            .into_iter()
            .map(|joined| joined.map_err(|e| format!("Request task failed: {}", e)))
            .collect::<Result<Vec<_>, String>>()?
            .into_iter()
            .filter(Result::is_err)
            .count();
        tracing::debug!(rejected, "batch applied");

        Ok(())
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Replay commands from input file and write balances to output
    ///
    /// 1. Validates the `as_of` timestamp, if any
    /// 2. Opens the configured store
    /// 3. Creates a tokio multi-threaded runtime
    /// 4. Reads rows in batches with `AsyncReader` and applies each batch
    ///    concurrently, waiting for it before reading the next
    /// 5. Writes balances using `csv_format::write_balances_csv`
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
