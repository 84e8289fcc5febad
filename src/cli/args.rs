use crate::strategy::{BatchConfig, ReplayConfig, StoreConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Replay ledger commands and report account balances
#[derive(Parser, Debug)]
#[command(name = "ledger-engine")]
#[command(about = "Replay ledger commands from CSV and report account balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Replay strategy
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "sync",
        help = "Replay strategy: 'sync' applies rows in order, 'async' applies each batch concurrently"
    )]
    pub strategy: StrategyType,

    /// Store backing the ledger
    #[arg(
        long = "store",
        value_name = "STORE",
        default_value = "memory",
        help = "Ledger store: 'memory' or 'sqlite'"
    )]
    pub store: StoreType,

    /// SQLite database path (sqlite store only)
    #[arg(
        long = "database",
        value_name = "PATH",
        default_value = "ledger.db",
        help = "SQLite database file, created if missing"
    )]
    pub database: PathBuf,

    /// Number of rows per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of rows per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of concurrent requests (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of requests running at once (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    /// Report balances as of an RFC3339 instant
    #[arg(
        long = "as-of",
        value_name = "TIMESTAMP",
        help = "Report balances as of this RFC3339 timestamp instead of current balances"
    )]
    pub as_of: Option<String>,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// Available replay strategies
#[derive(Clone, Debug, PartialEq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

/// Available ledger stores
#[derive(Clone, Debug, PartialEq, ValueEnum)]
pub enum StoreType {
    Memory,
    Sqlite,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values use the defaults; zero values fall back to the
    /// defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent.unwrap_or(default.max_concurrent),
            )
        } else {
            BatchConfig::default()
        }
    }

    /// Create the store and output settings from CLI arguments
    pub fn to_replay_config(&self) -> ReplayConfig {
        let store = match self.store {
            StoreType::Memory => StoreConfig::Memory,
            StoreType::Sqlite => StoreConfig::Sqlite {
                path: self.database.clone(),
            },
        };

        ReplayConfig {
            store,
            as_of: self.as_of.clone(),
        }
    }
}
