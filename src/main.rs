//! Ledger engine CLI
//!
//! Replays deposits, withdrawals, and transfers from a CSV file through the
//! ledger core and prints the resulting balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > balances.csv
//! cargo run -- --strategy async --batch-size 500 --max-concurrent 8 commands.csv
//! cargo run -- --store sqlite --database ledger.db commands.csv
//! cargo run -- --store sqlite --database ledger.db --as-of 2024-06-01T00:00:00Z empty.csv
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, store failure, bad `--as-of`, etc.)

use rust_ledger_engine::{cli, logging, strategy};
use std::process;

fn main() {
    let args = cli::parse_args();
    logging::init(&args.log_level);

    let strategy = {
        let config = if matches!(args.strategy, cli::StrategyType::Async) {
            Some(args.to_batch_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy.clone(), config, args.to_replay_config())
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
