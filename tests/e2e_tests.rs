//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Applies every row through the ledger
//! 3. Generates output CSV
//! 4. Compares actual output with expected.csv
//!
//! Fixtures are located in tests/fixtures/ and cover:
//! - Happy path scenarios
//! - Rejections (insufficient funds, missing accounts, invalid amounts)
//! - Self-transfers
//! - Malformed rows
//!
//! Order-sensitive fixtures run under the sync strategy and under the async
//! strategy with single-row batches. Order-insensitive fixtures also run with
//! the default async batch configuration.

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rust_ledger_engine::cli::StrategyType;
    use rust_ledger_engine::strategy::{create_strategy, BatchConfig, ReplayConfig, StoreConfig};
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::{NamedTempFile, TempDir};

    /// Replay `input_path` and return the CSV output
    fn replay(
        input_path: &Path,
        strategy_type: StrategyType,
        batch_config: Option<BatchConfig>,
        replay: ReplayConfig,
    ) -> String {
        let strategy = create_strategy(strategy_type, batch_config, replay);
        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        strategy
            .process(input_path, &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to replay {}: {}", input_path.display(), e));
        temp_output.flush().expect("Failed to flush temp file");

        fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e))
    }

    /// Run a fixture and compare the output with its expected.csv
    fn run_test_fixture(
        fixture_name: &str,
        strategy_type: StrategyType,
        batch_config: Option<BatchConfig>,
        store: StoreConfig,
    ) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );

        let actual_output = replay(
            Path::new(&input_path),
            strategy_type.clone(),
            batch_config,
            ReplayConfig { store, as_of: None },
        );
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, strategy_type, actual_output, expected_output
        );
    }

    fn ordered_batches(strategy: &StrategyType) -> Option<BatchConfig> {
        match strategy {
            StrategyType::Sync => None,
            StrategyType::Async => Some(BatchConfig::new(1, 4)),
        }
    }

    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("missing_accounts")]
    #[case("self_transfer")]
    #[case("precision_testing")]
    #[case("malformed_data")]
    #[case("concurrent_deposits")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        let batch_config = ordered_batches(&strategy);
        run_test_fixture(fixture, strategy, batch_config, StoreConfig::Memory);
    }

    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("self_transfer")]
    fn test_fixtures_sqlite(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = StoreConfig::Sqlite {
            path: dir.path().join("ledger.db"),
        };
        let batch_config = ordered_batches(&strategy);
        run_test_fixture(fixture, strategy, batch_config, store);
    }

    /// Deposits commute, so any interleaving inside a batch gives the same result
    #[rstest]
    #[case(StoreConfig::Memory)]
    #[case(StoreConfig::Sqlite { path: "ledger.db".into() })]
    fn test_concurrent_deposits_default_batches(#[case] store: StoreConfig) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = match store {
            StoreConfig::Sqlite { path } => StoreConfig::Sqlite {
                path: dir.path().join(path),
            },
            memory => memory,
        };

        run_test_fixture(
            "concurrent_deposits",
            StrategyType::Async,
            Some(BatchConfig::default()),
            store,
        );
    }

    #[rstest]
    #[case::before_everything("1970-01-01T00:00:00Z", "account,balance\n1,0.00\n2,0.00\n3,0.00\n")]
    #[case::far_future("9999-12-31T23:59:59Z", "account,balance\n1,74.75\n2,55.00\n3,20.25\n")]
    fn test_as_of_output(
        #[case] as_of: &str,
        #[case] expected: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] strategy: StrategyType,
    ) {
        let batch_config = ordered_batches(&strategy);
        let output = replay(
            Path::new("tests/fixtures/happy_path/input.csv"),
            strategy,
            batch_config,
            ReplayConfig {
                store: StoreConfig::Memory,
                as_of: Some(as_of.to_string()),
            },
        );

        assert_eq!(output, expected);
    }

    #[test]
    fn test_invalid_as_of_is_fatal() {
        let strategy = create_strategy(
            StrategyType::Sync,
            None,
            ReplayConfig {
                store: StoreConfig::Memory,
                as_of: Some("tomorrow".to_string()),
            },
        );
        let mut output = Vec::new();

        let result = strategy.process(
            Path::new("tests/fixtures/happy_path/input.csv"),
            &mut output,
        );

        assert!(result.unwrap_err().contains("Invalid timestamp 'tomorrow'"));
        assert!(output.is_empty());
    }
}
