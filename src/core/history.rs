//! Point-in-time balance reconstruction
//!
//! The balance of an account at instant `T` is its current balance with the
//! effect of every record committed strictly after `T` undone. Records at
//! exactly `T` count as already applied.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::traits::LedgerStore;
use crate::types::money::to_scale;
use crate::types::{AccountId, EngineError, LedgerError, StoreError};

/// Read-only half of the ledger
#[derive(Debug)]
pub struct HistoryReconstructor<S> {
    store: Arc<S>,
}

impl<S> Clone for HistoryReconstructor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> HistoryReconstructor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Balance of `account` as of `at`
    ///
    /// An instant before the account's first record yields zero; an instant
    /// in the future yields the current balance.
    ///
    /// # Returns
    ///
    /// * `Ok(Decimal)` - The reconstructed balance, scaled to two places
    /// * `Err(EngineError::Rejected(AccountNotFound))` - If the account does not exist
    /// * `Err(EngineError::Store(Corrupt))` - If undoing the suffix goes negative
    pub fn balance_as_of(
        &self,
        account: AccountId,
        at: DateTime<Utc>,
    ) -> Result<Decimal, EngineError> {
        let history = self.store.account_history(account, at)?;

        let mut balance = history.balance;
        for record in &history.records {
            balance = balance
                .checked_sub(record.signed_effect(account))
                .ok_or_else(|| EngineError::arithmetic_overflow("balance_as_of", account))?;
        }

        if balance < Decimal::ZERO {
            return Err(StoreError::corrupt(format!(
                "history of account {} reconstructs to negative balance {} at {}",
                account,
                balance,
                at.to_rfc3339()
            ))
            .into());
        }

        tracing::trace!(
            account,
            undone = history.records.len(),
            %balance,
            "reconstructed balance"
        );
        Ok(to_scale(balance))
    }
}

/// Parse an RFC3339 timestamp into UTC
///
/// Surrounding whitespace is ignored; any offset is accepted and normalized.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| LedgerError::invalid_timestamp(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::engine::BalanceEngine;
    use crate::core::memory_store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;

    struct Fixture {
        clock: Arc<ManualClock>,
        engine: BalanceEngine<MemoryStore>,
        history: HistoryReconstructor<MemoryStore>,
        start: DateTime<Utc>,
    }

    fn fixture(accounts: usize) -> Fixture {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        for _ in 0..accounts {
            store.create_account().unwrap();
        }
        Fixture {
            clock,
            engine: BalanceEngine::new(Arc::clone(&store)),
            history: HistoryReconstructor::new(store),
            start,
        }
    }

    #[rstest]
    #[case::utc("2024-03-01T09:00:00Z")]
    #[case::offset("2024-03-01T10:00:00+01:00")]
    #[case::padded("  2024-03-01T09:00:00Z ")]
    fn test_parse_timestamp_accepts_rfc3339(#[case] input: &str) {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        assert_eq!(parse_timestamp(input), Ok(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::date_only("2024-03-01")]
    #[case::words("yesterday")]
    #[case::no_offset("2024-03-01T09:00:00")]
    fn test_parse_timestamp_rejects_garbage(#[case] input: &str) {
        assert_eq!(
            parse_timestamp(input),
            Err(LedgerError::InvalidTimestamp {
                value: input.to_string()
            })
        );
    }

    #[test]
    fn test_balance_before_first_record_is_zero() {
        let f = fixture(1);
        f.clock.advance(Duration::minutes(1));
        f.engine.deposit(1, Decimal::new(5000, 2)).unwrap();

        let balance = f.history.balance_as_of(1, f.start).unwrap();

        assert_eq!(balance, Decimal::ZERO);
    }

    #[test]
    fn test_balance_between_records() {
        let f = fixture(2);
        f.engine.deposit(1, Decimal::new(10000, 2)).unwrap();
        let t1 = f.clock.advance(Duration::minutes(1));
        f.engine.transfer(1, 2, Decimal::new(2500, 2)).unwrap();
        let t2 = f.clock.advance(Duration::minutes(1));
        f.engine.withdraw(1, Decimal::new(1000, 2)).unwrap();
        f.clock.advance(Duration::minutes(1));

        assert_eq!(f.history.balance_as_of(1, f.start).unwrap(), Decimal::new(10000, 2));
        assert_eq!(f.history.balance_as_of(1, t1).unwrap(), Decimal::new(7500, 2));
        assert_eq!(f.history.balance_as_of(1, t2).unwrap(), Decimal::new(6500, 2));
        assert_eq!(f.history.balance_as_of(2, t1).unwrap(), Decimal::new(2500, 2));
    }

    #[test]
    fn test_balance_counts_record_at_exact_instant() {
        let f = fixture(1);
        let at = f.clock.advance(Duration::seconds(5));
        f.engine.deposit(1, Decimal::new(700, 2)).unwrap();

        assert_eq!(f.history.balance_as_of(1, at).unwrap(), Decimal::new(700, 2));
        assert_eq!(
            f.history
                .balance_as_of(1, at - Duration::nanoseconds(1))
                .unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_balance_in_future_is_current() {
        let f = fixture(1);
        f.engine.deposit(1, Decimal::new(1234, 2)).unwrap();

        let later = f.start + Duration::days(365);

        assert_eq!(f.history.balance_as_of(1, later).unwrap(), Decimal::new(1234, 2));
    }

    #[test]
    fn test_self_transfer_does_not_shift_history() {
        let f = fixture(1);
        f.engine.deposit(1, Decimal::new(900, 2)).unwrap();
        let at = f.clock.advance(Duration::seconds(1));
        f.clock.advance(Duration::seconds(1));
        f.engine.transfer(1, 1, Decimal::new(400, 2)).unwrap();

        assert_eq!(f.history.balance_as_of(1, at).unwrap(), Decimal::new(900, 2));
    }

    #[test]
    fn test_balance_as_of_missing_account() {
        let f = fixture(0);

        assert_eq!(
            f.history.balance_as_of(3, f.start),
            Err(EngineError::Rejected(LedgerError::account_not_found(3)))
        );
    }

    #[test]
    fn test_balance_as_of_result_has_two_places() {
        let f = fixture(1);
        f.engine.deposit(1, Decimal::new(5, 0)).unwrap();

        let balance = f.history.balance_as_of(1, f.start + Duration::hours(1)).unwrap();

        assert_eq!(balance.scale(), 2);
        assert_eq!(balance.to_string(), "5.00");
    }
}
