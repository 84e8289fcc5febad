//! SQLite-backed ledger store
//!
//! Persists accounts and the transaction log in two tables:
//!
//! ```text
//! accounts(id, balance)
//! transactions(id, from_account NULLABLE, to_account, amount, kind, created_at)
//! ```
//!
//! Balances and amounts are stored as integer cents, timestamps as integer
//! microseconds since the Unix epoch. `(to_account, created_at)` and
//! `(from_account, created_at)` are indexed so history reconstruction only
//! scans the suffix it needs.
//!
//! The connection sits behind a `Mutex` and every atomic unit runs as a
//! `BEGIN IMMEDIATE` transaction, so units are serialized by the store. A
//! failed unit rolls back when its transaction is dropped.
//!
//! # Thread Safety
//!
//! - Units and reads share the single connection, one at a time
//! - A read waits for the unit in progress, and a unit waits for the read in
//!   progress, so reads do block writers for the length of their queries
//! - Every read sees only committed state, since units hold the connection
//!   from `BEGIN` to `COMMIT`

use super::clock::{Clock, SystemClock};
use super::traits::{lock_order, AccountHistory, BalanceSheet, LedgerStore};
use crate::types::money::{from_cents, to_cents};
use crate::types::{Account, AccountId, NewRecord, StoreError, TransactionKind, TransactionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0)
    );

    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_account INTEGER REFERENCES accounts(id),
        to_account INTEGER NOT NULL REFERENCES accounts(id),
        amount INTEGER NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('deposit', 'transfer', 'withdrawal')),
        created_at INTEGER NOT NULL,
        CHECK (
            (kind = 'deposit' AND from_account IS NULL AND amount > 0) OR
            (kind = 'withdrawal' AND from_account IS NULL AND amount < 0) OR
            (kind = 'transfer' AND from_account IS NOT NULL AND amount > 0)
        )
    );

    CREATE INDEX IF NOT EXISTS idx_transactions_to_created
        ON transactions(to_account, created_at);
    CREATE INDEX IF NOT EXISTS idx_transactions_from_created
        ON transactions(from_account, created_at);
";

// `created_at` never decreases as `id` grows, so the newest row by rowid
// carries the latest timestamp.
const LATEST_CREATED_AT: &str = "SELECT created_at FROM transactions ORDER BY id DESC LIMIT 1";

const SELECT_RECORDS: &str = "
    SELECT id, from_account, to_account, amount, kind, created_at
    FROM transactions
    WHERE (to_account = ?1 OR from_account = ?1) AND created_at > ?2
    ORDER BY created_at, id";

/// SQLite implementation of [`LedgerStore`]
#[derive(Debug)]
pub struct SqliteStore {
    connection: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open (or create) a ledger database file and bootstrap its schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Replace the timestamp source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch(SCHEMA)?;
        tracing::debug!("ledger schema ready");

        Ok(Self {
            connection: Mutex::new(connection),
            clock: Arc::new(SystemClock),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::backend("database connection lock poisoned"))
    }

    /// Commit timestamp for a new record, never earlier than the latest one
    fn next_timestamp(&self, connection: &Connection) -> Result<i64, StoreError> {
        let now = self.clock.now().timestamp_micros();
        let latest: Option<i64> = connection
            .query_row(LATEST_CREATED_AT, [], |row| row.get(0))
            .optional()?;
        Ok(latest.map_or(now, |latest| latest.max(now)))
    }
}

fn read_balance(connection: &Connection, account: AccountId) -> Result<Decimal, StoreError> {
    let cents: Option<i64> = connection
        .query_row(
            "SELECT balance FROM accounts WHERE id = ?1",
            [account],
            |row| row.get(0),
        )
        .optional()?;
    cents
        .map(from_cents)
        .ok_or_else(|| StoreError::account_not_found(account))
}

fn read_records(
    connection: &Connection,
    account: AccountId,
    after_micros: i64,
) -> Result<Vec<TransactionRecord>, StoreError> {
    let mut statement = connection.prepare(SELECT_RECORDS)?;
    let rows = statement.query_map((account, after_micros), RawRecord::from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.decode()?);
    }
    Ok(records)
}

fn cents(amount: Decimal) -> Result<i64, StoreError> {
    to_cents(amount).ok_or_else(|| StoreError::backend(format!("amount {} out of range", amount)))
}

/// A `transactions` row before kind and timestamp decoding
struct RawRecord {
    id: i64,
    from_account: Option<AccountId>,
    to_account: AccountId,
    amount: i64,
    kind: String,
    created_at: i64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            from_account: row.get(1)?,
            to_account: row.get(2)?,
            amount: row.get(3)?,
            kind: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<TransactionRecord, StoreError> {
        let kind: TransactionKind = self.kind.parse().map_err(StoreError::corrupt)?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(self.created_at).ok_or_else(|| {
            StoreError::corrupt(format!(
                "record {} has an invalid timestamp {}",
                self.id, self.created_at
            ))
        })?;
        Ok(TransactionRecord {
            id: self.id,
            from_account: self.from_account,
            to_account: self.to_account,
            amount: from_cents(self.amount),
            kind,
            created_at,
        })
    }
}

impl LedgerStore for SqliteStore {
    fn create_account(&self) -> Result<Account, StoreError> {
        let connection = self.lock()?;
        let id: AccountId = connection.query_row(
            "INSERT INTO accounts (balance) VALUES (0) RETURNING id",
            [],
            |row| row.get(0),
        )?;
        Ok(Account::new(id))
    }

    fn get_balance(&self, account: AccountId) -> Result<Decimal, StoreError> {
        let connection = self.lock()?;
        read_balance(&connection, account)
    }

    fn list_balances(&self) -> Result<Vec<Account>, StoreError> {
        let connection = self.lock()?;
        let mut statement = connection.prepare("SELECT id, balance FROM accounts ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                balance: from_cents(row.get(1)?),
            })
        })?;

        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?);
        }
        Ok(accounts)
    }

    fn atomic_update<F, E>(&self, accounts: &[AccountId], f: F) -> Result<TransactionRecord, E>
    where
        F: FnOnce(&mut BalanceSheet) -> Result<NewRecord, E>,
        E: From<StoreError>,
    {
        let ids = lock_order(accounts);
        let mut connection = self.lock()?;
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let mut balances = Vec::with_capacity(ids.len());
        for id in &ids {
            balances.push((*id, read_balance(&transaction, *id)?));
        }
        let mut sheet = BalanceSheet::new(balances);
        let new_record = f(&mut sheet)?;

        for (account, balance) in sheet.changes() {
            transaction
                .execute(
                    "UPDATE accounts SET balance = ?1 WHERE id = ?2",
                    (cents(balance)?, account),
                )
                .map_err(StoreError::from)?;
        }

        let created_at = self.next_timestamp(&transaction)?;
        let id: i64 = transaction
            .query_row(
                "INSERT INTO transactions (from_account, to_account, amount, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 RETURNING id",
                (
                    new_record.from_account,
                    new_record.to_account,
                    cents(new_record.amount)?,
                    new_record.kind.as_str(),
                    created_at,
                ),
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        transaction.commit().map_err(StoreError::from)?;

        let created_at = DateTime::<Utc>::from_timestamp_micros(created_at).ok_or_else(|| {
            StoreError::corrupt(format!("invalid commit timestamp {}", created_at))
        })?;
        Ok(new_record.into_record(id, created_at))
    }

    fn list_records_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut connection = self.lock()?;
        let transaction = connection.transaction()?;
        read_balance(&transaction, account)?;
        read_records(&transaction, account, i64::MIN)
    }

    fn account_history(
        &self,
        account: AccountId,
        after: DateTime<Utc>,
    ) -> Result<AccountHistory, StoreError> {
        let mut connection = self.lock()?;
        let transaction = connection.transaction()?;
        let balance = read_balance(&transaction, account)?;
        let records = read_records(&transaction, account, after.timestamp_micros())?;
        Ok(AccountHistory { balance, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use rusqlite::StatementStatus;
    use tempfile::NamedTempFile;

    fn deposit(store: &SqliteStore, account: AccountId, cents: i64) -> TransactionRecord {
        let amount = Decimal::new(cents, 2);
        store
            .atomic_update(&[account], |sheet| -> Result<NewRecord, StoreError> {
                let balance = sheet.balance(account)?;
                sheet.set_balance(account, balance + amount)?;
                Ok(NewRecord::deposit(account, amount))
            })
            .unwrap()
    }

    #[test]
    fn test_create_account_starts_at_one() {
        let store = SqliteStore::open_in_memory().unwrap();

        let account = store.create_account().unwrap();

        assert_eq!(account.id, 1);
        assert_eq!(store.get_balance(1).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_get_balance_missing_account() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(
            store.get_balance(3),
            Err(StoreError::AccountNotFound { account: 3 })
        );
    }

    #[test]
    fn test_withdrawal_record_round_trips_signed_amount() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_account().unwrap();
        deposit(&store, 1, 1000);

        let withdrawal = store
            .atomic_update(&[1], |sheet| -> Result<NewRecord, StoreError> {
                sheet.set_balance(1, Decimal::new(400, 2))?;
                Ok(NewRecord::withdrawal(1, Decimal::new(600, 2)))
            })
            .unwrap();

        let records = store.list_records_for_account(1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], withdrawal);
        assert_eq!(records[1].amount, Decimal::new(-600, 2));
        assert_eq!(store.get_balance(1).unwrap(), Decimal::new(400, 2));
    }

    #[test]
    fn test_failed_unit_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_account().unwrap();
        deposit(&store, 1, 500);

        let result = store.atomic_update(&[1], |sheet| -> Result<NewRecord, StoreError> {
            sheet.set_balance(1, Decimal::ZERO)?;
            Err(StoreError::backend("abort"))
        });

        assert!(result.is_err());
        assert_eq!(store.get_balance(1).unwrap(), Decimal::new(500, 2));
        assert_eq!(store.list_records_for_account(1).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_account_in_unit() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_account().unwrap();

        let result = store.atomic_update(&[1, 2], |_sheet| -> Result<NewRecord, StoreError> {
            panic!("unit must not run when an account is missing")
        });

        assert_eq!(result, Err(StoreError::AccountNotFound { account: 2 }));
    }

    #[test]
    fn test_account_history_suffix_and_ordering() {
        let start = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = SqliteStore::open_in_memory()
            .unwrap()
            .with_clock(clock.clone());
        store.create_account().unwrap();

        deposit(&store, 1, 100);
        let cutoff = clock.advance(Duration::minutes(1));
        clock.advance(Duration::minutes(1));
        let second = deposit(&store, 1, 200);
        let third = deposit(&store, 1, 300);

        let history = store.account_history(1, cutoff).unwrap();
        assert_eq!(history.balance, Decimal::new(600, 2));
        assert_eq!(history.records, vec![second, third]);
    }

    #[test]
    fn test_state_survives_reopen() {
        let file = NamedTempFile::new().unwrap();
        {
            let store = SqliteStore::open(file.path()).unwrap();
            store.create_account().unwrap();
            deposit(&store, 1, 4200);
        }

        let reopened = SqliteStore::open(file.path()).unwrap();

        assert_eq!(reopened.get_balance(1).unwrap(), Decimal::new(4200, 2));
        assert_eq!(reopened.list_records_for_account(1).unwrap().len(), 1);
        assert_eq!(reopened.create_account().unwrap().id, 2);
    }

    #[test]
    fn test_schema_rejects_negative_balance() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_account().unwrap();
        let connection = store.lock().unwrap();

        let result = connection.execute("UPDATE accounts SET balance = -1 WHERE id = 1", []);

        assert!(result.is_err());
    }

    /// VM steps spent looking up the latest commit timestamp
    fn latest_timestamp_steps(store: &SqliteStore) -> i32 {
        let connection = store.lock().unwrap();
        let mut statement = connection.prepare(LATEST_CREATED_AT).unwrap();
        let _: Option<i64> = statement
            .query_row([], |row| row.get(0))
            .optional()
            .unwrap();
        statement.get_status(StatementStatus::VmStep)
    }

    #[test]
    fn test_latest_timestamp_lookup_does_not_scan_log() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_account().unwrap();
        deposit(&store, 1, 100);
        let small_log = latest_timestamp_steps(&store);

        for _ in 0..2_000 {
            deposit(&store, 1, 100);
        }
        let large_log = latest_timestamp_steps(&store);

        assert_eq!(small_log, large_log);
        assert_eq!(store.get_balance(1).unwrap(), Decimal::new(200_100, 2));
    }

    #[test]
    fn test_commit_timestamps_never_go_backwards() {
        let start = Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = SqliteStore::open_in_memory()
            .unwrap()
            .with_clock(clock.clone());
        store.create_account().unwrap();

        let first = deposit(&store, 1, 100);
        clock.set(start - Duration::hours(1));
        let second = deposit(&store, 1, 100);

        assert_eq!(second.created_at, first.created_at);
        assert!(second.id > first.id);
    }
}
