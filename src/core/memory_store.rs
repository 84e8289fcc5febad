//! Thread-safe in-memory ledger store
//!
//! This module provides the `MemoryStore` struct, which keeps balances and the
//! transaction log in process memory using concurrent data structures.
//!
//! # Design
//!
//! Accounts live in a `DashMap` of cells, and each cell sits behind its own
//! `Mutex`. An atomic unit clones the `Arc`s of the cells it needs out of the
//! map (so no shard lock is held while waiting) and then locks them in
//! ascending id order. Two transfers touching the same pair of accounts in
//! opposite directions therefore always queue on the same first lock.
//!
//! Every cell keeps the records that touch it, in commit order. Record ids and
//! timestamps are assigned from a shared cursor while the unit still holds its
//! cell locks, so per-account history, ids, and timestamps all agree.
//!
//! # Thread Safety
//!
//! - Units on disjoint accounts run in parallel
//! - Units on overlapping accounts are serialized by the cell locks
//! - Single-account reads lock one cell briefly and never see a half-applied unit
//! - `list_balances` takes the commit gate exclusively, which waits until no
//!   unit is between its first and last write
//! - While `list_balances` copies the balances, new units wait on the gate.
//!   This is the one read that blocks writers, for one pass over the
//!   account cells
//!
//! ```text
//! MemoryStore
//!     ├── DashMap<AccountId, Arc<Mutex<AccountCell>>>  (per-account state)
//!     ├── Mutex<LogCursor>                             (record id + timestamp)
//!     ├── RwLock<()>                                   (commit gate)
//!     └── Arc<dyn Clock>                               (timestamp source)
//! ```

use super::clock::{Clock, SystemClock};
use super::traits::{lock_order, AccountHistory, BalanceSheet, LedgerStore};
use crate::types::{Account, AccountId, NewRecord, RecordId, StoreError, TransactionRecord};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// State of one account: its balance and every record touching it
#[derive(Debug, Default)]
struct AccountCell {
    balance: Decimal,
    records: Vec<TransactionRecord>,
}

/// Next record id and the last timestamp handed out
#[derive(Debug)]
struct LogCursor {
    next_id: RecordId,
    last_created_at: Option<DateTime<Utc>>,
}

/// In-memory implementation of [`LedgerStore`]
///
/// Durability is whatever the process gives you: state is lost on exit.
/// Cheap to share behind an `Arc` across threads.
#[derive(Debug)]
pub struct MemoryStore {
    /// Account cells keyed by id
    ///
    /// DashMap provides fine-grained locking through internal sharding; the
    /// per-cell mutex is what a unit actually holds while it runs.
    accounts: DashMap<AccountId, Arc<Mutex<AccountCell>>>,

    /// Last account id handed out
    last_account_id: AtomicI64,

    log: Mutex<LogCursor>,

    /// Shared by units while they write, exclusive for multi-account snapshots
    commit_gate: RwLock<()>,

    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store stamped by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamped by the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: DashMap::new(),
            last_account_id: AtomicI64::new(0),
            log: Mutex::new(LogCursor {
                next_id: 1,
                last_created_at: None,
            }),
            commit_gate: RwLock::new(()),
            clock,
        }
    }

    /// Clone the cell handle out of the map without holding the shard lock
    fn cell(&self, account: AccountId) -> Result<Arc<Mutex<AccountCell>>, StoreError> {
        self.accounts
            .get(&account)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| StoreError::account_not_found(account))
    }

    /// Assign the next id and a timestamp that never goes backwards
    fn stamp(&self, record: NewRecord) -> Result<TransactionRecord, StoreError> {
        let mut cursor = self.log.lock().map_err(poisoned)?;
        let now = self.clock.now();
        let created_at = match cursor.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        let id = cursor.next_id;
        cursor.next_id += 1;
        cursor.last_created_at = Some(created_at);
        Ok(record.into_record(id, created_at))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryStore {
    fn create_account(&self) -> Result<Account, StoreError> {
        let id = self.last_account_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.accounts
            .insert(id, Arc::new(Mutex::new(AccountCell::default())));
        Ok(Account::new(id))
    }

    fn get_balance(&self, account: AccountId) -> Result<Decimal, StoreError> {
        let cell = self.cell(account)?;
        let balance = cell.lock().map_err(poisoned)?.balance;
        Ok(balance)
    }

    fn list_balances(&self) -> Result<Vec<Account>, StoreError> {
        let _gate = self.commit_gate.write().map_err(poisoned)?;

        let mut cells: Vec<(AccountId, Arc<Mutex<AccountCell>>)> = self
            .accounts
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        cells.sort_by_key(|(id, _)| *id);

        cells
            .into_iter()
            .map(|(id, cell)| {
                let balance = cell.lock().map_err(poisoned)?.balance;
                Ok(Account { id, balance })
            })
            .collect()
    }

    fn atomic_update<F, E>(&self, accounts: &[AccountId], f: F) -> Result<TransactionRecord, E>
    where
        F: FnOnce(&mut BalanceSheet) -> Result<NewRecord, E>,
        E: From<StoreError>,
    {
        let ids = lock_order(accounts);

        // Gate before cell locks; list_balances takes them in the same order
        let _gate = self.commit_gate.read().map_err(poisoned)?;

        let cells = ids
            .iter()
            .map(|id| self.cell(*id))
            .collect::<Result<Vec<_>, StoreError>>()?;
        let mut guards: Vec<MutexGuard<'_, AccountCell>> = Vec::with_capacity(cells.len());
        for cell in &cells {
            guards.push(cell.lock().map_err(poisoned)?);
        }

        let mut sheet = BalanceSheet::new(
            ids.iter()
                .zip(guards.iter())
                .map(|(id, guard)| (*id, guard.balance)),
        );
        let new_record = f(&mut sheet)?;
        let record = self.stamp(new_record)?;

        for (account, balance) in sheet.changes() {
            if let Some(position) = ids.iter().position(|id| *id == account) {
                guards[position].balance = balance;
            }
        }
        for (id, guard) in ids.iter().zip(guards.iter_mut()) {
            if record.touches(*id) {
                guard.records.push(record.clone());
            }
        }

        Ok(record)
    }

    fn list_records_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let cell = self.cell(account)?;
        let records = cell.lock().map_err(poisoned)?.records.clone();
        Ok(records)
    }

    fn account_history(
        &self,
        account: AccountId,
        after: DateTime<Utc>,
    ) -> Result<AccountHistory, StoreError> {
        let cell = self.cell(account)?;
        let cell = cell.lock().map_err(poisoned)?;
        let records = cell
            .records
            .iter()
            .filter(|record| record.created_at > after)
            .cloned()
            .collect();
        Ok(AccountHistory {
            balance: cell.balance,
            records,
        })
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::backend("ledger lock poisoned by a panicked writer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::types::TransactionKind;
    use chrono::{Duration, TimeZone};
    use std::sync::Barrier;
    use std::thread;

    fn deposit(store: &MemoryStore, account: AccountId, cents: i64) -> TransactionRecord {
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
    fn test_create_account_assigns_increasing_ids() {
        let store = MemoryStore::new();

        let first = store.create_account().unwrap();
        let second = store.create_account().unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.get_balance(1).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_get_balance_missing_account() {
        let store = MemoryStore::new();

        assert_eq!(
            store.get_balance(9),
            Err(StoreError::AccountNotFound { account: 9 })
        );
    }

    #[test]
    fn test_atomic_update_writes_balance_and_record() {
        let store = MemoryStore::new();
        store.create_account().unwrap();

        let record = deposit(&store, 1, 1050);

        assert_eq!(record.id, 1);
        assert_eq!(record.kind, TransactionKind::Deposit);
        assert_eq!(store.get_balance(1).unwrap(), Decimal::new(1050, 2));
        assert_eq!(store.list_records_for_account(1).unwrap(), vec![record]);
    }

    #[test]
    fn test_atomic_update_failure_leaves_no_trace() {
        let store = MemoryStore::new();
        store.create_account().unwrap();
        store.create_account().unwrap();
        deposit(&store, 1, 1000);

        let result = store.atomic_update(&[1, 2], |sheet| -> Result<NewRecord, StoreError> {
            sheet.set_balance(1, Decimal::ZERO)?;
            sheet.set_balance(2, Decimal::new(1000, 2))?;
            Err(StoreError::backend("abort"))
        });

        assert!(result.is_err());
        assert_eq!(store.get_balance(1).unwrap(), Decimal::new(1000, 2));
        assert_eq!(store.get_balance(2).unwrap(), Decimal::ZERO);
        assert_eq!(store.list_records_for_account(1).unwrap().len(), 1);
        assert!(store.list_records_for_account(2).unwrap().is_empty());
    }

    #[test]
    fn test_atomic_update_missing_account_runs_nothing() {
        let store = MemoryStore::new();
        store.create_account().unwrap();

        let result = store.atomic_update(&[1, 5], |_sheet| -> Result<NewRecord, StoreError> {
            panic!("unit must not run when an account is missing")
        });

        assert_eq!(result, Err(StoreError::AccountNotFound { account: 5 }));
    }

    #[test]
    fn test_transfer_record_lands_in_both_histories() {
        let store = MemoryStore::new();
        store.create_account().unwrap();
        store.create_account().unwrap();
        deposit(&store, 1, 500);

        let record = store
            .atomic_update(&[2, 1], |sheet| -> Result<NewRecord, StoreError> {
                sheet.set_balance(1, Decimal::ZERO)?;
                sheet.set_balance(2, Decimal::new(500, 2))?;
                Ok(NewRecord::transfer(1, 2, Decimal::new(500, 2)))
            })
            .unwrap();

        assert_eq!(store.list_records_for_account(1).unwrap().last(), Some(&record));
        assert_eq!(store.list_records_for_account(2).unwrap(), vec![record]);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = MemoryStore::with_clock(clock.clone());
        store.create_account().unwrap();

        let first = deposit(&store, 1, 100);
        clock.set(start - Duration::hours(1));
        let second = deposit(&store, 1, 100);

        assert_eq!(first.created_at, start);
        assert_eq!(second.created_at, start);
        assert!(second.id > first.id);
    }

    #[test]
    fn test_account_history_returns_suffix() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = MemoryStore::with_clock(clock.clone());
        store.create_account().unwrap();

        deposit(&store, 1, 100);
        let cutoff = clock.advance(Duration::seconds(1));
        clock.advance(Duration::seconds(1));
        let later = deposit(&store, 1, 200);

        let history = store.account_history(1, cutoff).unwrap();
        assert_eq!(history.balance, Decimal::new(300, 2));
        assert_eq!(history.records, vec![later]);
    }

    #[test]
    fn test_list_balances_sorted_by_id() {
        let store = MemoryStore::new();
        for _ in 0..5 {
            store.create_account().unwrap();
        }
        deposit(&store, 3, 700);

        let ids: Vec<AccountId> = store
            .list_balances()
            .unwrap()
            .iter()
            .map(|account| account.id)
            .collect();

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    // Concurrent access tests
    #[test]
    fn test_concurrent_updates_same_account() {
        let store = Arc::new(MemoryStore::new());
        store.create_account().unwrap();
        let barrier = Arc::new(Barrier::new(50));
        let mut handles = vec![];

        for _ in 0..50 {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                deposit(&store, 1, 1);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_balance(1).unwrap(), Decimal::new(50, 2));
        assert_eq!(store.list_records_for_account(1).unwrap().len(), 50);
    }

    #[test]
    fn test_opposite_direction_units_do_not_deadlock() {
        let store = Arc::new(MemoryStore::new());
        store.create_account().unwrap();
        store.create_account().unwrap();
        let mut handles = vec![];

        for i in 0..40 {
            let store = Arc::clone(&store);
            let (from, to) = if i % 2 == 0 { (1, 2) } else { (2, 1) };
            handles.push(thread::spawn(move || {
                store
                    .atomic_update(&[from, to], |sheet| -> Result<NewRecord, StoreError> {
                        let balance = sheet.balance(to)?;
                        sheet.set_balance(to, balance + Decimal::ONE)?;
                        Ok(NewRecord::deposit(to, Decimal::ONE))
                    })
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let total: Decimal = store
            .list_balances()
            .unwrap()
            .iter()
            .map(|account| account.balance)
            .sum();
        assert_eq!(total, Decimal::from(40));
    }
}
