//! Persistence seam for lot state.
//!
//! [`LotStore`] is what the engine talks to. [`TableStore`] implements it
//! on top of [`LotTables`], handing every change to a [`ChangeLog`] before
//! applying it. The in-memory store uses a log that records nothing.

use crate::model::{Lot, LotId, Occupancy, Transaction};
use crate::tables::{LotTables, TableChange};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use thiserror::Error;

/// Category of a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Io,
    Corruption,
    Unavailable,
    Other,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreErrorKind::Io => "io",
            StoreErrorKind::Corruption => "corruption",
            StoreErrorKind::Unavailable => "unavailable",
            StoreErrorKind::Other => "storage",
        };
        f.write_str(s)
    }
}

/// Failure reported by a store backend.
#[derive(Debug, Clone, Error)]
#[error("{kind} failure: {message}")]
pub struct StoreError {
    kind: StoreErrorKind,
    message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        self.kind
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, StoreErrorKind::Io | StoreErrorKind::Unavailable)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage operations the parking engine relies on.
///
/// Every mutating call is atomic: it either takes full effect or leaves the
/// store unchanged and returns an error.
pub trait LotStore: Send + Sync {
    /// Creates a lot with `total_spaces` free spaces and assigns the next id.
    fn create_lot(&self, total_spaces: u32, created_at: DateTime<Utc>) -> Result<Lot>;

    fn lot_exists(&self, lot_id: LotId) -> Result<bool>;

    fn lot(&self, lot_id: LotId) -> Result<Option<Lot>>;

    /// Marks the lowest-numbered eligible space occupied by `plate`.
    /// Returns `None` when no space is eligible.
    fn claim_space(
        &self,
        lot_id: LotId,
        plate: &str,
        entry_time: DateTime<Utc>,
    ) -> Result<Option<u32>>;

    /// Finds the lowest-numbered space currently held by `plate`.
    fn find_occupancy(&self, lot_id: LotId, plate: &str) -> Result<Option<Occupancy>>;

    /// Frees the space described by `transaction` and records the
    /// transaction, provided the occupancy it closes is still current.
    /// Returns `false` if it is not.
    fn close_occupancy(&self, transaction: &Transaction) -> Result<bool>;

    /// Sets the maintenance flag. Returns `false` if the space does not exist.
    fn set_maintenance(&self, lot_id: LotId, number: u32, in_maintenance: bool) -> Result<bool>;

    fn occupancies(&self, lot_id: LotId) -> Result<Vec<Occupancy>>;

    fn transactions(&self, lot_id: LotId) -> Result<Vec<Transaction>>;
}

/// Sink for table changes, called before each change is applied.
///
/// An error aborts the change.
pub trait ChangeLog: Send + Sync {
    fn record(&self, change: &TableChange) -> Result<()>;
}

/// Change log that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Volatile;

impl ChangeLog for Volatile {
    fn record(&self, _change: &TableChange) -> Result<()> {
        Ok(())
    }
}

/// Store backed by in-memory tables and a change log.
pub struct TableStore<L> {
    tables: RwLock<LotTables>,
    log: L,
}

/// Store that keeps everything in memory only.
pub type MemoryStore = TableStore<Volatile>;

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_parts(LotTables::new(), Volatile)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ChangeLog> TableStore<L> {
    /// Creates a store over existing tables, e.g. ones rebuilt from a log.
    pub fn from_parts(tables: LotTables, log: L) -> Self {
        Self {
            tables: RwLock::new(tables),
            log,
        }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn lot_count(&self) -> usize {
        self.tables.read().lot_count()
    }

    fn commit(&self, tables: &mut LotTables, change: &TableChange) -> Result<()> {
        self.log.record(change)?;
        tables
            .apply(change)
            .map_err(|e| StoreError::new(StoreErrorKind::Other, e.to_string()))
    }
}

impl<L: ChangeLog> LotStore for TableStore<L> {
    fn create_lot(&self, total_spaces: u32, created_at: DateTime<Utc>) -> Result<Lot> {
        let mut tables = self.tables.write();
        let lot_id = tables.next_lot_id();
        let change = tables
            .plan_create(total_spaces, created_at)
            .map_err(|e| StoreError::new(StoreErrorKind::Other, e.to_string()))?;
        self.commit(&mut tables, &change)?;

        tables
            .lot(lot_id)
            .ok_or_else(|| StoreError::new(StoreErrorKind::Other, "created lot vanished"))
    }

    fn lot_exists(&self, lot_id: LotId) -> Result<bool> {
        Ok(self.tables.read().contains(lot_id))
    }

    fn lot(&self, lot_id: LotId) -> Result<Option<Lot>> {
        Ok(self.tables.read().lot(lot_id))
    }

    fn claim_space(
        &self,
        lot_id: LotId,
        plate: &str,
        entry_time: DateTime<Utc>,
    ) -> Result<Option<u32>> {
        let mut tables = self.tables.write();
        let Some(change) = tables.plan_claim(lot_id, plate, entry_time) else {
            return Ok(None);
        };
        self.commit(&mut tables, &change)?;

        match change {
            TableChange::SpaceClaimed(occupancy) => Ok(Some(occupancy.space_number)),
            _ => Ok(None),
        }
    }

    fn find_occupancy(&self, lot_id: LotId, plate: &str) -> Result<Option<Occupancy>> {
        Ok(self.tables.read().find_occupancy(lot_id, plate))
    }

    fn close_occupancy(&self, transaction: &Transaction) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(change) = tables.plan_release(transaction) else {
            return Ok(false);
        };
        self.commit(&mut tables, &change)?;
        Ok(true)
    }

    fn set_maintenance(&self, lot_id: LotId, number: u32, in_maintenance: bool) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(change) = tables.plan_maintenance(lot_id, number, in_maintenance) else {
            return Ok(false);
        };
        self.commit(&mut tables, &change)?;
        Ok(true)
    }

    fn occupancies(&self, lot_id: LotId) -> Result<Vec<Occupancy>> {
        Ok(self.tables.read().occupancies(lot_id))
    }

    fn transactions(&self, lot_id: LotId) -> Result<Vec<Transaction>> {
        Ok(self.tables.read().transactions(lot_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap()
    }

    #[derive(Default)]
    struct RecordingLog {
        changes: Mutex<Vec<TableChange>>,
        fail: AtomicBool,
    }

    impl ChangeLog for RecordingLog {
        fn record(&self, change: &TableChange) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::new(StoreErrorKind::Io, "log offline"));
            }
            self.changes.lock().push(change.clone());
            Ok(())
        }
    }

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryStore::new();
        let lot = store.create_lot(2, t0()).unwrap();
        assert_eq!(lot.id, LotId(1));
        assert!(store.lot_exists(LotId(1)).unwrap());
        assert!(!store.lot_exists(LotId(2)).unwrap());

        assert_eq!(store.claim_space(lot.id, "A", t0()).unwrap(), Some(1));
        assert_eq!(store.claim_space(lot.id, "B", t0()).unwrap(), Some(2));
        assert_eq!(store.claim_space(lot.id, "C", t0()).unwrap(), None);

        let occupancy = store.find_occupancy(lot.id, "B").unwrap().unwrap();
        assert_eq!(occupancy.space_number, 2);

        let tx = Transaction {
            id: Uuid::new_v4(),
            lot_id: lot.id,
            space_number: 2,
            plate: "B".to_string(),
            entry_time: t0(),
            exit_time: t0() + Duration::hours(2),
            fee: 20,
        };
        assert!(store.close_occupancy(&tx).unwrap());
        assert!(!store.close_occupancy(&tx).unwrap());
        assert_eq!(store.transactions(lot.id).unwrap(), vec![tx]);
        assert_eq!(store.occupancies(lot.id).unwrap().len(), 1);
    }

    #[test]
    fn test_changes_are_logged_in_order() {
        let store = TableStore::from_parts(LotTables::new(), RecordingLog::default());
        store.create_lot(1, t0()).unwrap();
        store.claim_space(LotId(1), "A", t0()).unwrap();
        store.set_maintenance(LotId(1), 1, true).unwrap();

        // No change, nothing logged
        assert_eq!(store.claim_space(LotId(1), "B", t0()).unwrap(), None);
        assert!(!store.set_maintenance(LotId(1), 2, true).unwrap());

        let changes = store.log().changes.lock();
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], TableChange::LotCreated { .. }));
        assert!(matches!(changes[1], TableChange::SpaceClaimed(_)));
        assert!(matches!(changes[2], TableChange::MaintenanceSet { .. }));
    }

    #[test]
    fn test_failed_log_leaves_tables_unchanged() {
        let store = TableStore::from_parts(LotTables::new(), RecordingLog::default());
        store.create_lot(2, t0()).unwrap();

        store.log().fail.store(true, Ordering::SeqCst);
        let err = store.claim_space(LotId(1), "A", t0()).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Io);
        assert!(store.create_lot(5, t0()).is_err());

        assert!(store.occupancies(LotId(1)).unwrap().is_empty());
        assert_eq!(store.lot_count(), 1);

        store.log().fail.store(false, Ordering::SeqCst);
        assert_eq!(store.claim_space(LotId(1), "A", t0()).unwrap(), Some(1));
    }

    #[test]
    fn test_oversized_lot_never_logged() {
        let store = TableStore::from_parts(LotTables::new(), RecordingLog::default());
        let err = store.create_lot(u32::MAX, t0()).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Other);
        assert!(store.log().changes.lock().is_empty());
        assert_eq!(store.lot_count(), 0);
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::new(StoreErrorKind::Corruption, "bad record");
        assert_eq!(err.to_string(), "corruption failure: bad record");
        assert!(!err.is_retryable());
        assert!(StoreError::new(StoreErrorKind::Unavailable, "closed").is_retryable());
    }
}
