//! Journal-backed lot store.

use crate::error::StorageError;
use chrono::{DateTime, Utc};
use lotkeeper_core::model::{Lot, LotId, Occupancy, Transaction};
use lotkeeper_core::store::Result;
use lotkeeper_core::{ChangeLog, LotStore, LotTables, StoreError, TableChange, TableStore};
use lotkeeper_journal::{Journal, JournalConfig, JournalEntry, JournalStats};
use std::path::{Path, PathBuf};

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base directory for all storage.
    pub dir: PathBuf,
    /// Journal configuration.
    pub journal: JournalConfig,
}

impl StorageConfig {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            journal: JournalConfig::new(dir.join("journal")),
            dir,
        }
    }
}

fn to_entry(change: &TableChange) -> JournalEntry {
    match change {
        TableChange::LotCreated {
            lot_id,
            total_spaces,
            created_at,
        } => JournalEntry::LotCreated {
            lot_id: lot_id.0,
            total_spaces: *total_spaces,
            created_at: *created_at,
        },
        TableChange::SpaceClaimed(o) => JournalEntry::SpaceClaimed {
            lot_id: o.lot_id.0,
            number: o.space_number,
            plate: o.plate.clone(),
            entry_time: o.entry_time,
        },
        TableChange::SpaceReleased(tx) => JournalEntry::SpaceReleased {
            lot_id: tx.lot_id.0,
            number: tx.space_number,
            plate: tx.plate.clone(),
            transaction_id: tx.id,
            entry_time: tx.entry_time,
            exit_time: tx.exit_time,
            fee: tx.fee,
        },
        TableChange::MaintenanceSet {
            lot_id,
            number,
            in_maintenance,
        } => JournalEntry::MaintenanceSet {
            lot_id: lot_id.0,
            number: *number,
            in_maintenance: *in_maintenance,
        },
    }
}

fn to_change(entry: JournalEntry) -> TableChange {
    match entry {
        JournalEntry::LotCreated {
            lot_id,
            total_spaces,
            created_at,
        } => TableChange::LotCreated {
            lot_id: LotId(lot_id),
            total_spaces,
            created_at,
        },
        JournalEntry::SpaceClaimed {
            lot_id,
            number,
            plate,
            entry_time,
        } => TableChange::SpaceClaimed(Occupancy {
            lot_id: LotId(lot_id),
            space_number: number,
            plate,
            entry_time,
        }),
        JournalEntry::SpaceReleased {
            lot_id,
            number,
            plate,
            transaction_id,
            entry_time,
            exit_time,
            fee,
        } => TableChange::SpaceReleased(Transaction {
            id: transaction_id,
            lot_id: LotId(lot_id),
            space_number: number,
            plate,
            entry_time,
            exit_time,
            fee,
        }),
        JournalEntry::MaintenanceSet {
            lot_id,
            number,
            in_maintenance,
        } => TableChange::MaintenanceSet {
            lot_id: LotId(lot_id),
            number,
            in_maintenance,
        },
    }
}

/// Change log that appends every change to the journal.
pub struct JournalLog {
    journal: Journal,
}

impl JournalLog {
    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl ChangeLog for JournalLog {
    fn record(&self, change: &TableChange) -> Result<()> {
        self.journal
            .append(&to_entry(change))
            .map_err(|e| StoreError::from(StorageError::from(e)))?;
        Ok(())
    }
}

/// Lot store that survives restarts.
///
/// Every change is appended to the journal before it is applied in memory;
/// a failed append leaves the tables untouched.
pub struct JournalStore {
    inner: TableStore<JournalLog>,
}

impl JournalStore {
    /// Opens the store, rebuilding the tables from the journal.
    pub fn open(config: StorageConfig) -> std::result::Result<Self, StorageError> {
        let (journal, entries) = Journal::open(config.journal.clone())?;

        let mut tables = LotTables::new();
        let replayed = entries.len();
        for (sequence, entry) in entries {
            let change = to_change(entry);
            tables.apply(&change).map_err(|e| {
                StorageError::Corruption(format!("journal entry {}: {}", sequence, e))
            })?;
        }

        tracing::info!(
            "Storage recovered: {} journal entries, {} lots",
            replayed,
            tables.lot_count()
        );

        Ok(Self {
            inner: TableStore::from_parts(tables, JournalLog { journal }),
        })
    }

    /// Returns the underlying journal.
    pub fn journal(&self) -> &Journal {
        self.inner.log().journal()
    }

    pub fn stats(&self) -> JournalStats {
        self.journal().stats()
    }

    pub fn lot_count(&self) -> usize {
        self.inner.lot_count()
    }

    /// Forces buffered journal writes to disk.
    pub fn sync(&self) -> std::result::Result<(), StorageError> {
        self.journal().sync()?;
        Ok(())
    }

    /// Syncs and closes the journal. Further mutations fail.
    pub fn close(&self) -> std::result::Result<(), StorageError> {
        self.journal().close()?;
        Ok(())
    }
}

impl LotStore for JournalStore {
    fn create_lot(&self, total_spaces: u32, created_at: DateTime<Utc>) -> Result<Lot> {
        self.inner.create_lot(total_spaces, created_at)
    }

    fn lot_exists(&self, lot_id: LotId) -> Result<bool> {
        self.inner.lot_exists(lot_id)
    }

    fn lot(&self, lot_id: LotId) -> Result<Option<Lot>> {
        self.inner.lot(lot_id)
    }

    fn claim_space(
        &self,
        lot_id: LotId,
        plate: &str,
        entry_time: DateTime<Utc>,
    ) -> Result<Option<u32>> {
        self.inner.claim_space(lot_id, plate, entry_time)
    }

    fn find_occupancy(&self, lot_id: LotId, plate: &str) -> Result<Option<Occupancy>> {
        self.inner.find_occupancy(lot_id, plate)
    }

    fn close_occupancy(&self, transaction: &Transaction) -> Result<bool> {
        self.inner.close_occupancy(transaction)
    }

    fn set_maintenance(&self, lot_id: LotId, number: u32, in_maintenance: bool) -> Result<bool> {
        self.inner.set_maintenance(lot_id, number, in_maintenance)
    }

    fn occupancies(&self, lot_id: LotId) -> Result<Vec<Occupancy>> {
        self.inner.occupancies(lot_id)
    }

    fn transactions(&self, lot_id: LotId) -> Result<Vec<Transaction>> {
        self.inner.transactions(lot_id)
    }
}
