//! Parking engine - coordinates the store, clock and billing.
//!
//! Operations are grouped by concern in sibling modules (`registry`,
//! `allocator`, `ledger`, `maintenance`, `report`), each adding an `impl`
//! block to [`ParkingEngine`]. Mutations on one lot are serialized through a
//! per-lot lock; different lots proceed in parallel.

use crate::billing::Billing;
use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;
use crate::model::LotId;
use crate::store::{LotStore, MemoryStore};
use crate::tables::MAX_SPACES_PER_LOT;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Default limit on the number of spaces in one lot.
pub const DEFAULT_MAX_SPACES: u32 = 1_000;

/// The parking engine.
pub struct ParkingEngine {
    pub(crate) store: Arc<dyn LotStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) billing: Billing,
    pub(crate) max_spaces: u32,

    /// One lock per lot, created on first use.
    lot_locks: DashMap<LotId, Arc<Mutex<()>>>,
}

impl ParkingEngine {
    pub fn new(store: Arc<dyn LotStore>, clock: Arc<dyn Clock>, billing: Billing) -> Self {
        Self {
            store,
            clock,
            billing,
            max_spaces: DEFAULT_MAX_SPACES,
            lot_locks: DashMap::new(),
        }
    }

    /// Sets the largest lot `create_lot` accepts, capped at [`MAX_SPACES_PER_LOT`].
    pub fn with_max_spaces(mut self, max_spaces: u32) -> Self {
        self.max_spaces = max_spaces.min(MAX_SPACES_PER_LOT);
        self
    }

    /// Creates an engine over `store` with the system clock and default tariff.
    pub fn with_store(store: Arc<dyn LotStore>) -> Self {
        Self::new(store, Arc::new(SystemClock::new()), Billing::default())
    }

    /// Creates an engine that keeps all state in memory.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn billing(&self) -> Billing {
        self.billing
    }

    pub fn max_spaces(&self) -> u32 {
        self.max_spaces
    }

    pub fn store(&self) -> &Arc<dyn LotStore> {
        &self.store
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Returns the lock serializing mutations of `lot_id`.
    pub(crate) fn lot_lock(&self, lot_id: LotId) -> Arc<Mutex<()>> {
        self.lot_locks
            .entry(lot_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub(crate) fn require_lot(&self, lot_id: LotId) -> Result<(), CoreError> {
        if self.store.lot_exists(lot_id)? {
            Ok(())
        } else {
            Err(CoreError::LotNotFound { lot_id })
        }
    }
}
