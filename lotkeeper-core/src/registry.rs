//! Lot registry.

use crate::engine::ParkingEngine;
use crate::error::CoreError;
use crate::model::{Lot, LotId};

impl ParkingEngine {
    /// Creates a lot with `total_spaces` free spaces numbered from 1.
    pub fn create_lot(&self, total_spaces: u32) -> Result<Lot, CoreError> {
        if total_spaces == 0 {
            return Err(CoreError::invalid("total spaces must be positive"));
        }
        if total_spaces > self.max_spaces {
            return Err(CoreError::invalid(format!(
                "total spaces must not exceed {}",
                self.max_spaces
            )));
        }

        let lot = self.store.create_lot(total_spaces, self.clock.now())?;
        tracing::info!(lot_id = %lot.id, total_spaces, "Parking lot created");
        Ok(lot)
    }

    /// Returns a snapshot of a lot and its spaces.
    pub fn lot(&self, lot_id: LotId) -> Result<Lot, CoreError> {
        self.store
            .lot(lot_id)?
            .ok_or(CoreError::LotNotFound { lot_id })
    }
}
