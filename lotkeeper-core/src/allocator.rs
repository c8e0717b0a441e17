//! Space allocation.

use crate::engine::ParkingEngine;
use crate::error::CoreError;
use crate::model::{LotId, Space};

/// Picks the lowest-numbered space that is neither occupied nor under
/// maintenance.
pub fn lowest_eligible(spaces: impl IntoIterator<Item = Space>) -> Option<u32> {
    spaces
        .into_iter()
        .filter(Space::is_eligible)
        .map(|s| s.number)
        .min()
}

/// Normalizes a licence plate, rejecting blank input.
pub(crate) fn normalize_plate(plate: &str) -> Result<&str, CoreError> {
    let plate = plate.trim();
    if plate.is_empty() {
        return Err(CoreError::invalid("licence plate must not be empty"));
    }
    Ok(plate)
}

impl ParkingEngine {
    /// Parks `plate` in the lowest free space of `lot_id` and returns the
    /// space number.
    ///
    /// Concurrent calls on the same lot never hand out the same space.
    pub fn park(&self, lot_id: LotId, plate: &str) -> Result<u32, CoreError> {
        let plate = normalize_plate(plate)?;
        self.require_lot(lot_id)?;

        let lock = self.lot_lock(lot_id);
        let _guard = lock.lock();

        let entry_time = self.clock.now();
        match self.store.claim_space(lot_id, plate, entry_time)? {
            Some(number) => {
                tracing::debug!(%lot_id, plate, space = number, "Vehicle parked");
                Ok(number)
            }
            None => {
                tracing::debug!(%lot_id, plate, "No available space");
                Err(CoreError::NoAvailableSpace { lot_id })
            }
        }
    }
}
