//! Maintenance flags.

use crate::engine::ParkingEngine;
use crate::error::CoreError;
use crate::model::LotId;

impl ParkingEngine {
    /// Sets or clears the maintenance flag of one space.
    ///
    /// An occupied space may be flagged; its vehicle stays until unparked.
    /// Setting the current value again succeeds.
    pub fn set_maintenance(
        &self,
        lot_id: LotId,
        number: u32,
        in_maintenance: bool,
    ) -> Result<(), CoreError> {
        self.require_lot(lot_id)?;

        let lock = self.lot_lock(lot_id);
        let _guard = lock.lock();

        if !self.store.set_maintenance(lot_id, number, in_maintenance)? {
            return Err(CoreError::invalid(format!(
                "space {} does not exist in parking lot {}",
                number, lot_id
            )));
        }

        tracing::info!(%lot_id, space = number, in_maintenance, "Maintenance updated");
        Ok(())
    }
}
