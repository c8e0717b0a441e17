//! Occupancy ledger: closing stays and reporting who is parked.

use crate::allocator::normalize_plate;
use crate::engine::ParkingEngine;
use crate::error::CoreError;
use crate::model::{LotId, LotStatus, Transaction};
use uuid::Uuid;

impl ParkingEngine {
    /// Removes `plate` from `lot_id`, frees its space and records the
    /// charged transaction.
    ///
    /// If the plate holds several spaces, the lowest-numbered one is closed.
    pub fn unpark(&self, lot_id: LotId, plate: &str) -> Result<Transaction, CoreError> {
        let plate = normalize_plate(plate)?;
        self.require_lot(lot_id)?;

        let lock = self.lot_lock(lot_id);
        let _guard = lock.lock();

        let occupancy = self
            .store
            .find_occupancy(lot_id, plate)?
            .ok_or_else(|| CoreError::OccupantNotFound {
                lot_id,
                plate: plate.to_string(),
            })?;

        let exit_time = self.clock.now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            lot_id,
            space_number: occupancy.space_number,
            plate: occupancy.plate,
            entry_time: occupancy.entry_time,
            exit_time,
            fee: self.billing.fee(occupancy.entry_time, exit_time),
        };

        if !self.store.close_occupancy(&transaction)? {
            // Unreachable while every mutation of the lot takes the lot lock.
            tracing::error!(
                %lot_id,
                space = transaction.space_number,
                "Occupancy changed while the lot lock was held"
            );
            return Err(CoreError::Internal {
                reason: format!(
                    "occupancy of space {} in parking lot {} changed while the lot lock was held",
                    transaction.space_number, lot_id
                ),
            });
        }

        tracing::debug!(
            %lot_id,
            plate,
            space = transaction.space_number,
            fee = transaction.fee,
            "Vehicle unparked"
        );
        Ok(transaction)
    }

    /// Lists the vehicles currently parked in `lot_id` by space number.
    pub fn status(&self, lot_id: LotId) -> Result<LotStatus, CoreError> {
        self.require_lot(lot_id)?;
        let mut parked = self.store.occupancies(lot_id)?;
        parked.sort_by_key(|o| o.space_number);
        Ok(LotStatus { lot_id, parked })
    }
}
