//! In-memory lot tables shared by every `LotStore` implementation.
//!
//! Mutations are split in two steps: `plan_*` inspects the tables and
//! describes the change as a [`TableChange`] without touching anything, and
//! [`LotTables::apply`] performs it. A durable store persists the change
//! between the two steps; replay after a restart is `apply` alone.

use crate::allocator;
use crate::model::{Lot, LotId, Occupancy, Space, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Largest lot the tables accept, whatever limit the engine is configured with.
pub const MAX_SPACES_PER_LOT: u32 = 10_000;

fn check_lot_size(lot_id: LotId, total_spaces: u32) -> Result<(), ChangeRejected> {
    if total_spaces == 0 || total_spaces > MAX_SPACES_PER_LOT {
        return Err(ChangeRejected(format!(
            "lot {} has {} spaces, expected 1..={}",
            lot_id, total_spaces, MAX_SPACES_PER_LOT
        )));
    }
    Ok(())
}

/// A single state change of the tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TableChange {
    LotCreated {
        lot_id: LotId,
        total_spaces: u32,
        created_at: DateTime<Utc>,
    },
    SpaceClaimed(Occupancy),
    SpaceReleased(Transaction),
    MaintenanceSet {
        lot_id: LotId,
        number: u32,
        in_maintenance: bool,
    },
}

/// A change that does not fit the current tables.
#[derive(Debug, Error)]
#[error("change rejected: {0}")]
pub struct ChangeRejected(String);

#[derive(Debug, Clone)]
struct Occupant {
    plate: String,
    entry_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct SpaceRow {
    in_maintenance: bool,
    occupant: Option<Occupant>,
}

#[derive(Debug, Clone)]
struct LotRow {
    created_at: DateTime<Utc>,
    /// Index `i` holds space number `i + 1`.
    spaces: Vec<SpaceRow>,
    transactions: Vec<Transaction>,
}

impl LotRow {
    fn space(&self, number: u32) -> Option<&SpaceRow> {
        let index = (number as usize).checked_sub(1)?;
        self.spaces.get(index)
    }

    fn space_mut(&mut self, number: u32) -> Option<&mut SpaceRow> {
        let index = (number as usize).checked_sub(1)?;
        self.spaces.get_mut(index)
    }

    fn views(&self) -> impl Iterator<Item = Space> + '_ {
        self.spaces.iter().enumerate().map(|(i, row)| Space {
            number: i as u32 + 1,
            occupied: row.occupant.is_some(),
            in_maintenance: row.in_maintenance,
            entry_time: row.occupant.as_ref().map(|o| o.entry_time),
        })
    }

    fn occupancies(&self, lot_id: LotId) -> impl Iterator<Item = Occupancy> + '_ {
        self.spaces.iter().enumerate().filter_map(move |(i, row)| {
            row.occupant.as_ref().map(|o| Occupancy {
                lot_id,
                space_number: i as u32 + 1,
                plate: o.plate.clone(),
                entry_time: o.entry_time,
            })
        })
    }
}

/// All lots, their spaces, occupants and transaction history.
#[derive(Debug, Clone, Default)]
pub struct LotTables {
    lots: BTreeMap<LotId, LotRow>,
}

impl LotTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id the next created lot will receive.
    pub fn next_lot_id(&self) -> LotId {
        self.lots
            .keys()
            .next_back()
            .map(|id| LotId(id.0 + 1))
            .unwrap_or(LotId(1))
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    pub fn contains(&self, lot_id: LotId) -> bool {
        self.lots.contains_key(&lot_id)
    }

    pub fn lot(&self, lot_id: LotId) -> Option<Lot> {
        self.lots.get(&lot_id).map(|row| Lot {
            id: lot_id,
            total_spaces: row.spaces.len() as u32,
            created_at: row.created_at,
            spaces: row.views().collect(),
        })
    }

    /// Plans a new lot. Sizes outside `1..=MAX_SPACES_PER_LOT` are rejected
    /// here so they never reach a change log.
    pub fn plan_create(
        &self,
        total_spaces: u32,
        created_at: DateTime<Utc>,
    ) -> Result<TableChange, ChangeRejected> {
        let lot_id = self.next_lot_id();
        check_lot_size(lot_id, total_spaces)?;
        Ok(TableChange::LotCreated {
            lot_id,
            total_spaces,
            created_at,
        })
    }

    /// Plans a claim of the lowest-numbered eligible space.
    ///
    /// Returns `None` if the lot is missing or every space is occupied or
    /// under maintenance.
    pub fn plan_claim(
        &self,
        lot_id: LotId,
        plate: &str,
        entry_time: DateTime<Utc>,
    ) -> Option<TableChange> {
        let row = self.lots.get(&lot_id)?;
        let number = allocator::lowest_eligible(row.views())?;
        Some(TableChange::SpaceClaimed(Occupancy {
            lot_id,
            space_number: number,
            plate: plate.to_string(),
            entry_time,
        }))
    }

    /// Finds the lowest-numbered occupied space held by `plate`.
    pub fn find_occupancy(&self, lot_id: LotId, plate: &str) -> Option<Occupancy> {
        self.lots
            .get(&lot_id)?
            .occupancies(lot_id)
            .find(|o| o.plate == plate)
    }

    /// Plans the release recorded by `transaction`, if its occupancy is still live.
    pub fn plan_release(&self, transaction: &Transaction) -> Option<TableChange> {
        let row = self.lots.get(&transaction.lot_id)?;
        let occupant = row.space(transaction.space_number)?.occupant.as_ref()?;
        let occupancy = Occupancy {
            lot_id: transaction.lot_id,
            space_number: transaction.space_number,
            plate: occupant.plate.clone(),
            entry_time: occupant.entry_time,
        };
        transaction
            .closes(&occupancy)
            .then(|| TableChange::SpaceReleased(transaction.clone()))
    }

    /// Plans a maintenance flag change. `None` if the space does not exist.
    pub fn plan_maintenance(
        &self,
        lot_id: LotId,
        number: u32,
        in_maintenance: bool,
    ) -> Option<TableChange> {
        self.lots.get(&lot_id)?.space(number)?;
        Some(TableChange::MaintenanceSet {
            lot_id,
            number,
            in_maintenance,
        })
    }

    pub fn occupancies(&self, lot_id: LotId) -> Vec<Occupancy> {
        self.lots
            .get(&lot_id)
            .map(|row| row.occupancies(lot_id).collect())
            .unwrap_or_default()
    }

    pub fn transactions(&self, lot_id: LotId) -> Vec<Transaction> {
        self.lots
            .get(&lot_id)
            .map(|row| row.transactions.clone())
            .unwrap_or_default()
    }

    /// Applies a change. Rejects changes that contradict the current state,
    /// which during replay means the persisted history is inconsistent.
    pub fn apply(&mut self, change: &TableChange) -> Result<(), ChangeRejected> {
        match change {
            TableChange::LotCreated {
                lot_id,
                total_spaces,
                created_at,
            } => {
                if self.lots.contains_key(lot_id) {
                    return Err(ChangeRejected(format!("lot {} already exists", lot_id)));
                }
                check_lot_size(*lot_id, *total_spaces)?;
                self.lots.insert(
                    *lot_id,
                    LotRow {
                        created_at: *created_at,
                        spaces: vec![SpaceRow::default(); *total_spaces as usize],
                        transactions: Vec::new(),
                    },
                );
            }

            TableChange::SpaceClaimed(occupancy) => {
                let space = self.space_mut(occupancy.lot_id, occupancy.space_number)?;
                if space.occupant.is_some() || space.in_maintenance {
                    return Err(ChangeRejected(format!(
                        "space {} in lot {} is not free",
                        occupancy.space_number, occupancy.lot_id
                    )));
                }
                space.occupant = Some(Occupant {
                    plate: occupancy.plate.clone(),
                    entry_time: occupancy.entry_time,
                });
            }

            TableChange::SpaceReleased(transaction) => {
                if self.plan_release(transaction).is_none() {
                    return Err(ChangeRejected(format!(
                        "space {} in lot {} is not held by '{}'",
                        transaction.space_number, transaction.lot_id, transaction.plate
                    )));
                }
                self.space_mut(transaction.lot_id, transaction.space_number)?
                    .occupant = None;
                if let Some(row) = self.lots.get_mut(&transaction.lot_id) {
                    row.transactions.push(transaction.clone());
                }
            }

            TableChange::MaintenanceSet {
                lot_id,
                number,
                in_maintenance,
            } => {
                self.space_mut(*lot_id, *number)?.in_maintenance = *in_maintenance;
            }
        }
        Ok(())
    }

    fn space_mut(&mut self, lot_id: LotId, number: u32) -> Result<&mut SpaceRow, ChangeRejected> {
        self.lots
            .get_mut(&lot_id)
            .and_then(|row| row.space_mut(number))
            .ok_or_else(|| {
                ChangeRejected(format!("space {} in lot {} does not exist", number, lot_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn tables_with_lot(spaces: u32) -> LotTables {
        let mut tables = LotTables::new();
        let change = tables.plan_create(spaces, t0()).unwrap();
        tables.apply(&change).unwrap();
        tables
    }

    fn claim(tables: &mut LotTables, plate: &str) -> Option<u32> {
        let change = tables.plan_claim(LotId(1), plate, t0())?;
        tables.apply(&change).unwrap();
        match change {
            TableChange::SpaceClaimed(o) => Some(o.space_number),
            _ => None,
        }
    }

    fn release_tx(occupancy: &Occupancy) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            lot_id: occupancy.lot_id,
            space_number: occupancy.space_number,
            plate: occupancy.plate.clone(),
            entry_time: occupancy.entry_time,
            exit_time: occupancy.entry_time + Duration::minutes(30),
            fee: 10,
        }
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let mut tables = LotTables::new();
        assert_eq!(tables.next_lot_id(), LotId(1));

        for expected in 1..=3 {
            let change = tables.plan_create(2, t0()).unwrap();
            tables.apply(&change).unwrap();
            assert!(tables.contains(LotId(expected)));
        }
        assert_eq!(tables.next_lot_id(), LotId(4));

        let lot = tables.lot(LotId(2)).unwrap();
        assert_eq!(lot.total_spaces, 2);
        assert_eq!(
            lot.spaces.iter().map(|s| s.number).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(lot.spaces.iter().all(Space::is_eligible));
    }

    #[test]
    fn test_claim_takes_lowest_free_space() {
        let mut tables = tables_with_lot(3);
        assert_eq!(claim(&mut tables, "A"), Some(1));
        assert_eq!(claim(&mut tables, "B"), Some(2));
        assert_eq!(claim(&mut tables, "C"), Some(3));
        assert_eq!(claim(&mut tables, "D"), None);

        let lot = tables.lot(LotId(1)).unwrap();
        assert!(lot.spaces.iter().all(|s| s.occupied && s.entry_time.is_some()));
    }

    #[test]
    fn test_claim_skips_maintenance() {
        let mut tables = tables_with_lot(3);
        let change = tables.plan_maintenance(LotId(1), 1, true).unwrap();
        tables.apply(&change).unwrap();

        assert_eq!(claim(&mut tables, "A"), Some(2));
    }

    #[test]
    fn test_release_frees_space_and_records_transaction() {
        let mut tables = tables_with_lot(2);
        claim(&mut tables, "A");
        claim(&mut tables, "B");

        let occupancy = tables.find_occupancy(LotId(1), "A").unwrap();
        let tx = release_tx(&occupancy);
        let change = tables.plan_release(&tx).unwrap();
        tables.apply(&change).unwrap();

        assert!(tables.find_occupancy(LotId(1), "A").is_none());
        assert_eq!(tables.transactions(LotId(1)), vec![tx.clone()]);
        assert_eq!(claim(&mut tables, "C"), Some(1));

        // The occupancy is gone, so the same release cannot be planned twice
        assert!(tables.plan_release(&tx).is_none());
    }

    #[test]
    fn test_maintenance_keeps_occupant() {
        let mut tables = tables_with_lot(1);
        claim(&mut tables, "A");

        let change = tables.plan_maintenance(LotId(1), 1, true).unwrap();
        tables.apply(&change).unwrap();

        let lot = tables.lot(LotId(1)).unwrap();
        assert!(lot.spaces[0].occupied);
        assert!(lot.spaces[0].in_maintenance);
        assert_eq!(tables.occupancies(LotId(1)).len(), 1);
    }

    #[test]
    fn test_plan_maintenance_unknown_space() {
        let tables = tables_with_lot(2);
        assert!(tables.plan_maintenance(LotId(1), 0, true).is_none());
        assert!(tables.plan_maintenance(LotId(1), 3, true).is_none());
        assert!(tables.plan_maintenance(LotId(9), 1, true).is_none());
    }

    #[test]
    fn test_apply_rejects_inconsistent_history() {
        let mut tables = tables_with_lot(1);
        claim(&mut tables, "A");

        let double_claim = TableChange::SpaceClaimed(Occupancy {
            lot_id: LotId(1),
            space_number: 1,
            plate: "B".to_string(),
            entry_time: t0(),
        });
        assert!(tables.apply(&double_claim).is_err());

        let duplicate_lot = TableChange::LotCreated {
            lot_id: LotId(1),
            total_spaces: 5,
            created_at: t0(),
        };
        assert!(tables.apply(&duplicate_lot).is_err());
    }

    #[test]
    fn test_apply_rejects_oversized_lot() {
        let mut tables = LotTables::new();
        let oversized = TableChange::LotCreated {
            lot_id: LotId(1),
            total_spaces: u32::MAX,
            created_at: t0(),
        };
        assert!(tables.apply(&oversized).is_err());
        assert!(tables.plan_create(MAX_SPACES_PER_LOT + 1, t0()).is_err());
        assert!(tables.plan_create(0, t0()).is_err());
        assert!(!tables.contains(LotId(1)));

        let largest = tables.plan_create(MAX_SPACES_PER_LOT, t0()).unwrap();
        tables.apply(&largest).unwrap();
        assert_eq!(tables.lot(LotId(1)).unwrap().total_spaces, MAX_SPACES_PER_LOT);
    }
}
