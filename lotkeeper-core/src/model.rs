//! Lot, space, occupancy and transaction records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lot identifier, assigned sequentially by the store starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(pub u64);

impl fmt::Display for LotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LotId {
    fn from(value: u64) -> Self {
        LotId(value)
    }
}

/// One numbered space within a lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Space number, `1..=total_spaces`, stable for the lot's lifetime.
    pub number: u32,
    pub occupied: bool,
    pub in_maintenance: bool,
    /// Set only while occupied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<DateTime<Utc>>,
}

impl Space {
    /// Returns whether the allocator may claim this space.
    pub fn is_eligible(&self) -> bool {
        !self.occupied && !self.in_maintenance
    }
}

/// A parking lot with its spaces in ascending number order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub total_spaces: u32,
    pub created_at: DateTime<Utc>,
    pub spaces: Vec<Space>,
}

impl Lot {
    /// Returns the number of spaces the allocator could claim right now.
    pub fn available_spaces(&self) -> usize {
        self.spaces.iter().filter(|s| s.is_eligible()).count()
    }
}

/// The live record of who holds a space and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub lot_id: LotId,
    pub space_number: u32,
    pub plate: String,
    pub entry_time: DateTime<Utc>,
}

/// Immutable record of a completed park/unpark cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub lot_id: LotId,
    pub space_number: u32,
    pub plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub fee: u64,
}

impl Transaction {
    /// Returns the raw (unrounded) parked time in hours.
    pub fn parked_hours(&self) -> f64 {
        let millis = (self.exit_time - self.entry_time).num_milliseconds().max(0);
        millis as f64 / 3_600_000.0
    }

    /// Returns the calendar day (UTC) the transaction is reported under.
    pub fn exit_day(&self) -> NaiveDate {
        self.exit_time.date_naive()
    }

    /// Returns whether this transaction closed the given occupancy.
    pub fn closes(&self, occupancy: &Occupancy) -> bool {
        self.lot_id == occupancy.lot_id
            && self.space_number == occupancy.space_number
            && self.plate == occupancy.plate
            && self.entry_time == occupancy.entry_time
    }
}

/// Aggregated usage for one exit day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub day: NaiveDate,
    pub total_vehicles: u64,
    pub total_parking_hours: f64,
    pub total_fee: u64,
}

/// Occupied spaces of a lot, ordered by space number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotStatus {
    pub lot_id: LotId,
    pub parked: Vec<Occupancy>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_space_eligibility() {
        let mut space = Space {
            number: 1,
            occupied: false,
            in_maintenance: false,
            entry_time: None,
        };
        assert!(space.is_eligible());

        space.in_maintenance = true;
        assert!(!space.is_eligible());

        space.in_maintenance = false;
        space.occupied = true;
        assert!(!space.is_eligible());
    }

    #[test]
    fn test_parked_hours_unrounded() {
        let entry = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let tx = Transaction {
            id: Uuid::new_v4(),
            lot_id: LotId(1),
            space_number: 1,
            plate: "AB-1".to_string(),
            entry_time: entry,
            exit_time: entry + Duration::minutes(90),
            fee: 20,
        };
        assert!((tx.parked_hours() - 1.5).abs() < 1e-9);
        assert_eq!(tx.exit_day(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
    }

    #[test]
    fn test_lot_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&LotId(7)).unwrap(), "7");
        assert_eq!(LotId(7).to_string(), "7");
    }
}
