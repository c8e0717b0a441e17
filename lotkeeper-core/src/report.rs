//! Daily usage reporting.

use crate::engine::ParkingEngine;
use crate::error::CoreError;
use crate::model::{DailyStats, LotId, Transaction};
use std::collections::BTreeMap;

/// Groups transactions by exit day, ascending.
///
/// Hours are summed unrounded; fees are summed as charged.
pub fn daily_stats(transactions: &[Transaction]) -> Vec<DailyStats> {
    let mut days: BTreeMap<_, DailyStats> = BTreeMap::new();

    for tx in transactions {
        let day = tx.exit_day();
        let stats = days.entry(day).or_insert_with(|| DailyStats {
            day,
            total_vehicles: 0,
            total_parking_hours: 0.0,
            total_fee: 0,
        });
        stats.total_vehicles += 1;
        stats.total_parking_hours += tx.parked_hours();
        stats.total_fee = stats.total_fee.saturating_add(tx.fee);
    }

    days.into_values().collect()
}

impl ParkingEngine {
    /// Returns per-day statistics of completed stays in `lot_id`.
    pub fn report(&self, lot_id: LotId) -> Result<Vec<DailyStats>, CoreError> {
        self.require_lot(lot_id)?;
        let transactions = self.store.transactions(lot_id)?;
        Ok(daily_stats(&transactions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{engine, t0};
    use chrono::{Duration, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    fn tx(entry: chrono::DateTime<Utc>, minutes: i64, fee: u64) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            lot_id: LotId(1),
            space_number: 1,
            plate: "A".to_string(),
            entry_time: entry,
            exit_time: entry + Duration::minutes(minutes),
            fee,
        }
    }

    #[test]
    fn test_groups_by_exit_day_ascending() {
        let day1 = Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 7, 2, 10, 0, 0).unwrap();

        // Deliberately out of order
        let stats = daily_stats(&[tx(day2, 30, 10), tx(day1, 90, 20), tx(day1, 60, 10)]);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].day, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(stats[0].total_vehicles, 2);
        assert!((stats[0].total_parking_hours - 2.5).abs() < 1e-9);
        assert_eq!(stats[0].total_fee, 30);

        assert_eq!(stats[1].day, NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
        assert_eq!(stats[1].total_vehicles, 1);
        assert!((stats[1].total_parking_hours - 0.5).abs() < 1e-9);
        assert_eq!(stats[1].total_fee, 10);
    }

    #[test]
    fn test_overnight_stay_counts_on_exit_day() {
        let entry = Utc.with_ymd_and_hms(2024, 7, 1, 23, 30, 0).unwrap();
        let stats = daily_stats(&[tx(entry, 60, 10)]);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].day, NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());
    }

    #[test]
    fn test_report_from_engine() {
        let (engine, clock) = engine();
        let lot = engine.create_lot(2).unwrap();
        assert!(engine.report(lot.id).unwrap().is_empty());

        engine.park(lot.id, "A").unwrap();
        engine.park(lot.id, "B").unwrap();
        // Still parked: not reported
        assert!(engine.report(lot.id).unwrap().is_empty());

        clock.advance(Duration::minutes(90));
        engine.unpark(lot.id, "A").unwrap();
        engine.unpark(lot.id, "B").unwrap();

        let stats = engine.report(lot.id).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].day, t0().date_naive());
        assert_eq!(stats[0].total_vehicles, 2);
        assert!((stats[0].total_parking_hours - 3.0).abs() < 1e-9);
        assert_eq!(stats[0].total_fee, 40);
    }

    #[test]
    fn test_report_unknown_lot() {
        let (engine, _) = engine();
        assert!(matches!(
            engine.report(LotId(3)),
            Err(CoreError::LotNotFound { .. })
        ));
    }
}
