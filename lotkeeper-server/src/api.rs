//! JSON request and response bodies.

use chrono::{DateTime, NaiveDate, Utc};
use lotkeeper_core::{DailyStats, Lot, LotId, LotStatus, Space};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLotRequest {
    pub total_spaces: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRequest {
    #[serde(rename = "parkingLotID")]
    pub parking_lot_id: u64,
    pub license_plate: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceRequest {
    #[serde(rename = "parkingLotID")]
    pub parking_lot_id: u64,
    pub slot_number: u32,
    pub in_maintenance: bool,
}

#[derive(Debug, Deserialize)]
pub struct LotQuery {
    #[serde(rename = "parkingLotID")]
    pub parking_lot_id: u64,
}

impl LotQuery {
    pub fn lot_id(&self) -> LotId {
        LotId(self.parking_lot_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotResponse {
    pub slot_number: u32,
}

#[derive(Debug, Serialize)]
pub struct FeeResponse {
    pub fee: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse<'a> {
    pub code: &'a str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceView {
    pub number: u32,
    pub in_maintenance: bool,
    pub occupied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<DateTime<Utc>>,
}

impl From<&Space> for SpaceView {
    fn from(space: &Space) -> Self {
        Self {
            number: space.number,
            in_maintenance: space.in_maintenance,
            occupied: space.occupied,
            entry_time: space.entry_time,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotView {
    pub id: u64,
    pub total_spaces: u32,
    pub created_at: DateTime<Utc>,
    pub spaces: Vec<SpaceView>,
}

impl From<&Lot> for LotView {
    fn from(lot: &Lot) -> Self {
        Self {
            id: lot.id.0,
            total_spaces: lot.total_spaces,
            created_at: lot.created_at,
            spaces: lot.spaces.iter().map(SpaceView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkedVehicleView {
    pub vehicle: String,
    pub slot_number: u32,
    pub entry_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    #[serde(rename = "parkingLotID")]
    pub parking_lot_id: u64,
    pub parked_vehicles: Vec<ParkedVehicleView>,
}

impl From<&LotStatus> for StatusView {
    fn from(status: &LotStatus) -> Self {
        Self {
            parking_lot_id: status.lot_id.0,
            parked_vehicles: status
                .parked
                .iter()
                .map(|o| ParkedVehicleView {
                    vehicle: o.plate.clone(),
                    slot_number: o.space_number,
                    entry_time: o.entry_time,
                })
                .collect(),
        }
    }
}

/// One day of the usage report. Hours are unrounded.
#[derive(Debug, Serialize)]
pub struct DailyStatsView {
    pub day: NaiveDate,
    pub total_vehicles: u64,
    pub total_parking_time: f64,
    pub total_fee: u64,
}

impl From<&DailyStats> for DailyStatsView {
    fn from(stats: &DailyStats) -> Self {
        Self {
            day: stats.day,
            total_vehicles: stats.total_vehicles,
            total_parking_time: stats.total_parking_hours,
            total_fee: stats.total_fee,
        }
    }
}
