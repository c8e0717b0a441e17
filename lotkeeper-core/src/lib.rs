//! # lotkeeper-core
//!
//! Parking allocation engine for lotkeeper.
//!
//! This crate provides:
//! - The lot/space/occupancy/transaction data model
//! - Lowest-free-space allocation, linearized per lot
//! - The occupancy ledger and hourly billing
//! - Maintenance flags and per-day usage reports
//! - The `LotStore` persistence seam with an in-memory implementation

pub mod allocator;
pub mod billing;
pub mod clock;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod maintenance;
pub mod model;
pub mod registry;
pub mod report;
pub mod store;
pub mod tables;

pub use billing::Billing;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::ParkingEngine;
pub use error::CoreError;
pub use model::{DailyStats, Lot, LotId, LotStatus, Occupancy, Space, Transaction};
pub use store::{ChangeLog, LotStore, MemoryStore, StoreError, StoreErrorKind, TableStore};
pub use tables::{LotTables, TableChange, MAX_SPACES_PER_LOT};
