//! # lotkeeper-storage
//!
//! Durable storage layer for lotkeeper.
//!
//! This crate provides:
//! - A `LotStore` that journals every change before applying it
//! - Recovery of lot tables by replaying the journal on open

pub mod error;
pub mod store;

pub use error::StorageError;
pub use store::{JournalLog, JournalStore, StorageConfig};
