//! # lotkeeper-journal
//!
//! Append-only journal for lotkeeper.
//!
//! Every mutation of lot state is written here before it becomes visible:
//! - Per-record CRC32C checksums for corruption detection
//! - Fixed-size segment files with rotation
//! - Configurable fsync policies
//! - Truncation of torn writes at the tail on open

pub mod entry;
pub mod error;
pub mod journal;
pub mod segment;

pub use entry::{JournalEntry, JournalEntryType, JournalRecord};
pub use error::JournalError;
pub use journal::{FsyncPolicy, Journal, JournalConfig, JournalStats};
pub use segment::{Segment, SegmentId};

/// Default segment size (16 MiB).
pub const DEFAULT_SEGMENT_SIZE: u64 = 16 * 1024 * 1024;

/// Journal record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 24;
