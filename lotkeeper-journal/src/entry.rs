//! Journal entry types.
//!
//! Each journal record has the following on-disk format:
//!
//! ```text
//! +----------+----------+----------+----------+----------+----------+
//! | magic    | type     | flags    | reserved | length   | crc32c   |
//! | 4 bytes  | 1 byte   | 1 byte   | 2 bytes  | 4 bytes  | 4 bytes  |
//! +----------+----------+----------+----------+----------+----------+
//! | sequence_number     | payload (JSON)                            |
//! | 8 bytes             | length bytes                              |
//! +---------------------+-------------------------------------------+
//! ```

use crate::error::JournalError;
use crate::RECORD_HEADER_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Magic bytes for journal records: "LKJR"
pub const JOURNAL_MAGIC: [u8; 4] = *b"LKJR";

/// Maximum record payload size (1 MiB).
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum JournalEntryType {
    /// Lot provisioned with its spaces.
    LotCreated = 1,
    /// Space claimed by a vehicle.
    SpaceClaimed = 2,
    /// Space released, transaction recorded.
    SpaceReleased = 3,
    /// Maintenance flag changed.
    MaintenanceSet = 4,
}

impl TryFrom<u8> for JournalEntryType {
    type Error = JournalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(JournalEntryType::LotCreated),
            2 => Ok(JournalEntryType::SpaceClaimed),
            3 => Ok(JournalEntryType::SpaceReleased),
            4 => Ok(JournalEntryType::MaintenanceSet),
            _ => Err(JournalError::InvalidHeader {
                segment: 0,
                offset: 0,
                reason: format!("unknown entry type: {}", value),
            }),
        }
    }
}

/// A parsed journal record header.
#[derive(Debug, Clone)]
pub struct JournalRecordHeader {
    pub entry_type: JournalEntryType,
    pub flags: u8,
    pub payload_len: u32,
    pub crc32c: u32,
    pub sequence: u64,
}

/// A complete journal record (header + payload).
#[derive(Debug, Clone)]
pub struct JournalRecord {
    pub header: JournalRecordHeader,
    pub payload: Bytes,
}

impl JournalRecord {
    /// Creates a new record, computing the payload checksum.
    pub fn new(entry_type: JournalEntryType, sequence: u64, payload: Bytes) -> Self {
        let crc = crc32c::crc32c(&payload);
        Self {
            header: JournalRecordHeader {
                entry_type,
                flags: 0,
                payload_len: payload.len() as u32,
                crc32c: crc,
                sequence,
            },
            payload,
        }
    }

    /// Serializes an entry into a record.
    pub fn from_entry(entry: &JournalEntry, sequence: u64) -> Result<Self, JournalError> {
        let payload = serde_json::to_vec(entry)?;
        Ok(Self::new(entry.entry_type(), sequence, Bytes::from(payload)))
    }

    /// Deserializes the payload back into a typed entry.
    pub fn entry(&self) -> Result<JournalEntry, JournalError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Encodes the record into bytes.
    pub fn encode(&self) -> Result<BytesMut, JournalError> {
        if self.payload.len() > MAX_RECORD_SIZE {
            return Err(JournalError::RecordTooLarge {
                size: self.payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.disk_size());
        buf.put_slice(&JOURNAL_MAGIC);
        buf.put_u8(self.header.entry_type as u8);
        buf.put_u8(self.header.flags);
        buf.put_u16(0);
        buf.put_u32(self.header.payload_len);
        buf.put_u32(self.header.crc32c);
        buf.put_u64(self.header.sequence);
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Decodes a record from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer holds less than one whole record,
    /// or when it starts with zero padding.
    pub fn decode(buf: &mut BytesMut, offset: u64) -> Result<Option<Self>, JournalError> {
        if buf.len() < RECORD_HEADER_SIZE {
            return Ok(None);
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != JOURNAL_MAGIC {
            if magic == [0, 0, 0, 0] {
                return Ok(None);
            }
            return Err(JournalError::InvalidHeader {
                segment: 0,
                offset,
                reason: format!("invalid magic: {:?}", magic),
            });
        }

        let entry_type =
            JournalEntryType::try_from(buf[4]).map_err(|_| JournalError::InvalidHeader {
                segment: 0,
                offset,
                reason: format!("unknown entry type: {}", buf[4]),
            })?;

        let flags = buf[5];
        let payload_len = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
        let crc_expected = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let sequence = u64::from_be_bytes([
            buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
        ]);

        if payload_len > MAX_RECORD_SIZE {
            return Err(JournalError::RecordTooLarge {
                size: payload_len,
                max: MAX_RECORD_SIZE,
            });
        }

        if buf.len() < RECORD_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(RECORD_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        let crc_actual = crc32c::crc32c(&payload);
        if crc_actual != crc_expected {
            return Err(JournalError::CorruptedRecord {
                segment: 0,
                offset,
                expected: crc_expected,
                actual: crc_actual,
            });
        }

        Ok(Some(Self {
            header: JournalRecordHeader {
                entry_type,
                flags,
                payload_len: payload_len as u32,
                crc32c: crc_expected,
                sequence,
            },
            payload,
        }))
    }

    /// Returns the total size of this record on disk.
    pub fn disk_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }
}

/// Typed journal entry with deserialized payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry {
    LotCreated {
        lot_id: u64,
        total_spaces: u32,
        created_at: DateTime<Utc>,
    },
    SpaceClaimed {
        lot_id: u64,
        number: u32,
        plate: String,
        entry_time: DateTime<Utc>,
    },
    SpaceReleased {
        lot_id: u64,
        number: u32,
        plate: String,
        transaction_id: Uuid,
        entry_time: DateTime<Utc>,
        exit_time: DateTime<Utc>,
        fee: u64,
    },
    MaintenanceSet {
        lot_id: u64,
        number: u32,
        in_maintenance: bool,
    },
}

impl JournalEntry {
    /// Returns the entry type for this entry.
    pub fn entry_type(&self) -> JournalEntryType {
        match self {
            JournalEntry::LotCreated { .. } => JournalEntryType::LotCreated,
            JournalEntry::SpaceClaimed { .. } => JournalEntryType::SpaceClaimed,
            JournalEntry::SpaceReleased { .. } => JournalEntryType::SpaceReleased,
            JournalEntry::MaintenanceSet { .. } => JournalEntryType::MaintenanceSet,
        }
    }

    /// Returns the lot this entry belongs to.
    pub fn lot_id(&self) -> u64 {
        match self {
            JournalEntry::LotCreated { lot_id, .. }
            | JournalEntry::SpaceClaimed { lot_id, .. }
            | JournalEntry::SpaceReleased { lot_id, .. }
            | JournalEntry::MaintenanceSet { lot_id, .. } => *lot_id,
        }
    }
}
