//! Journal segment management.
//!
//! The journal is split into fixed-size segment files:
//! - Rotation: a new segment is started when the current one cannot fit a record
//! - Recovery: each segment can be scanned independently, a torn tail is detected

use crate::entry::JournalRecord;
use crate::error::JournalError;
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Segment identifier (monotonically increasing).
pub type SegmentId = u64;

/// Segment file name format: NNNNNNNNNNNNNNNN.log (16 hex digits)
pub fn segment_filename(id: SegmentId) -> String {
    format!("{:016x}.log", id)
}

/// Parse segment ID from filename.
pub fn parse_segment_filename(name: &str) -> Option<SegmentId> {
    let name = name.strip_suffix(".log")?;
    if name.len() != 16 {
        return None;
    }
    u64::from_str_radix(name, 16).ok()
}

/// Result of scanning a segment from the start.
#[derive(Debug)]
pub struct SegmentScan {
    /// Decoded records with their byte offsets.
    pub records: Vec<(u64, JournalRecord)>,
    /// Length of the prefix made of whole, valid records.
    pub valid_len: u64,
}

impl SegmentScan {
    /// Returns whether bytes follow the last whole record.
    pub fn has_torn_tail(&self, file_size: u64) -> bool {
        self.valid_len < file_size
    }
}

/// A single journal segment file.
pub struct Segment {
    id: SegmentId,
    file: File,
    size: u64,
    max_size: u64,
    sync_pending: bool,
    #[cfg(test)]
    fail_sync: bool,
}

impl Segment {
    /// Creates a new segment file.
    pub fn create(dir: &Path, id: SegmentId, max_size: u64) -> Result<Self, JournalError> {
        let path = dir.join(segment_filename(id));
        let file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)?;

        Ok(Self {
            id,
            file,
            size: 0,
            max_size,
            sync_pending: false,
            #[cfg(test)]
            fail_sync: false,
        })
    }

    /// Opens an existing segment file for reading and appending.
    pub fn open(dir: &Path, id: SegmentId, max_size: u64) -> Result<Self, JournalError> {
        let path = dir.join(segment_filename(id));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            id,
            file,
            size,
            max_size,
            sync_pending: false,
            #[cfg(test)]
            fail_sync: false,
        })
    }

    /// Returns the segment ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Returns the current size of the segment.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns whether the segment can fit a record of the given size.
    ///
    /// An empty segment accepts any record so oversized entries still land somewhere.
    pub fn can_fit(&self, record_size: usize) -> bool {
        self.size == 0 || self.size + record_size as u64 <= self.max_size
    }

    /// Appends a record and returns its offset within the segment.
    pub fn append(&mut self, record: &JournalRecord) -> Result<u64, JournalError> {
        let encoded = record.encode()?;
        let offset = self.size;

        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&encoded)?;
        self.size += encoded.len() as u64;
        self.sync_pending = true;

        Ok(offset)
    }

    /// Syncs the segment to disk.
    pub fn sync(&mut self) -> Result<(), JournalError> {
        #[cfg(test)]
        if self.fail_sync {
            return Err(std::io::Error::other("sync failed").into());
        }
        if self.sync_pending {
            self.file.sync_data()?;
            self.sync_pending = false;
        }
        Ok(())
    }

    /// Reads every whole record from the start of the segment.
    pub fn scan(&mut self) -> Result<SegmentScan, JournalError> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::with_capacity(self.size as usize);
        self.file.read_to_end(&mut raw)?;

        let mut buf = BytesMut::from(&raw[..]);
        let mut records = Vec::new();
        let mut offset = 0u64;

        while let Some(record) =
            JournalRecord::decode(&mut buf, offset).map_err(|e| e.in_segment(self.id))?
        {
            let record_size = record.disk_size() as u64;
            records.push((offset, record));
            offset += record_size;
        }

        Ok(SegmentScan {
            records,
            valid_len: offset,
        })
    }

    /// Truncates the segment at the given offset (drops a torn tail or a
    /// failed append).
    pub fn truncate_at(&mut self, offset: u64) -> Result<(), JournalError> {
        self.file.set_len(offset)?;
        self.size = offset;
        self.file.seek(SeekFrom::End(0))?;
        self.file.sync_all()?;
        self.sync_pending = false;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn fail_syncs(&mut self, fail: bool) {
        self.fail_sync = fail;
    }

    /// Swaps the handle for a read-only one so writes and truncation fail.
    #[cfg(test)]
    pub(crate) fn reopen_read_only(&mut self, dir: &Path) -> Result<(), JournalError> {
        self.file = File::open(dir.join(segment_filename(self.id)))?;
        Ok(())
    }
}

/// Segment directory scanner.
pub struct SegmentScanner;

impl SegmentScanner {
    /// Lists all segment IDs in a directory, sorted ascending.
    pub fn list_segments(dir: &Path) -> Result<Vec<SegmentId>, JournalError> {
        let mut segments = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = parse_segment_filename(&name.to_string_lossy()) {
                segments.push(id);
            }
        }

        segments.sort_unstable();
        Ok(segments)
    }
}
