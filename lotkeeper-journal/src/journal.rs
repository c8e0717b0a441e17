//! Main journal implementation.

use crate::entry::{JournalEntry, JournalRecord};
use crate::error::JournalError;
use crate::segment::{Segment, SegmentId, SegmentScanner};
use crate::DEFAULT_SEGMENT_SIZE;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Fsync policy for journal writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsyncPolicy {
    /// Fsync after every write (safest, slowest).
    #[default]
    EveryWrite,
    /// Fsync after N writes.
    EveryN(u32),
    /// Never fsync automatically (caller must call sync).
    Never,
}

/// Journal configuration.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Directory holding segment files.
    pub dir: PathBuf,
    /// Maximum segment size before rotation.
    pub segment_size: u64,
    /// Fsync policy.
    pub fsync_policy: FsyncPolicy,
}

impl JournalConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            segment_size: DEFAULT_SEGMENT_SIZE,
            fsync_policy: FsyncPolicy::default(),
        }
    }

    pub fn with_segment_size(mut self, size: u64) -> Self {
        self.segment_size = size;
        self
    }

    pub fn with_fsync_policy(mut self, policy: FsyncPolicy) -> Self {
        self.fsync_policy = policy;
        self
    }
}

/// I/O statistics for the journal.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalStats {
    /// Total bytes appended.
    pub bytes_written: u64,
    /// Total append operations.
    pub writes: u64,
    /// Total fsync operations.
    pub fsyncs: u64,
}

struct Writer {
    current: Segment,
    segment_ids: Vec<SegmentId>,
    writes_since_sync: u32,
}

/// Append-only journal.
pub struct Journal {
    config: JournalConfig,
    writer: Mutex<Writer>,
    next_sequence: AtomicU64,
    closed: AtomicBool,
    stats_bytes_written: AtomicU64,
    stats_writes: AtomicU64,
    stats_fsyncs: AtomicU64,
}

impl Journal {
    /// Opens or creates a journal, returning it with every recovered entry in order.
    pub fn open(config: JournalConfig) -> Result<(Self, Vec<(u64, JournalEntry)>), JournalError> {
        std::fs::create_dir_all(&config.dir)?;

        let mut segment_ids = SegmentScanner::list_segments(&config.dir)?;
        let mut entries = Vec::new();
        let mut max_sequence = 0u64;

        for (i, &seg_id) in segment_ids.iter().enumerate() {
            let mut segment = Segment::open(&config.dir, seg_id, config.segment_size)?;
            let scan = segment.scan()?;

            if scan.has_torn_tail(segment.size()) {
                let is_last = i + 1 == segment_ids.len();
                if !is_last {
                    return Err(JournalError::InvalidHeader {
                        segment: seg_id,
                        offset: scan.valid_len,
                        reason: "incomplete record before the newest segment".to_string(),
                    });
                }
                tracing::warn!(
                    "Truncating torn journal tail: segment {} at {} ({} bytes dropped)",
                    seg_id,
                    scan.valid_len,
                    segment.size() - scan.valid_len
                );
                segment.truncate_at(scan.valid_len)?;
            }

            for (_, record) in scan.records {
                max_sequence = max_sequence.max(record.header.sequence);
                entries.push((record.header.sequence, record.entry()?));
            }
        }

        let current = match segment_ids.last() {
            Some(&latest) => Segment::open(&config.dir, latest, config.segment_size)?,
            None => {
                segment_ids.push(1);
                Segment::create(&config.dir, 1, config.segment_size)?
            }
        };

        tracing::info!(
            "Journal opened: {} segments, {} entries, next_sequence={}",
            segment_ids.len(),
            entries.len(),
            max_sequence + 1
        );

        let journal = Self {
            config,
            writer: Mutex::new(Writer {
                current,
                segment_ids,
                writes_since_sync: 0,
            }),
            next_sequence: AtomicU64::new(max_sequence + 1),
            closed: AtomicBool::new(false),
            stats_bytes_written: AtomicU64::new(0),
            stats_writes: AtomicU64::new(0),
            stats_fsyncs: AtomicU64::new(0),
        };

        Ok((journal, entries))
    }

    /// Appends an entry, returning its sequence number.
    ///
    /// The entry is on disk (subject to the fsync policy) when this returns.
    pub fn append(&self, entry: &JournalEntry) -> Result<u64, JournalError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(JournalError::Closed);
        }

        let mut writer = self.writer.lock();

        // Sequence is taken under the writer lock so file order matches sequence order.
        let sequence = self.next_sequence.load(Ordering::SeqCst);
        let record = JournalRecord::from_entry(entry, sequence)?;
        let record_size = record.disk_size();

        if !writer.current.can_fit(record_size) {
            writer.current.sync()?;
            let next_id = writer.current.id() + 1;
            writer.current = Segment::create(&self.config.dir, next_id, self.config.segment_size)?;
            writer.segment_ids.push(next_id);
            tracing::debug!("Rotated to journal segment {}", next_id);
        }

        let due = match self.config.fsync_policy {
            FsyncPolicy::EveryWrite => true,
            FsyncPolicy::EveryN(n) => writer.writes_since_sync + 1 >= n,
            FsyncPolicy::Never => false,
        };

        // A failed append must leave neither bytes nor a sequence gap behind.
        let offset = writer.current.size();
        if let Err(e) = Self::write_record(&mut writer.current, &record, due) {
            self.roll_back(&mut writer.current, offset);
            return Err(e);
        }
        self.next_sequence.store(sequence + 1, Ordering::SeqCst);

        self.stats_bytes_written
            .fetch_add(record_size as u64, Ordering::Relaxed);
        self.stats_writes.fetch_add(1, Ordering::Relaxed);

        if due {
            writer.writes_since_sync = 0;
            self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        } else {
            writer.writes_since_sync += 1;
        }

        Ok(sequence)
    }

    fn write_record(
        segment: &mut Segment,
        record: &JournalRecord,
        sync: bool,
    ) -> Result<(), JournalError> {
        segment.append(record)?;
        if sync {
            segment.sync()?;
        }
        Ok(())
    }

    /// Cuts the segment back to `offset`. If that fails the segment may end
    /// in a partial record, so the journal stops accepting appends.
    fn roll_back(&self, segment: &mut Segment, offset: u64) {
        match segment.truncate_at(offset) {
            Ok(()) => tracing::warn!(
                "Journal append failed, segment {} rolled back to {}",
                segment.id(),
                offset
            ),
            Err(e) => {
                self.closed.store(true, Ordering::Release);
                tracing::error!(
                    "Journal rollback of segment {} to {} failed, refusing further appends: {}",
                    segment.id(),
                    offset,
                    e
                );
            }
        }
    }

    /// Forces a sync to disk.
    pub fn sync(&self) -> Result<(), JournalError> {
        let mut writer = self.writer.lock();
        writer.current.sync()?;
        writer.writes_since_sync = 0;
        self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Syncs and refuses further appends.
    pub fn close(&self) -> Result<(), JournalError> {
        self.closed.store(true, Ordering::Release);
        self.sync()
    }

    /// Returns whether the journal has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the next sequence number that will be assigned.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    /// Returns the list of segment IDs.
    pub fn segment_ids(&self) -> Vec<SegmentId> {
        self.writer.lock().segment_ids.clone()
    }

    /// Returns the current I/O statistics.
    pub fn stats(&self) -> JournalStats {
        JournalStats {
            bytes_written: self.stats_bytes_written.load(Ordering::Relaxed),
            writes: self.stats_writes.load(Ordering::Relaxed),
            fsyncs: self.stats_fsyncs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment_filename;
    use chrono::{TimeZone, Utc};
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> JournalConfig {
        JournalConfig::new(dir)
            .with_segment_size(4096)
            .with_fsync_policy(FsyncPolicy::EveryWrite)
    }

    fn maintenance(number: u32) -> JournalEntry {
        JournalEntry::MaintenanceSet {
            lot_id: 1,
            number,
            in_maintenance: number % 2 == 0,
        }
    }

    #[test]
    fn test_append_and_reopen() {
        let dir = TempDir::new().unwrap();

        {
            let (journal, entries) = Journal::open(test_config(dir.path())).unwrap();
            assert!(entries.is_empty());

            let created = JournalEntry::LotCreated {
                lot_id: 1,
                total_spaces: 4,
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            };
            assert_eq!(journal.append(&created).unwrap(), 1);
            for n in 1..=9 {
                journal.append(&maintenance(n)).unwrap();
            }
            journal.close().unwrap();
        }

        let (journal, entries) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(entries.len(), 10);
        assert_eq!(journal.next_sequence(), 11);
        assert!(matches!(entries[0].1, JournalEntry::LotCreated { .. }));
        assert_eq!(entries[9], (10, maintenance(9)));
    }

    #[test]
    fn test_segment_rotation_preserves_order() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path()).with_segment_size(256);

        {
            let (journal, _) = Journal::open(config.clone()).unwrap();
            for n in 1..=20 {
                journal.append(&maintenance(n)).unwrap();
            }
            assert!(journal.segment_ids().len() > 1);
        }

        let (_, entries) = Journal::open(config).unwrap();
        let sequences: Vec<u64> = entries.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_sync_rolls_back_append() {
        let dir = TempDir::new().unwrap();
        let segment_path = dir.path().join(segment_filename(1));

        {
            let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
            journal.append(&maintenance(1)).unwrap();
            let size = std::fs::metadata(&segment_path).unwrap().len();

            journal.writer.lock().current.fail_syncs(true);
            assert!(matches!(
                journal.append(&maintenance(2)),
                Err(JournalError::Io(_))
            ));
            assert_eq!(journal.next_sequence(), 2);
            assert_eq!(journal.stats().writes, 1);
            assert_eq!(std::fs::metadata(&segment_path).unwrap().len(), size);
            assert!(!journal.is_closed());

            // The failed entry's sequence number is reused
            journal.writer.lock().current.fail_syncs(false);
            assert_eq!(journal.append(&maintenance(3)).unwrap(), 2);
        }

        let (_, entries) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(entries, vec![(1, maintenance(1)), (2, maintenance(3))]);
    }

    #[test]
    fn test_failed_rollback_closes_journal() {
        let dir = TempDir::new().unwrap();

        {
            let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
            journal.append(&maintenance(1)).unwrap();

            journal
                .writer
                .lock()
                .current
                .reopen_read_only(dir.path())
                .unwrap();
            assert!(matches!(
                journal.append(&maintenance(2)),
                Err(JournalError::Io(_))
            ));
            assert!(journal.is_closed());
            assert!(matches!(
                journal.append(&maintenance(3)),
                Err(JournalError::Closed)
            ));
            assert_eq!(journal.next_sequence(), 2);
        }

        let (journal, entries) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(entries, vec![(1, maintenance(1))]);
        assert_eq!(journal.next_sequence(), 2);
    }

    #[test]
    fn test_torn_tail_is_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
            journal.append(&maintenance(1)).unwrap();
            journal.append(&maintenance(2)).unwrap();
        }

        let partial = JournalRecord::from_entry(&maintenance(3), 3)
            .unwrap()
            .encode()
            .unwrap();
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(segment_filename(1)))
            .unwrap();
        file.write_all(&partial[..partial.len() / 2]).unwrap();
        drop(file);

        let (journal, entries) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(journal.next_sequence(), 3);

        // Appends continue cleanly after the truncation point
        journal.append(&maintenance(3)).unwrap();
        drop(journal);
        let (_, entries) = Journal::open(test_config(dir.path())).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_corruption_is_reported() {
        let dir = TempDir::new().unwrap();
        {
            let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
            journal.append(&maintenance(1)).unwrap();
        }

        let path = dir.path().join(segment_filename(1));
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        match Journal::open(test_config(dir.path())) {
            Err(e) => assert!(e.is_corruption()),
            Ok(_) => panic!("corrupted journal opened"),
        }
    }

    #[test]
    fn test_closed_journal_rejects_appends() {
        let dir = TempDir::new().unwrap();
        let (journal, _) = Journal::open(test_config(dir.path())).unwrap();
        journal.close().unwrap();

        assert!(journal.is_closed());
        assert!(matches!(
            journal.append(&maintenance(1)),
            Err(JournalError::Closed)
        ));
    }

    #[test]
    fn test_fsync_every_n() {
        let dir = TempDir::new().unwrap();
        let config = JournalConfig::new(dir.path()).with_fsync_policy(FsyncPolicy::EveryN(3));
        let (journal, _) = Journal::open(config).unwrap();

        for n in 1..=7 {
            journal.append(&maintenance(n)).unwrap();
        }

        let stats = journal.stats();
        assert_eq!(stats.writes, 7);
        assert_eq!(stats.fsyncs, 2);
        assert!(stats.bytes_written > 0);
    }
}
