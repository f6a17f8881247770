//! Append-only, crash-tolerant log of file lifecycle events (spec §4.4).
//!
//! Records only File inserts; the catalog is the authoritative store and
//! writes to it first. An append here happens after the catalog insert
//! succeeds and is best-effort — a failed append is logged and swallowed
//! rather than failing the upload — so a rebuild can replay this log to
//! recover File rows without re-reading every volume, but it is not a
//! transactional mirror of the catalog. File deletes (including the
//! maintenance sweep's expiry cleanup) are catalog-only and never appear
//! here.

mod record;

pub use record::RecoveryRecord;

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use common::StoreResult;
use tracing::warn;

pub struct RecoveryLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RecoveryLog {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).read(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and fsyncs it before returning, so a crash right
    /// after this call still leaves the record recoverable.
    pub fn append(&self, record: &RecoveryRecord) -> StoreResult<()> {
        let encoded = record.encode();
        let mut file = self.file.lock().expect("recovery log mutex poisoned");
        file.write_all(&encoded)?;
        file.sync_data()?;
        Ok(())
    }

    /// Replays every record in the log, skipping a truncated final record
    /// left by a crash mid-append.
    pub fn scan(&self) -> StoreResult<Vec<RecoveryRecord>> {
        let mut file = self.file.lock().expect("recovery log mutex poisoned");
        file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut *file);

        let mut records = Vec::new();
        loop {
            match RecoveryRecord::decode(&mut reader)? {
                Some(record) => records.push(record),
                None => break,
            }
        }
        file.seek(SeekFrom::End(0))?;
        Ok(records)
    }

    /// Truncates the log to empty. Called once maintenance has folded every
    /// record into the catalog and a fresh log can start from zero.
    pub fn truncate(&self) -> StoreResult<()> {
        let mut file = self.file.lock().expect("recovery log mutex poisoned");
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        warn!("recovery log truncated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample(blob_id: i64, name: &str) -> RecoveryRecord {
        RecoveryRecord {
            id: Uuid::new_v4(),
            blob_id,
            created_at_unix_nanos: 1_700_000_000_000_000_000,
            old_cumulus_id: None,
            expires_unix_nanos: None,
            tags: None,
            name: name.to_string(),
        }
    }

    #[test]
    fn append_then_scan_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecoveryLog::open(dir.path().join("recovery.log")).unwrap();
        log.append(&sample(1, "a.txt")).unwrap();
        log.append(&sample(2, "b.txt")).unwrap();

        let records = log.scan().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a.txt");
        assert_eq!(records[1].name, "b.txt");
    }

    #[test]
    fn reopening_existing_log_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery.log");
        {
            let log = RecoveryLog::open(&path).unwrap();
            log.append(&sample(1, "a.txt")).unwrap();
        }
        let log = RecoveryLog::open(&path).unwrap();
        let records = log.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a.txt");
    }

    #[test]
    fn truncated_tail_record_is_dropped_on_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recovery.log");
        let log = RecoveryLog::open(&path).unwrap();
        log.append(&sample(1, "a.txt")).unwrap();

        // simulate a crash mid-append of a second record
        let encoded = sample(2, "b.txt").encode();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&encoded[..encoded.len() - 4]).unwrap();
            file.sync_data().unwrap();
        }

        let records = log.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a.txt");
    }

    #[test]
    fn truncate_clears_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = RecoveryLog::open(dir.path().join("recovery.log")).unwrap();
        log.append(&sample(1, "a.txt")).unwrap();
        log.truncate().unwrap();
        assert!(log.scan().unwrap().is_empty());
    }
}
