//! The Metadata Catalog: a single-writer, WAL-mode SQLite database holding
//! the four relations of spec §4.3 — the source of truth the `.meta`
//! side-cars merely cache.

mod integrity;
mod migration;
mod schema;

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::{Blob, CompressionAlg, FileRecord, StoreError, StoreResult, StorageStats, VolumeStats};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Wraps the single permitted connection (spec §4.3: "connection pool size =
/// 1"). Concurrent Rust-side callers serialize on this mutex; SQLite's own
/// busy-timeout covers the rarer case of a second process (the maintenance
/// CLI, rebuild) opening the same file.
pub struct Catalog {
    conn: Mutex<Connection>,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

impl Catalog {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        migration::run(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(schema::CREATE_TABLES)?;
        migration::run(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ---- file_types --------------------------------------------------

    /// Insert-or-select, race-safe via retry on unique-constraint violation
    /// (spec §4.3).
    pub fn get_or_create_file_type(&self, mime: &str, category: &str, subtype: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        loop {
            if let Some(id) = select_file_type(&conn, mime, category, subtype)? {
                return Ok(id);
            }
            match conn.execute(
                "INSERT INTO file_types (mime, category, subtype) VALUES (?1, ?2, ?3)",
                params![mime, category, subtype],
            ) {
                Ok(_) => return Ok(conn.last_insert_rowid()),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn get_file_type_mime(&self, id: i64) -> StoreResult<String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT mime FROM file_types WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn insert_file_type_with_id(&self, id: i64, mime: &str, category: &str, subtype: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO file_types (id, mime, category, subtype) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO NOTHING",
            params![id, mime, category, subtype],
        )?;
        Ok(())
    }

    // ---- blobs ----------------------------------------------------------

    pub fn get_blob_id_by_hash(&self, hash: &str) -> StoreResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT id FROM blobs WHERE hash = ?1", params![hash], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    /// Inserts a Blob row with no physical location yet. Per spec §9, a
    /// Blob without a location is legal only during an in-flight upload —
    /// [`Self::reap_stale_unlocated_blobs`] cleans up ones that never
    /// completed.
    pub fn create_blob(&self, hash: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO blobs (hash, volume_id, offset, size_raw, size_compressed, compression_alg, file_type_id, created_at)
             VALUES (?1, NULL, NULL, NULL, NULL, NULL, NULL, ?2)",
            params![hash, now_unix()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_blob_location(
        &self,
        blob_id: i64,
        volume_id: u32,
        offset: u64,
        size_raw: u64,
        size_compressed: u64,
        alg: CompressionAlg,
        file_type_id: i64,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE blobs SET volume_id = ?1, offset = ?2, size_raw = ?3, size_compressed = ?4,
             compression_alg = ?5, file_type_id = ?6 WHERE id = ?7",
            params![
                volume_id,
                offset as i64,
                size_raw as i64,
                size_compressed as i64,
                alg.as_str(),
                file_type_id,
                blob_id
            ],
        )?;
        let frame_total = common::FRAME_HEADER_LEN as i64 + size_compressed as i64 + common::FRAME_FOOTER_LEN as i64;
        conn.execute(
            "INSERT INTO volumes (id, size_total, size_deleted) VALUES (?1, ?2, 0)
             ON CONFLICT(id) DO UPDATE SET size_total = size_total + ?2",
            params![volume_id, frame_total],
        )?;
        Ok(())
    }

    pub fn get_blob(&self, id: i64) -> StoreResult<Blob> {
        let conn = self.conn.lock().unwrap();
        blob_by_id(&conn, id)?.ok_or(StoreError::NotFound)
    }

    /// Used by rebuild/restore to recreate a Blob with its original id
    /// (the physical frame's embedded `blob_id` can't be reassigned without
    /// violating the frame invariant of spec §3).
    pub fn insert_blob_with_id(&self, blob: &Blob) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO blobs (id, hash, volume_id, offset, size_raw, size_compressed, compression_alg, file_type_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO NOTHING",
            params![
                blob.id,
                blob.hash,
                blob.volume_id,
                blob.offset as i64,
                blob.size_raw as i64,
                blob.size_compressed as i64,
                blob.compression_alg.as_str(),
                blob.file_type_id,
                now_unix(),
            ],
        )?;
        Ok(())
    }

    /// Deletes Blob rows with no location older than `cutoff_unix`: the
    /// bound on how long an in-flight upload may hold a location-less row
    /// before it's considered abandoned (spec §9 open-question resolution,
    /// see DESIGN.md).
    pub fn reap_stale_unlocated_blobs(&self, cutoff_unix: i64) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM blobs WHERE volume_id IS NULL AND created_at < ?1",
            params![cutoff_unix],
        )?;
        Ok(affected as u64)
    }

    // ---- files ------------------------------------------------------------

    pub fn save_file(&self, file: &FileRecord) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        insert_file(&conn, file)
    }

    pub fn get_file(&self, id: Uuid) -> StoreResult<FileRecord> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, blob_id, old_cumulus_id, expires_at, created_at, tags FROM files WHERE id = ?1",
            params![id.to_string()],
            file_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    pub fn get_file_by_old_id(&self, old_id: i64) -> StoreResult<FileRecord> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, blob_id, old_cumulus_id, expires_at, created_at, tags FROM files WHERE old_cumulus_id = ?1",
            params![old_id],
            file_from_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Removes the File row; if it held the last reference to its Blob,
    /// removes the Blob row too and credits the frame's length to
    /// `volumes.size_deleted` — the bytes stay on disk until `compact`
    /// (spec §4.3).
    pub fn delete_file(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let found = delete_file_and_maybe_blob(&tx, &id.to_string())?;
        tx.commit()?;
        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// `DELETE FROM files WHERE expires_at < now`, applying the same
    /// reference-count bookkeeping as `delete_file` to every expired row.
    /// Returns the number of files removed; no physical bytes are reclaimed
    /// here — that's compaction's job (spec §4.5).
    pub fn cleanup_expired_files(&self, now: i64) -> StoreResult<u64> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let expired: Vec<String> = {
            let mut stmt = tx.prepare("SELECT id FROM files WHERE expires_at IS NOT NULL AND expires_at < ?1")?;
            stmt.query_map(params![now], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?
        };
        for id in &expired {
            delete_file_and_maybe_blob(&tx, id)?;
        }
        tx.commit()?;
        Ok(expired.len() as u64)
    }

    // ---- volumes / stats ----------------------------------------------

    pub fn increment_deleted_size(&self, volume_id: u32, bytes: u64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO volumes (id, size_total, size_deleted) VALUES (?1, 0, ?2)
             ON CONFLICT(id) DO UPDATE SET size_deleted = size_deleted + ?2",
            params![volume_id, bytes as i64],
        )?;
        Ok(())
    }

    pub fn get_volumes_to_compact(&self, threshold_pct: f64) -> StoreResult<Vec<u32>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, size_total, size_deleted FROM volumes ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, total, deleted) = row?;
            let pct = if total == 0 { 0.0 } else { (deleted as f64 / total as f64) * 100.0 };
            if pct > threshold_pct {
                out.push(id as u32);
            }
        }
        Ok(out)
    }

    pub fn get_storage_stats(&self) -> StoreResult<StorageStats> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COALESCE(SUM(size_total), 0), COALESCE(SUM(size_deleted), 0) FROM volumes",
            [],
            |row| {
                Ok(StorageStats {
                    total_bytes: row.get::<_, i64>(0)? as u64,
                    deleted_bytes: row.get::<_, i64>(1)? as u64,
                })
            },
        )
        .map_err(Into::into)
    }

    pub fn get_volume_stats(&self, volume_id: u32) -> StoreResult<VolumeStats> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, size_total, size_deleted FROM volumes WHERE id = ?1",
            params![volume_id],
            |row| {
                Ok(VolumeStats {
                    id: row.get::<_, i64>(0)? as u32,
                    size_total: row.get::<_, i64>(1)? as u64,
                    size_deleted: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    pub fn list_volume_stats(&self) -> StoreResult<Vec<VolumeStats>> {
        let conn = self.conn.lock().unwrap();
        integrity::list_volume_stats(&conn)
    }

    pub fn ensure_volume_row(&self, volume_id: u32, size_total: u64, size_deleted: u64) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO volumes (id, size_total, size_deleted) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET size_total = ?2, size_deleted = ?3",
            params![volume_id, size_total as i64, size_deleted as i64],
        )?;
        Ok(())
    }

    /// Every Blob currently attributed to `volume_id`, ordered by ascending
    /// offset — exactly the enumeration compaction needs (spec §4.1 step 3).
    pub fn blobs_in_volume_ordered(&self, volume_id: u32) -> StoreResult<Vec<(i64, u64, u64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, offset, size_compressed FROM blobs WHERE volume_id = ?1 ORDER BY offset ASC",
        )?;
        let rows = stmt.query_map(params![volume_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as u64, row.get::<_, i64>(2)? as u64))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Applies a compaction's new frame offsets in one transaction: the
    /// `commit` closure passed to `storage::VolumeStore::compact_with`.
    pub fn apply_compaction(&self, volume_id: u32, new_offsets: &[(i64, u64)], new_size_total: u64) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for &(blob_id, new_offset) in new_offsets {
            tx.execute("UPDATE blobs SET offset = ?1 WHERE id = ?2", params![new_offset as i64, blob_id])?;
        }
        tx.execute(
            "INSERT INTO volumes (id, size_total, size_deleted) VALUES (?1, ?2, 0)
             ON CONFLICT(id) DO UPDATE SET size_total = ?2, size_deleted = 0",
            params![volume_id, new_size_total as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ---- integrity ------------------------------------------------------

    pub fn orphaned_blob_count(&self) -> StoreResult<u64> {
        integrity::orphaned_blob_count(&self.conn.lock().unwrap())
    }

    pub fn missing_blob_count(&self) -> StoreResult<u64> {
        integrity::missing_blob_count(&self.conn.lock().unwrap())
    }

    pub fn distinct_volume_ids(&self) -> StoreResult<Vec<u32>> {
        integrity::distinct_volume_ids(&self.conn.lock().unwrap())
    }

    pub fn sample_blobs(&self, limit: u32) -> StoreResult<Vec<Blob>> {
        integrity::sample_blobs(&self.conn.lock().unwrap(), limit)
    }

    /// Runs SQLite's `VACUUM`, rebuilding the database file to reclaim space
    /// left by deleted rows. Used by the `db vacuum` CLI command; has no
    /// effect on volume files — that's what volume compaction is for.
    pub fn vacuum(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

fn select_file_type(conn: &Connection, mime: &str, category: &str, subtype: &str) -> StoreResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM file_types WHERE mime = ?1 AND category = ?2 AND subtype = ?3",
        params![mime, category, subtype],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn blob_by_id(conn: &Connection, id: i64) -> StoreResult<Option<Blob>> {
    let row = conn
        .query_row(
            "SELECT id, hash, volume_id, offset, size_raw, size_compressed, compression_alg, file_type_id FROM blobs WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<i64>>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, hash, volume_id, offset, size_raw, size_compressed, alg, file_type_id)) = row else {
        return Ok(None);
    };

    // Not yet located: an in-flight upload hasn't committed the location
    // update. Treat the same as not found for callers.
    match (volume_id, offset, size_raw, size_compressed, alg, file_type_id) {
        (Some(volume_id), Some(offset), Some(size_raw), Some(size_compressed), Some(alg), Some(file_type_id)) => {
            Ok(Some(Blob {
                id,
                hash,
                volume_id: volume_id as u32,
                offset: offset as u64,
                size_raw: size_raw as u64,
                size_compressed: size_compressed as u64,
                compression_alg: CompressionAlg::from_str_opt(&alg).unwrap_or(CompressionAlg::None),
                file_type_id,
            }))
        }
        _ => Ok(None),
    }
}

fn insert_file(conn: &Connection, file: &FileRecord) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO files (id, name, blob_id, old_cumulus_id, expires_at, created_at, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            file.id.to_string(),
            file.name,
            file.blob_id,
            file.old_cumulus_id,
            file.expires_at,
            file.created_at,
            file.tags,
        ],
    )?;
    Ok(())
}

fn file_from_row(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let id: String = row.get(0)?;
    Ok(FileRecord {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        name: row.get(1)?,
        blob_id: row.get(2)?,
        old_cumulus_id: row.get(3)?,
        expires_at: row.get(4)?,
        created_at: row.get(5)?,
        tags: row.get(6)?,
    })
}

/// Removes the file row and, if it was the blob's last reference, the blob
/// row too, crediting its frame length to `size_deleted`. Returns whether
/// the file existed.
fn delete_file_and_maybe_blob(tx: &rusqlite::Transaction, file_id: &str) -> StoreResult<bool> {
    let blob_id: Option<i64> = tx
        .query_row("SELECT blob_id FROM files WHERE id = ?1", params![file_id], |row| row.get(0))
        .optional()?;
    let Some(blob_id) = blob_id else {
        return Ok(false);
    };

    tx.execute("DELETE FROM files WHERE id = ?1", params![file_id])?;

    let remaining: i64 = tx.query_row(
        "SELECT COUNT(*) FROM files WHERE blob_id = ?1",
        params![blob_id],
        |row| row.get(0),
    )?;
    if remaining == 0 {
        let location: Option<(Option<i64>, Option<i64>)> = tx
            .query_row(
                "SELECT volume_id, size_compressed FROM blobs WHERE id = ?1",
                params![blob_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((Some(volume_id), Some(size_compressed))) = location {
            let frame_total = common::FRAME_HEADER_LEN as i64 + size_compressed + common::FRAME_FOOTER_LEN as i64;
            tx.execute(
                "UPDATE volumes SET size_deleted = size_deleted + ?1 WHERE id = ?2",
                params![frame_total, volume_id],
            )?;
        }
        tx.execute("DELETE FROM blobs WHERE id = ?1", params![blob_id])?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CompressionAlg;

    fn sample_file(blob_id: i64) -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            name: "a.txt".to_string(),
            blob_id,
            old_cumulus_id: None,
            expires_at: None,
            created_at: now_unix(),
            tags: String::new(),
        }
    }

    #[test]
    fn file_type_is_created_once_and_reused() {
        let catalog = Catalog::open_in_memory().unwrap();
        let a = catalog.get_or_create_file_type("image/png", "image", "png").unwrap();
        let b = catalog.get_or_create_file_type("image/png", "image", "png").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn blob_lifecycle_and_dedup_lookup() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert_eq!(catalog.get_blob_id_by_hash("deadbeef").unwrap(), None);

        let blob_id = catalog.create_blob("deadbeef").unwrap();
        let file_type_id = catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();
        catalog
            .update_blob_location(blob_id, 1, 0, 11, 11, CompressionAlg::None, file_type_id)
            .unwrap();

        assert_eq!(catalog.get_blob_id_by_hash("deadbeef").unwrap(), Some(blob_id));
        let blob = catalog.get_blob(blob_id).unwrap();
        assert_eq!(blob.volume_id, 1);
        assert_eq!(blob.size_raw, 11);
    }

    #[test]
    fn delete_file_removes_blob_only_when_last_reference() {
        let catalog = Catalog::open_in_memory().unwrap();
        let blob_id = catalog.create_blob("hash1").unwrap();
        let file_type_id = catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();
        catalog
            .update_blob_location(blob_id, 1, 0, 5, 5, CompressionAlg::None, file_type_id)
            .unwrap();

        let file_a = sample_file(blob_id);
        let file_b = sample_file(blob_id);
        catalog.save_file(&file_a).unwrap();
        catalog.save_file(&file_b).unwrap();

        catalog.delete_file(file_a.id).unwrap();
        // Blob still referenced by file_b.
        assert!(catalog.get_blob(blob_id).is_ok());

        catalog.delete_file(file_b.id).unwrap();
        assert!(matches!(catalog.get_blob(blob_id).unwrap_err(), StoreError::NotFound));

        let stats = catalog.get_volume_stats(1).unwrap();
        assert_eq!(stats.size_deleted, common::FRAME_HEADER_LEN + 5 + common::FRAME_FOOTER_LEN);
    }

    #[test]
    fn delete_unknown_file_is_not_found() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(matches!(catalog.delete_file(Uuid::new_v4()).unwrap_err(), StoreError::NotFound));
    }

    #[test]
    fn cleanup_expired_files_applies_same_refcount_logic() {
        let catalog = Catalog::open_in_memory().unwrap();
        let blob_id = catalog.create_blob("hash2").unwrap();
        let file_type_id = catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();
        catalog
            .update_blob_location(blob_id, 2, 0, 5, 5, CompressionAlg::None, file_type_id)
            .unwrap();

        let mut expired = sample_file(blob_id);
        expired.expires_at = Some(now_unix() - 10);
        catalog.save_file(&expired).unwrap();

        let removed = catalog.cleanup_expired_files(now_unix()).unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(catalog.get_blob(blob_id).unwrap_err(), StoreError::NotFound));
    }

    #[test]
    fn get_volumes_to_compact_filters_by_threshold() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.ensure_volume_row(1, 1000, 100).unwrap();
        catalog.ensure_volume_row(2, 1000, 600).unwrap();
        let over_50 = catalog.get_volumes_to_compact(50.0).unwrap();
        assert_eq!(over_50, vec![2]);
    }

    #[test]
    fn vacuum_runs_without_error_on_populated_catalog() {
        let catalog = Catalog::open_in_memory().unwrap();
        catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();
        catalog.create_blob("a-hash").unwrap();
        catalog.vacuum().unwrap();
    }

    #[test]
    fn reap_stale_unlocated_blobs_respects_cutoff() {
        let catalog = Catalog::open_in_memory().unwrap();
        let blob_id = catalog.create_blob("pending").unwrap();
        let reaped_future = catalog.reap_stale_unlocated_blobs(now_unix() - 100).unwrap();
        assert_eq!(reaped_future, 0);
        let reaped_now = catalog.reap_stale_unlocated_blobs(now_unix() + 100).unwrap();
        assert_eq!(reaped_now, 1);
        assert!(matches!(catalog.get_blob(blob_id).unwrap_err(), StoreError::NotFound));
    }
}
