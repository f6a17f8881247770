use common::{Blob, CompressionAlg, StoreResult, VolumeStats};
use rusqlite::{params, Connection};

/// Blobs with no referencing file — should be zero by construction (spec §4.5).
pub fn orphaned_blob_count(conn: &Connection) -> StoreResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blobs WHERE id NOT IN (SELECT DISTINCT blob_id FROM files)",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Files whose blob row is gone.
pub fn missing_blob_count(conn: &Connection) -> StoreResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM files WHERE blob_id NOT IN (SELECT id FROM blobs)",
        [],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

pub fn distinct_volume_ids(conn: &Connection) -> StoreResult<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT DISTINCT volume_id FROM blobs WHERE volume_id IS NOT NULL ORDER BY volume_id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0).map(|id| id as u32))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// The first `limit` located blobs ordered by `(volume_id, offset)`, used by
/// the deep integrity check's sampling pass.
pub fn sample_blobs(conn: &Connection, limit: u32) -> StoreResult<Vec<Blob>> {
    let mut stmt = conn.prepare(
        "SELECT id, hash, volume_id, offset, size_raw, size_compressed, compression_alg, file_type_id
         FROM blobs WHERE volume_id IS NOT NULL
         ORDER BY volume_id ASC, offset ASC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(Blob {
            id: row.get(0)?,
            hash: row.get(1)?,
            volume_id: row.get::<_, i64>(2)? as u32,
            offset: row.get::<_, i64>(3)? as u64,
            size_raw: row.get::<_, i64>(4)? as u64,
            size_compressed: row.get::<_, i64>(5)? as u64,
            compression_alg: CompressionAlg::from_str_opt(&row.get::<_, String>(6)?)
                .unwrap_or(CompressionAlg::None),
            file_type_id: row.get(7)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub fn list_volume_stats(conn: &Connection) -> StoreResult<Vec<VolumeStats>> {
    let mut stmt = conn.prepare("SELECT id, size_total, size_deleted FROM volumes ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(VolumeStats {
            id: row.get::<_, i64>(0)? as u32,
            size_total: row.get::<_, i64>(1)? as u64,
            size_deleted: row.get::<_, i64>(2)? as u64,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}
