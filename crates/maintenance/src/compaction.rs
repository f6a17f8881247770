//! Compaction scheduling: selects fragmented volumes and rewrites each one
//! through [`storage::VolumeStore::compact_with`], following the
//! rename-first, commit-second, truncate-third ordering that primitive
//! already implements (spec §4.1, §9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use catalog::Catalog;
use common::StoreResult;
use storage::VolumeStore;
use tracing::{info, instrument};

use crate::jobs::{JobKind, JobRegistry};
use crate::now_unix;

/// Result of compacting one volume.
#[derive(Debug, Clone, Copy)]
pub struct CompactionSummary {
    pub volume_id: u32,
    pub frames_kept: usize,
    pub new_size_total: u64,
}

/// Rewrites `volume_id`, keeping only the blobs the catalog still attributes
/// to it, and commits the new offsets in the same pass `storage` already
/// orders correctly.
#[instrument(skip(volumes, catalog))]
pub fn compact_volume(volumes: &VolumeStore, catalog: &Catalog, volume_id: u32) -> StoreResult<CompactionSummary> {
    let ordered = catalog.blobs_in_volume_ordered(volume_id)?;
    let outcome = volumes.compact_with(volume_id, &ordered, |outcome| {
        let new_offsets: Vec<(i64, u64)> = outcome.frames.iter().map(|f| (f.blob_id, f.new_offset)).collect();
        catalog.apply_compaction(outcome.volume_id, &new_offsets, outcome.new_size_total)
    })?;
    info!(volume_id, frames = outcome.frames.len(), new_size_total = outcome.new_size_total, "compacted volume");
    Ok(CompactionSummary {
        volume_id,
        frames_kept: outcome.frames.len(),
        new_size_total: outcome.new_size_total,
    })
}

/// Selects every volume whose fragmentation ratio exceeds `threshold_pct`
/// and compacts each in turn, ordered by id, recording progress in
/// `registry`. Checks `cancel` between volumes; a cancelled run leaves
/// later volumes untouched and the in-progress one's `.compact` sibling (if
/// any) for cleanup on the next invocation.
#[instrument(skip(volumes, catalog, registry, cancel))]
pub fn compact_all(
    volumes: &VolumeStore,
    catalog: &Catalog,
    registry: &Arc<JobRegistry>,
    threshold_pct: f64,
    cancel: &AtomicBool,
) -> StoreResult<Vec<CompactionSummary>> {
    let candidates = catalog.get_volumes_to_compact(threshold_pct)?;
    let job_id = registry.start(JobKind::Compaction, None, candidates.len() as u64, now_unix());

    let mut summaries = Vec::with_capacity(candidates.len());
    for (processed, volume_id) in candidates.into_iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            info!(job = %job_id, "compaction run cancelled");
            break;
        }
        match compact_volume(volumes, catalog, volume_id) {
            Ok(summary) => summaries.push(summary),
            Err(err) => {
                registry.fail(job_id, now_unix(), err.to_string());
                return Err(err);
            }
        }
        registry.advance(job_id, processed as u64 + 1);
    }
    registry.finish(job_id, now_unix());
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CompressionAlg;

    #[test]
    fn compacts_a_single_fragmented_volume() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = VolumeStore::open(dir.path(), 1024 * 1024).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let file_type = catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();

        let blob_a = catalog.create_blob("a").unwrap();
        let (v, off_a) = volumes.append(blob_a, b"AAAAA", CompressionAlg::None).unwrap();
        catalog.update_blob_location(blob_a, v, off_a, 5, 5, CompressionAlg::None, file_type).unwrap();

        let blob_b = catalog.create_blob("b").unwrap();
        let (_, off_b) = volumes.append(blob_b, b"BBBBB", CompressionAlg::None).unwrap();
        catalog.update_blob_location(blob_b, v, off_b, 5, 5, CompressionAlg::None, file_type).unwrap();

        // Delete b's only file reference so compaction has something to drop.
        let file_b = common::FileRecord {
            id: uuid::Uuid::new_v4(),
            name: "b.txt".to_string(),
            blob_id: blob_b,
            old_cumulus_id: None,
            expires_at: None,
            created_at: 0,
            tags: String::new(),
        };
        catalog.save_file(&file_b).unwrap();
        catalog.delete_file(file_b.id).unwrap();

        let summary = compact_volume(&volumes, &catalog, v).unwrap();
        assert_eq!(summary.frames_kept, 1);

        let blob = catalog.get_blob(blob_a).unwrap();
        assert_eq!(volumes.read(blob.volume_id, blob.offset, blob.size_compressed).unwrap(), b"AAAAA");
    }

    #[test]
    fn compact_all_only_touches_volumes_over_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let volumes = VolumeStore::open(dir.path(), 1024 * 1024).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let file_type = catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();

        // Volume 1: stays under the threshold, left untouched.
        let blob1 = catalog.create_blob("keep-1").unwrap();
        let (_, off1) = volumes.append(blob1, b"11111", CompressionAlg::None).unwrap();
        catalog.update_blob_location(blob1, 1, off1, 5, 5, CompressionAlg::None, file_type).unwrap();
        catalog.ensure_volume_row(1, 1000, 100).unwrap();

        // Volume 2: over the threshold and has a real frame to rewrite.
        let blob2 = catalog.create_blob("keep-2").unwrap();
        let (_, off2) = volumes.append(blob2, b"22222", CompressionAlg::None).unwrap();
        catalog.update_blob_location(blob2, 2, off2, 5, 5, CompressionAlg::None, file_type).unwrap();
        catalog.ensure_volume_row(2, 1000, 900).unwrap();

        let registry = Arc::new(JobRegistry::new());
        let cancel = AtomicBool::new(false);
        let summaries = compact_all(&volumes, &catalog, &registry, 50.0, &cancel).unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].volume_id, 2);
        assert_eq!(catalog.get_volume_stats(1).unwrap().size_deleted, 100);
        assert_eq!(catalog.get_volume_stats(2).unwrap().size_deleted, 0);
    }
}
