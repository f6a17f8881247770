//! Expired-file sweep (spec §4.5): deletes files whose `expires_at` has
//! passed. No physical bytes are reclaimed here — that happens at
//! compaction, once the deleted frame's length has been credited to
//! `volumes.size_deleted` by the catalog's own reference-count bookkeeping.

use catalog::Catalog;
use common::StoreResult;
use tracing::{info, instrument};

use crate::jobs::{JobKind, JobRegistry};
use crate::now_unix;

#[instrument(skip(catalog, registry))]
pub fn sweep_expired(catalog: &Catalog, registry: &JobRegistry) -> StoreResult<u64> {
    let job_id = registry.start(JobKind::ExpirySweep, None, 0, now_unix());
    let removed = match catalog.cleanup_expired_files(now_unix()) {
        Ok(removed) => removed,
        Err(err) => {
            registry.fail(job_id, now_unix(), err.to_string());
            return Err(err);
        }
    };
    registry.advance(job_id, removed);
    registry.finish(job_id, now_unix());
    info!(removed, "expired-file sweep complete");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CompressionAlg, FileRecord};
    use uuid::Uuid;

    #[test]
    fn sweeps_only_expired_files() {
        let catalog = Catalog::open_in_memory().unwrap();
        let file_type = catalog.get_or_create_file_type("text/plain", "text", "plain").unwrap();
        let blob_id = catalog.create_blob("hash").unwrap();
        catalog.update_blob_location(blob_id, 1, 0, 5, 5, CompressionAlg::None, file_type).unwrap();

        let expired = FileRecord {
            id: Uuid::new_v4(),
            name: "old.txt".to_string(),
            blob_id,
            old_cumulus_id: None,
            expires_at: Some(now_unix() - 100),
            created_at: now_unix(),
            tags: String::new(),
        };
        let fresh = FileRecord {
            id: Uuid::new_v4(),
            name: "new.txt".to_string(),
            blob_id,
            old_cumulus_id: None,
            expires_at: Some(now_unix() + 100_000),
            created_at: now_unix(),
            tags: String::new(),
        };
        catalog.save_file(&expired).unwrap();
        catalog.save_file(&fresh).unwrap();

        let registry = JobRegistry::new();
        let removed = sweep_expired(&catalog, &registry).unwrap();
        assert_eq!(removed, 1);
        assert!(catalog.get_file(expired.id).is_err());
        assert!(catalog.get_file(fresh.id).is_ok());
    }
}
