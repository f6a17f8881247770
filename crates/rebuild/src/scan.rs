//! Walks a data directory's volumes to recover the physical location of
//! every blob frame still on disk, preferring each volume's `.meta`
//! side-car and falling back to a raw `.dat` walk (spec §4.6).

use std::collections::HashMap;

use common::{CompressionAlg, StoreResult};
use storage::VolumeStore;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
pub struct PhysicalBlob {
    pub volume_id: u32,
    pub offset: u64,
    pub size_compressed: u64,
    pub comp: CompressionAlg,
}

/// `blob_id -> PhysicalBlob` for every frame found across every volume in
/// `volumes`. Later volumes never overwrite earlier ones — blob ids don't
/// repeat across volumes in well-formed data.
pub fn scan_physical_blobs(volumes: &VolumeStore) -> StoreResult<HashMap<i64, PhysicalBlob>> {
    let mut found = HashMap::new();
    for volume_id in volumes.list_volume_ids()? {
        if volumes.has_meta(volume_id) {
            match volumes.read_meta_records(volume_id) {
                Ok(records) => {
                    for record in records {
                        found.insert(
                            record.blob_id,
                            PhysicalBlob {
                                volume_id,
                                offset: record.offset,
                                size_compressed: record.size,
                                comp: record.comp,
                            },
                        );
                    }
                    continue;
                }
                Err(err) => {
                    warn!(volume_id, error = %err, "meta side-car unreadable, falling back to .dat scan");
                }
            }
        }

        info!(volume_id, "scanning .dat directly (no usable .meta)");
        for frame in volumes.scan_dat_frames(volume_id)? {
            found.insert(
                frame.blob_id,
                PhysicalBlob {
                    volume_id,
                    offset: frame.offset,
                    size_compressed: frame.size,
                    comp: frame.comp,
                },
            );
        }
    }
    Ok(found)
}
