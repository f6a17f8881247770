//! The Volume Store: a directory of append-only container files
//! (`volume_XXXXXXXX.dat`) and their `.meta` side-cars (spec §4.1).

pub mod frame;
pub mod sidecar;

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use common::{
    CompressionAlg, StoreError, StoreResult, FRAME_FOOTER_LEN, FRAME_HEADER_LEN, META_RECORD_LEN,
};
use tracing::{debug, instrument, warn};

pub use frame::{decode_frame, decode_header, encode_frame, frame_len, FrameHeader};
pub use sidecar::MetaRecord;

struct StoreState {
    current_volume_id: u32,
}

/// Owns a data directory of volume `.dat`/`.meta` file pairs. Readers,
/// appenders and compaction coordinate through a short store-level lock
/// guarding `current_volume_id` plus one `RwLock` per volume id (lock order
/// is always store → per-volume, per spec §5).
pub struct VolumeStore {
    dir: PathBuf,
    max_volume_size: u64,
    store_lock: Mutex<StoreState>,
    volume_locks: Mutex<HashMap<u32, Arc<RwLock<()>>>>,
}

/// One surviving frame carried forward by a compaction pass, keyed by the
/// blob id it belongs to, at its new offset in the rewritten volume.
#[derive(Debug, Clone, Copy)]
pub struct CompactedFrame {
    pub blob_id: i64,
    pub new_offset: u64,
}

/// Result of rewriting one volume: the new offset of every surviving frame,
/// and the resulting file length.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub volume_id: u32,
    pub frames: Vec<CompactedFrame>,
    pub new_size_total: u64,
}

/// One frame discovered by walking a `.dat` file directly, used by rebuild
/// when the `.meta` side-car is absent or fails to parse.
#[derive(Debug, Clone, Copy)]
pub struct ScannedFrame {
    pub blob_id: i64,
    pub offset: u64,
    pub size: u64,
    pub comp: CompressionAlg,
}

impl VolumeStore {
    /// Opens (creating if absent) the volume directory and determines the
    /// current appendable volume from whatever is already on disk.
    pub fn open(dir: impl Into<PathBuf>, max_volume_size: u64) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let store = Self {
            dir,
            max_volume_size,
            store_lock: Mutex::new(StoreState { current_volume_id: 1 }),
            volume_locks: Mutex::new(HashMap::new()),
        };
        let current = store.recalculate_current_volume()?;
        store.store_lock.lock().unwrap().current_volume_id = current;
        Ok(store)
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.dir
    }

    pub fn max_volume_size(&self) -> u64 {
        self.max_volume_size
    }

    pub fn current_volume_id(&self) -> u32 {
        self.store_lock.lock().unwrap().current_volume_id
    }

    /// Primary, zero-padded `.dat` path. Writers emit only this form.
    pub fn volume_path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("volume_{id:08}.dat"))
    }

    /// Legacy short-form `.dat` path, recognised on read for backward
    /// compatibility (spec §4.1).
    pub fn legacy_volume_path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("volume_{id}.dat"))
    }

    pub fn meta_path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("volume_{id:08}.meta"))
    }

    fn compact_path(&self, id: u32) -> PathBuf {
        self.dir.join(format!("volume_{id:08}.dat.compact"))
    }

    fn resolve_volume_path(&self, id: u32) -> StoreResult<PathBuf> {
        let primary = self.volume_path(id);
        if primary.exists() {
            return Ok(primary);
        }
        let legacy = self.legacy_volume_path(id);
        if legacy.exists() {
            return Ok(legacy);
        }
        Err(StoreError::VolumeMissing(id))
    }

    pub fn volume_exists(&self, id: u32) -> bool {
        self.resolve_volume_path(id).is_ok()
    }

    pub fn volume_file_len(&self, id: u32) -> StoreResult<u64> {
        let path = self.resolve_volume_path(id)?;
        Ok(fs::metadata(path)?.len())
    }

    /// Every volume id with a `.dat` on disk, in either naming form.
    pub fn list_volume_ids(&self) -> StoreResult<Vec<u32>> {
        let mut ids = std::collections::BTreeSet::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(id) = parse_volume_id(&name.to_string_lossy()) {
                ids.insert(id);
            }
        }
        Ok(ids.into_iter().collect())
    }

    /// Scans the directory and picks the highest volume id whose file
    /// length is below `max_volume_size`, else the next integer id.
    pub fn recalculate_current_volume(&self) -> StoreResult<u32> {
        let ids = self.list_volume_ids()?;
        for &id in ids.iter().rev() {
            if self.volume_file_len(id)? < self.max_volume_size {
                return Ok(id);
            }
        }
        Ok(ids.into_iter().max().map(|id| id + 1).unwrap_or(1))
    }

    fn volume_lock(&self, id: u32) -> Arc<RwLock<()>> {
        let mut locks = self.volume_locks.lock().unwrap();
        locks.entry(id).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    /// Appends `payload` (already compressed, or raw for `comp = None`)
    /// framed behind `blob_id`, rotating the current volume if the frame
    /// would push it past `max_volume_size`. Returns the volume it landed in
    /// and the pre-append offset of the frame.
    #[instrument(skip(self, payload), fields(blob_id, payload_len = payload.len()))]
    pub fn append(&self, blob_id: i64, payload: &[u8], comp: CompressionAlg) -> StoreResult<(u32, u64)> {
        let encoded = encode_frame(blob_id, payload, comp);
        loop {
            let volume_id = self.current_volume_id();
            let lock = self.volume_lock(volume_id);
            let _guard = lock.write().unwrap();

            let path = self.volume_path(volume_id);
            let mut file = OpenOptions::new().create(true).read(true).write(true).open(&path)?;
            let current_len = file.seek(SeekFrom::End(0))?;

            if current_len > 0 && current_len + encoded.len() as u64 > self.max_volume_size {
                drop(_guard);
                let mut state = self.store_lock.lock().unwrap();
                if state.current_volume_id == volume_id {
                    state.current_volume_id += 1;
                }
                drop(state);
                continue;
            }

            file.write_all(&encoded)?;
            file.sync_data()?;
            drop(file);

            let record = MetaRecord {
                blob_id,
                offset: current_len,
                size: payload.len() as u64,
                comp,
                crc32: crc32fast::hash(payload),
            };
            // Not atomic with the `.dat` write above by design (spec §5,
            // §7): on crash the `.meta` may lag the `.dat`, and rebuild
            // falls back to a frame-by-frame scan.
            self.append_meta_record(volume_id, &record)?;

            debug!(volume_id, offset = current_len, "appended blob frame");
            return Ok((volume_id, current_len));
        }
    }

    fn append_meta_record(&self, volume_id: u32, record: &MetaRecord) -> StoreResult<()> {
        let path = self.meta_path(volume_id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&record.encode())?;
        file.sync_data()?;
        Ok(())
    }

    /// Reads and validates the frame for a blob of known `size` at
    /// `(volume_id, offset)`. Verifies magic, the size field and the CRC32
    /// footer; any mismatch is `CorruptFrame`.
    #[instrument(skip(self))]
    pub fn read(&self, volume_id: u32, offset: u64, size: u64) -> StoreResult<Vec<u8>> {
        let lock = self.volume_lock(volume_id);
        let _guard = lock.read().unwrap();

        let path = self.resolve_volume_path(volume_id)?;
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let total_len = frame_len(size);
        let end = offset
            .checked_add(total_len)
            .ok_or_else(|| StoreError::CorruptFrame("offset + frame length overflows u64".into()))?;
        if end > file_len {
            return Err(StoreError::CorruptFrame(format!(
                "frame at offset {offset} size {size} exceeds volume {volume_id} length {file_len}"
            )));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; total_len as usize];
        file.read_exact(&mut buf)?;
        let (header, payload) = decode_frame(&buf)?;
        if header.size != size {
            return Err(StoreError::CorruptFrame(format!(
                "frame size field {} does not match catalog size {size}",
                header.size
            )));
        }
        Ok(payload.to_vec())
    }

    /// Reads `len` raw bytes at `offset` without frame validation, used by
    /// the deep integrity check's blob sampling (spec §4.5).
    pub fn probe(&self, volume_id: u32, offset: u64, len: u64) -> StoreResult<()> {
        let lock = self.volume_lock(volume_id);
        let _guard = lock.read().unwrap();
        let path = self.resolve_volume_path(volume_id)?;
        let mut file = File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf)?;
        Ok(())
    }

    /// Rewrites `volume_id` to contain only the frames named in
    /// `ordered_blobs` (ascending by original offset). Follows the
    /// crash-safe ordering spec §9 prescribes: rename first, `commit`
    /// second, truncate third — the rename is the event that publishes new
    /// offsets to any reader re-opening the file. `commit` is expected to
    /// persist the returned offsets (and updated volume size bookkeeping) to
    /// the catalog in one transaction; if it fails, the rename has already
    /// happened and the error comes back as `CompactionInconsistent`.
    pub fn compact_with<F>(
        &self,
        volume_id: u32,
        ordered_blobs: &[(i64, u64, u64)],
        commit: F,
    ) -> StoreResult<CompactionOutcome>
    where
        F: FnOnce(&CompactionOutcome) -> StoreResult<()>,
    {
        let mut held_store_lock: Option<MutexGuard<'_, StoreState>> = None;
        {
            let guard = self.store_lock.lock().unwrap();
            if guard.current_volume_id == volume_id {
                held_store_lock = Some(guard);
            }
        }

        let vlock = self.volume_lock(volume_id);
        let _vguard = vlock.write().unwrap();

        let original_path = self.resolve_volume_path(volume_id)?;
        let compact_path = self.compact_path(volume_id);

        let mut src = File::open(&original_path)?;
        let mut dst = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&compact_path)?;

        let mut frames = Vec::with_capacity(ordered_blobs.len());
        let mut running_total = 0u64;
        for &(blob_id, offset, size_compressed) in ordered_blobs {
            let len = frame_len(size_compressed);
            let mut buf = vec![0u8; len as usize];
            src.seek(SeekFrom::Start(offset))?;
            src.read_exact(&mut buf)?;
            dst.write_all(&buf)?;
            frames.push(CompactedFrame { blob_id, new_offset: running_total });
            running_total += len;
        }
        dst.sync_all()?;
        drop(dst);
        drop(src);

        let outcome = CompactionOutcome { volume_id, frames, new_size_total: running_total };

        fs::rename(&compact_path, &original_path)?;

        if let Err(err) = commit(&outcome) {
            warn!(
                volume_id,
                error = %err,
                "catalog commit failed after volume rename; catalog may disagree with disk"
            );
            return Err(StoreError::CompactionInconsistent(volume_id));
        }

        let truncated = OpenOptions::new().write(true).open(&original_path)?;
        truncated.set_len(outcome.new_size_total)?;
        drop(truncated);

        if let Some(mut guard) = held_store_lock.take() {
            if let Ok(recalculated) = self.recalculate_current_volume() {
                guard.current_volume_id = recalculated;
            }
        }

        Ok(outcome)
    }

    /// Overwrites `<volume_id>.meta` with exactly `records`, strictly from
    /// the catalog's current view of that volume's blobs (spec §4.1).
    pub fn regenerate_meta(&self, volume_id: u32, records: &[MetaRecord]) -> StoreResult<()> {
        let path = self.meta_path(volume_id);
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
        for record in records {
            file.write_all(&record.encode())?;
        }
        file.sync_all()?;
        Ok(())
    }

    /// Parses every fixed-width record out of `<volume_id>.meta`, if present.
    pub fn read_meta_records(&self, volume_id: u32) -> StoreResult<Vec<MetaRecord>> {
        let bytes = fs::read(self.meta_path(volume_id))?;
        let rec_len = META_RECORD_LEN as usize;
        let mut out = Vec::with_capacity(bytes.len() / rec_len.max(1));
        let mut offset = 0;
        while offset + rec_len <= bytes.len() {
            out.push(MetaRecord::decode(&bytes[offset..offset + rec_len])?);
            offset += rec_len;
        }
        Ok(out)
    }

    pub fn has_meta(&self, volume_id: u32) -> bool {
        self.meta_path(volume_id).exists()
    }

    /// Walks a `.dat` file frame by frame, stopping at the first magic
    /// mismatch or truncated frame (treated as EOF). Used by rebuild when
    /// `.meta` is absent or fails to parse.
    pub fn scan_dat_frames(&self, volume_id: u32) -> StoreResult<Vec<ScannedFrame>> {
        let path = self.resolve_volume_path(volume_id)?;
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let mut offset = 0u64;
        let mut out = Vec::new();
        while offset + FRAME_HEADER_LEN + FRAME_FOOTER_LEN <= file_len {
            file.seek(SeekFrom::Start(offset))?;
            let mut header_buf = [0u8; FRAME_HEADER_LEN as usize];
            if file.read_exact(&mut header_buf).is_err() {
                break;
            }
            let header = match decode_header(&header_buf) {
                Ok(header) => header,
                Err(_) => break,
            };
            let total = frame_len(header.size);
            if offset + total > file_len {
                break;
            }
            out.push(ScannedFrame {
                blob_id: header.blob_id,
                offset,
                size: header.size,
                comp: header.comp,
            });
            offset += total;
        }
        Ok(out)
    }
}

fn parse_volume_id(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("volume_")?;
    let digits = rest.strip_suffix(".dat")?;
    digits.parse().ok()
}
