//! The Ingest Pipeline (spec §4.2): spool, hash, detect type, decide on
//! compression, dedup against the catalog, write the volume frame, and
//! record the new logical File — both in the catalog and the recovery log.

mod sniff;

use std::io::{Read, Seek, SeekFrom, Write};

use catalog::Catalog;
use common::{CompressionAlg, FileRecord, StoreError, StoreResult, UseCompress};
use recovery_log::{RecoveryLog, RecoveryRecord};
use storage::VolumeStore;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Bytes of the raw stream sniffed for MIME detection (spec §4.2 step 2).
const HEAD_SNIFF_LEN: usize = 12_000;

/// Everything the caller knows about an upload besides its bytes.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub filename: String,
    pub content_type_hint: Option<String>,
    pub old_cumulus_id: Option<i64>,
    pub expires_at: Option<i64>,
    pub tags: String,
}

/// The File row created for a completed upload, plus the MIME type detected
/// along the way (useful to a collaborator answering an upload request
/// without a second catalog round trip).
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub file: FileRecord,
    pub mime: String,
    pub deduplicated: bool,
}

/// A downloaded file's bytes plus the metadata needed to answer a request.
pub struct DownloadOutcome {
    pub bytes: Vec<u8>,
    pub name: String,
    pub mime: String,
}

/// Struct-of-collaborators pipeline: the volume store, catalog and recovery
/// log each own their own locking and are safe to share behind an `Arc`.
pub struct Pipeline {
    volumes: std::sync::Arc<VolumeStore>,
    catalog: std::sync::Arc<Catalog>,
    recovery_log: std::sync::Arc<RecoveryLog>,
    use_compress: UseCompress,
    min_compression_pct: f64,
}

impl Pipeline {
    pub fn new(
        volumes: std::sync::Arc<VolumeStore>,
        catalog: std::sync::Arc<Catalog>,
        recovery_log: std::sync::Arc<RecoveryLog>,
        use_compress: UseCompress,
        min_compression_pct: f64,
    ) -> Self {
        Self {
            volumes,
            catalog,
            recovery_log,
            use_compress,
            min_compression_pct,
        }
    }

    /// Tees `reader` in a single pass into a BLAKE2b-256 hasher and whichever
    /// spool file(s) the configured mode needs (spec §4.2 step 1): raw only
    /// in `None` mode, the compressed form only in `Gzip`/`Zstd` mode, or
    /// both in `Auto` mode. Then sniffs the type, decides on compression,
    /// dedups against the catalog, and — unless an identical blob already
    /// exists — writes a new volume frame. Always allocates a fresh logical
    /// File referencing whichever blob applies.
    #[instrument(skip(self, reader, request), fields(filename = %request.filename))]
    pub fn ingest(&self, mut reader: impl Read, request: UploadRequest) -> StoreResult<IngestOutcome> {
        let spool = match self.use_compress {
            UseCompress::None => IngestSpool::Raw(tempfile::tempfile()?),
            UseCompress::Gzip => IngestSpool::Compressed(
                compression::stream_encoder(tempfile::tempfile()?, CompressionAlg::Gzip)
                    .map_err(compression_err)?,
                CompressionAlg::Gzip,
            ),
            UseCompress::Zstd => IngestSpool::Compressed(
                compression::stream_encoder(tempfile::tempfile()?, CompressionAlg::Zstd)
                    .map_err(compression_err)?,
                CompressionAlg::Zstd,
            ),
            UseCompress::Auto => IngestSpool::RawAndZstd(
                tempfile::tempfile()?,
                compression::stream_encoder(tempfile::tempfile()?, CompressionAlg::Zstd)
                    .map_err(compression_err)?,
            ),
        };

        let mut tee = IngestTee {
            hasher: dedup::StreamingHasher::new(),
            head: Vec::new(),
            bytes_written: 0,
            spool,
        };
        std::io::copy(&mut reader, &mut tee)?;
        let IngestTee { hasher, head, bytes_written, spool } = tee;
        let hash = hasher.finish_hex();
        let raw_len = bytes_written;

        let (mime, category, subtype) =
            sniff::detect(&head, request.content_type_hint.as_deref(), &request.filename);

        if let Some(blob_id) = self.catalog.get_blob_id_by_hash(&hash)? {
            let file = self.finish_file(blob_id, &request)?;
            return Ok(IngestOutcome { file, mime, deduplicated: true });
        }

        let decision = self.finish_compression(raw_len, spool)?;

        let blob_id = self.catalog.create_blob(&hash)?;
        let (volume_id, offset) = self.volumes.append(blob_id, &decision.payload, decision.algorithm)?;
        let file_type_id = self.catalog.get_or_create_file_type(&mime, &category, &subtype)?;
        self.catalog.update_blob_location(
            blob_id,
            volume_id,
            offset,
            decision.original_size,
            decision.compressed_size,
            decision.algorithm,
            file_type_id,
        )?;

        let file = self.finish_file(blob_id, &request)?;
        Ok(IngestOutcome { file, mime, deduplicated: false })
    }

    /// `catalog lookup → volume read → decompress`, the inverse of `ingest`.
    #[instrument(skip(self))]
    pub fn download(&self, id: Uuid) -> StoreResult<DownloadOutcome> {
        let file = self.catalog.get_file(id)?;
        self.download_blob(file)
    }

    pub fn download_by_old_id(&self, old_id: i64) -> StoreResult<DownloadOutcome> {
        let file = self.catalog.get_file_by_old_id(old_id)?;
        self.download_blob(file)
    }

    fn download_blob(&self, file: FileRecord) -> StoreResult<DownloadOutcome> {
        let blob = self.catalog.get_blob(file.blob_id)?;
        let raw = self.volumes.read(blob.volume_id, blob.offset, blob.size_compressed)?;
        let bytes = decompress(&raw, blob.compression_alg)?;
        let mime = self.catalog.get_file_type_mime(blob.file_type_id)?;
        Ok(DownloadOutcome { bytes, name: file.name, mime })
    }

    pub fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.catalog.delete_file(id)
    }

    /// Allocates the File row and appends to the recovery log. Per spec
    /// §4.2, a recovery-log append failure after a successful catalog
    /// insert is logged and swallowed rather than failing the upload — the
    /// catalog is already the source of truth.
    fn finish_file(&self, blob_id: i64, request: &UploadRequest) -> StoreResult<FileRecord> {
        let now = now_unix();
        let file = FileRecord {
            id: Uuid::new_v4(),
            name: request.filename.clone(),
            blob_id,
            old_cumulus_id: request.old_cumulus_id,
            expires_at: request.expires_at,
            created_at: now,
            tags: request.tags.clone(),
        };
        self.catalog.save_file(&file)?;

        let record = RecoveryRecord {
            id: file.id,
            blob_id: file.blob_id,
            created_at_unix_nanos: now as u64 * 1_000_000_000,
            old_cumulus_id: file.old_cumulus_id,
            expires_unix_nanos: file.expires_at.map(|secs| secs as u64 * 1_000_000_000),
            tags: if file.tags.is_empty() { None } else { Some(file.tags.clone()) },
            name: file.name.clone(),
        };
        if let Err(err) = self.recovery_log.append(&record) {
            warn!(file_id = %file.id, error = %err, "recovery log append failed after catalog insert");
        }

        Ok(file)
    }

    /// Finishes whichever spool(s) `ingest` opened and runs the mode-dependent
    /// compression decision (spec §4.2 step 3): `None` always keeps the raw
    /// spool, `Gzip`/`Zstd` always keep the already-compressed spool, and
    /// `Auto` compares the zstd spool's size against the raw spool's and
    /// keeps whichever satisfies `min_compression_pct`. Only the winning
    /// form is ever read back fully, to hand to
    /// [`storage::VolumeStore::append`].
    fn finish_compression(&self, raw_len: u64, spool: IngestSpool) -> StoreResult<compression::CompressionResult> {
        match spool {
            IngestSpool::Raw(mut raw) => Ok(compression::CompressionResult {
                original_size: raw_len,
                compressed_size: raw_len,
                algorithm: CompressionAlg::None,
                payload: read_whole(&mut raw)?,
            }),
            IngestSpool::Compressed(encoder, algorithm) => {
                let mut compressed = encoder.finish().map_err(compression_err)?;
                let compressed_size = compressed.metadata()?.len();
                Ok(compression::CompressionResult {
                    original_size: raw_len,
                    compressed_size,
                    algorithm,
                    payload: read_whole(&mut compressed)?,
                })
            }
            IngestSpool::RawAndZstd(mut raw, encoder) => {
                let mut compressed = encoder.finish().map_err(compression_err)?;
                let compressed_size = compressed.metadata()?.len();
                let saved_pct = if raw_len == 0 {
                    0.0
                } else {
                    ((raw_len as f64 - compressed_size as f64) / raw_len as f64) * 100.0
                };
                if saved_pct >= self.min_compression_pct {
                    Ok(compression::CompressionResult {
                        original_size: raw_len,
                        compressed_size,
                        algorithm: CompressionAlg::Zstd,
                        payload: read_whole(&mut compressed)?,
                    })
                } else {
                    Ok(compression::CompressionResult {
                        original_size: raw_len,
                        compressed_size: raw_len,
                        algorithm: CompressionAlg::None,
                        payload: read_whole(&mut raw)?,
                    })
                }
            }
        }
    }
}

/// The spool destination(s) an in-progress `ingest` writes to, chosen up
/// front from the configured compression mode: raw only, compressed only
/// (`Gzip`/`Zstd` never spool a raw copy), or both (`Auto`, which needs the
/// raw size and the compressed candidate to decide between them).
enum IngestSpool {
    Raw(std::fs::File),
    Compressed(compression::StreamEncoder<std::fs::File>, CompressionAlg),
    RawAndZstd(std::fs::File, compression::StreamEncoder<std::fs::File>),
}

/// Tees every byte written through it into a BLAKE2b-256 hasher, a bounded
/// in-memory head buffer for MIME sniffing, and the active `IngestSpool` —
/// all in the same pass over the incoming reader, so the payload is never
/// buffered whole before being routed to disk.
struct IngestTee {
    hasher: dedup::StreamingHasher,
    head: Vec<u8>,
    bytes_written: u64,
    spool: IngestSpool,
}

impl Write for IngestTee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.hasher.update(buf);
        self.bytes_written += buf.len() as u64;
        if self.head.len() < HEAD_SNIFF_LEN {
            let take = (HEAD_SNIFF_LEN - self.head.len()).min(buf.len());
            self.head.extend_from_slice(&buf[..take]);
        }
        match &mut self.spool {
            IngestSpool::Raw(raw) => raw.write_all(buf)?,
            IngestSpool::Compressed(encoder, _) => encoder.write_all(buf)?,
            IngestSpool::RawAndZstd(raw, encoder) => {
                raw.write_all(buf)?;
                encoder.write_all(buf)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.spool {
            IngestSpool::Raw(raw) => raw.flush(),
            IngestSpool::Compressed(encoder, _) => encoder.flush(),
            IngestSpool::RawAndZstd(raw, encoder) => {
                raw.flush()?;
                encoder.flush()
            }
        }
    }
}

fn compression_err(err: compression::CompressionError) -> StoreError {
    StoreError::BadRequest(err.to_string())
}

/// Rewinds `file` and reads it fully into memory — the one buffering point
/// the pipeline can't avoid, since [`storage::VolumeStore::append`] takes
/// the whole frame payload as a slice.
fn read_whole(file: &mut std::fs::File) -> StoreResult<Vec<u8>> {
    file.seek(SeekFrom::Start(0))?;
    let len = file.metadata()?.len() as usize;
    let mut buf = Vec::with_capacity(len);
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

fn decompress(raw: &[u8], alg: CompressionAlg) -> StoreResult<Vec<u8>> {
    match alg {
        CompressionAlg::None => Ok(raw.to_vec()),
        CompressionAlg::Gzip => {
            compression::decompress_gzip(raw).map_err(|err| StoreError::CorruptFrame(err.to_string()))
        }
        CompressionAlg::Zstd => {
            compression::decompress_zstd(raw).map_err(|err| StoreError::CorruptFrame(err.to_string()))
        }
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}
