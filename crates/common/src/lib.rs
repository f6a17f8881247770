use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{StoreError, StoreResult};

/// Magic header for every on-disk volume frame: ASCII "CUMU".
pub const FRAME_MAGIC: u32 = 0x4355_4D55;
pub const FRAME_VERSION: u8 = 1;

/// Fixed byte length of a frame header (`magic|version|comp|size|blob_id`).
pub const FRAME_HEADER_LEN: u64 = 22;
/// Fixed byte length of the CRC32 footer.
pub const FRAME_FOOTER_LEN: u64 = 4;
/// Fixed byte length of one `.meta` side-car record.
pub const META_RECORD_LEN: u64 = 29;

/// Selected compression algorithm for a stored Blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlg {
    None,
    Gzip,
    Zstd,
}

impl CompressionAlg {
    /// Maps to the `comp` byte of the on-disk frame header.
    pub fn wire_tag(self) -> u8 {
        match self {
            CompressionAlg::None => 0,
            CompressionAlg::Gzip => 1,
            CompressionAlg::Zstd => 2,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Result<Self, StoreError> {
        match tag {
            0 => Ok(CompressionAlg::None),
            1 => Ok(CompressionAlg::Gzip),
            2 => Ok(CompressionAlg::Zstd),
            other => Err(StoreError::CorruptFrame(format!(
                "unknown compression tag {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompressionAlg::None => "none",
            CompressionAlg::Gzip => "gzip",
            CompressionAlg::Zstd => "zstd",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "none" => Some(CompressionAlg::None),
            "gzip" => Some(CompressionAlg::Gzip),
            "zstd" => Some(CompressionAlg::Zstd),
            _ => None,
        }
    }
}

/// Operator-selected compression mode, `USE_COMPRESS` in the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UseCompress {
    #[default]
    Auto,
    Gzip,
    Zstd,
    None,
}

impl UseCompress {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Auto" => Some(UseCompress::Auto),
            "Gzip" => Some(UseCompress::Gzip),
            "Zstd" => Some(UseCompress::Zstd),
            "None" => Some(UseCompress::None),
            _ => None,
        }
    }
}

/// Intern row for a MIME/category/subtype triple. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileType {
    pub id: i64,
    pub mime: String,
    pub category: String,
    pub subtype: String,
}

/// One physical, content-addressed record on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub id: i64,
    pub hash: String,
    pub volume_id: u32,
    pub offset: u64,
    pub size_raw: u64,
    pub size_compressed: u64,
    pub compression_alg: CompressionAlg,
    pub file_type_id: i64,
}

impl Blob {
    /// Total length of this blob's frame on disk: header + payload + footer.
    pub fn frame_len(&self) -> u64 {
        FRAME_HEADER_LEN + self.size_compressed + FRAME_FOOTER_LEN
    }
}

/// A logical, user-visible file: a name bound to a Blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub name: String,
    pub blob_id: i64,
    pub old_cumulus_id: Option<i64>,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub tags: String,
}

/// Aggregate size bookkeeping for one volume file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeStats {
    pub id: u32,
    pub size_total: u64,
    pub size_deleted: u64,
}

impl VolumeStats {
    /// `size_deleted / size_total * 100`, the fragmentation ratio of §4.5.
    pub fn fragmentation_pct(&self) -> f64 {
        if self.size_total == 0 {
            0.0
        } else {
            (self.size_deleted as f64 / self.size_total as f64) * 100.0
        }
    }
}

/// Aggregate counters returned by `get_storage_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_bytes: u64,
    pub deleted_bytes: u64,
}
