use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// Hex-encoded BLAKE2b-256 digest of `data`, the content hash backing the
/// catalog's `hash → blob` lookup (spec §3's "Blob.hash").
pub fn hash_content(data: &[u8]) -> String {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Incremental BLAKE2b-256 hasher for the ingest pipeline's spool-and-hash
/// tee (spec §4.2 step 1): fed chunk by chunk as the raw stream is written
/// to its spool file, so the full payload never has to sit in memory just to
/// be hashed.
#[derive(Default)]
pub struct StreamingHasher(Blake2b<U32>);

impl StreamingHasher {
    pub fn new() -> Self {
        Self(Blake2b::<U32>::new())
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    /// Consumes the hasher, returning its hex-encoded digest.
    pub fn finish_hex(self) -> String {
        hex::encode(self.0.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_hash_identically() {
        let a = hash_content(b"hello world");
        let b = hash_content(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = hash_content(b"hello world");
        let b = hash_content(b"hello worlds");
        assert_ne!(a, b);
    }

    #[test]
    fn digest_is_32_bytes_hex_encoded() {
        let digest = hash_content(b"object storage");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn streaming_hasher_matches_whole_buffer_hash() {
        let mut streaming = StreamingHasher::new();
        for chunk in b"hello world".chunks(3) {
            streaming.update(chunk);
        }
        assert_eq!(streaming.finish_hex(), hash_content(b"hello world"));
    }
}
