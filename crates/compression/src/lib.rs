mod error;

use std::io::Write;

use common::{CompressionAlg, UseCompress};
use tracing::{debug, instrument};

pub use error::CompressionError;

type CompressionOpResult<T> = std::result::Result<T, CompressionError>;

/// Compress `data` with gzip at the default level.
#[instrument(skip(data), fields(algorithm = "gzip", input_len = data.len()))]
pub fn compress_gzip(data: &[u8]) -> CompressionOpResult<Vec<u8>> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|err| CompressionError::io("gzip", err))?;
    let compressed = encoder
        .finish()
        .map_err(|err| CompressionError::io("gzip", err))?;
    debug!(compressed_len = compressed.len(), "gzip compression complete");
    Ok(compressed)
}

/// Decompress a gzip payload.
pub fn decompress_gzip(data: &[u8]) -> CompressionOpResult<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    std::io::copy(&mut decoder, &mut out).map_err(|err| CompressionError::io("gzip", err))?;
    Ok(out)
}

/// Compress `data` with zstd at the default level.
#[instrument(skip(data), fields(algorithm = "zstd", input_len = data.len()))]
pub fn compress_zstd(data: &[u8]) -> CompressionOpResult<Vec<u8>> {
    zstd::encode_all(data, 0).map_err(|err| CompressionError::codec("zstd", err.to_string()))
}

/// Decompress a zstd payload.
pub fn decompress_zstd(data: &[u8]) -> CompressionOpResult<Vec<u8>> {
    zstd::decode_all(data).map_err(|err| CompressionError::codec("zstd", err.to_string()))
}

/// Opens a gzip encoder writing into `sink`, for callers that need to tee a
/// stream through compression incrementally instead of holding the whole
/// payload in memory (ingest pipeline spool, spec §4.2 step 1).
pub fn gzip_encoder<W: Write>(sink: W) -> flate2::write::GzEncoder<W> {
    flate2::write::GzEncoder::new(sink, flate2::Compression::default())
}

/// Opens a zstd encoder writing into `sink`, at the default level, for the
/// same streaming tee use as [`gzip_encoder`].
pub fn zstd_encoder<W: Write>(sink: W) -> CompressionOpResult<zstd::Encoder<'static, W>> {
    zstd::Encoder::new(sink, 0).map_err(|err| CompressionError::io("zstd", err))
}

/// A streaming gzip-or-zstd encoder, named so callers outside this crate can
/// hold one without depending on `flate2`/`zstd` directly.
pub enum StreamEncoder<W: Write> {
    Gzip(flate2::write::GzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> Write for StreamEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            StreamEncoder::Gzip(encoder) => encoder.write(buf),
            StreamEncoder::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            StreamEncoder::Gzip(encoder) => encoder.flush(),
            StreamEncoder::Zstd(encoder) => encoder.flush(),
        }
    }
}

impl<W: Write> StreamEncoder<W> {
    /// Flushes the trailing codec framing and returns the underlying sink.
    pub fn finish(self) -> CompressionOpResult<W> {
        match self {
            StreamEncoder::Gzip(encoder) => {
                encoder.finish().map_err(|err| CompressionError::io("gzip", err))
            }
            StreamEncoder::Zstd(encoder) => {
                encoder.finish().map_err(|err| CompressionError::io("zstd", err))
            }
        }
    }
}

/// Opens a [`StreamEncoder`] for `alg`. `alg` must be `Gzip` or `Zstd` — the
/// ingest pipeline never needs a streaming encoder in `None` mode, since
/// that mode spools the raw stream directly with no codec in front of it.
pub fn stream_encoder<W: Write>(sink: W, alg: CompressionAlg) -> CompressionOpResult<StreamEncoder<W>> {
    match alg {
        CompressionAlg::Gzip => Ok(StreamEncoder::Gzip(gzip_encoder(sink))),
        CompressionAlg::Zstd => Ok(StreamEncoder::Zstd(zstd_encoder(sink)?)),
        CompressionAlg::None => Err(CompressionError::invalid_mode(
            "stream_encoder requires Gzip or Zstd",
        )),
    }
}

/// Result of running the adaptive compression decision over one payload.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub original_size: u64,
    pub compressed_size: u64,
    pub algorithm: CompressionAlg,
    /// Bytes to persist: either the compressed form, or the original when
    /// compression was rejected or not requested.
    pub payload: Vec<u8>,
}

impl CompressionResult {
    pub fn saved_pct(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        ((self.original_size as f64 - self.compressed_size as f64) / self.original_size as f64)
            * 100.0
    }
}

/// Runs the mode-dependent compression decision of the ingest pipeline's
/// compression step: `Auto` compares a zstd-compressed candidate against the
/// raw payload and keeps whichever satisfies the minimum-ratio threshold;
/// `Gzip`/`Zstd` always keep the compressed form; `None` always keeps raw.
pub fn decide(
    raw: &[u8],
    mode: UseCompress,
    min_ratio_pct: f64,
) -> CompressionOpResult<CompressionResult> {
    match mode {
        UseCompress::None => Ok(CompressionResult {
            original_size: raw.len() as u64,
            compressed_size: raw.len() as u64,
            algorithm: CompressionAlg::None,
            payload: raw.to_vec(),
        }),
        UseCompress::Gzip => {
            let compressed = compress_gzip(raw)?;
            Ok(CompressionResult {
                original_size: raw.len() as u64,
                compressed_size: compressed.len() as u64,
                algorithm: CompressionAlg::Gzip,
                payload: compressed,
            })
        }
        UseCompress::Zstd => {
            let compressed = compress_zstd(raw)?;
            Ok(CompressionResult {
                original_size: raw.len() as u64,
                compressed_size: compressed.len() as u64,
                algorithm: CompressionAlg::Zstd,
                payload: compressed,
            })
        }
        UseCompress::Auto => {
            let compressed = compress_zstd(raw)?;
            let original_size = raw.len() as u64;
            let compressed_size = compressed.len() as u64;
            let saved_pct = if original_size == 0 {
                0.0
            } else {
                ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
            };
            if saved_pct >= min_ratio_pct {
                Ok(CompressionResult {
                    original_size,
                    compressed_size,
                    algorithm: CompressionAlg::Zstd,
                    payload: compressed,
                })
            } else {
                Ok(CompressionResult {
                    original_size,
                    compressed_size: original_size,
                    algorithm: CompressionAlg::None,
                    payload: raw.to_vec(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_gzip() {
        let original = b"object storage roundtrip test ".repeat(200);
        let compressed = compress_gzip(&original).unwrap();
        let decompressed = decompress_gzip(&compressed).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn roundtrip_zstd() {
        let original = b"object storage zstd roundtrip ".repeat(200);
        let compressed = compress_zstd(&original).unwrap();
        let decompressed = decompress_zstd(&compressed).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    fn auto_mode_keeps_compressed_when_ratio_met() {
        let zeros = vec![0u8; 1024 * 1024];
        let result = decide(&zeros, UseCompress::Auto, 10.0).unwrap();
        assert_eq!(result.algorithm, CompressionAlg::Zstd);
        assert!(result.compressed_size < result.original_size);
    }

    #[test]
    fn auto_mode_keeps_raw_when_ratio_not_met() {
        // Tiny payload: zstd framing overhead means nothing is saved.
        let small = b"hello world";
        let result = decide(small, UseCompress::Auto, 10.0).unwrap();
        assert_eq!(result.algorithm, CompressionAlg::None);
        assert_eq!(result.compressed_size, small.len() as u64);
    }

    #[test]
    fn explicit_none_mode_never_compresses() {
        let zeros = vec![0u8; 4096];
        let result = decide(&zeros, UseCompress::None, 10.0).unwrap();
        assert_eq!(result.algorithm, CompressionAlg::None);
    }

    #[test]
    fn explicit_gzip_mode_always_keeps_compressed_form() {
        let data = b"abababababababababababababab".repeat(64);
        let result = decide(&data, UseCompress::Gzip, 10.0).unwrap();
        assert_eq!(result.algorithm, CompressionAlg::Gzip);
    }

    #[test]
    fn streaming_gzip_encoder_matches_one_shot_compression() {
        let original = b"streamed gzip tee test ".repeat(100);
        let mut sink = Vec::new();
        {
            let mut encoder = gzip_encoder(&mut sink);
            encoder.write_all(&original).unwrap();
            encoder.finish().unwrap();
        }
        let decompressed = decompress_gzip(&sink).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn streaming_zstd_encoder_matches_one_shot_compression() {
        let original = b"streamed zstd tee test ".repeat(100);
        let mut sink = Vec::new();
        {
            let mut encoder = zstd_encoder(&mut sink).unwrap();
            encoder.write_all(&original).unwrap();
            encoder.finish().unwrap();
        }
        let decompressed = decompress_zstd(&sink).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn stream_encoder_dispatches_to_the_requested_codec() {
        let original = b"stream encoder dispatch test ".repeat(100);

        let mut gzip_sink = Vec::new();
        {
            let mut encoder = stream_encoder(&mut gzip_sink, CompressionAlg::Gzip).unwrap();
            encoder.write_all(&original).unwrap();
            encoder.finish().unwrap();
        }
        assert_eq!(decompress_gzip(&gzip_sink).unwrap(), original);

        let mut zstd_sink = Vec::new();
        {
            let mut encoder = stream_encoder(&mut zstd_sink, CompressionAlg::Zstd).unwrap();
            encoder.write_all(&original).unwrap();
            encoder.finish().unwrap();
        }
        assert_eq!(decompress_zstd(&zstd_sink).unwrap(), original);

        assert!(stream_encoder(Vec::new(), CompressionAlg::None).is_err());
    }
}
