use common::{CompressionAlg, StoreError, StoreResult, FRAME_FOOTER_LEN, FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION};

/// Decoded view of one frame's header fields (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub comp: CompressionAlg,
    pub size: u64,
    pub blob_id: i64,
}

/// Encodes `payload` (already compressed by the caller, or raw if `comp` is
/// `None`) into the on-disk frame: `magic|version|comp|size|blob_id` header,
/// the payload, and a CRC32 footer over the payload bytes only.
pub fn encode_frame(blob_id: i64, payload: &[u8], comp: CompressionAlg) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN as usize + payload.len() + FRAME_FOOTER_LEN as usize);
    buf.extend_from_slice(&FRAME_MAGIC.to_be_bytes());
    buf.push(FRAME_VERSION);
    buf.push(comp.wire_tag());
    buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    buf.extend_from_slice(&blob_id.to_be_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&crc32fast::hash(payload).to_be_bytes());
    buf
}

/// Total on-disk length of a frame carrying a `size`-byte payload.
pub fn frame_len(size: u64) -> u64 {
    FRAME_HEADER_LEN + size + FRAME_FOOTER_LEN
}

/// Parses a complete frame buffer (header + payload + footer), verifying
/// magic, version and CRC32. Returns the header and a slice over the payload.
pub fn decode_frame(buf: &[u8]) -> StoreResult<(FrameHeader, &[u8])> {
    let header_len = FRAME_HEADER_LEN as usize;
    if buf.len() < header_len + FRAME_FOOTER_LEN as usize {
        return Err(StoreError::CorruptFrame("frame shorter than header+footer".into()));
    }
    let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if magic != FRAME_MAGIC {
        return Err(StoreError::CorruptFrame(format!("bad magic {magic:#010x}")));
    }
    let version = buf[4];
    if version != FRAME_VERSION {
        return Err(StoreError::CorruptFrame(format!("unsupported frame version {version}")));
    }
    let comp = CompressionAlg::from_wire_tag(buf[5])?;
    let size = u64::from_be_bytes(buf[6..14].try_into().unwrap());
    let blob_id = i64::from_be_bytes(buf[14..22].try_into().unwrap());

    let payload_start = header_len;
    let payload_end = payload_start
        .checked_add(size as usize)
        .ok_or_else(|| StoreError::CorruptFrame("size field overflows usize".into()))?;
    if buf.len() < payload_end + FRAME_FOOTER_LEN as usize {
        return Err(StoreError::CorruptFrame("frame truncated before footer".into()));
    }
    let payload = &buf[payload_start..payload_end];
    let footer_start = payload_end;
    let stored_crc = u32::from_be_bytes(buf[footer_start..footer_start + 4].try_into().unwrap());
    let actual_crc = crc32fast::hash(payload);
    if stored_crc != actual_crc {
        return Err(StoreError::CorruptFrame(format!(
            "crc mismatch: stored {stored_crc:#010x}, computed {actual_crc:#010x}"
        )));
    }

    Ok((FrameHeader { comp, size, blob_id }, payload))
}

/// Reads and validates only the header of a frame, given a header-sized
/// buffer (used while walking a `.dat` frame-by-frame during rebuild, where
/// the payload length isn't known up front).
pub fn decode_header(buf: &[u8]) -> StoreResult<FrameHeader> {
    if buf.len() < FRAME_HEADER_LEN as usize {
        return Err(StoreError::CorruptFrame("header buffer too short".into()));
    }
    let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if magic != FRAME_MAGIC {
        return Err(StoreError::CorruptFrame(format!("bad magic {magic:#010x}")));
    }
    let comp = CompressionAlg::from_wire_tag(buf[5])?;
    let size = u64::from_be_bytes(buf[6..14].try_into().unwrap());
    let blob_id = i64::from_be_bytes(buf[14..22].try_into().unwrap());
    Ok(FrameHeader { comp, size, blob_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_frame() {
        let payload = b"some compressed or raw bytes";
        let encoded = encode_frame(42, payload, CompressionAlg::Gzip);
        assert_eq!(encoded.len() as u64, frame_len(payload.len() as u64));
        let (header, decoded_payload) = decode_frame(&encoded).unwrap();
        assert_eq!(header.blob_id, 42);
        assert_eq!(header.size, payload.len() as u64);
        assert_eq!(header.comp, CompressionAlg::Gzip);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let payload = b"abcdefgh";
        let mut encoded = encode_frame(1, payload, CompressionAlg::None);
        // Flip a bit inside the payload region.
        let payload_region = FRAME_HEADER_LEN as usize;
        encoded[payload_region] ^= 0x01;
        let err = decode_frame(&encoded).unwrap_err();
        assert!(matches!(err, StoreError::CorruptFrame(_)));
    }

    #[test]
    fn bad_magic_rejected() {
        let mut encoded = encode_frame(1, b"x", CompressionAlg::None);
        encoded[0] = 0;
        assert!(decode_frame(&encoded).is_err());
    }
}
