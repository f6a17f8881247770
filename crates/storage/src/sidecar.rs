use common::{CompressionAlg, StoreError, StoreResult, META_RECORD_LEN};

/// One fixed-width `.meta` side-car record (spec §4.1): `blob_id|offset|size|
/// comp|crc32`, 29 bytes, big-endian. `offset` is the frame's position in the
/// `.dat`; `size` is `size_compressed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRecord {
    pub blob_id: i64,
    pub offset: u64,
    pub size: u64,
    pub comp: CompressionAlg,
    pub crc32: u32,
}

impl MetaRecord {
    pub fn encode(&self) -> [u8; META_RECORD_LEN as usize] {
        let mut buf = [0u8; META_RECORD_LEN as usize];
        buf[0..8].copy_from_slice(&self.blob_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.offset.to_be_bytes());
        buf[16..24].copy_from_slice(&self.size.to_be_bytes());
        buf[24] = self.comp.wire_tag();
        buf[25..29].copy_from_slice(&self.crc32.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> StoreResult<Self> {
        if buf.len() != META_RECORD_LEN as usize {
            return Err(StoreError::CorruptFrame(format!(
                "meta record has {} bytes, expected {META_RECORD_LEN}",
                buf.len()
            )));
        }
        Ok(Self {
            blob_id: i64::from_be_bytes(buf[0..8].try_into().unwrap()),
            offset: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
            size: u64::from_be_bytes(buf[16..24].try_into().unwrap()),
            comp: CompressionAlg::from_wire_tag(buf[24])?,
            crc32: u32::from_be_bytes(buf[25..29].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_meta_record() {
        let record = MetaRecord {
            blob_id: 7,
            offset: 1234,
            size: 99,
            comp: CompressionAlg::Zstd,
            crc32: 0xDEAD_BEEF,
        };
        let encoded = record.encode();
        assert_eq!(encoded.len(), META_RECORD_LEN as usize);
        let decoded = MetaRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(MetaRecord::decode(&[0u8; 10]).is_err());
    }
}
