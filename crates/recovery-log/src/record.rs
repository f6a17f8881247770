use std::io::{self, Read};

use uuid::Uuid;

const FLAG_OLD_ID: u8 = 1 << 0;
const FLAG_EXPIRES: u8 = 1 << 1;
const FLAG_TAGS: u8 = 1 << 2;

/// One append-only recovery-log entry, bit-exact with spec §4.4:
/// `[len:u32][id_len:u16][id][blob_id:i64][created_at_nanos:u64][flags:u8]`
/// followed by whichever of `old_id`/`expires_nanos`/`tags` the flags name,
/// then `[name_len:u16][name]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRecord {
    pub id: Uuid,
    pub blob_id: i64,
    pub created_at_unix_nanos: u64,
    pub old_cumulus_id: Option<i64>,
    pub expires_unix_nanos: Option<u64>,
    pub tags: Option<String>,
    pub name: String,
}

impl RecoveryRecord {
    pub fn encode(&self) -> Vec<u8> {
        let id_bytes = self.id.as_bytes();
        let mut flags = 0u8;
        if self.old_cumulus_id.is_some() {
            flags |= FLAG_OLD_ID;
        }
        if self.expires_unix_nanos.is_some() {
            flags |= FLAG_EXPIRES;
        }
        if self.tags.is_some() {
            flags |= FLAG_TAGS;
        }

        let mut body = Vec::new();
        body.extend_from_slice(&(id_bytes.len() as u16).to_be_bytes());
        body.extend_from_slice(id_bytes);
        body.extend_from_slice(&self.blob_id.to_be_bytes());
        body.extend_from_slice(&self.created_at_unix_nanos.to_be_bytes());
        body.push(flags);
        if let Some(old_id) = self.old_cumulus_id {
            body.extend_from_slice(&old_id.to_be_bytes());
        }
        if let Some(expires) = self.expires_unix_nanos {
            body.extend_from_slice(&expires.to_be_bytes());
        }
        if let Some(tags) = &self.tags {
            let tag_bytes = tags.as_bytes();
            body.extend_from_slice(&(tag_bytes.len() as u16).to_be_bytes());
            body.extend_from_slice(tag_bytes);
        }
        let name_bytes = self.name.as_bytes();
        body.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
        body.extend_from_slice(name_bytes);

        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Reads one record from `reader`. Returns `Ok(None)` at a clean EOF
    /// *or* at a partial length-prefix/body — the crash-truncated-final-
    /// record case spec §4.4 calls out explicitly.
    pub fn decode<R: Read>(reader: &mut R) -> io::Result<Option<Self>> {
        let mut len_buf = [0u8; 4];
        if !read_exact_or_eof(reader, &mut len_buf)? {
            return Ok(None);
        }
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        if !read_exact_or_eof(reader, &mut body)? {
            return Ok(None);
        }

        let mut cursor = 0usize;
        let id_len = u16::from_be_bytes(take(&body, &mut cursor, 2)?.try_into().unwrap()) as usize;
        let id_bytes = take(&body, &mut cursor, id_len)?;
        let id = Uuid::from_slice(id_bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        let blob_id = i64::from_be_bytes(take(&body, &mut cursor, 8)?.try_into().unwrap());
        let created_at_unix_nanos = u64::from_be_bytes(take(&body, &mut cursor, 8)?.try_into().unwrap());
        let flags = take(&body, &mut cursor, 1)?[0];

        let old_cumulus_id = if flags & FLAG_OLD_ID != 0 {
            Some(i64::from_be_bytes(take(&body, &mut cursor, 8)?.try_into().unwrap()))
        } else {
            None
        };
        let expires_unix_nanos = if flags & FLAG_EXPIRES != 0 {
            Some(u64::from_be_bytes(take(&body, &mut cursor, 8)?.try_into().unwrap()))
        } else {
            None
        };
        let tags = if flags & FLAG_TAGS != 0 {
            let tag_len = u16::from_be_bytes(take(&body, &mut cursor, 2)?.try_into().unwrap()) as usize;
            Some(String::from_utf8_lossy(take(&body, &mut cursor, tag_len)?).into_owned())
        } else {
            None
        };
        let name_len = u16::from_be_bytes(take(&body, &mut cursor, 2)?.try_into().unwrap()) as usize;
        let name = String::from_utf8_lossy(take(&body, &mut cursor, name_len)?).into_owned();

        Ok(Some(RecoveryRecord {
            id,
            blob_id,
            created_at_unix_nanos,
            old_cumulus_id,
            expires_unix_nanos,
            tags,
            name,
        }))
    }
}

fn take<'a>(body: &'a [u8], cursor: &mut usize, n: usize) -> io::Result<&'a [u8]> {
    let end = cursor
        .checked_add(n)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "recovery record field overflows"))?;
    if end > body.len() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "recovery record body truncated"));
    }
    let slice = &body[*cursor..end];
    *cursor = end;
    Ok(slice)
}

/// Like `read_exact`, but a zero-byte read (clean EOF) or a short read
/// partway through `buf` both return `Ok(false)` instead of erroring — both
/// are "nothing more to recover" from this log's point of view.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            // EOF before `buf` is full: a clean EOF if nothing was read yet,
            // or a crash-truncated final record if we were partway through
            // one — both mean "nothing more to recover" here.
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}
