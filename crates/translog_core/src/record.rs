//! On-disk framing of the store header and message records.
//!
//! ```text
//! header  | magic "TLOG" (4) | format u16 (2) | version_len u16 (2) | version (N) | crc32 (4) |
//! record  | magic "TMSG" (4) | body_len u32 (4) | body (N) | crc32 (4) |
//! body    | sec i64 | nsec u32 | topic_len u16 | topic | type_len u16 | type | data_len u32 | data |
//! ```
//!
//! All integers are little-endian. Both checksums cover every byte that
//! precedes them in the frame.

use crate::error::{LogError, LogResult};
use crate::types::Timestamp;

/// Magic bytes opening a store.
pub(crate) const STORE_MAGIC: [u8; 4] = *b"TLOG";

/// Layout revision of the header frame itself.
pub(crate) const HEADER_FORMAT: u16 = 1;

/// magic (4) + format (2) + version_len (2)
pub(crate) const HEADER_PREFIX_SIZE: usize = 8;

/// Magic bytes opening each message record.
pub(crate) const RECORD_MAGIC: [u8; 4] = *b"TMSG";

/// magic (4) + body_len (4)
pub(crate) const ENVELOPE_SIZE: usize = 8;

pub(crate) const CRC_SIZE: usize = 4;

/// Fixed part of a body: sec + nsec + topic_len + type_len + data_len.
const BODY_FIXED_SIZE: usize = 8 + 4 + 2 + 2 + 4;

/// One stored message, fully decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Capture time.
    pub time: Timestamp,
    /// Topic the message was published on.
    pub topic: String,
    /// Wire type of the payload.
    pub type_name: String,
    /// Opaque payload.
    pub data: Vec<u8>,
}

fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Frames the store header for `version`.
pub(crate) fn encode_header(version: &str) -> LogResult<Vec<u8>> {
    let version_len = u16::try_from(version.len())
        .map_err(|_| LogError::invalid_argument("schema version string too long"))?;

    let mut buf = Vec::with_capacity(HEADER_PREFIX_SIZE + version.len() + CRC_SIZE);
    buf.extend_from_slice(&STORE_MAGIC);
    buf.extend_from_slice(&HEADER_FORMAT.to_le_bytes());
    buf.extend_from_slice(&version_len.to_le_bytes());
    buf.extend_from_slice(version.as_bytes());
    let crc = checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Validates the fixed header prefix and returns the version string length.
pub(crate) fn decode_header_prefix(prefix: &[u8]) -> LogResult<usize> {
    if prefix.len() < HEADER_PREFIX_SIZE || prefix[0..4] != STORE_MAGIC {
        return Err(LogError::invalid_format("not a translog store (bad magic)"));
    }
    let format = u16::from_le_bytes([prefix[4], prefix[5]]);
    if format != HEADER_FORMAT {
        return Err(LogError::invalid_format(format!(
            "unsupported header format {format}"
        )));
    }
    Ok(u16::from_le_bytes([prefix[6], prefix[7]]) as usize)
}

/// Checks the complete header frame and returns the schema version it names.
pub(crate) fn decode_header(frame: &[u8]) -> LogResult<String> {
    let version_len = decode_header_prefix(frame)?;
    let version_end = HEADER_PREFIX_SIZE + version_len;
    if frame.len() != version_end + CRC_SIZE {
        return Err(LogError::invalid_format("truncated store header"));
    }

    let stored = read_u32_at(frame, version_end);
    let actual = checksum(&frame[..version_end]);
    if stored != actual {
        return Err(LogError::ChecksumMismatch {
            offset: 0,
            expected: stored,
            actual,
        });
    }

    String::from_utf8(frame[HEADER_PREFIX_SIZE..version_end].to_vec())
        .map_err(|_| LogError::invalid_format("schema version is not UTF-8"))
}

/// Frames one message record.
///
/// # Errors
///
/// Fails if the topic or type name exceed 64 KiB or the record would exceed
/// the 4 GiB body limit.
pub(crate) fn encode_record(
    time: Timestamp,
    topic: &str,
    type_name: &str,
    data: &[u8],
) -> LogResult<Vec<u8>> {
    let topic_len = u16::try_from(topic.len())
        .map_err(|_| LogError::invalid_argument("topic name longer than 65535 bytes"))?;
    let type_len = u16::try_from(type_name.len())
        .map_err(|_| LogError::invalid_argument("type name longer than 65535 bytes"))?;
    let data_len = u32::try_from(data.len())
        .map_err(|_| LogError::invalid_argument("payload larger than 4 GiB"))?;
    let body_len = BODY_FIXED_SIZE + topic.len() + type_name.len() + data.len();
    let body_len = u32::try_from(body_len)
        .map_err(|_| LogError::invalid_argument("record larger than 4 GiB"))?;

    let mut buf = Vec::with_capacity(ENVELOPE_SIZE + body_len as usize + CRC_SIZE);
    buf.extend_from_slice(&RECORD_MAGIC);
    buf.extend_from_slice(&body_len.to_le_bytes());

    buf.extend_from_slice(&time.sec().to_le_bytes());
    buf.extend_from_slice(&time.nsec().to_le_bytes());
    buf.extend_from_slice(&topic_len.to_le_bytes());
    buf.extend_from_slice(topic.as_bytes());
    buf.extend_from_slice(&type_len.to_le_bytes());
    buf.extend_from_slice(type_name.as_bytes());
    buf.extend_from_slice(&data_len.to_le_bytes());
    buf.extend_from_slice(data);

    let crc = checksum(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Validates the envelope magic and returns the body length.
pub(crate) fn decode_envelope(offset: u64, envelope: &[u8]) -> LogResult<usize> {
    if envelope.len() < ENVELOPE_SIZE || envelope[0..4] != RECORD_MAGIC {
        return Err(LogError::corruption(offset, "invalid record magic"));
    }
    let body_len = read_u32_at(envelope, 4) as usize;
    if body_len < BODY_FIXED_SIZE {
        return Err(LogError::corruption(
            offset,
            format!("body length {body_len} shorter than the fixed fields"),
        ));
    }
    Ok(body_len)
}

/// Verifies a complete frame (envelope, body, checksum) and decodes its body.
pub(crate) fn decode_frame(offset: u64, frame: &[u8]) -> LogResult<MessageRecord> {
    let body_len = decode_envelope(offset, frame)?;
    let body_end = ENVELOPE_SIZE + body_len;
    if frame.len() != body_end + CRC_SIZE {
        return Err(LogError::corruption(
            offset,
            format!(
                "frame length {} does not match body length {body_len}",
                frame.len()
            ),
        ));
    }

    let stored = read_u32_at(frame, body_end);
    let actual = checksum(&frame[..body_end]);
    if stored != actual {
        return Err(LogError::ChecksumMismatch {
            offset,
            expected: stored,
            actual,
        });
    }

    decode_body(offset, &frame[ENVELOPE_SIZE..body_end])
}

fn decode_body(offset: u64, body: &[u8]) -> LogResult<MessageRecord> {
    let mut cursor = 0usize;

    let mut take = |len: usize| -> LogResult<&[u8]> {
        if cursor + len > body.len() {
            return Err(LogError::corruption(offset, "unexpected end of record body"));
        }
        let slice = &body[cursor..cursor + len];
        cursor += len;
        Ok(slice)
    };

    let sec = i64::from_le_bytes(fixed(take(8)?));
    let nsec = u32::from_le_bytes(fixed(take(4)?));
    let topic_len = u16::from_le_bytes(fixed(take(2)?)) as usize;
    let topic = take(topic_len)?.to_vec();
    let type_len = u16::from_le_bytes(fixed(take(2)?)) as usize;
    let type_name = take(type_len)?.to_vec();
    let data_len = u32::from_le_bytes(fixed(take(4)?)) as usize;
    let data = take(data_len)?.to_vec();

    if cursor != body.len() {
        return Err(LogError::corruption(
            offset,
            format!("{} trailing bytes in record body", body.len() - cursor),
        ));
    }
    if nsec >= 1_000_000_000 {
        return Err(LogError::corruption(offset, "nanoseconds out of range"));
    }

    let text = |bytes: Vec<u8>, what: &str| {
        String::from_utf8(bytes)
            .map_err(|_| LogError::corruption(offset, format!("{what} is not UTF-8")))
    };

    Ok(MessageRecord {
        time: Timestamp::new(sec, nsec),
        topic: text(topic, "topic")?,
        type_name: text(type_name, "type name")?,
        data,
    })
}

fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

fn read_u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(fixed(&bytes[at..at + 4]))
}
