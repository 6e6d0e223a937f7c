//! Streaming scan over the records of a store.
//!
//! Used once per open to rebuild the in-memory index. Records are pulled
//! through a fixed read buffer, so memory stays bounded by the largest
//! record rather than the store size.

use crate::error::{LogError, LogResult};
use crate::record::{
    decode_envelope, decode_frame, decode_header, decode_header_prefix, MessageRecord, CRC_SIZE,
    ENVELOPE_SIZE, HEADER_PREFIX_SIZE, RECORD_MAGIC,
};
use translog_storage::StorageBackend;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Reads and validates the store header.
///
/// Returns `None` for an empty store, otherwise the schema version and the
/// offset of the first record.
pub(crate) fn read_header(backend: &dyn StorageBackend) -> LogResult<Option<(String, u64)>> {
    let size = backend.size()?;
    if size == 0 {
        return Ok(None);
    }
    if size < HEADER_PREFIX_SIZE as u64 {
        return Err(LogError::invalid_format("truncated store header"));
    }

    let prefix = backend.read_at(0, HEADER_PREFIX_SIZE)?;
    let version_len = decode_header_prefix(&prefix)?;
    let header_len = HEADER_PREFIX_SIZE + version_len + CRC_SIZE;
    if size < header_len as u64 {
        return Err(LogError::invalid_format("truncated store header"));
    }

    let frame = backend.read_at(0, header_len)?;
    let version = decode_header(&frame)?;
    Ok(Some((version, header_len as u64)))
}

/// A record found by [`RecordScanner`].
#[derive(Debug)]
pub(crate) struct ScannedRecord {
    pub offset: u64,
    pub len: u32,
    pub record: MessageRecord,
}

/// Forward iterator over the records between a start offset and the store end.
///
/// A trailing record that stops short of the end of the store is an
/// interrupted append: iteration ends cleanly and [`RecordScanner::torn_at`]
/// reports where it began. An interrupted append leaves at most a prefix of
/// one frame, so a record whose length runs past the end while a complete
/// record follows it is corruption, like bad magic or a checksum mismatch.
pub(crate) struct RecordScanner<'a> {
    backend: &'a dyn StorageBackend,
    total_size: u64,
    current_offset: u64,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    torn_at: Option<u64>,
    finished: bool,
}

impl<'a> RecordScanner<'a> {
    pub(crate) fn new(backend: &'a dyn StorageBackend, start_offset: u64) -> LogResult<Self> {
        let total_size = backend.size()?;
        Ok(Self {
            backend,
            total_size,
            current_offset: start_offset,
            buffer: vec![0u8; READ_BUFFER_SIZE],
            buffer_pos: 0,
            buffer_len: 0,
            torn_at: None,
            finished: start_offset >= total_size,
        })
    }

    /// Offset of an incomplete trailing record, if the scan stopped at one.
    pub(crate) fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    /// Offset just past the last complete record read so far.
    pub(crate) fn position(&self) -> u64 {
        self.current_offset
    }

    /// Makes at least `min_bytes` available from `buffer_pos`. `false` at EOF.
    fn ensure_buffered(&mut self, min_bytes: usize) -> LogResult<bool> {
        let available = self.buffer_len - self.buffer_pos;
        if available >= min_bytes {
            return Ok(true);
        }

        let unread = self.total_size - self.current_offset - available as u64;
        if unread < (min_bytes - available) as u64 {
            return Ok(false);
        }

        if self.buffer_pos > 0 && available > 0 {
            self.buffer.copy_within(self.buffer_pos..self.buffer_len, 0);
        }
        self.buffer_len = available;
        self.buffer_pos = 0;

        if min_bytes > self.buffer.len() {
            self.buffer.resize(min_bytes.next_power_of_two(), 0);
        }

        let room = (self.buffer.len() - self.buffer_len) as u64;
        let to_read = room.min(unread) as usize;
        if to_read > 0 {
            let read_offset = self.current_offset + self.buffer_len as u64;
            let data = self.backend.read_at(read_offset, to_read)?;
            self.buffer[self.buffer_len..self.buffer_len + data.len()].copy_from_slice(&data);
            self.buffer_len += data.len();
        }

        Ok(self.buffer_len - self.buffer_pos >= min_bytes)
    }

    /// Whether a complete, checksum-valid record starts anywhere after
    /// `offset` in the rest of the store.
    fn tail_holds_record(&self, offset: u64) -> LogResult<bool> {
        let tail = self
            .backend
            .read_at(offset, (self.total_size - offset) as usize)?;
        let found = (1..tail.len())
            .filter(|&pos| tail[pos..].starts_with(&RECORD_MAGIC))
            .any(|pos| {
                let rest = &tail[pos..];
                decode_envelope(0, rest)
                    .ok()
                    .map(|body_len| ENVELOPE_SIZE + body_len + CRC_SIZE)
                    .is_some_and(|frame_len| {
                        frame_len <= rest.len() && decode_frame(0, &rest[..frame_len]).is_ok()
                    })
            });
        Ok(found)
    }

    fn read_next(&mut self) -> LogResult<Option<ScannedRecord>> {
        let offset = self.current_offset;
        if offset >= self.total_size {
            return Ok(None);
        }

        if !self.ensure_buffered(ENVELOPE_SIZE)? {
            self.torn_at = Some(offset);
            return Ok(None);
        }
        let body_len = decode_envelope(
            offset,
            &self.buffer[self.buffer_pos..self.buffer_pos + ENVELOPE_SIZE],
        )?;

        let frame_len = ENVELOPE_SIZE + body_len + CRC_SIZE;
        if !self.ensure_buffered(frame_len)? {
            if self.tail_holds_record(offset)? {
                return Err(LogError::corruption(
                    offset,
                    format!("body length {body_len} runs over later records"),
                ));
            }
            self.torn_at = Some(offset);
            return Ok(None);
        }

        let frame = &self.buffer[self.buffer_pos..self.buffer_pos + frame_len];
        let record = decode_frame(offset, frame)?;
        let len = u32::try_from(frame_len)
            .map_err(|_| LogError::corruption(offset, "record frame exceeds 4 GiB"))?;

        self.buffer_pos += frame_len;
        self.current_offset += frame_len as u64;
        Ok(Some(ScannedRecord {
            offset,
            len,
            record,
        }))
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = LogResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
