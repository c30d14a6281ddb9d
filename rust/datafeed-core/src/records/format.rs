// rust/datafeed-core/src/records/format.rs

use std::hash::Hasher;
use std::sync::Arc;

use twox_hash::XxHash64;

use crate::error::{FeedError, Result};

/// Describes how records are framed inside a record file.
pub trait RecordFormat: Send + Sync {
    /// Minimum size of a record in bytes, framing included.
    fn min_record_size(&self) -> usize;

    /// Find the end of the record that starts at `offset` in `data`.
    /// Returns the byte position after the record ends (exclusive end).
    /// Returns None if `data` does not hold the complete record.
    fn find_record_end(&self, data: &[u8], offset: usize) -> Option<usize>;

    /// Strips the framing from one complete record and checks its integrity.
    ///
    /// `offset` is the record's position in the file, used for errors.
    fn payload<'a>(&self, record: &'a [u8], offset: u64) -> Result<&'a [u8]>;

    /// Name of this record format
    fn name(&self) -> &'static str;
}

/// Checksummed records.
///
/// ```text
/// +----------------------+-----------------------+-----------+
/// | payload len (u64 LE) | xxh64 payload (u64 LE)| payload   |
/// +----------------------+-----------------------+-----------+
/// ```
#[derive(Debug, Clone, Default)]
pub struct FramedFormat;

impl FramedFormat {
    /// Length of the frame header.
    pub const HEADER_LEN: usize = 16;

    pub fn new() -> Self {
        Self
    }

    /// XXHash64 (seed 0) of a payload.
    pub fn checksum(payload: &[u8]) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(payload);
        hasher.finish()
    }
}

impl RecordFormat for FramedFormat {
    fn min_record_size(&self) -> usize {
        Self::HEADER_LEN
    }

    fn find_record_end(&self, data: &[u8], offset: usize) -> Option<usize> {
        let header_end = offset.checked_add(Self::HEADER_LEN)?;
        if header_end > data.len() {
            return None;
        }

        let length_bytes: [u8; 8] = data[offset..offset + 8].try_into().ok()?;
        let length = usize::try_from(u64::from_le_bytes(length_bytes)).ok()?;

        let end = header_end.checked_add(length)?;
        if end <= data.len() {
            Some(end)
        } else {
            None
        }
    }

    fn payload<'a>(&self, record: &'a [u8], offset: u64) -> Result<&'a [u8]> {
        if record.len() < Self::HEADER_LEN {
            return Err(FeedError::malformed_record(
                offset,
                format!("record of {} bytes is shorter than its header", record.len()),
            ));
        }

        let (header, payload) = record.split_at(Self::HEADER_LEN);
        let mut length_bytes = [0u8; 8];
        length_bytes.copy_from_slice(&header[..8]);
        let mut checksum_bytes = [0u8; 8];
        checksum_bytes.copy_from_slice(&header[8..]);

        let length = u64::from_le_bytes(length_bytes);
        if length != payload.len() as u64 {
            return Err(FeedError::malformed_record(
                offset,
                format!(
                    "header declares {length} payload bytes but record holds {}",
                    payload.len()
                ),
            ));
        }

        let expected = u64::from_le_bytes(checksum_bytes);
        let actual = Self::checksum(payload);
        if expected != actual {
            return Err(FeedError::malformed_record(
                offset,
                format!("checksum mismatch: expected {expected:016x}, got {actual:016x}"),
            ));
        }

        Ok(payload)
    }

    fn name(&self) -> &'static str {
        "framed"
    }
}

/// Length-prefixed records (4-byte big-endian length + data)
#[derive(Debug, Clone, Default)]
pub struct LengthPrefixedFormat;

impl LengthPrefixedFormat {
    pub fn new() -> Self {
        Self
    }
}

impl RecordFormat for LengthPrefixedFormat {
    fn min_record_size(&self) -> usize {
        4 // Minimum is just the length prefix with zero-length data
    }

    fn find_record_end(&self, data: &[u8], offset: usize) -> Option<usize> {
        if offset.checked_add(4)? > data.len() {
            return None;
        }

        // Read 4-byte big-endian length
        let length_bytes: [u8; 4] = data[offset..offset + 4].try_into().ok()?;
        let length = u32::from_be_bytes(length_bytes) as usize;

        let end = offset + 4 + length;
        if end <= data.len() {
            Some(end)
        } else {
            None
        }
    }

    fn payload<'a>(&self, record: &'a [u8], offset: u64) -> Result<&'a [u8]> {
        if record.len() < 4 {
            return Err(FeedError::malformed_record(offset, "missing length prefix"));
        }

        let (prefix, payload) = record.split_at(4);
        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(prefix);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length != payload.len() {
            return Err(FeedError::malformed_record(
                offset,
                format!(
                    "prefix declares {length} bytes but record holds {}",
                    payload.len()
                ),
            ));
        }
        Ok(payload)
    }

    fn name(&self) -> &'static str {
        "length-prefixed"
    }
}

/// Looks up a record format by its configuration name.
///
/// # Errors
///
/// Returns a configuration error for unknown names.
pub fn parse_format(name: &str) -> Result<Arc<dyn RecordFormat>> {
    match name.to_lowercase().as_str() {
        "framed" => Ok(Arc::new(FramedFormat::new())),
        "length-prefixed" => Ok(Arc::new(LengthPrefixedFormat::new())),
        other => Err(FeedError::config(format!("unknown record format '{other}'"))),
    }
}
