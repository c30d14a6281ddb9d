// rust/datafeed-core/src/records/reader.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{FeedError, Result};
use crate::storage::{StorageBackend, StorageReader};

use super::format::RecordFormat;

/// A single record read from a record file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Byte offset of the record's framing in the file.
    pub offset: u64,
    /// Length of the record in the file, framing included.
    pub len: usize,
    /// The record's payload with framing removed.
    pub payload: Vec<u8>,
}

/// A sequential reader over the records of one file.
///
/// The file is read in chunks of `chunk_size` bytes; a record larger than a
/// chunk is assembled from as many chunks as it spans. Bytes left at the end
/// of the file that do not form a complete record are reported as a
/// malformed record. A record whose framing is intact but whose payload
/// fails verification is reported once and then skipped.
pub struct RecordReader {
    path: PathBuf,
    format: Arc<dyn RecordFormat>,
    reader: Box<dyn StorageReader>,
    size: u64,
    chunk_size: usize,
    buffer: Vec<u8>,
    /// File offset of `buffer[0]`.
    buffer_start: u64,
    /// Read position within `buffer`.
    pos: usize,
    records_read: u64,
}

impl RecordReader {
    /// Opens `path` on `storage` for sequential record reads.
    ///
    /// # Errors
    ///
    /// Returns a storage error if nothing is stored at `path`, if it is a
    /// directory, or if it cannot be opened.
    pub fn open(
        storage: &dyn StorageBackend,
        path: impl AsRef<Path>,
        format: Arc<dyn RecordFormat>,
        chunk_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        match storage.metadata(&path)? {
            None => return Err(FeedError::storage(&path, "record file not found")),
            Some(meta) if meta.is_dir => {
                return Err(FeedError::storage(&path, "found a directory, not a record file"));
            }
            Some(meta) if meta.size == 0 => {
                debug!(path = %path.display(), "Record file is empty");
            }
            Some(_) => {}
        }

        let reader = storage.open_read(&path)?;
        let size = reader.size();

        Ok(Self {
            path,
            format,
            reader,
            size,
            chunk_size: chunk_size.max(1),
            buffer: Vec::new(),
            buffer_start: 0,
            pos: 0,
            records_read: 0,
        })
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` once every byte of the file has been consumed.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let offset = self.buffer_start + self.pos as u64;

            if let Some(end) = self.format.find_record_end(&self.buffer, self.pos) {
                let start = self.pos;
                // Move past the record before verifying it so a bad payload
                // does not stall the reader.
                self.pos = end;
                self.records_read += 1;

                let payload = self.format.payload(&self.buffer[start..end], offset)?;
                return Ok(Some(Record {
                    offset,
                    len: end - start,
                    payload: payload.to_vec(),
                }));
            }

            let file_pos = self.buffer_start + self.buffer.len() as u64;
            if file_pos >= self.size {
                let trailing = self.buffer.len() - self.pos;
                if trailing == 0 {
                    return Ok(None);
                }
                // Report the truncated tail once.
                self.pos = self.buffer.len();
                return Err(FeedError::malformed_record(
                    offset,
                    format!(
                        "{trailing} trailing bytes in '{}' do not form a complete {} record",
                        self.path.display(),
                        self.format.name()
                    ),
                ));
            }

            self.fill(file_pos)?;
        }
    }

    /// Drops consumed bytes and appends the next chunk of the file.
    fn fill(&mut self, file_pos: u64) -> Result<()> {
        self.buffer.drain(..self.pos);
        self.buffer_start += self.pos as u64;
        self.pos = 0;

        let remaining = self.size - file_pos;
        let read_size = (self.chunk_size as u64).min(remaining) as usize;
        let chunk = self.reader.read_range(file_pos, read_size)?;
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    /// Rewinds to the first record of the file.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.buffer_start = 0;
        self.pos = 0;
        self.records_read = 0;
    }

    /// File offset of the next record.
    pub fn offset(&self) -> u64 {
        self.buffer_start + self.pos as u64
    }

    /// Number of records returned since the last reset.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl std::fmt::Debug for RecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("path", &self.path)
            .field("format", &self.format.name())
            .field("offset", &self.offset())
            .field("size", &self.size)
            .finish()
    }
}
