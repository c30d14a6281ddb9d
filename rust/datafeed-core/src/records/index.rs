// rust/datafeed-core/src/records/index.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{FeedError, Result};
use crate::storage::{StorageBackend, StorageReader};

use super::format::RecordFormat;
use super::reader::RecordReader;

/// Random access to the records of one file.
///
/// Building the index scans the file once, verifying every record, and keeps
/// the position and length of each. Later reads fetch single records by
/// their ordinal.
pub struct RecordIndex {
    path: PathBuf,
    format: Arc<dyn RecordFormat>,
    reader: Box<dyn StorageReader>,
    entries: Vec<(u64, usize)>,
}

impl RecordIndex {
    /// Scans `path` and records where each record lives.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds a malformed
    /// record.
    pub fn build(
        storage: &dyn StorageBackend,
        path: impl AsRef<Path>,
        format: Arc<dyn RecordFormat>,
        chunk_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut entries = Vec::new();
        let mut scan = RecordReader::open(storage, &path, format.clone(), chunk_size)?;
        while let Some(record) = scan.next_record()? {
            entries.push((record.offset, record.len));
        }
        debug!(path = %path.display(), records = entries.len(), "Built record index");

        let reader = storage.open_read(&path)?;
        Ok(Self {
            path,
            format,
            reader,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset and framed length of record `i`.
    pub fn entry(&self, i: usize) -> Option<(u64, usize)> {
        self.entries.get(i).copied()
    }

    /// Reads the payload of record `i`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if `i` is out of range or the read fails, and
    /// a malformed record error if the record changed since indexing.
    pub fn read(&mut self, i: usize) -> Result<Vec<u8>> {
        let (offset, len) = self.entry(i).ok_or_else(|| {
            FeedError::storage(
                &self.path,
                format!("record {i} out of range ({} records)", self.entries.len()),
            )
        })?;

        let record = self.reader.read_range(offset, len)?;
        let payload = self.format.payload(&record, offset)?;
        Ok(payload.to_vec())
    }
}

impl std::fmt::Debug for RecordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordIndex")
            .field("path", &self.path)
            .field("format", &self.format.name())
            .field("records", &self.entries.len())
            .finish()
    }
}
