// rust/datafeed-core/src/records/testing.rs

//! Fixtures shared by unit tests that need record files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{FeedError, Result};
use crate::storage::{ObjectMeta, StorageBackend, StorageReader};

use super::example::Example;
use super::format::FramedFormat;

/// Wraps `payload` in the framed record layout.
pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(FramedFormat::HEADER_LEN + payload.len());
    data.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    data.extend_from_slice(&FramedFormat::checksum(payload).to_le_bytes());
    data.extend_from_slice(payload);
    data
}

/// An example whose every image byte is `id` and whose mask byte is `id`.
///
/// Image shape `[2, 2]`, mask shape `[1]`.
pub(crate) fn tagged_example(id: u8) -> Example {
    Example {
        height: 2,
        width: 2,
        image_raw: vec![id; 4],
        mask_raw: vec![id],
    }
}

/// A framed record file holding `tagged_example(0..count)`.
pub(crate) fn tagged_file(count: u8) -> Vec<u8> {
    (0..count)
        .flat_map(|id| frame(&tagged_example(id).to_bytes().unwrap()))
        .collect()
}

struct MockReader {
    data: Vec<u8>,
    /// Reads reaching past this offset fail.
    fail_at: Option<u64>,
}

impl StorageReader for MockReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let end = start as usize + length;
        if self.fail_at.is_some_and(|at| end as u64 > at) {
            return Err(FeedError::storage("mock", "injected read failure"));
        }
        self.data
            .get(start as usize..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| FeedError::storage("mock", "read past end"))
    }
}

#[derive(Clone)]
enum Entry {
    File { data: Vec<u8>, fail_at: Option<u64> },
    Dir,
}

/// In-memory storage backend.
pub(crate) struct MockStorage {
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl MockStorage {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn add_file(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.insert(path, Entry::File { data, fail_at: None });
    }

    /// A file whose reads fail once they reach `fail_at` bytes.
    pub(crate) fn add_failing_file(
        &self,
        path: impl Into<PathBuf>,
        data: Vec<u8>,
        fail_at: u64,
    ) {
        self.insert(
            path,
            Entry::File {
                data,
                fail_at: Some(fail_at),
            },
        );
    }

    pub(crate) fn add_dir(&self, path: impl Into<PathBuf>) {
        self.insert(path, Entry::Dir);
    }

    fn insert(&self, path: impl Into<PathBuf>, entry: Entry) {
        self.entries.lock().unwrap().insert(path.into(), entry);
    }

    fn entry(&self, path: &Path) -> Option<Entry> {
        self.entries.lock().unwrap().get(path).cloned()
    }
}

impl StorageBackend for MockStorage {
    fn metadata(&self, path: &Path) -> Result<Option<ObjectMeta>> {
        Ok(self.entry(path).map(|entry| match entry {
            Entry::File { data, .. } => ObjectMeta {
                size: data.len() as u64,
                is_dir: false,
            },
            Entry::Dir => ObjectMeta {
                size: 0,
                is_dir: true,
            },
        }))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        match self.entry(path) {
            Some(Entry::File { data, fail_at }) => Ok(Box::new(MockReader { data, fail_at })),
            Some(Entry::Dir) => Err(FeedError::storage(path, "is a directory")),
            None => Err(FeedError::storage(path, "not found")),
        }
    }
}
