// rust/datafeed-core/src/storage/traits.rs

//! Read-only access to stored record files.

use std::path::Path;

use crate::error::Result;

/// What a backend reports about a stored object without opening it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    pub is_dir: bool,
}

/// Random access to the bytes of one opened object.
pub trait StorageReader: Send {
    /// Total size of the object in bytes.
    fn size(&self) -> u64;

    /// Reads `length` bytes starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the range extends past `size` or the
    /// underlying read fails.
    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>>;
}

/// A place record files are read from.
///
/// Shared as `Arc<dyn StorageBackend>` between a dataset and the worker
/// threads of its pipeline.
pub trait StorageBackend: Send + Sync {
    /// Looks up `path`. `Ok(None)` means nothing is stored there.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup itself fails.
    fn metadata(&self, path: &Path) -> Result<Option<ObjectMeta>>;

    /// Opens `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the object cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;
}
