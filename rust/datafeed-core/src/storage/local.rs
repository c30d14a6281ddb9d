// rust/datafeed-core/src/storage/local.rs

//! Record files on the local filesystem.
//!
//! Files at or above the mmap threshold are mapped once and sliced; smaller
//! files are read with a seek and an exact read per range.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::debug;

use super::traits::{ObjectMeta, StorageBackend, StorageReader};
use crate::config::StorageConfig;
use crate::error::{FeedError, Result};

/// Storage rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    /// `None` when memory mapping is disabled.
    mmap_threshold: Option<u64>,
}

impl LocalStorage {
    /// # Errors
    ///
    /// Returns a storage error if `base_path` exists but is not a directory.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = config.base_path.clone();
        if base_path.exists() && !base_path.is_dir() {
            return Err(FeedError::storage(&base_path, "base path is not a directory"));
        }

        Ok(Self {
            base_path,
            mmap_threshold: config.use_mmap.then_some(config.mmap_threshold),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn should_map(&self, size: u64) -> bool {
        // Zero-length files cannot be mapped everywhere.
        matches!(self.mmap_threshold, Some(threshold) if size > 0 && size >= threshold)
    }
}

impl StorageBackend for LocalStorage {
    fn metadata(&self, path: &Path) -> Result<Option<ObjectMeta>> {
        let full_path = self.resolve(path);
        match fs::metadata(&full_path) {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.len(),
                is_dir: meta.is_dir(),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FeedError::storage_with_source(
                &full_path,
                "failed to read metadata",
                e,
            )),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve(path);
        let file = File::open(&full_path)
            .map_err(|e| FeedError::storage_with_source(&full_path, "failed to open file", e))?;
        let size = file
            .metadata()
            .map_err(|e| FeedError::storage_with_source(&full_path, "failed to stat file", e))?
            .len();

        let reader = if self.should_map(size) {
            // SAFETY: the file is opened read-only and the map is owned by
            // the reader for its whole lifetime.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                FeedError::storage_with_source(&full_path, "failed to memory-map file", e)
            })?;
            debug!(path = %full_path.display(), size, "Mapped record file");
            LocalReader::Mapped {
                mmap,
                path: full_path,
            }
        } else {
            LocalReader::File {
                file,
                size,
                path: full_path,
            }
        };
        Ok(Box::new(reader))
    }
}

enum LocalReader {
    File { file: File, size: u64, path: PathBuf },
    Mapped { mmap: Mmap, path: PathBuf },
}

impl LocalReader {
    fn path(&self) -> &Path {
        match self {
            Self::File { path, .. } | Self::Mapped { path, .. } => path,
        }
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        match self {
            Self::File { size, .. } => *size,
            Self::Mapped { mmap, .. } => mmap.len() as u64,
        }
    }

    fn read_range(&mut self, start: u64, length: usize) -> Result<Vec<u8>> {
        let size = self.size();
        let end = start
            .checked_add(length as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| {
                FeedError::storage(
                    self.path(),
                    format!("range {start}+{length} is past the end of a {size} byte file"),
                )
            })?;

        match self {
            Self::Mapped { mmap, .. } => Ok(mmap[start as usize..end as usize].to_vec()),
            Self::File { file, path, .. } => {
                let mut buf = vec![0u8; length];
                file.seek(SeekFrom::Start(start))
                    .and_then(|_| file.read_exact(&mut buf))
                    .map_err(|e| {
                        FeedError::storage_with_source(
                            path.as_path(),
                            format!("failed to read {length} bytes at offset {start}"),
                            e,
                        )
                    })?;
                Ok(buf)
            }
        }
    }
}
