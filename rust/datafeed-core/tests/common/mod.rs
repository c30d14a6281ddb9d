// rust/datafeed-core/tests/common/mod.rs

//! Record file fixtures for integration tests.

#![allow(dead_code)]

use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;

use datafeed_core::config::StorageConfig;
use datafeed_core::{Example, LocalStorage, StorageBackend};
use tempfile::TempDir;
use twox_hash::XxHash64;

pub const IMAGE_SHAPE: [usize; 3] = [4, 4, 3];
pub const MASK_SHAPE: [usize; 3] = [4, 4, 1];

/// Example `id`: every image byte is `id`, every mask byte is `id % 2`.
pub fn example(id: u8) -> Example {
    Example {
        height: 4,
        width: 4,
        image_raw: vec![id; IMAGE_SHAPE.iter().product()],
        mask_raw: vec![id % 2; MASK_SHAPE.iter().product()],
    }
}

/// `[u64 LE len][u64 LE xxh64][payload]`
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(payload);

    let mut data = Vec::with_capacity(16 + payload.len());
    data.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    data.extend_from_slice(&hasher.finish().to_le_bytes());
    data.extend_from_slice(payload);
    data
}

/// `[u32 BE len][payload]`
pub fn length_prefix(payload: &[u8]) -> Vec<u8> {
    let mut data = (payload.len() as u32).to_be_bytes().to_vec();
    data.extend_from_slice(payload);
    data
}

pub fn encode(example: &Example) -> Vec<u8> {
    bincode::serialize(example).unwrap()
}

/// A temporary directory of record files with local storage rooted at it.
pub struct Fixture {
    pub dir: TempDir,
    pub storage: Arc<dyn StorageBackend>,
}

impl Fixture {
    /// `mmap_threshold` decides which reader local storage hands out.
    pub fn new(mmap_threshold: u64) -> Self {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: dir.path().to_path_buf(),
            buffer_size: 512,
            use_mmap: true,
            mmap_threshold,
        };
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config).unwrap());
        Self { dir, storage }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes examples `0..count` as framed records.
    pub fn write_framed(&self, name: &str, count: u8) {
        let data: Vec<u8> = (0..count).flat_map(|id| frame(&encode(&example(id)))).collect();
        self.write_raw(name, &data);
    }

    /// Writes examples `0..count` as length-prefixed records.
    pub fn write_length_prefixed(&self, name: &str, count: u8) {
        let data: Vec<u8> = (0..count)
            .flat_map(|id| length_prefix(&encode(&example(id))))
            .collect();
        self.write_raw(name, &data);
    }

    pub fn write_raw(&self, name: &str, data: &[u8]) {
        std::fs::write(self.path(name), data).unwrap();
    }
}
