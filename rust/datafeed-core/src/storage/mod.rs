// rust/datafeed-core/src/storage/mod.rs

//! Storage abstraction for record files.
//!
//! Record-backed datasets read through a `StorageBackend` so the same
//! dataset code works against the local filesystem or a test double.
//!
//! # Example
//!
//! ```no_run
//! use datafeed_core::config::StorageConfig;
//! use datafeed_core::storage::{LocalStorage, StorageBackend};
//! use std::path::Path;
//!
//! let config = StorageConfig::default();
//! let storage = LocalStorage::new(&config).unwrap();
//!
//! let mut reader = storage.open_read(Path::new("train.rec")).unwrap();
//! let header = reader.read_range(0, 16).unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader};
