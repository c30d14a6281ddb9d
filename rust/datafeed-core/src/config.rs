// rust/datafeed-core/src/config.rs

//! Configuration for data feeding.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{FeedError, Result};

/// Record container formats understood by `records::parse_format`.
pub const RECORD_FORMATS: [&str; 2] = ["framed", "length-prefixed"];

// Top-level feed configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub storage: StorageConfig,
    pub dataset: DatasetConfig,
    pub stream: StreamConfig,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path for relative record file paths.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations and record scanning.
    pub buffer_size: usize,
    // Whether to use memory-mapped I/O.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

/// Options shared by every dataset variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether `DataSet::next_epoch` reshuffles finite datasets.
    pub shuffle: bool,
    /// Optional seed for reproducible shuffling.
    pub seed: Option<u64>,
}

/// Options for the record-stream dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Number of samples that make up one epoch.
    pub epoch_size: usize,
    /// Record container format: "framed" or "length-prefixed".
    pub record_format: String,
    /// Shuffle buffer capacity. Derived from batch and epoch size when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle_capacity: Option<usize>,
    /// Elements that must stay buffered before the shuffle buffer emits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_after_dequeue: Option<usize>,
    /// Number of decode worker threads.
    pub num_threads: usize,
    /// Bound of the channels between pipeline stages.
    pub channel_capacity: usize,
    /// Cycle the record source forever instead of stopping at its end.
    pub repeat: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data"),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle: true,
            seed: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            epoch_size: 1,
            record_format: "framed".to_string(),
            shuffle_capacity: None,
            min_after_dequeue: None,
            num_threads: 1,
            channel_capacity: 64,
            repeat: false,
        }
    }
}

impl StreamConfig {
    /// Shuffle buffer capacity for the given batch size.
    ///
    /// Defaults to `batch_size * 3 + epoch_size / 4`.
    pub fn capacity_for(&self, batch_size: usize) -> usize {
        self.shuffle_capacity
            .unwrap_or(batch_size * 3 + self.epoch_size / 4)
            .max(1)
    }

    /// Emission threshold for the given batch size.
    ///
    /// Defaults to four fifths of the capacity and always stays below it.
    pub fn min_after_dequeue_for(&self, batch_size: usize) -> usize {
        let capacity = self.capacity_for(batch_size);
        self.min_after_dequeue
            .unwrap_or(capacity * 4 / 5)
            .min(capacity - 1)
    }
}

impl FromStr for FeedConfig {
    type Err = FeedError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| FeedError::config_with_source("failed to parse TOML config", e))
    }
}

impl FeedConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| FeedError::storage_with_source(path, "failed to read config file", e))?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `DFD_` and use underscores
    // to separate nested fields, for example `DFD_DATASET_BATCH_SIZE`
    // overrides `dataset.batch_size` and `DFD_STREAM_REPEAT` overrides
    // `stream.repeat`. Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("DFD_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DFD_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        // Dataset overrides
        if let Ok(val) = std::env::var("DFD_DATASET_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.dataset.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_DATASET_SHUFFLE") {
            if let Ok(v) = val.parse() {
                self.dataset.shuffle = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_DATASET_SEED") {
            if let Ok(v) = val.parse() {
                self.dataset.seed = Some(v);
            }
        }

        // Stream overrides
        if let Ok(val) = std::env::var("DFD_STREAM_EPOCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.stream.epoch_size = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_STREAM_RECORD_FORMAT") {
            self.stream.record_format = val.to_lowercase();
        }
        if let Ok(val) = std::env::var("DFD_STREAM_SHUFFLE_CAPACITY") {
            if let Ok(v) = val.parse() {
                self.stream.shuffle_capacity = Some(v);
            }
        }
        if let Ok(val) = std::env::var("DFD_STREAM_MIN_AFTER_DEQUEUE") {
            if let Ok(v) = val.parse() {
                self.stream.min_after_dequeue = Some(v);
            }
        }
        if let Ok(val) = std::env::var("DFD_STREAM_NUM_THREADS") {
            if let Ok(v) = val.parse() {
                self.stream.num_threads = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_STREAM_CHANNEL_CAPACITY") {
            if let Ok(v) = val.parse() {
                self.stream.channel_capacity = v;
            }
        }
        if let Ok(val) = std::env::var("DFD_STREAM_REPEAT") {
            if let Ok(v) = val.parse() {
                self.stream.repeat = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Storage validation
        if self.storage.buffer_size == 0 {
            return Err(FeedError::config("storage.buffer_size must be greater than 0"));
        }

        // Dataset validation
        if self.dataset.batch_size == 0 {
            return Err(FeedError::config("dataset.batch_size must be greater than 0"));
        }

        // Stream validation
        if self.stream.epoch_size == 0 {
            return Err(FeedError::config("stream.epoch_size must be greater than 0"));
        }
        if !RECORD_FORMATS.contains(&self.stream.record_format.as_str()) {
            return Err(FeedError::config(format!(
                "stream.record_format must be one of: {}",
                RECORD_FORMATS.join(", ")
            )));
        }
        if self.stream.num_threads == 0 {
            return Err(FeedError::config("stream.num_threads must be greater than 0"));
        }
        if self.stream.channel_capacity == 0 {
            return Err(FeedError::config(
                "stream.channel_capacity must be greater than 0",
            ));
        }
        if self.stream.shuffle_capacity == Some(0) {
            return Err(FeedError::config(
                "stream.shuffle_capacity must be greater than 0",
            ));
        }
        if let Some(min) = self.stream.min_after_dequeue {
            let capacity = self.stream.capacity_for(self.dataset.batch_size);
            if min >= capacity {
                return Err(FeedError::config(format!(
                    "stream.min_after_dequeue ({min}) must be less than \
                     the shuffle capacity ({capacity})"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = FeedConfig::default();

        assert_eq!(config.storage.base_path, PathBuf::from("./data"));
        assert_eq!(config.storage.buffer_size, 64 * 1024);
        assert!(config.storage.use_mmap);
        assert_eq!(config.storage.mmap_threshold, 1024 * 1024);

        assert_eq!(config.dataset.batch_size, 32);
        assert!(config.dataset.shuffle);
        assert!(config.dataset.seed.is_none());

        assert_eq!(config.stream.epoch_size, 1);
        assert_eq!(config.stream.record_format, "framed");
        assert!(config.stream.shuffle_capacity.is_none());
        assert!(config.stream.min_after_dequeue.is_none());
        assert_eq!(config.stream.num_threads, 1);
        assert_eq!(config.stream.channel_capacity, 64);
        assert!(!config.stream.repeat);
    }

    #[test]
    fn test_default_validates() {
        assert!(FeedConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_str_empty() {
        let config: FeedConfig = "".parse().unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_str_full() {
        let toml = r#"
            [storage]
            base_path = "/data/segmentation"
            buffer_size = 131072
            use_mmap = false
            mmap_threshold = 2097152

            [dataset]
            batch_size = 16
            shuffle = false
            seed = 42

            [stream]
            epoch_size = 1000
            record_format = "length-prefixed"
            shuffle_capacity = 125
            min_after_dequeue = 100
            num_threads = 4
            channel_capacity = 32
            repeat = true
        "#;

        let config: FeedConfig = toml.parse().unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.storage.base_path, PathBuf::from("/data/segmentation"));
        assert_eq!(config.storage.buffer_size, 131072);
        assert!(!config.storage.use_mmap);

        assert_eq!(config.dataset.batch_size, 16);
        assert!(!config.dataset.shuffle);
        assert_eq!(config.dataset.seed, Some(42));

        assert_eq!(config.stream.epoch_size, 1000);
        assert_eq!(config.stream.record_format, "length-prefixed");
        assert_eq!(config.stream.shuffle_capacity, Some(125));
        assert_eq!(config.stream.min_after_dequeue, Some(100));
        assert_eq!(config.stream.num_threads, 4);
        assert_eq!(config.stream.channel_capacity, 32);
        assert!(config.stream.repeat);
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result: std::result::Result<FeedConfig, _> = "invalid = [".parse();
        assert!(matches!(result, Err(FeedError::Config { .. })));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [dataset]
            batch_size = 8
            "#
        )
        .unwrap();

        let config = FeedConfig::from_file(file.path()).unwrap();
        assert_eq!(config.dataset.batch_size, 8);
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[dataset]\nbatch_size = 0").unwrap();
        assert!(FeedConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_from_file_not_found() {
        let result = FeedConfig::from_file("/nonexistent/feed.toml");
        assert!(matches!(result, Err(FeedError::Storage { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = FeedConfig::default();
        config.storage.buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.stream.epoch_size = 0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.stream.num_threads = 0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.stream.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.stream.shuffle_capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_record_format() {
        let mut config = FeedConfig::default();
        config.stream.record_format = "tfrecord".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("framed"));
    }

    #[test]
    fn test_validate_threshold_below_capacity() {
        let mut config = FeedConfig::default();
        config.stream.shuffle_capacity = Some(10);
        config.stream.min_after_dequeue = Some(10);
        assert!(config.validate().is_err());

        config.stream.min_after_dequeue = Some(9);
        assert!(config.validate().is_ok());

        // Against the capacity derived from batch and epoch size: 4 * 3 + 8 / 4
        let mut config = FeedConfig::default();
        config.dataset.batch_size = 4;
        config.stream.epoch_size = 8;
        config.stream.min_after_dequeue = Some(14);
        assert!(config.validate().is_err());

        config.stream.min_after_dequeue = Some(13);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_shuffle_parameters() {
        let config = StreamConfig {
            epoch_size: 100,
            ..Default::default()
        };
        // 32 * 3 + 100 / 4
        assert_eq!(config.capacity_for(32), 121);
        assert_eq!(config.min_after_dequeue_for(32), 96);

        let explicit = StreamConfig {
            shuffle_capacity: Some(125),
            min_after_dequeue: Some(100),
            ..Default::default()
        };
        assert_eq!(explicit.capacity_for(32), 125);
        assert_eq!(explicit.min_after_dequeue_for(32), 100);

        let tiny = StreamConfig {
            shuffle_capacity: Some(1),
            ..Default::default()
        };
        assert_eq!(tiny.min_after_dequeue_for(4), 0);
    }

    // Helper to clear all DFD_ environment variables for test isolation
    fn clear_dfd_env_vars() {
        for (key, _) in std::env::vars() {
            if key.starts_with("DFD_") {
                std::env::remove_var(&key);
            }
        }
    }

    // Environment variable tests are combined into a single test to avoid
    // races between parallel tests, since env vars are global state.
    #[test]
    fn test_env_overrides() {
        clear_dfd_env_vars();

        std::env::set_var("DFD_STORAGE_BASE_PATH", "/env/path");
        std::env::set_var("DFD_DATASET_BATCH_SIZE", "64");
        std::env::set_var("DFD_DATASET_SEED", "12345");
        std::env::set_var("DFD_STREAM_NUM_THREADS", "8");
        std::env::set_var("DFD_STREAM_REPEAT", "true");
        std::env::set_var("DFD_STREAM_RECORD_FORMAT", "Length-Prefixed");

        let config = FeedConfig::default().with_env_overrides();

        assert_eq!(config.storage.base_path, PathBuf::from("/env/path"));
        assert_eq!(config.dataset.batch_size, 64);
        assert_eq!(config.dataset.seed, Some(12345));
        assert_eq!(config.stream.num_threads, 8);
        assert!(config.stream.repeat);
        assert_eq!(config.stream.record_format, "length-prefixed");

        clear_dfd_env_vars();

        // Invalid values are ignored
        std::env::set_var("DFD_DATASET_BATCH_SIZE", "not_a_number");
        let config = FeedConfig::default().with_env_overrides();
        assert_eq!(config.dataset.batch_size, 32);

        clear_dfd_env_vars();
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut original = FeedConfig::default();
        original.stream.shuffle_capacity = Some(50);
        let toml_str = toml::to_string(&original).unwrap();
        let parsed: FeedConfig = toml_str.parse().unwrap();

        assert_eq!(original.storage.base_path, parsed.storage.base_path);
        assert_eq!(original.dataset.batch_size, parsed.dataset.batch_size);
        assert_eq!(parsed.stream.shuffle_capacity, Some(50));
        assert!(parsed.stream.min_after_dequeue.is_none());
    }
}
