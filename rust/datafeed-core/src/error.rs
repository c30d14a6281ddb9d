// rust/datafeed-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Batch size mismatch: inputs have {inputs} samples, targets have {targets}")]
    BatchMismatch {
        inputs: usize,
        targets: usize,
    },

    #[error("Invalid shape: {message}")]
    InvalidShape {
        message: String,
    },

    #[error("Execution context is closed")]
    ContextClosed,

    #[error("Dataset has not been loaded")]
    NotLoaded,

    #[error("Dataset is already loaded")]
    AlreadyLoaded,

    #[error("Malformed record at offset {offset}: {message}")]
    MalformedRecord {
        offset: u64,
        message: String,
    },

    #[error("Invalid permutation: {message}")]
    InvalidPermutation {
        message: String,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("Pipeline error: {message}")]
    Pipeline {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, FeedError>;

// Convenience constructors
impl FeedError {

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn batch_mismatch(inputs: usize, targets: usize) -> Self {
        Self::BatchMismatch { inputs, targets }
    }

    pub fn invalid_shape(message: impl Into<String>) -> Self {
        Self::InvalidShape {
            message: message.into(),
        }
    }

    pub fn malformed_record(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            message: message.into(),
        }
    }

    pub fn invalid_permutation(message: impl Into<String>) -> Self {
        Self::InvalidPermutation {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::Pipeline {
            message: message.into(),
        }
    }

    /// Returns true for errors that only affect the current call and leave
    /// dataset state usable for the next one.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. } | Self::InvalidShape { .. })
    }
}
