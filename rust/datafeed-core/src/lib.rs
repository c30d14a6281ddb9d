// rust/datafeed-core/src/lib.rs

//! Data Feed - Core Library
//!
//! This crate provides batched, shuffled data feeding for model training:
//! an in-memory dataset that serves windows of preloaded samples, an
//! index-based dataset over an external sample store, and a streaming
//! dataset that decodes record files through a threaded shuffle pipeline.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::FeedConfig;
pub use error::{FeedError, Result};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader};

pub mod augment;
pub mod batch;
pub use augment::{augment, Augment, AugmentationPipeline};
pub use batch::Batch;

pub mod dataset;
pub use dataset::{
    Cursor, DataSet, InMemoryDataset, IndexedDataset, RecordFileSource, RecordFileStore,
    SampleSource, SampleStore, VecSource,
};

pub mod records;
pub use records::{
    parse_format, Example, ExampleDecoder, FramedFormat, LengthPrefixedFormat, Record,
    RecordFormat, RecordIndex, RecordReader,
};

pub mod stream;
pub use stream::{
    ExecutionContext, PipelineOptions, RecordPipeline, RecordStreamDataset, Session,
    ShuffleBuffer, StreamBatch,
};
