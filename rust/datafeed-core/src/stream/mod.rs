// rust/datafeed-core/src/stream/mod.rs

//! Engine-driven streaming over record files.
//!
//! `RecordStreamDataset` runs a threaded decode pipeline behind a blocking
//! `batch` call: records are decoded, pass through a bounded shuffle buffer
//! and are grouped into batches. An `ExecutionContext` must be open for
//! every call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use datafeed_core::config::FeedConfig;
//! use datafeed_core::records::ExampleDecoder;
//! use datafeed_core::storage::LocalStorage;
//! use datafeed_core::stream::{RecordStreamDataset, Session, StreamBatch};
//!
//! let config = FeedConfig::from_file("feed.toml").unwrap();
//! let storage = Arc::new(LocalStorage::new(&config.storage).unwrap());
//! let decoder = ExampleDecoder::new([256, 256, 3], [256, 256, 1]).unwrap();
//! let session = Session::new();
//!
//! let mut dataset =
//!     RecordStreamDataset::open(&session, storage, "train.rec", decoder, &config).unwrap();
//!
//! loop {
//!     match dataset.batch(&session).unwrap() {
//!         StreamBatch::Ready { batch, epoch_complete } => {
//!             // train on batch
//!             if epoch_complete {
//!                 dataset.reset(&session).unwrap();
//!             }
//!         }
//!         StreamBatch::Exhausted { .. } => {
//!             dataset.reset(&session).unwrap();
//!         }
//!     }
//! }
//! ```

mod context;
mod dataset;
mod pipeline;
mod shuffle;

pub use context::{ExecutionContext, Session};
pub use dataset::{RecordStreamDataset, StreamBatch};
pub use pipeline::{PipelineOptions, RecordPipeline, Sample};
pub use shuffle::ShuffleBuffer;
