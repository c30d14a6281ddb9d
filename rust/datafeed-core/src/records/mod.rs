// rust/datafeed-core/src/records/mod.rs

//! Consumption of on-disk record files.
//!
//! A record file is a sequence of framed records. Each payload is a
//! bincode-encoded `Example` carrying an image and a segmentation mask as
//! raw bytes. This module reads records sequentially or through an index
//! and decodes them into fixed-shape arrays. Producing record files is left
//! to external tooling.
//!
//! # Example
//!
//! ```no_run
//! use datafeed_core::config::StorageConfig;
//! use datafeed_core::records::{parse_format, ExampleDecoder, RecordReader};
//! use datafeed_core::storage::LocalStorage;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//! let format = parse_format("framed").unwrap();
//! let decoder = ExampleDecoder::new([128, 128, 3], [128, 128, 1]).unwrap();
//!
//! let reader = RecordReader::open(&storage, "train.rec", format, 64 * 1024).unwrap();
//! for record in reader {
//!     let (image, mask) = decoder.decode_record(&record.unwrap()).unwrap();
//!     assert_eq!(image.shape(), &[128, 128, 3]);
//! }
//! ```

mod example;
mod format;
mod index;
mod reader;

#[cfg(test)]
pub(crate) mod testing;

pub use example::{Example, ExampleDecoder};
pub use format::{parse_format, FramedFormat, LengthPrefixedFormat, RecordFormat};
pub use index::RecordIndex;
pub use reader::{Record, RecordReader};
