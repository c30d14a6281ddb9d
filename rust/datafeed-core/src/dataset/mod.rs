// rust/datafeed-core/src/dataset/mod.rs

//! Datasets that serve batches from a cursor.
//!
//! `InMemoryDataset` loads every sample up front and slices contiguous
//! windows; `IndexedDataset` keeps an index list over a `SampleStore` and
//! fetches each window on demand. Both hand out `ceil(size / batch_size)`
//! batches per epoch, the last one possibly short, and report exhaustion
//! with `None`. `next_epoch` rewinds and, when the dataset is set to
//! shuffle between epochs, reshuffles first.
//!
//! # Example
//!
//! ```
//! use datafeed_core::dataset::{DataSet, InMemoryDataset, VecSource};
//! use ndarray::arr1;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let images = (0..5u8).map(|i| arr1(&[i, i]).into_dyn()).collect();
//! let labels = (0..5u8).map(|i| arr1(&[i]).into_dyn()).collect();
//! let source = VecSource::new(images, labels).unwrap();
//!
//! let mut dataset = InMemoryDataset::new(source, 2)
//!     .unwrap()
//!     .with_epoch_shuffle(true);
//! dataset.load().unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! dataset.shuffle(&mut rng).unwrap();
//!
//! let mut sizes = Vec::new();
//! while let Some(batch) = dataset.batch().unwrap() {
//!     sizes.push(batch.size());
//! }
//! assert_eq!(sizes, vec![2, 2, 1]);
//! dataset.next_epoch(&mut rng).unwrap();
//! assert_eq!(dataset.current_index(), 0);
//! ```

mod in_memory;
mod indexed;
mod traits;

pub use in_memory::{InMemoryDataset, RecordFileSource, VecSource};
pub use indexed::{IndexedDataset, RecordFileStore};
pub use traits::{Cursor, DataSet, SampleSource, SampleStore};
