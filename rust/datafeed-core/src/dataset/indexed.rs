// rust/datafeed-core/src/dataset/indexed.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::ArrayD;
use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::info;

use crate::batch::Batch;
use crate::config::DatasetConfig;
use crate::error::{FeedError, Result};
use crate::records::{Example, ExampleDecoder, RecordFormat, RecordIndex};
use crate::storage::StorageBackend;

use super::traits::{Cursor, DataSet, SampleStore};

/// A dataset that keeps only an index list over an external store.
///
/// Shuffling permutes the index list; the store is never touched. Each
/// batch fetches the samples named by the next window of the index list,
/// with the same short final batch as `InMemoryDataset`.
pub struct IndexedDataset<S: SampleStore> {
    store: S,
    indices: Vec<usize>,
    cursor: Cursor,
    loaded: bool,
    shuffle_each_epoch: bool,
}

impl<S: SampleStore> IndexedDataset<S> {
    /// Creates an unloaded dataset over `store`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `batch_size` is zero.
    pub fn new(store: S, batch_size: usize) -> Result<Self> {
        Ok(Self {
            store,
            indices: Vec::new(),
            cursor: Cursor::new(batch_size)?,
            loaded: false,
            shuffle_each_epoch: false,
        })
    }

    pub fn from_config(store: S, config: &DatasetConfig) -> Result<Self> {
        Ok(Self::new(store, config.batch_size)?.with_epoch_shuffle(config.shuffle))
    }

    /// Reshuffle the index list in `next_epoch`.
    #[must_use]
    pub fn with_epoch_shuffle(mut self, enabled: bool) -> Self {
        self.shuffle_each_epoch = enabled;
        self
    }

    /// Current sample order as store indices.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> DataSet for IndexedDataset<S>
where
    S: SampleStore,
    S::Input: Clone,
    S::Target: Clone,
{
    type Input = S::Input;
    type Target = S::Target;

    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Err(FeedError::AlreadyLoaded);
        }

        let size = self.store.open()?;
        self.indices = (0..size).collect();
        self.cursor.set_size(size);
        self.loaded = true;

        info!(
            samples = size,
            batch_size = self.cursor.batch_size(),
            "Loaded indexed dataset"
        );
        Ok(())
    }

    fn shuffle(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        if !self.loaded {
            return Err(FeedError::NotLoaded);
        }
        self.indices.shuffle(rng);
        Ok(())
    }

    fn batch(&mut self) -> Result<Option<Batch<S::Input, S::Target>>> {
        if !self.loaded {
            return Err(FeedError::NotLoaded);
        }

        let Some(window) = self.cursor.peek_window() else {
            return Ok(None);
        };

        let Some(selected) = self.indices.get(window.clone()) else {
            return Err(FeedError::invalid_shape(format!(
                "window {window:?} is outside the {} indexed samples",
                self.indices.len()
            )));
        };

        let mut images = Vec::with_capacity(window.len());
        let mut labels = Vec::with_capacity(window.len());
        for &index in selected {
            let (image, label) = self.store.fetch(index)?;
            images.push(image);
            labels.push(label);
        }

        let batch = Batch::stack(&images, &labels)?;
        self.cursor.commit(window.end);
        Ok(Some(batch))
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }

    fn shuffles_each_epoch(&self) -> bool {
        self.shuffle_each_epoch
    }
}

/// Samples fetched one record at a time from an indexed record file.
pub struct RecordFileStore {
    storage: Arc<dyn StorageBackend>,
    path: PathBuf,
    format: Arc<dyn RecordFormat>,
    decoder: ExampleDecoder,
    chunk_size: usize,
    index: Option<RecordIndex>,
}

impl RecordFileStore {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        path: impl AsRef<Path>,
        format: Arc<dyn RecordFormat>,
        decoder: ExampleDecoder,
        chunk_size: usize,
    ) -> Self {
        Self {
            storage,
            path: path.as_ref().to_path_buf(),
            format,
            decoder,
            chunk_size,
            index: None,
        }
    }
}

impl SampleStore for RecordFileStore {
    type Input = u8;
    type Target = u8;

    fn open(&mut self) -> Result<usize> {
        let index = RecordIndex::build(
            self.storage.as_ref(),
            &self.path,
            self.format.clone(),
            self.chunk_size,
        )?;
        let len = index.len();
        self.index = Some(index);
        Ok(len)
    }

    fn fetch(&mut self, index: usize) -> Result<(ArrayD<u8>, ArrayD<u8>)> {
        let records = self.index.as_mut().ok_or(FeedError::NotLoaded)?;
        let offset = records.entry(index).map_or(0, |(offset, _)| offset);
        let payload = records.read(index)?;
        let example = Example::from_bytes(&payload, offset)?;
        self.decoder.decode(example, offset)
    }
}
