// rust/datafeed-core/src/dataset/traits.rs

use std::ops::Range;

use ndarray::ArrayD;
use rand::RngCore;

use crate::batch::Batch;
use crate::error::{FeedError, Result};

/// Position of a dataset within the current epoch.
///
/// The cursor hands out windows of at most `batch_size` samples. A window is
/// only consumed once the caller commits it, so a batch that fails to build
/// leaves the position untouched. After the final, possibly short, window is
/// committed the position equals `size` exactly.
///
/// Only the owning dataset moves the cursor; callers get read access through
/// `DataSet::cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    position: usize,
    size: usize,
    batch_size: usize,
}

impl Cursor {
    /// Creates an empty cursor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `batch_size` is zero.
    pub fn new(batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(FeedError::config("batch_size must be greater than 0"));
        }
        Ok(Self {
            position: 0,
            size: 0,
            batch_size,
        })
    }

    /// Sets the number of samples and rewinds.
    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
        self.position = 0;
    }

    /// The next window to serve, or `None` once the epoch is exhausted.
    pub fn peek_window(&self) -> Option<Range<usize>> {
        if self.position >= self.size {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.size);
        Some(self.position..end)
    }

    /// Marks everything before `end` as consumed.
    pub(crate) fn commit(&mut self, end: usize) {
        self.position = end.min(self.size);
    }

    pub(crate) fn reset(&mut self) {
        self.position = 0;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.size
    }

    /// Number of batches in one epoch, counting a short final batch.
    pub fn steps_per_epoch(&self) -> usize {
        self.size.div_ceil(self.batch_size)
    }
}

/// The batch-iteration contract shared by dataset variants.
///
/// A dataset starts unloaded. `load` moves it to loaded exactly once; after
/// that the caller alternates `batch` until it returns `None` with `reset`,
/// and may `shuffle` between epochs. Calls must not overlap: shuffling while
/// another caller is batching the same instance is a caller error.
pub trait DataSet {
    type Input;
    type Target;

    /// Populates the dataset's storage and size.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLoaded` on a second call, or the source's error. A
    /// failed load leaves the dataset unloaded.
    fn load(&mut self) -> Result<()>;

    /// Reorders the samples without adding or dropping any.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` before `load`.
    fn shuffle(&mut self, rng: &mut dyn RngCore) -> Result<()>;

    /// Returns the next batch, or `None` once the epoch is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` before `load`. Any other failure leaves the
    /// cursor where it was.
    fn batch(&mut self) -> Result<Option<Batch<Self::Input, Self::Target>>>;

    fn is_loaded(&self) -> bool;

    fn cursor(&self) -> &Cursor;

    /// Rewinds to the first sample. Does not reshuffle or reload.
    fn reset(&mut self);

    /// Whether `next_epoch` reshuffles before rewinding.
    fn shuffles_each_epoch(&self) -> bool;

    /// Moves on to the next epoch: reshuffles with `rng` if the dataset
    /// shuffles between epochs, then rewinds.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` before `load`.
    fn next_epoch(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        if !self.is_loaded() {
            return Err(FeedError::NotLoaded);
        }
        if self.shuffles_each_epoch() {
            self.shuffle(rng)?;
        }
        self.reset();
        Ok(())
    }

    /// Number of samples; 0 until loaded.
    fn size(&self) -> usize {
        self.cursor().size()
    }

    fn current_index(&self) -> usize {
        self.cursor().position()
    }

    fn batch_size(&self) -> usize {
        self.cursor().batch_size()
    }

    fn steps_per_epoch(&self) -> usize {
        self.cursor().steps_per_epoch()
    }
}

/// A one-shot provider of every sample for an in-memory dataset.
pub trait SampleSource {
    type Input;
    type Target;

    /// Returns the index-aligned images and labels.
    #[allow(clippy::type_complexity)]
    fn load_samples(&mut self) -> Result<(Vec<ArrayD<Self::Input>>, Vec<ArrayD<Self::Target>>)>;
}

/// Random access to samples kept outside the dataset.
pub trait SampleStore {
    type Input;
    type Target;

    /// Prepares the store and returns how many samples it holds.
    fn open(&mut self) -> Result<usize>;

    /// Fetches the sample at `index`.
    fn fetch(&mut self, index: usize) -> Result<(ArrayD<Self::Input>, ArrayD<Self::Target>)>;
}
