// rust/datafeed-core/src/dataset/in_memory.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{ArrayD, Axis};
use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::info;

use crate::batch::Batch;
use crate::config::DatasetConfig;
use crate::error::{FeedError, Result};
use crate::records::{ExampleDecoder, RecordFormat, RecordReader};
use crate::storage::StorageBackend;

use super::traits::{Cursor, DataSet, SampleSource};

/// A dataset that holds every sample in memory.
///
/// Images and labels live in two index-aligned sequences. Batches are
/// contiguous windows of both; the final window of an epoch may be short.
/// Shuffling reorders both sequences with one shared permutation.
pub struct InMemoryDataset<S: SampleSource> {
    source: S,
    images: Vec<ArrayD<S::Input>>,
    labels: Vec<ArrayD<S::Target>>,
    cursor: Cursor,
    loaded: bool,
    shuffle_each_epoch: bool,
}

impl<S: SampleSource> InMemoryDataset<S> {
    /// Creates an unloaded dataset over `source`. It does not reshuffle
    /// between epochs unless `with_epoch_shuffle` turns that on.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `batch_size` is zero.
    pub fn new(source: S, batch_size: usize) -> Result<Self> {
        Ok(Self {
            source,
            images: Vec::new(),
            labels: Vec::new(),
            cursor: Cursor::new(batch_size)?,
            loaded: false,
            shuffle_each_epoch: false,
        })
    }

    /// Takes the batch size and the between-epoch shuffle policy from
    /// `config`.
    pub fn from_config(source: S, config: &DatasetConfig) -> Result<Self> {
        Ok(Self::new(source, config.batch_size)?.with_epoch_shuffle(config.shuffle))
    }

    #[must_use]
    pub fn with_epoch_shuffle(mut self, enabled: bool) -> Self {
        self.shuffle_each_epoch = enabled;
        self
    }

    pub fn images(&self) -> &[ArrayD<S::Input>] {
        &self.images
    }

    pub fn labels(&self) -> &[ArrayD<S::Target>] {
        &self.labels
    }

    /// Reorders both sequences so that position `k` holds the sample that
    /// was at `permutation[k]`.
    ///
    /// # Errors
    ///
    /// Returns `NotLoaded` before `load` and `InvalidPermutation` unless
    /// `permutation` holds every index in `0..size` exactly once. On error
    /// the samples are left untouched.
    pub fn permute(&mut self, permutation: &[usize]) -> Result<()> {
        if !self.loaded {
            return Err(FeedError::NotLoaded);
        }

        let size = self.images.len();
        if permutation.len() != size {
            return Err(FeedError::invalid_permutation(format!(
                "expected {size} indices, got {}",
                permutation.len()
            )));
        }

        // inverse[i] is the new position of the sample at i
        let mut inverse = vec![usize::MAX; size];
        for (position, &index) in permutation.iter().enumerate() {
            match inverse.get_mut(index) {
                Some(slot) if *slot == usize::MAX => *slot = position,
                Some(_) => {
                    return Err(FeedError::invalid_permutation(format!(
                        "index {index} appears more than once"
                    )))
                }
                None => {
                    return Err(FeedError::invalid_permutation(format!(
                        "index {index} out of range for {size} samples"
                    )))
                }
            }
        }

        let images = std::mem::take(&mut self.images);
        let labels = std::mem::take(&mut self.labels);
        let mut samples: Vec<_> = inverse
            .into_iter()
            .zip(images.into_iter().zip(labels))
            .collect();
        samples.sort_unstable_by_key(|(position, _)| *position);
        (self.images, self.labels) = samples.into_iter().map(|(_, sample)| sample).unzip();

        Ok(())
    }
}

impl<S> DataSet for InMemoryDataset<S>
where
    S: SampleSource,
    S::Input: Clone,
    S::Target: Clone,
{
    type Input = S::Input;
    type Target = S::Target;

    fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Err(FeedError::AlreadyLoaded);
        }

        let (images, labels) = self.source.load_samples()?;
        if images.len() != labels.len() {
            return Err(FeedError::batch_mismatch(images.len(), labels.len()));
        }

        self.cursor.set_size(images.len());
        self.images = images;
        self.labels = labels;
        self.loaded = true;

        info!(
            samples = self.cursor.size(),
            batch_size = self.cursor.batch_size(),
            steps_per_epoch = self.cursor.steps_per_epoch(),
            "Loaded in-memory dataset"
        );
        Ok(())
    }

    fn shuffle(&mut self, rng: &mut dyn RngCore) -> Result<()> {
        if !self.loaded {
            return Err(FeedError::NotLoaded);
        }

        let mut permutation: Vec<usize> = (0..self.images.len()).collect();
        permutation.shuffle(rng);
        self.permute(&permutation)
    }

    fn batch(&mut self) -> Result<Option<Batch<S::Input, S::Target>>> {
        if !self.loaded {
            return Err(FeedError::NotLoaded);
        }

        let Some(window) = self.cursor.peek_window() else {
            return Ok(None);
        };

        let (Some(images), Some(labels)) = (
            self.images.get(window.clone()),
            self.labels.get(window.clone()),
        ) else {
            return Err(FeedError::invalid_shape(format!(
                "window {window:?} is outside the {} loaded samples",
                self.images.len().min(self.labels.len())
            )));
        };

        let batch = Batch::stack(images, labels)?;
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

/// Samples supplied by the caller.
#[derive(Debug, Clone)]
pub struct VecSource<X, Y> {
    samples: Option<(Vec<ArrayD<X>>, Vec<ArrayD<Y>>)>,
}

impl<X, Y> VecSource<X, Y> {
    /// # Errors
    ///
    /// Returns `BatchMismatch` if the sequences differ in length.
    pub fn new(images: Vec<ArrayD<X>>, labels: Vec<ArrayD<Y>>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(FeedError::batch_mismatch(images.len(), labels.len()));
        }
        Ok(Self {
            samples: Some((images, labels)),
        })
    }
}

impl<X: Clone, Y: Clone> VecSource<X, Y> {
    /// Splits whole arrays into samples along their leading axis.
    pub fn from_arrays(images: &ArrayD<X>, labels: &ArrayD<Y>) -> Result<Self> {
        if images.ndim() == 0 || labels.ndim() == 0 {
            return Err(FeedError::invalid_shape(
                "images and labels must have a leading sample axis",
            ));
        }
        Self::new(
            images.axis_iter(Axis(0)).map(|s| s.to_owned()).collect(),
            labels.axis_iter(Axis(0)).map(|s| s.to_owned()).collect(),
        )
    }
}

impl<X, Y> SampleSource for VecSource<X, Y> {
    type Input = X;
    type Target = Y;

    fn load_samples(&mut self) -> Result<(Vec<ArrayD<X>>, Vec<ArrayD<Y>>)> {
        self.samples.take().ok_or(FeedError::AlreadyLoaded)
    }
}

/// Samples decoded eagerly from every record of a record file.
pub struct RecordFileSource {
    storage: Arc<dyn StorageBackend>,
    path: PathBuf,
    format: Arc<dyn RecordFormat>,
    decoder: ExampleDecoder,
    chunk_size: usize,
}

impl RecordFileSource {
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
        }
    }
}

impl SampleSource for RecordFileSource {
    type Input = u8;
    type Target = u8;

    fn load_samples(&mut self) -> Result<(Vec<ArrayD<u8>>, Vec<ArrayD<u8>>)> {
        let reader = RecordReader::open(
            self.storage.as_ref(),
            &self.path,
            self.format.clone(),
            self.chunk_size,
        )?;

        let mut images = Vec::new();
        let mut masks = Vec::new();
        for record in reader {
            let (image, mask) = self.decoder.decode_record(&record?)?;
            images.push(image);
            masks.push(mask);
        }
        Ok((images, masks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::testing::{tagged_file, MockStorage};
    use crate::records::FramedFormat;
    use ndarray::{arr1, Array, IxDyn};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Sample i has image [i, i] and label [100 + i].
    fn numbered(n: usize, batch_size: usize) -> InMemoryDataset<VecSource<u32, u32>> {
        let images = (0..n as u32).map(|i| arr1(&[i, i]).into_dyn()).collect();
        let labels = (0..n as u32).map(|i| arr1(&[100 + i]).into_dyn()).collect();
        let source = VecSource::new(images, labels).unwrap();
        let mut dataset = InMemoryDataset::new(source, batch_size).unwrap();
        dataset.load().unwrap();
        dataset
    }

    fn first_column(batch: &Batch<u32, u32>) -> Vec<u32> {
        batch.inputs().index_axis(Axis(1), 0).iter().copied().collect()
    }

    fn drain(dataset: &mut InMemoryDataset<VecSource<u32, u32>>) -> Vec<Vec<u32>> {
        let mut windows = Vec::new();
        while let Some(batch) = dataset.batch().unwrap() {
            windows.push(first_column(&batch));
        }
        windows
    }

    #[test]
    fn test_partition_with_short_final_batch() {
        let mut dataset = numbered(10, 4);
        assert_eq!(dataset.size(), 10);
        assert_eq!(dataset.steps_per_epoch(), 3);

        let windows = drain(&mut dataset);
        assert_eq!(
            windows,
            vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]
        );
        assert_eq!(dataset.current_index(), 10);
        assert!(dataset.batch().unwrap().is_none());
        assert_eq!(dataset.current_index(), 10);
    }

    #[test]
    fn test_exact_multiple_has_no_short_batch() {
        // current_index + batch_size == size on the last window
        let mut dataset = numbered(8, 4);
        let windows = drain(&mut dataset);
        assert_eq!(windows.len(), 2);
        assert_eq!(dataset.current_index(), 8);
    }

    #[test]
    fn test_batch_larger_than_dataset() {
        // current_index + batch_size > size on the first window
        let mut dataset = numbered(3, 5);
        let batch = dataset.batch().unwrap().unwrap();
        assert_eq!(batch.size(), 3);
        assert_eq!(dataset.current_index(), 3);
        assert!(dataset.batch().unwrap().is_none());
    }

    #[test]
    fn test_reset_reproduces_partition() {
        let mut dataset = numbered(7, 3);
        dataset.reset();
        assert_eq!(dataset.current_index(), 0);

        let first = drain(&mut dataset);
        dataset.reset();
        dataset.reset();
        assert_eq!(dataset.current_index(), 0);
        let second = drain(&mut dataset);
        assert_eq!(first, second);
    }

    #[test]
    fn test_shuffle_keeps_pairs_aligned() {
        let mut dataset = numbered(50, 8);
        let mut rng = StdRng::seed_from_u64(7);
        dataset.shuffle(&mut rng).unwrap();
        assert_eq!(dataset.size(), 50);

        let mut seen: Vec<u32> = Vec::new();
        for (image, label) in dataset.images().iter().zip(dataset.labels()) {
            let id = image[[0]];
            assert_eq!(image[[1]], id);
            assert_eq!(label[[0]], 100 + id);
            seen.push(id);
        }

        let order = seen.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<u32>>());
        assert_ne!(order, (0..50).collect::<Vec<u32>>());
    }

    #[test]
    fn test_shuffle_is_reproducible_with_seed() {
        let mut a = numbered(20, 4);
        let mut b = numbered(20, 4);
        a.shuffle(&mut StdRng::seed_from_u64(99)).unwrap();
        b.shuffle(&mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a.images(), b.images());
        assert_eq!(a.labels(), b.labels());
    }

    #[test]
    fn test_permute_applies_to_both_sequences() {
        let mut dataset = numbered(4, 2);
        dataset.permute(&[2, 0, 3, 1]).unwrap();

        let ids: Vec<u32> = dataset.images().iter().map(|x| x[[0]]).collect();
        let labels: Vec<u32> = dataset.labels().iter().map(|y| y[[0]]).collect();
        assert_eq!(ids, vec![2, 0, 3, 1]);
        assert_eq!(labels, vec![102, 100, 103, 101]);

        let windows = drain(&mut dataset);
        assert_eq!(windows, vec![vec![2, 0], vec![3, 1]]);
    }

    #[test]
    fn test_permute_rejects_non_bijection() {
        let mut dataset = numbered(3, 2);
        for bad in [&[0, 1][..], &[0, 1, 1], &[0, 1, 3]] {
            assert!(matches!(
                dataset.permute(bad),
                Err(FeedError::InvalidPermutation { .. })
            ));
        }
        let ids: Vec<u32> = dataset.images().iter().map(|x| x[[0]]).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_state_machine() {
        let images = vec![arr1(&[1u8]).into_dyn()];
        let labels = vec![arr1(&[2u8]).into_dyn()];
        let mut dataset =
            InMemoryDataset::new(VecSource::new(images, labels).unwrap(), 1).unwrap();

        assert!(!dataset.is_loaded());
        assert_eq!(dataset.size(), 0);
        assert!(matches!(dataset.batch(), Err(FeedError::NotLoaded)));
        assert!(matches!(
            dataset.shuffle(&mut StdRng::seed_from_u64(0)),
            Err(FeedError::NotLoaded)
        ));

        dataset.load().unwrap();
        assert!(dataset.is_loaded());
        assert!(matches!(dataset.load(), Err(FeedError::AlreadyLoaded)));
        assert_eq!(dataset.size(), 1);
    }

    #[test]
    fn test_cursor_beyond_samples_is_an_error() {
        let mut dataset = numbered(10, 4);
        dataset.cursor.set_size(20);

        assert_eq!(drain_until_error(&mut dataset), 2);
        assert!(matches!(
            dataset.batch(),
            Err(FeedError::InvalidShape { .. })
        ));
        assert_eq!(dataset.current_index(), 8);
    }

    /// Counts the batches served before the first error.
    fn drain_until_error(dataset: &mut InMemoryDataset<VecSource<u32, u32>>) -> usize {
        let mut served = 0;
        while let Ok(Some(_)) = dataset.batch() {
            served += 1;
        }
        served
    }

    #[test]
    fn test_next_epoch_follows_shuffle_policy() {
        let mut rng = StdRng::seed_from_u64(21);

        let mut fixed = numbered(30, 30);
        let before = drain(&mut fixed);
        fixed.next_epoch(&mut rng).unwrap();
        assert_eq!(fixed.current_index(), 0);
        assert_eq!(drain(&mut fixed), before);

        let config = DatasetConfig {
            batch_size: 30,
            ..Default::default()
        };
        let images = (0..30u32).map(|i| arr1(&[i, i]).into_dyn()).collect();
        let labels = (0..30u32).map(|i| arr1(&[100 + i]).into_dyn()).collect();
        let source = VecSource::new(images, labels).unwrap();
        let mut shuffled = InMemoryDataset::from_config(source, &config).unwrap();
        assert!(shuffled.shuffles_each_epoch());
        shuffled.load().unwrap();

        let first = drain(&mut shuffled);
        shuffled.next_epoch(&mut rng).unwrap();
        assert_eq!(shuffled.current_index(), 0);
        let second = drain(&mut shuffled);
        assert_ne!(first, second);

        let mut ids = second.concat();
        ids.sort_unstable();
        assert_eq!(ids, (0..30).collect::<Vec<u32>>());
        for (image, label) in shuffled.images().iter().zip(shuffled.labels()) {
            assert_eq!(label[[0]], 100 + image[[0]]);
        }
    }

    #[test]
    fn test_next_epoch_before_load() {
        let source = VecSource::<u8, u8>::new(vec![], vec![]).unwrap();
        let mut dataset = InMemoryDataset::new(source, 2).unwrap();
        assert!(matches!(
            dataset.next_epoch(&mut StdRng::seed_from_u64(0)),
            Err(FeedError::NotLoaded)
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let source = VecSource::<u8, u8>::new(vec![], vec![]).unwrap();
        assert!(InMemoryDataset::new(source, 0).is_err());
    }

    #[test]
    fn test_empty_dataset() {
        let source = VecSource::<u8, u8>::new(vec![], vec![]).unwrap();
        let mut dataset = InMemoryDataset::new(source, 4).unwrap();
        dataset.load().unwrap();
        assert!(dataset.batch().unwrap().is_none());
        dataset.shuffle(&mut StdRng::seed_from_u64(1)).unwrap();
    }

    #[test]
    fn test_vec_source_from_arrays() {
        let images = Array::from_shape_vec(IxDyn(&[3, 2]), vec![0u8, 0, 1, 1, 2, 2]).unwrap();
        let labels = Array::from_shape_vec(IxDyn(&[3]), vec![5u8, 6, 7]).unwrap();
        let source = VecSource::from_arrays(&images, &labels).unwrap();

        let mut dataset = InMemoryDataset::new(source, 2).unwrap();
        dataset.load().unwrap();
        let batch = dataset.batch().unwrap().unwrap();
        assert_eq!(batch.inputs().shape(), &[2, 2]);
        assert_eq!(batch.targets().shape(), &[2]);
        assert_eq!(batch.targets()[[1]], 6);

        let short = Array::from_shape_vec(IxDyn(&[2]), vec![5u8, 6]).unwrap();
        assert!(VecSource::from_arrays(&images, &short).is_err());
    }

    #[test]
    fn test_record_file_source() {
        let storage = Arc::new(MockStorage::new());
        storage.add_file("train.rec", tagged_file(5));

        let source = RecordFileSource::new(
            storage,
            "train.rec",
            Arc::new(FramedFormat::new()),
            ExampleDecoder::new([2, 2], [1]).unwrap(),
            32,
        );
        let mut dataset = InMemoryDataset::new(source, 2).unwrap();
        dataset.load().unwrap();
        assert_eq!(dataset.size(), 5);

        let batch = dataset.batch().unwrap().unwrap();
        assert_eq!(batch.inputs().shape(), &[2, 2, 2]);
        assert_eq!(batch.inputs()[[1, 0, 0]], 1);
        assert_eq!(batch.targets().shape(), &[2, 1]);
        assert_eq!(batch.targets()[[1, 0]], 1);
    }

    #[test]
    fn test_record_file_source_failure_leaves_unloaded() {
        let storage = Arc::new(MockStorage::new());
        storage.add_file("train.rec", tagged_file(3));

        // Wrong image shape for the stored bytes
        let source = RecordFileSource::new(
            storage,
            "train.rec",
            Arc::new(FramedFormat::new()),
            ExampleDecoder::new([3, 3], [1]).unwrap(),
            32,
        );
        let mut dataset = InMemoryDataset::new(source, 2).unwrap();
        assert!(matches!(
            dataset.load(),
            Err(FeedError::MalformedRecord { .. })
        ));
        assert!(!dataset.is_loaded());
        assert_eq!(dataset.size(), 0);
    }
}
