// rust/datafeed-core/src/stream/pipeline.rs

//! Threaded decode pipeline feeding a shuffle buffer.
//!
//! A reader thread pulls records from the file into a bounded channel;
//! `num_threads` workers decode them into `(image, mask)` samples and pass
//! them on through a second bounded channel. The consumer moves samples
//! into a `ShuffleBuffer` and draws batches from it. Once the source runs
//! out the buffer is drained, so the final batch may be short.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use ndarray::ArrayD;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::records::{ExampleDecoder, Record, RecordFormat, RecordReader};
use crate::storage::StorageBackend;

use super::shuffle::ShuffleBuffer;

/// A decoded `(image, mask)` pair.
pub type Sample = (ArrayD<u8>, ArrayD<u8>);

/// Tuning for a `RecordPipeline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub shuffle_capacity: usize,
    pub min_after_dequeue: usize,
    pub num_threads: usize,
    /// Bound of each inter-stage channel.
    pub channel_capacity: usize,
    /// Bytes read from the file at a time.
    pub chunk_size: usize,
    /// Start over from the first record whenever the file ends.
    pub repeat: bool,
    pub seed: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            shuffle_capacity: 125,
            min_after_dequeue: 100,
            num_threads: 1,
            channel_capacity: 64,
            chunk_size: 64 * 1024,
            repeat: false,
            seed: None,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &FeedConfig) -> Self {
        let batch_size = config.dataset.batch_size;
        Self {
            batch_size,
            shuffle_capacity: config.stream.capacity_for(batch_size),
            min_after_dequeue: config.stream.min_after_dequeue_for(batch_size),
            num_threads: config.stream.num_threads,
            channel_capacity: config.stream.channel_capacity,
            chunk_size: config.storage.buffer_size,
            repeat: config.stream.repeat,
            seed: config.dataset.seed,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FeedError::config("batch_size must be greater than 0"));
        }
        if self.num_threads == 0 {
            return Err(FeedError::config("num_threads must be greater than 0"));
        }
        if self.channel_capacity == 0 {
            return Err(FeedError::config("channel_capacity must be greater than 0"));
        }
        Ok(())
    }
}

/// Threads of one pass over the source.
struct Workers {
    samples: Receiver<Result<Sample>>,
    stop_flag: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

/// A pull-based, restartable stream of shuffled batches over a record file.
///
/// Output order is reproducible for a fixed seed only with a single decode
/// worker and `min_after_dequeue + 1 == shuffle_capacity`; otherwise it
/// depends on thread timing.
pub struct RecordPipeline {
    storage: Arc<dyn StorageBackend>,
    path: PathBuf,
    format: Arc<dyn RecordFormat>,
    decoder: ExampleDecoder,
    options: PipelineOptions,
    buffer: ShuffleBuffer<Sample>,
    workers: Option<Workers>,
    upstream_done: bool,
    /// Set when the source failed for good; reported once the buffer drains.
    failure: Option<String>,
}

impl RecordPipeline {
    /// Opens `path` and starts the reader and decode threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the file cannot be
    /// opened.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        path: impl AsRef<Path>,
        format: Arc<dyn RecordFormat>,
        decoder: ExampleDecoder,
        options: PipelineOptions,
    ) -> Result<Self> {
        options.validate()?;
        let buffer = ShuffleBuffer::new(
            options.shuffle_capacity,
            options.min_after_dequeue,
            options.seed,
        )?;

        let mut pipeline = Self {
            storage,
            path: path.as_ref().to_path_buf(),
            format,
            decoder,
            options,
            buffer,
            workers: None,
            upstream_done: false,
            failure: None,
        };
        pipeline.start()?;
        Ok(pipeline)
    }

    fn start(&mut self) -> Result<()> {
        let reader = RecordReader::open(
            self.storage.as_ref(),
            &self.path,
            self.format.clone(),
            self.options.chunk_size,
        )?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (record_tx, record_rx) = channel::bounded(self.options.channel_capacity);
        let (sample_tx, sample_rx) = channel::bounded(self.options.channel_capacity);

        let mut handles = Vec::with_capacity(self.options.num_threads + 1);

        let stop = stop_flag.clone();
        let repeat = self.options.repeat;
        handles.push(thread::spawn(move || {
            read_records(reader, record_tx, stop, repeat);
        }));

        for worker_id in 0..self.options.num_threads {
            let records = record_rx.clone();
            let samples = sample_tx.clone();
            let decoder = self.decoder.clone();
            let stop = stop_flag.clone();
            handles.push(thread::spawn(move || {
                decode_records(worker_id, records, samples, decoder, stop);
            }));
        }

        // Only the threads hold channel ends now, so each stage sees its
        // upstream disconnect when the previous stage finishes.
        drop(record_rx);
        drop(sample_tx);

        self.workers = Some(Workers {
            samples: sample_rx,
            stop_flag,
            handles,
        });
        self.upstream_done = false;
        self.failure = None;

        debug!(
            path = %self.path.display(),
            format = self.format.name(),
            num_threads = self.options.num_threads,
            shuffle_capacity = self.options.shuffle_capacity,
            min_after_dequeue = self.options.min_after_dequeue,
            "Started record pipeline"
        );
        Ok(())
    }

    /// Returns the next batch, or `None` once the source and the shuffle
    /// buffer are both empty.
    ///
    /// # Errors
    ///
    /// A record that fails to decode fails this call; samples already drawn
    /// for the batch go back into the shuffle buffer and later calls carry
    /// on with the following records. After a storage failure the samples
    /// still buffered are served, then every call fails until `restart`.
    pub fn next_batch(&mut self) -> Result<Option<Batch<u8, u8>>> {
        let batch_size = self.options.batch_size;
        let mut images = Vec::with_capacity(batch_size);
        let mut masks = Vec::with_capacity(batch_size);

        while images.len() < batch_size {
            match self.next_sample() {
                Ok(Some((image, mask))) => {
                    images.push(image);
                    masks.push(mask);
                }
                Ok(None) => break,
                Err(e) => {
                    for sample in images.into_iter().zip(masks) {
                        self.buffer.push(sample);
                    }
                    if !e.is_recoverable() {
                        warn!(path = %self.path.display(), error = %e, "Record source failed");
                        self.failure = Some(e.to_string());
                    }
                    return Err(e);
                }
            }
        }

        if images.is_empty() {
            return match &self.failure {
                Some(message) => Err(FeedError::pipeline(format!(
                    "record source '{}' failed: {message}",
                    self.path.display()
                ))),
                None => Ok(None),
            };
        }
        Batch::stack(&images, &masks).map(Some)
    }

    fn next_sample(&mut self) -> Result<Option<Sample>> {
        let Some(workers) = &self.workers else {
            return Ok(self.buffer.pop());
        };

        // Block until the buffer may emit.
        while !self.upstream_done && !self.buffer.is_ready() {
            match workers.samples.recv() {
                Ok(item) => self.buffer.push(item?),
                Err(_) => self.upstream_done = true,
            }
        }

        // Take whatever is already decoded, up to capacity.
        while !self.upstream_done && !self.buffer.is_full() {
            match workers.samples.try_recv() {
                Ok(item) => self.buffer.push(item?),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.upstream_done = true,
            }
        }

        Ok(self.buffer.pop())
    }

    /// Stops all threads and starts again from the first record.
    ///
    /// Buffered samples are discarded.
    pub fn restart(&mut self) -> Result<()> {
        self.stop();
        self.buffer.clear();
        debug!(path = %self.path.display(), "Restarting record pipeline");
        self.start()
    }

    /// Stops and joins all threads. Samples already buffered can still be
    /// drawn with `next_batch`.
    pub fn stop(&mut self) {
        let Some(workers) = self.workers.take() else {
            return;
        };

        workers.stop_flag.store(true, Ordering::Relaxed);
        // Dropping the receiver unblocks workers waiting to send.
        drop(workers.samples);
        for handle in workers.handles {
            if handle.join().is_err() {
                warn!(path = %self.path.display(), "Record pipeline thread panicked");
            }
        }
        self.upstream_done = true;
        debug!(path = %self.path.display(), "Stopped record pipeline");
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Number of samples waiting in the shuffle buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RecordPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordPipeline")
            .field("path", &self.path)
            .field("format", &self.format.name())
            .field("options", &self.options)
            .field("buffered", &self.buffer.len())
            .field("running", &self.workers.is_some())
            .finish()
    }
}

fn read_records(
    mut reader: RecordReader,
    records: Sender<Result<Record>>,
    stop: Arc<AtomicBool>,
    repeat: bool,
) {
    loop {
        let mut produced = 0u64;
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            match reader.next_record() {
                Ok(Some(record)) => {
                    produced += 1;
                    if records.send(Ok(record)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let recoverable = e.is_recoverable();
                    if records.send(Err(e)).is_err() || !recoverable {
                        return;
                    }
                }
            }
        }

        if !repeat || produced == 0 {
            debug!(
                path = %reader.path().display(),
                records = produced,
                "Record source exhausted"
            );
            return;
        }
        reader.reset();
    }
}

fn decode_records(
    worker_id: usize,
    records: Receiver<Result<Record>>,
    samples: Sender<Result<Sample>>,
    decoder: ExampleDecoder,
    stop: Arc<AtomicBool>,
) {
    for item in records.iter() {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let sample = item.and_then(|record| decoder.decode_record(&record));
        if samples.send(sample).is_err() {
            if !stop.load(Ordering::Relaxed) {
                warn!(worker_id, "Sample channel closed, decode worker exiting");
            }
            return;
        }
    }
}
