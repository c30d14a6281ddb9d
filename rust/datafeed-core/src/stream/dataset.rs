// rust/datafeed-core/src/stream/dataset.rs

use std::path::Path;
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use crate::records::{parse_format, ExampleDecoder};
use crate::storage::StorageBackend;

use super::context::ExecutionContext;
use super::pipeline::{PipelineOptions, RecordPipeline};

/// Outcome of one `RecordStreamDataset::batch` call.
#[derive(Debug)]
pub enum StreamBatch {
    /// A batch was produced. `epoch_complete` is set on the batch that
    /// completes `steps_per_epoch` steps.
    Ready {
        batch: Batch<u8, u8>,
        epoch_complete: bool,
    },
    /// The source ran out. `steps_taken` counts the batches served since
    /// the last epoch boundary.
    Exhausted { steps_taken: usize },
}

impl StreamBatch {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// The source ran out part way through an epoch, so `epoch_size` does
    /// not match the number of records available.
    pub fn is_size_mismatch(&self) -> bool {
        matches!(self, Self::Exhausted { steps_taken } if *steps_taken > 0)
    }

    pub fn epoch_complete(&self) -> bool {
        matches!(
            self,
            Self::Ready {
                epoch_complete: true,
                ..
            }
        )
    }

    pub fn into_batch(self) -> Option<Batch<u8, u8>> {
        match self {
            Self::Ready { batch, .. } => Some(batch),
            Self::Exhausted { .. } => None,
        }
    }
}

/// A dataset that streams decoded, shuffled batches from a record file.
///
/// Each call to `batch` runs one step of the pipeline in the supplied
/// execution context. Epochs are counted in steps: the batch that reaches
/// `ceil(epoch_size / batch_size)` steps is flagged as completing the epoch
/// and the counter starts over. When the source runs out the counter also
/// starts over and `Exhausted` is returned; the pipeline then has to be
/// `reset` before it yields more batches. With `repeat` enabled the source
/// never runs out and epochs end only by step count.
#[derive(Debug)]
pub struct RecordStreamDataset {
    pipeline: RecordPipeline,
    epoch_size: usize,
    steps_per_epoch: usize,
    step: usize,
}

impl RecordStreamDataset {
    /// Wraps a running pipeline.
    ///
    /// # Errors
    ///
    /// Returns `ContextClosed` if `ctx` is closed and a configuration error
    /// if `epoch_size` is zero.
    pub fn new<C: ExecutionContext>(
        ctx: &C,
        pipeline: RecordPipeline,
        epoch_size: usize,
    ) -> Result<Self> {
        if ctx.is_closed() {
            return Err(FeedError::ContextClosed);
        }
        if epoch_size == 0 {
            return Err(FeedError::config("epoch_size must be greater than 0"));
        }

        let steps_per_epoch = epoch_size.div_ceil(pipeline.options().batch_size);
        debug!(epoch_size, steps_per_epoch, "Created record stream dataset");

        Ok(Self {
            pipeline,
            epoch_size,
            steps_per_epoch,
            step: 0,
        })
    }

    /// Builds the pipeline for `path` from `config` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `ContextClosed` if `ctx` is closed, a configuration error if
    /// `config` does not validate, or any error from opening the file.
    pub fn open<C: ExecutionContext>(
        ctx: &C,
        storage: Arc<dyn StorageBackend>,
        path: impl AsRef<Path>,
        decoder: ExampleDecoder,
        config: &FeedConfig,
    ) -> Result<Self> {
        if ctx.is_closed() {
            return Err(FeedError::ContextClosed);
        }

        config.validate()?;
        let format = parse_format(&config.stream.record_format)?;
        let options = PipelineOptions::from_config(config);
        let pipeline = RecordPipeline::new(storage, path, format, decoder, options)?;
        Self::new(ctx, pipeline, config.stream.epoch_size)
    }

    /// Produces the next batch.
    ///
    /// # Errors
    ///
    /// Returns `ContextClosed` if `ctx` is closed. A malformed record fails
    /// the call and leaves the step counter unchanged.
    pub fn batch<C: ExecutionContext>(&mut self, ctx: &C) -> Result<StreamBatch> {
        if ctx.is_closed() {
            return Err(FeedError::ContextClosed);
        }

        let pipeline = &mut self.pipeline;
        let next = ctx.run(|| pipeline.next_batch())?;

        let Some(batch) = next else {
            let steps_taken = self.step;
            self.step = 0;
            if steps_taken > 0 {
                warn!(
                    steps_taken,
                    steps_per_epoch = self.steps_per_epoch,
                    epoch_size = self.epoch_size,
                    "Record source exhausted before the epoch completed"
                );
            }
            return Ok(StreamBatch::Exhausted { steps_taken });
        };

        self.step += 1;
        let epoch_complete = self.step >= self.steps_per_epoch;
        if epoch_complete {
            debug!(steps = self.step, "Epoch complete");
            self.step = 0;
        }

        Ok(StreamBatch::Ready {
            batch,
            epoch_complete,
        })
    }

    /// Restarts the pipeline from the first record and zeroes the step
    /// counter.
    ///
    /// # Errors
    ///
    /// Returns `ContextClosed` if `ctx` is closed, or an error if the file
    /// can no longer be opened.
    pub fn reset<C: ExecutionContext>(&mut self, ctx: &C) -> Result<()> {
        if ctx.is_closed() {
            return Err(FeedError::ContextClosed);
        }

        let pipeline = &mut self.pipeline;
        ctx.run(|| pipeline.restart())?;
        self.step = 0;
        Ok(())
    }

    /// No-op: the shuffle buffer already randomizes continuously.
    pub fn shuffle(&mut self, _rng: &mut dyn RngCore) {}

    /// Batches served since the last epoch boundary.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn steps_per_epoch(&self) -> usize {
        self.steps_per_epoch
    }

    pub fn epoch_size(&self) -> usize {
        self.epoch_size
    }

    pub fn batch_size(&self) -> usize {
        self.pipeline.options().batch_size
    }

    pub fn pipeline(&self) -> &RecordPipeline {
        &self.pipeline
    }
}
