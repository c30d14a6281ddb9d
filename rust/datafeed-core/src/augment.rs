// rust/datafeed-core/src/augment.rs

//! Batch augmentation.
//!
//! An augmentation is any transform from one `Batch` to the next. Methods
//! are applied in the order they are listed, each receiving the output of
//! the previous one. Keeping the leading axes aligned is the method's job;
//! a method that breaks it fails when it rebuilds its `Batch`.

use crate::batch::Batch;
use crate::error::Result;

/// A single batch-to-batch transform.
pub trait Augment<X, Y>: Send + Sync {
    fn apply(&self, batch: Batch<X, Y>) -> Result<Batch<X, Y>>;
}

impl<X, Y, F> Augment<X, Y> for F
where
    F: Fn(Batch<X, Y>) -> Result<Batch<X, Y>> + Send + Sync,
{
    fn apply(&self, batch: Batch<X, Y>) -> Result<Batch<X, Y>> {
        self(batch)
    }
}

/// Applies `methods` to `batch` in order.
///
/// An empty method list returns the batch unchanged.
pub fn augment<X, Y>(
    batch: Batch<X, Y>,
    methods: &[&dyn Augment<X, Y>],
) -> Result<Batch<X, Y>> {
    methods
        .iter()
        .try_fold(batch, |batch, method| method.apply(batch))
}

/// An owned, ordered list of augmentation methods.
pub struct AugmentationPipeline<X, Y> {
    methods: Vec<Box<dyn Augment<X, Y>>>,
}

impl<X, Y> AugmentationPipeline<X, Y> {
    pub fn new() -> Self {
        Self {
            methods: Vec::new(),
        }
    }

    /// Appends a method to the end of the pipeline.
    #[must_use]
    pub fn then(mut self, method: impl Augment<X, Y> + 'static) -> Self {
        self.methods.push(Box::new(method));
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Runs every method in order, threading the batch through.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error raised by a method.
    pub fn apply(&self, batch: Batch<X, Y>) -> Result<Batch<X, Y>> {
        self.methods
            .iter()
            .try_fold(batch, |batch, method| method.apply(batch))
    }
}

impl<X, Y> Default for AugmentationPipeline<X, Y> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X, Y> std::fmt::Debug for AugmentationPipeline<X, Y> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugmentationPipeline")
            .field("methods", &self.methods.len())
            .finish()
    }
}
