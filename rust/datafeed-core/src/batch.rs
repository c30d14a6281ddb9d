// rust/datafeed-core/src/batch.rs

//! Aligned input/target pairs handed to the training loop.

use ndarray::{ArrayD, ArrayViewD, Axis};

use crate::error::{FeedError, Result};

/// A batch of aligned inputs and targets.
///
/// Both arrays share the length of their leading axis, which is the number
/// of samples in the batch. A batch is immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<X, Y> {
    inputs: ArrayD<X>,
    targets: ArrayD<Y>,
    size: usize,
}

impl<X, Y> Batch<X, Y> {
    /// Creates a batch from inputs and targets.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` if either array has no leading axis and
    /// `BatchMismatch` if the leading axes differ in length.
    pub fn new(inputs: ArrayD<X>, targets: ArrayD<Y>) -> Result<Self> {
        let input_len = leading_len(&inputs, "inputs")?;
        let target_len = leading_len(&targets, "targets")?;

        if input_len != target_len {
            return Err(FeedError::batch_mismatch(input_len, target_len));
        }

        Ok(Self {
            inputs,
            targets,
            size: input_len,
        })
    }

    /// Number of samples in the batch.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn inputs(&self) -> &ArrayD<X> {
        &self.inputs
    }

    pub fn targets(&self) -> &ArrayD<Y> {
        &self.targets
    }

    /// Consumes the batch, returning `(inputs, targets)`.
    pub fn into_parts(self) -> (ArrayD<X>, ArrayD<Y>) {
        (self.inputs, self.targets)
    }
}

impl<X: Clone, Y: Clone> Batch<X, Y> {
    /// Stacks per-sample arrays along a new leading axis.
    ///
    /// # Errors
    ///
    /// Returns `BatchMismatch` if the slices differ in length and
    /// `InvalidShape` if they are empty or the samples differ in shape.
    pub fn stack(inputs: &[ArrayD<X>], targets: &[ArrayD<Y>]) -> Result<Self> {
        if inputs.len() != targets.len() {
            return Err(FeedError::batch_mismatch(inputs.len(), targets.len()));
        }
        if inputs.is_empty() {
            return Err(FeedError::invalid_shape("cannot stack an empty batch"));
        }

        let inputs = stack_samples(inputs, "inputs")?;
        let targets = stack_samples(targets, "targets")?;
        Self::new(inputs, targets)
    }
}

fn leading_len<T>(array: &ArrayD<T>, name: &str) -> Result<usize> {
    if array.ndim() == 0 {
        return Err(FeedError::invalid_shape(format!(
            "{name} must have a leading sample axis"
        )));
    }
    Ok(array.len_of(Axis(0)))
}

fn stack_samples<T: Clone>(samples: &[ArrayD<T>], name: &str) -> Result<ArrayD<T>> {
    let views: Vec<ArrayViewD<'_, T>> = samples.iter().map(|s| s.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| FeedError::invalid_shape(format!("cannot stack {name}: {e}")))
}
