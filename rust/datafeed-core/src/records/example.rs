// rust/datafeed-core/src/records/example.rs

//! Structured examples stored in record payloads.
//!
//! Each payload is a bincode-encoded `Example`. The raw image and mask bytes
//! carry one unsigned byte per element; their shapes come from the caller
//! because the channel count is not stored.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{FeedError, Result};

use super::reader::Record;

/// One serialized training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub height: i64,
    pub width: i64,
    pub image_raw: Vec<u8>,
    pub mask_raw: Vec<u8>,
}

impl Example {
    /// Decodes an example from a record payload.
    ///
    /// # Errors
    ///
    /// Returns a malformed record error naming `offset` if the payload is
    /// not a valid example.
    pub fn from_bytes(bytes: &[u8], offset: u64) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| FeedError::malformed_record(offset, format!("invalid example: {e}")))
    }

    /// Encodes the example as a record payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| FeedError::serialization(format!("failed to encode example: {e}")))
    }
}

/// Turns examples into fixed-shape image and mask arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleDecoder {
    image_shape: Vec<usize>,
    mask_shape: Vec<usize>,
}

impl ExampleDecoder {
    /// # Errors
    ///
    /// Returns `InvalidShape` if either shape has no dimensions.
    pub fn new(
        image_shape: impl Into<Vec<usize>>,
        mask_shape: impl Into<Vec<usize>>,
    ) -> Result<Self> {
        let image_shape = image_shape.into();
        let mask_shape = mask_shape.into();

        if image_shape.is_empty() || mask_shape.is_empty() {
            return Err(FeedError::invalid_shape(
                "image and mask shapes need at least one dimension",
            ));
        }

        Ok(Self {
            image_shape,
            mask_shape,
        })
    }

    pub fn image_shape(&self) -> &[usize] {
        &self.image_shape
    }

    pub fn mask_shape(&self) -> &[usize] {
        &self.mask_shape
    }

    /// Reshapes the raw bytes of `example` into `(image, mask)`.
    ///
    /// # Errors
    ///
    /// Returns a malformed record error if a raw byte string does not hold
    /// exactly as many bytes as its shape has elements.
    pub fn decode(&self, example: Example, offset: u64) -> Result<(ArrayD<u8>, ArrayD<u8>)> {
        let image = reshape(example.image_raw, &self.image_shape, "image_raw", offset)?;
        let mask = reshape(example.mask_raw, &self.mask_shape, "mask_raw", offset)?;
        Ok((image, mask))
    }

    /// Decodes a record payload straight to `(image, mask)`.
    pub fn decode_record(&self, record: &Record) -> Result<(ArrayD<u8>, ArrayD<u8>)> {
        let example = Example::from_bytes(&record.payload, record.offset)?;
        self.decode(example, record.offset)
    }
}

fn reshape(raw: Vec<u8>, shape: &[usize], field: &str, offset: u64) -> Result<ArrayD<u8>> {
    let expected: usize = shape.iter().product();
    if raw.len() != expected {
        return Err(FeedError::malformed_record(
            offset,
            format!(
                "{field} holds {} bytes, shape {shape:?} needs {expected}",
                raw.len()
            ),
        ));
    }

    ArrayD::from_shape_vec(IxDyn(shape), raw)
        .map_err(|e| FeedError::malformed_record(offset, format!("{field}: {e}")))
}
