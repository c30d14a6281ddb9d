// rust/datafeed-core/src/stream/shuffle.rs

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{FeedError, Result};

/// A bounded staging area that emits its elements in random order.
///
/// The buffer is ready to emit once it holds more than `min_after_dequeue`
/// elements. Producers stop filling at `capacity`; `push` itself never
/// refuses an element, so samples handed back after a failed batch always
/// fit.
#[derive(Debug)]
pub struct ShuffleBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    min_after_dequeue: usize,
    rng: StdRng,
}

impl<T> ShuffleBuffer<T> {
    /// Creates an empty buffer. Without a seed the generator is seeded from
    /// the operating system.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless
    /// `0 <= min_after_dequeue < capacity`.
    pub fn new(capacity: usize, min_after_dequeue: usize, seed: Option<u64>) -> Result<Self> {
        if capacity == 0 {
            return Err(FeedError::config("shuffle capacity must be greater than 0"));
        }
        if min_after_dequeue >= capacity {
            return Err(FeedError::config(format!(
                "min_after_dequeue ({min_after_dequeue}) must be less than capacity ({capacity})"
            )));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            items: Vec::with_capacity(capacity),
            capacity,
            min_after_dequeue,
            rng,
        })
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Removes a uniformly random element.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.items.len());
        Some(self.items.swap_remove(index))
    }

    /// Enough elements are buffered to emit one.
    pub fn is_ready(&self) -> bool {
        self.items.len() > self.min_after_dequeue
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn min_after_dequeue(&self) -> usize {
        self.min_after_dequeue
    }

    /// Drops every buffered element. The generator keeps its state.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
