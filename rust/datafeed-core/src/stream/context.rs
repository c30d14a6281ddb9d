// rust/datafeed-core/src/stream/context.rs

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::debug;

use crate::error::{FeedError, Result};

/// The runtime a streaming dataset runs its pipeline steps in.
pub trait ExecutionContext {
    /// Whether the context has been closed.
    fn is_closed(&self) -> bool;

    /// Runs one pipeline step to completion and returns its result.
    ///
    /// # Errors
    ///
    /// Returns `ContextClosed` if the context is closed, otherwise whatever
    /// the step returns.
    fn run<T, F>(&self, step: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>;
}

/// A context that runs steps on the calling thread.
#[derive(Debug, Default)]
pub struct Session {
    closed: AtomicBool,
    steps_run: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the session. Later steps fail with `ContextClosed`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(steps_run = self.steps_run(), "Session closed");
        }
    }

    /// Number of steps started through this session.
    pub fn steps_run(&self) -> u64 {
        self.steps_run.load(Ordering::Relaxed)
    }
}

impl ExecutionContext for Session {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn run<T, F>(&self, step: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.is_closed() {
            return Err(FeedError::ContextClosed);
        }
        self.steps_run.fetch_add(1, Ordering::Relaxed);
        step()
    }
}
