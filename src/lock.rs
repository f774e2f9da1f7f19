//! Engine mutual exclusion with a bounded wait.
//!
//! One sync or one save may touch the plan store at a time. Acquisition
//! waits up to the configured timeout and then fails with `Busy` instead of
//! blocking indefinitely. The guard releases on drop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::EngineError;

/// A single-holder lock over the plan store's read-modify-write sequence.
#[derive(Debug, Clone)]
pub struct EngineLock {
    semaphore: Arc<Semaphore>,
}

impl Default for EngineLock {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLock {
    pub fn new() -> Self {
        EngineLock {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Acquire the lock, waiting at most `timeout`. `operation` names the
    /// caller in the `Busy` error.
    pub async fn acquire(
        &self,
        timeout: Duration,
        operation: &'static str,
    ) -> Result<EngineLockGuard, EngineError> {
        let busy = EngineError::Busy {
            operation,
            waited_secs: timeout.as_secs(),
        };
        match tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(EngineLockGuard { _permit: permit }),
            // Elapsed, or the semaphore was closed (never happens here)
            _ => Err(busy),
        }
    }
}

/// Held lock; releases on drop.
#[derive(Debug)]
pub struct EngineLockGuard {
    _permit: OwnedSemaphorePermit,
}
