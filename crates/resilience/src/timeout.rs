//! Timeout handling utilities

use crate::error::{ResilienceError, ResilienceResult};
use std::future::Future;
use std::time::Duration;

/// Runs `operation`, giving up once `duration` has elapsed
///
/// The future is dropped on timeout, so any work it has not yet started is
/// cancelled.
pub async fn with_timeout<F, T>(
    operation_name: &str,
    duration: Duration,
    operation: F,
) -> ResilienceResult<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(value) => Ok(value),
        Err(_) => {
            log::warn!("{} did not finish within {:?}", operation_name, duration);
            Err(ResilienceError::Timeout {
                operation: operation_name.to_string(),
                duration,
            })
        }
    }
}

/// Timeout wrapper for operations
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Creates a new timeout
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Gets the timeout duration
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Executes an operation with this timeout
    pub async fn run<F, T>(&self, operation_name: &str, operation: F) -> ResilienceResult<T>
    where
        F: Future<Output = T>,
    {
        with_timeout(operation_name, self.duration, operation).await
    }
}
