//! Bounded execution for operations whose cost grows with their input, such as report
//! queries over caller-chosen date ranges.

use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The operation did not finish before its deadline.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{operation} exceeded its deadline of {limit:?}")]
pub struct DeadlineExceeded {
    /// Label of the bounded operation
    pub operation: &'static str,
    /// The limit that was exceeded
    pub limit: Duration,
}

/// Run `future` for at most `limit`.
///
/// The future is dropped when the deadline passes. Completion time is logged at `debug`
/// level; overruns at `warn`.
///
/// # Errors
///
/// Returns [`DeadlineExceeded`] when `limit` elapses first.
pub async fn with_deadline<F, T>(
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    let started = Instant::now();
    if let Ok(output) = tokio::time::timeout(limit, future).await {
        tracing::debug!(
            operation,
            elapsed_ms = started.elapsed().as_millis(),
            "Bounded operation finished"
        );
        Ok(output)
    } else {
        tracing::warn!(operation, limit_ms = limit.as_millis(), "Bounded operation timed out");
        Err(DeadlineExceeded { operation, limit })
    }
}
