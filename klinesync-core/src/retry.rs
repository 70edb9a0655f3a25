//! Bounded retry with linear backoff for provider calls.
//!
//! Any fetch operation composes with a policy without knowing about retries:
//! `policy.run(|| provider.fetch_daily(..))`. Only errors classified
//! transient are retried; everything else surfaces immediately.

use crate::provider::DataError;
use std::time::Duration;

/// Retry policy: at most `max_attempts` invocations, sleeping
/// `retry_index × base_delay` between them (0.5s, 1.0s, ... for the default
/// base). The sleeps are real wall-clock waits — a fully failing call blocks
/// for the sum of the schedule plus provider latency.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Invoke `op` until it succeeds, fails permanently, or the attempt
    /// budget is spent. When the budget is spent the final transient error is
    /// wrapped in [`DataError::RetriesExhausted`] with the attempt count.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, DataError>
    where
        F: FnMut() -> Result<T, DataError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last: Option<DataError> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.base_delay * (attempt - 1);
                tracing::warn!(
                    "transient fetch error (attempt {}/{}), retrying in {:.1}s: {}",
                    attempt - 1,
                    attempts,
                    delay.as_secs_f64(),
                    last.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                );
                std::thread::sleep(delay);
            }

            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => last = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(DataError::RetriesExhausted {
            attempts,
            last: Box::new(last.expect("at least one attempt was made")),
        })
    }
}
