//! Bounded retry with exponential back-off.
//!
//! Every remote call that can fail transiently (folder lookup/creation, file
//! upload) goes through [`RetryPolicy::run`]. The caller decides which errors
//! are retriable; anything else is returned on the spot without sleeping.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Sleep after the `failed_attempts`-th failure: `base_delay * 2^failed_attempts`.
    ///
    /// | failures | base 4 s |
    /// |----------|----------|
    /// | 1        | 8 s      |
    /// | 2        | 16 s     |
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << failed_attempts.min(16))
    }

    /// Runs `operation` until it succeeds, fails with a non-retriable error,
    /// or `max_attempts` attempts have been made. The last error is returned.
    pub async fn run<T, E, F, Fut, P>(&self, what: &str, is_retriable: P, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut failed = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failed += 1;
                    if !is_retriable(&err) {
                        tracing::debug!(what, attempt = failed, error = %err, "Non-retriable error, giving up");
                        return Err(err);
                    }
                    if failed >= self.max_attempts {
                        tracing::error!(what, attempts = failed, error = %err, "Failed after {} attempts", self.max_attempts);
                        return Err(err);
                    }
                    let delay = self.delay_after(failed);
                    tracing::info!(
                        what,
                        attempt = failed,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "Transient error. Retrying..."
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
