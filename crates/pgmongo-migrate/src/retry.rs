//! Retry logic with exponential backoff for establishing connections.
//!
//! Only connection setup is retried. Once rows are flowing, a failure ends
//! the table it happened in; replaying inserts would duplicate documents.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub backoff_multiplier: f64,
    /// Whether to add jitter to the delay.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::for_connections(3)
    }
}

impl RetryConfig {
    /// Backoff used for database handshakes: 500ms doubling up to 10s.
    #[must_use]
    pub fn for_connections(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a config with no retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Calculates the delay for a given attempt number.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32);

        let capped_delay = base_delay.min(self.max_delay.as_secs_f64());

        let final_delay = if self.add_jitter {
            // up to 25%
            capped_delay + capped_delay * 0.25 * rand_jitter()
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

/// Pseudo-random value in `[0, 1)` taken from the clock.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

/// Determines if an error is worth another connection attempt.
///
/// Only connection errors whose message looks transient qualify: bad
/// credentials or an unknown database fail the same way every time.
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Io(_) => true,
        Error::SourceConnection(msg) | Error::DestinationConnection(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("timeout")
                || msg.contains("timed out")
                || msg.contains("connection refused")
                || msg.contains("connection reset")
                || msg.contains("server selection")
                || msg.contains("temporary")
                || msg.contains("starting up")
        }
        _ => false,
    }
}

/// Executes an async operation with retry logic.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once all
/// attempts are used.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = config.delay_for_attempt(attempt);
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name, attempt, config.max_retries, delay
            );
            sleep(delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{}: Succeeded after {} retries", operation_name, attempt);
                }
                return Ok(result);
            }
            Err(e) if is_retryable_error(&e) && attempt < config.max_retries => {
                warn!(
                    "{}: Retryable error (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    max_attempts,
                    e
                );
            }
            Err(e) => return Err(e),
        }

        attempt += 1;
    }
}
