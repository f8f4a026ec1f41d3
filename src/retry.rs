use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Base delay; the n-th retry waits `n * delay_base`
    pub delay_base: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_attempts: u32, delay_base: Duration) -> Self {
        Self {
            max_attempts,
            delay_base,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Set the maximum delay between retries
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Preset: CDS GET requests (3 attempts)
    /// Delays: 1s, 2s = 3s total wait time
    pub fn cds() -> Self {
        Self::new(3, Duration::from_secs(1)).with_max_delay(Duration::from_secs(10))
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        self.delay_base.saturating_mul(attempt).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::cds()
    }
}

/// Execute an async operation, retrying while `should_retry` says its outcome is transient
///
/// Unlike a plain error retry, the predicate sees the whole outcome, so a
/// successful HTTP exchange with a "not ready yet" status can be retried too.
/// When the attempts run out the last outcome is returned as-is.
///
/// # Panics
/// Panics if `config.max_attempts` is 0
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&Result<T, E>) -> bool,
{
    assert!(
        config.max_attempts >= 1,
        "RetryConfig.max_attempts must be >= 1, got {}",
        config.max_attempts
    );

    let mut attempt = 0;
    loop {
        // Wait before retry (except for first attempt)
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                config.max_attempts,
                delay
            );
            sleep(delay).await;
        }

        let outcome = operation().await;
        if !should_retry(&outcome) {
            if attempt > 0 {
                debug!(
                    "{}: Settled on attempt {}/{}",
                    operation_name,
                    attempt + 1,
                    config.max_attempts
                );
            }
            return outcome;
        }

        let remaining = config.max_attempts - attempt - 1;
        if remaining == 0 {
            warn!(
                "{}: All {} attempts returned a transient outcome",
                operation_name, config.max_attempts
            );
            return outcome;
        }

        debug!(
            "{}: Attempt {}/{} was transient, {} retries remaining",
            operation_name,
            attempt + 1,
            config.max_attempts,
            remaining
        );
        attempt += 1;
    }
}
