use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Backoff Retry
// ============================================================================
//
// Used for compensating writes (stock releases, refunds of charges that
// could not be recorded) where a transient hiccup should not leak stock or
// money. Payment charges themselves are never retried.
//
// ============================================================================

/// Classify errors worth retrying
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Attempts including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Short doubling schedule for compensations issued inside a request
    pub fn compensation() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
        }
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: E },

    #[error("{0}")]
    Permanent(E),
}

/// Re-run `operation` while it fails with a transient error.
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt = attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            return Err(RetryError::Permanent(error));
        }
        if attempt >= config.max_attempts {
            return Err(RetryError::Exhausted { attempts: attempt, last_error: error });
        }

        let delay = config.delay_after(attempt);
        tracing::warn!(
            attempt = attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
        sleep(delay).await;
    }
}
