use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards calls to the payment gateway. After repeated failures the circuit
// opens and charges fail fast without reaching the gateway, until the
// cool-down elapses and a trial call is let through.
//
// Closed -> Open       after `failure_threshold` consecutive failures
// Open -> HalfOpen     once `cooldown` has elapsed since the last failure
// HalfOpen -> Closed   after `trial_successes` successes
// HalfOpen -> Open     on any failure
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding used by the metrics registry
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub trial_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            trial_successes: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    trial_successes: u32,
    last_failure: Option<Instant>,
}

impl Inner {
    fn trip(&mut self) {
        self.state = CircuitState::Open;
        self.trial_successes = 0;
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.trial_successes = 0;
        self.last_failure = None;
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                trial_successes: 0,
                last_failure: None,
            })),
        }
    }

    /// Run `operation` unless the circuit is open. Every error counts
    /// against the circuit.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.call_with(operation, |_| true).await
    }

    /// Like `call`, but only errors for which `trips` returns true count
    /// against the circuit. Any other error means the dependency answered
    /// and is recorded as a success. The lock is not held while the
    /// operation runs.
    pub async fn call_with<F, T, E, P>(&self, operation: F, trips: P) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        self.admit().await?;

        let result = operation.await;

        let mut inner = self.inner.lock().await;
        match result {
            Ok(value) => {
                self.on_success(&mut inner);
                Ok(value)
            }
            Err(err) => {
                if trips(&err) {
                    self.on_failure(&mut inner);
                } else {
                    self.on_success(&mut inner);
                }
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    async fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut inner = self.inner.lock().await;
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let cooled_down = inner
            .last_failure
            .map_or(true, |at| at.elapsed() >= self.config.cooldown);
        if !cooled_down {
            return Err(CircuitBreakerError::CircuitOpen);
        }

        tracing::info!(breaker = self.name, "Circuit breaker half-open, allowing trial call");
        inner.state = CircuitState::HalfOpen;
        inner.trial_successes = 0;
        Ok(())
    }

    fn on_success(&self, inner: &mut Inner) {
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.trial_successes {
                    tracing::info!(breaker = self.name, "Circuit breaker closed");
                    inner.reset();
                }
            }
            // A call admitted before another caller tripped the circuit
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner) {
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed if inner.consecutive_failures >= self.config.failure_threshold => {
                tracing::warn!(
                    breaker = self.name,
                    failures = inner.consecutive_failures,
                    "Circuit breaker opened"
                );
                inner.trip();
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = self.name, "Trial call failed, circuit breaker reopened");
                inner.trip();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, cooldown: Duration, trial_successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig { failure_threshold, cooldown, trial_successes },
        )
    }

    #[tokio::test]
    async fn test_opens_after_failures_and_rejects_fast() {
        let cb = breaker(3, Duration::from_secs(60), 2);

        for _ in 0..3 {
            let result = cb.call(async { Err::<(), _>("gateway down") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed("gateway down"))));
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let mut reached = false;
        let result = cb
            .call(async {
                reached = true;
                Ok::<_, &str>(())
            })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
        assert!(!reached);
    }

    #[tokio::test]
    async fn test_trial_success_closes_and_trial_failure_reopens() {
        let cb = breaker(2, Duration::from_millis(50), 1);

        for _ in 0..2 {
            let _ = cb.call(async { Err::<(), _>("gateway down") }).await;
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = cb.call(async { Err::<(), _>("still down") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_errors_outside_predicate_do_not_trip() {
        let cb = breaker(3, Duration::from_secs(60), 1);

        for _ in 0..10 {
            let result = cb.call_with(async { Err::<(), _>("declined") }, |e| *e == "down").await;
            assert!(matches!(result, Err(CircuitBreakerError::OperationFailed("declined"))));
        }
        assert_eq!(cb.state().await, CircuitState::Closed);

        // Rejections also clear a run of counted failures
        for _ in 0..2 {
            let _ = cb.call_with(async { Err::<(), _>("down") }, |e| *e == "down").await;
        }
        let _ = cb.call_with(async { Err::<(), _>("declined") }, |e| *e == "down").await;
        let _ = cb.call_with(async { Err::<(), _>("down") }, |e| *e == "down").await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        for _ in 0..4 {
            let _ = cb.call(async { Err::<(), _>("blip") }).await;
        }
        let _ = cb.call(async { Ok::<_, &str>(()) }).await;
        for _ in 0..4 {
            let _ = cb.call(async { Err::<(), _>("blip") }).await;
        }

        assert_eq!(cb.state().await, CircuitState::Closed);
        assert_eq!(CircuitState::HalfOpen.as_str(), "half_open");
    }
}
