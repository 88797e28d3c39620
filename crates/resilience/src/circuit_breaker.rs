use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// The three states of the breaker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through.
    Closed,
    /// Too many failures, calls fail fast without being attempted.
    Open,
    /// Recovery timeout elapsed, a single probe call is allowed through.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error("{0}")]
    Inner(E),
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Fails fast once a dependency keeps erroring, and probes it again after a
/// recovery timeout.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Runs `op` through the breaker. Every `Err` counts towards tripping.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(op, |_| true).await
    }

    /// Runs `op` through the breaker, counting only failures for which
    /// `counts` returns true. Non-counting failures still propagate but do
    /// not move the breaker towards open.
    pub async fn call_classified<F, Fut, T, E, C>(
        &self,
        op: F,
        counts: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.state == CircuitState::Open {
                let elapsed = inner.last_failure.map(|at| at.elapsed());
                match elapsed {
                    Some(elapsed) if elapsed >= self.recovery_timeout => {
                        inner.state = CircuitState::HalfOpen;
                        info!("circuit breaker half-open, probing");
                    }
                    _ => return Err(BreakerError::Open),
                }
            }
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                if counts(&err) {
                    self.on_failure();
                }
                Err(BreakerError::Inner(err))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.state != CircuitState::Closed {
            info!("circuit breaker closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        if inner.failure_count >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                warn!(
                    failures = inner.failure_count,
                    "circuit breaker tripped open"
                );
            }
            inner.state = CircuitState::Open;
        } else if inner.state == CircuitState::HalfOpen {
            // A failed probe reopens immediately.
            inner.state = CircuitState::Open;
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .failure_count
    }

    /// Force the breaker back to closed and forget accumulated failures.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn failing() -> Result<(), &'static str> {
        Err("boom")
    }

    #[tokio::test]
    async fn trips_open_at_threshold() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            let _ = breaker.call(failing).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.failure_count(), 5);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_invoking() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        for _ in 0..2 {
            let _ = breaker.call(failing).await;
        }

        let calls = AtomicU32::new(0);
        let result = breaker
            .call(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, &'static str>(()) }
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_probe_closes_after_recovery() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        let _ = breaker.call(failing).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        let result = breaker.call(|| async { Ok::<_, &'static str>(42) }).await;
        assert!(matches!(result, Ok(42)));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));
        let _ = breaker.call(failing).await;

        tokio::time::advance(Duration::from_secs(31)).await;

        let _ = breaker.call(failing).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn non_counting_failures_leave_breaker_closed() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        let result = breaker.call_classified(failing, |_| false).await;
        assert!(matches!(result, Err(BreakerError::Inner("boom"))));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[tokio::test]
    async fn reset_closes_and_clears() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        let _ = breaker.call(failing).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
