use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::circuit_breaker::{Admission, BreakerSnapshot, BreakerState, CircuitState};
use crate::config::CircuitBreakerConfig;
use crate::errors::StrategyError;
use crate::outcome::RunOutcome;

// ============================================================================
// Shared Circuit Breaker
// ============================================================================
//
// Clonable handle to one breaker that many tasks can call concurrently.
// Admission (read counters, close an expired ban, decide) and recording
// (count, open) each happen inside a single lock acquisition. The lock is
// not held while the operation runs.
//
// ============================================================================

#[derive(Clone)]
pub struct SharedCircuitBreaker<E> {
    inner: Arc<Mutex<Inner<E>>>,
}

struct Inner<E> {
    config: CircuitBreakerConfig,
    state: BreakerState<E>,
    last_error: Option<StrategyError>,
}

impl<E: Clone + Display> SharedCircuitBreaker<E> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                config,
                state: BreakerState::new(),
                last_error: None,
            })),
        }
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// The future is dropped unpolled when the call is rejected.
    pub async fn call<F, T>(&self, operation: F) -> RunOutcome<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        // Check if circuit allows the call
        {
            let mut inner = self.inner.lock().await;

            if let Err(e) = inner.config.validate() {
                tracing::warn!(error = %e, "Invalid circuit breaker configuration, nothing executed");
                inner.last_error = Some(e);
                return RunOutcome::Misconfigured(e);
            }

            let Inner { config, state, last_error } = &mut *inner;
            if let Admission::Rejected(error) = state.admit(config, now()) {
                *last_error = Some(StrategyError::CircuitOpen);
                return RunOutcome::Failed {
                    error,
                    status: Some(StrategyError::CircuitOpen),
                };
            }
        }

        let result = operation.await;

        let mut inner = self.inner.lock().await;
        let Inner { config, state, last_error } = &mut *inner;

        let outcome = match result {
            Ok(value) => {
                state.record_success();
                RunOutcome::Success(value)
            }
            Err(error) => {
                let status = state.record_failure(config, &error, now());
                RunOutcome::Failed { error, status }
            }
        };
        // A late result from a call admitted before the circuit opened keeps
        // the classification left by the call that opened it
        if state.state() == CircuitState::Closed || outcome.status().is_some() {
            *last_error = outcome.status();
        }
        outcome
    }

    pub async fn get_state(&self) -> CircuitState {
        self.inner.lock().await.state.state()
    }

    pub async fn get_attempts_used(&self) -> u32 {
        self.inner.lock().await.state.attempts_used()
    }

    pub async fn last_error(&self) -> Option<StrategyError> {
        self.inner.lock().await.last_error
    }

    pub async fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().await;
        inner.state.snapshot(&inner.config, inner.last_error, now())
    }

    /// Replace the configuration used by subsequent calls
    pub async fn set_config(&self, config: CircuitBreakerConfig) {
        self.inner.lock().await.config = config;
    }

    /// Manually reset the circuit breaker
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        tracing::info!("Circuit breaker manually reset");
        inner.state.reset();
        inner.last_error = None;
    }
}

/// Tokio's clock, so paused-time tests drive ban expiry.
fn now() -> std::time::Instant {
    Instant::now().into_std()
}
