use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::time::{Duration, Instant};

use super::Operation;
use crate::config::{millis, CircuitBreakerConfig};
use crate::errors::StrategyError;
use crate::outcome::RunOutcome;

// ============================================================================
// Circuit Breaker Pattern Implementation
// ============================================================================
//
// Invokes the operation once per call and counts consecutive failures across
// calls. When the count reaches `max_attempts` the circuit opens: calls are
// rejected without invoking the operation and re-surface the failure that
// opened it.
//
// States:
// - Closed: Normal operation, failures are counted
// - Open:   Ban active, calls rejected until `ban_timeout` elapses
//
// The Open -> Closed transition is evaluated lazily when a call arrives;
// there is no background timer. A circuit can therefore stay open longer
// than `ban_timeout` if nobody calls it.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed, // Counting failures
    Open,   // Rejecting calls
}

/// Point-in-time view of a breaker, for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// Zero once the ban has expired but no call has closed the circuit yet
    #[serde(rename = "remaining_ban_ms", serialize_with = "millis::serialize_option")]
    pub remaining_ban: Option<Duration>,
    /// Number of bans lifted by an arriving call since construction
    pub ban_expirations: u64,
    pub last_error: Option<String>,
}

pub(crate) enum Admission<E> {
    Proceed,
    Rejected(E),
}

/// An active ban and the failure that triggered it
struct OpenBan<E> {
    at: Instant,
    at_wall: DateTime<Utc>,
    trigger: E,
}

/// Counters and ban bookkeeping, shared by the sync and async breakers
pub(crate) struct BreakerState<E> {
    attempts_used: u32,
    open: Option<OpenBan<E>>,
    ban_expirations: u64,
}

impl<E> BreakerState<E> {
    pub(crate) fn new() -> Self {
        Self {
            attempts_used: 0,
            open: None,
            ban_expirations: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        if self.open.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub(crate) fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub(crate) fn reset(&mut self) {
        self.attempts_used = 0;
        self.open = None;
    }

    pub(crate) fn record_success(&mut self) {
        if self.open.is_some() {
            // Another caller opened the circuit while this call was in flight
            tracing::warn!("Success recorded while circuit is open");
            return;
        }
        self.attempts_used = 0;
    }

    pub(crate) fn snapshot(
        &self,
        config: &CircuitBreakerConfig,
        last_error: Option<StrategyError>,
        now: Instant,
    ) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state(),
            attempts_used: self.attempts_used,
            max_attempts: config.max_attempts,
            opened_at: self.open.as_ref().map(|ban| ban.at_wall),
            remaining_ban: self.open.as_ref().map(|ban| {
                config
                    .ban_timeout
                    .saturating_sub(now.saturating_duration_since(ban.at))
            }),
            ban_expirations: self.ban_expirations,
            last_error: last_error.map(|e| e.to_string()),
        }
    }
}

impl<E: Clone + Display> BreakerState<E> {
    /// Decide whether a call may invoke the operation. Closes an expired ban.
    pub(crate) fn admit(&mut self, config: &CircuitBreakerConfig, now: Instant) -> Admission<E> {
        let Some(ban) = &self.open else {
            return Admission::Proceed;
        };

        if now.saturating_duration_since(ban.at) < config.ban_timeout {
            tracing::debug!(error = %ban.trigger, "Circuit open, rejecting call");
            return Admission::Rejected(ban.trigger.clone());
        }

        tracing::info!(
            attempts_used = self.attempts_used,
            "Ban expired, circuit breaker closing"
        );
        self.reset();
        self.ban_expirations += 1;
        Admission::Proceed
    }

    /// Count a failed invocation, opening the circuit at the bound.
    pub(crate) fn record_failure(
        &mut self,
        config: &CircuitBreakerConfig,
        error: &E,
        now: Instant,
    ) -> Option<StrategyError> {
        if self.open.is_some() {
            // Already opened by a concurrent caller; the bound was counted there
            tracing::debug!(error = %error, "Failure recorded while circuit is open");
            return None;
        }

        self.attempts_used += 1;

        if self.attempts_used < config.max_attempts {
            tracing::warn!(
                attempts_used = self.attempts_used,
                max_attempts = config.max_attempts,
                error = %error,
                "Operation failed"
            );
            return None;
        }

        tracing::error!(
            attempts_used = self.attempts_used,
            ban_timeout_ms = config.ban_timeout.as_millis(),
            error = %error,
            "Circuit breaker opening after max attempts"
        );
        self.open = Some(OpenBan {
            at: now,
            at_wall: Utc::now(),
            trigger: error.clone(),
        });
        Some(StrategyError::MaxAttemptsReached)
    }
}

pub struct CircuitBreaker<'a, T, E> {
    config: CircuitBreakerConfig,
    execute: Option<Operation<'a, T, E>>,
    state: BreakerState<E>,
    last_error: Option<StrategyError>,
}

impl<'a, T, E> CircuitBreaker<'a, T, E> {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            execute: None,
            state: BreakerState::new(),
            last_error: None,
        }
    }

    pub fn with_operation<F>(mut self, operation: F) -> Self
    where
        F: FnMut() -> Result<T, E> + 'a,
    {
        self.execute = Some(Box::new(operation));
        self
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Changing the config while the circuit is open has unspecified effects
    /// on the current ban.
    pub fn config_mut(&mut self) -> &mut CircuitBreakerConfig {
        &mut self.config
    }

    pub fn last_error(&self) -> Option<StrategyError> {
        self.last_error
    }

    /// State as last evaluated. An expired ban still reads `Open` until the
    /// next `run`.
    pub fn state(&self) -> CircuitState {
        self.state.state()
    }

    pub fn attempts_used(&self) -> u32 {
        self.state.attempts_used()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.state.snapshot(&self.config, self.last_error, Instant::now())
    }

    /// Manually reset the circuit breaker
    pub fn reset(&mut self) {
        tracing::info!("Circuit breaker manually reset");
        self.state.reset();
        self.last_error = None;
    }
}

impl<'a, T, E: Clone + Display> CircuitBreaker<'a, T, E> {
    /// Execute the operation with circuit breaker protection
    pub fn run(&mut self) -> RunOutcome<T, E> {
        let outcome = self.run_once();
        self.last_error = outcome.status();
        outcome
    }

    fn run_once(&mut self) -> RunOutcome<T, E> {
        let Some(execute) = self.execute.as_deref_mut() else {
            tracing::warn!("Circuit breaker has no operation configured, nothing executed");
            return RunOutcome::Misconfigured(StrategyError::ExecuteMissing);
        };
        if let Err(e) = self.config.validate() {
            tracing::warn!(error = %e, "Invalid circuit breaker configuration, nothing executed");
            return RunOutcome::Misconfigured(e);
        }

        if let Admission::Rejected(error) = self.state.admit(&self.config, Instant::now()) {
            return RunOutcome::Failed {
                error,
                status: Some(StrategyError::CircuitOpen),
            };
        }

        match execute() {
            Ok(value) => {
                self.state.record_success();
                RunOutcome::Success(value)
            }
            Err(error) => {
                let status = self.state.record_failure(&self.config, &error, Instant::now());
                RunOutcome::Failed { error, status }
            }
        }
    }
}
