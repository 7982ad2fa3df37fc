use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::{Operation, RecoveryFn};
use crate::config::{RecoveryMode, RetryConfig};
use crate::errors::StrategyError;
use crate::outcome::RunOutcome;

// ============================================================================
// Fixed-Delay Retry Strategy
// ============================================================================
//
// Re-invokes an operation up to `max_attempts` times, sleeping `delay`
// between a failed attempt and the next. An optional recovery callback is
// handed each failure and may clear it (see `RecoveryMode`).
//
// Every `run` starts with a fresh attempt budget. Only `last_error` survives
// between calls.
//
// ============================================================================

pub struct Retry<'a, T, E> {
    config: RetryConfig,
    execute: Option<Operation<'a, T, E>>,
    recovery: Option<RecoveryFn<'a, E>>,
    last_error: Option<StrategyError>,
}

impl<'a, T, E> Retry<'a, T, E> {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            execute: None,
            recovery: None,
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

    pub fn with_recovery<R>(mut self, recovery: R) -> Self
    where
        R: FnMut(&E) -> Result<(), E> + 'a,
    {
        self.recovery = Some(Box::new(recovery));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Changes take effect on the next `run`.
    pub fn config_mut(&mut self) -> &mut RetryConfig {
        &mut self.config
    }

    /// Classification of the most recent `run`, `None` after a success.
    pub fn last_error(&self) -> Option<StrategyError> {
        self.last_error
    }
}

impl<'a, T, E: Display> Retry<'a, T, E> {
    /// Execute the operation with retry protection
    pub fn run(&mut self) -> RunOutcome<T, E> {
        let outcome = self.run_attempts();
        self.last_error = outcome.status();
        outcome
    }

    fn run_attempts(&mut self) -> RunOutcome<T, E> {
        let Some(execute) = self.execute.as_deref_mut() else {
            tracing::warn!("Retry has no operation configured, nothing executed");
            return RunOutcome::Misconfigured(StrategyError::ExecuteMissing);
        };
        if let Err(e) = self.config.validate() {
            tracing::warn!(error = %e, "Invalid retry configuration, nothing executed");
            return RunOutcome::Misconfigured(e);
        }

        let config = &self.config;
        let mut recovery = self.recovery.as_mut();
        let mut attempt = 0;

        loop {
            attempt += 1;

            tracing::debug!(
                attempt = attempt,
                max_attempts = config.max_attempts,
                "Attempting operation"
            );

            let error = match execute() {
                Ok(value) => {
                    log_success(attempt);
                    return RunOutcome::Success(value);
                }
                Err(error) => error,
            };

            match handle_failure(config, attempt, error, recovery.as_deref_mut()) {
                Step::Done(outcome) => return outcome,
                Step::Wait(delay) => {
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }
}

/// Execute an async operation with fixed-delay retry
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RunOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    run_async_attempts(config, operation, None::<&mut fn(&E) -> Result<(), E>>).await
}

/// Async variant with a recovery callback consulted after failures
pub async fn retry_async_with_recovery<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation: F,
    mut recovery: R,
) -> RunOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> Result<(), E>,
    E: Display,
{
    run_async_attempts(config, operation, Some(&mut recovery)).await
}

async fn run_async_attempts<F, Fut, T, E, R>(
    config: &RetryConfig,
    mut operation: F,
    mut recovery: Option<&mut R>,
) -> RunOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> Result<(), E> + ?Sized,
    E: Display,
{
    if let Err(e) = config.validate() {
        tracing::warn!(error = %e, "Invalid retry configuration, nothing executed");
        return RunOutcome::Misconfigured(e);
    }

    let mut attempt = 0;

    loop {
        attempt += 1;

        tracing::debug!(
            attempt = attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        let error = match operation(attempt).await {
            Ok(value) => {
                log_success(attempt);
                return RunOutcome::Success(value);
            }
            Err(error) => error,
        };

        match handle_failure(config, attempt, error, recovery.as_deref_mut()) {
            Step::Done(outcome) => return outcome,
            Step::Wait(delay) => tokio::time::sleep(delay).await,
        }
    }
}

enum Step<T, E> {
    /// Sleep for the given delay, then attempt again
    Wait(Duration),
    Done(RunOutcome<T, E>),
}

/// Decide what follows a failed attempt. Shared by the sync and async loops.
fn handle_failure<T, E, R>(
    config: &RetryConfig,
    attempt: u32,
    mut error: E,
    recovery: Option<&mut R>,
) -> Step<T, E>
where
    R: FnMut(&E) -> Result<(), E> + ?Sized,
    E: Display,
{
    let is_last = attempt >= config.max_attempts;

    if let Some(recover) = recovery {
        match config.recovery_mode {
            RecoveryMode::Resolve => match recover(&error) {
                Ok(()) => {
                    tracing::info!(attempt = attempt, "Recovery resolved failure, stopping");
                    return Step::Done(RunOutcome::Recovered);
                }
                Err(recovery_error) => error = recovery_error,
            },
            RecoveryMode::Retry if !is_last => match recover(&error) {
                Ok(()) => {
                    tracing::debug!(attempt = attempt, error = %error, "Recovery cleared failure");
                }
                Err(recovery_error) => error = recovery_error,
            },
            RecoveryMode::Retry => {}
        }
    }

    if is_last {
        tracing::error!(
            attempt = attempt,
            error = %error,
            "Operation failed after all retries"
        );
        return Step::Done(RunOutcome::Failed {
            error,
            status: Some(StrategyError::MaxAttemptsReached),
        });
    }

    tracing::warn!(
        attempt = attempt,
        error = %error,
        delay_ms = config.delay.as_millis(),
        "Operation failed, retrying after delay"
    );

    Step::Wait(config.delay)
}

fn log_success(attempt: u32) {
    if attempt > 1 {
        tracing::info!(attempt = attempt, "Operation succeeded after retry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(&'static str);

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    fn config(max_attempts: u32, delay_ms: u64) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(delay_ms))
    }

    #[test]
    fn test_retry_exhausts_all_attempts() {
        let attempts = Cell::new(0);
        let mut strategy = Retry::new(config(4, 10)).with_operation(|| {
            attempts.set(attempts.get() + 1);
            Err::<(), _>(TestError("down"))
        });

        let start = Instant::now();
        let outcome = strategy.run();

        assert_eq!(attempts.get(), 4);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(outcome.error(), Some(&TestError("down")));
        assert_eq!(outcome.status(), Some(StrategyError::MaxAttemptsReached));
        assert_eq!(strategy.last_error(), Some(StrategyError::MaxAttemptsReached));
    }

    #[test]
    fn test_retry_succeeds_on_third_attempt() {
        let attempts = Cell::new(0);
        let mut strategy = Retry::new(config(5, 20)).with_operation(|| {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(TestError("temporary failure"))
            } else {
                Ok("success")
            }
        });

        let start = Instant::now();
        let outcome = strategy.run();

        assert_eq!(outcome, RunOutcome::Success("success"));
        assert_eq!(attempts.get(), 3);
        // two delays, none after the success
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(strategy.last_error(), None);
    }

    #[test]
    fn test_successful_recovery_continues_to_next_attempt() {
        let attempts = Cell::new(0);
        let recoveries = Cell::new(0);
        let mut strategy = Retry::new(config(5, 100))
            .with_operation(|| {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(TestError("expected error"))
            })
            .with_recovery(|_err| {
                recoveries.set(recoveries.get() + 1);
                Ok(())
            });

        let start = Instant::now();
        let outcome = strategy.run();

        assert!(start.elapsed() >= Duration::from_millis(400));
        assert_eq!(outcome.error(), Some(&TestError("expected error")));
        assert_eq!(strategy.last_error(), Some(StrategyError::MaxAttemptsReached));
        assert_eq!(attempts.get(), 5);
        // not consulted after the final attempt
        assert_eq!(recoveries.get(), 4);
    }

    #[test]
    fn test_recovery_flag_lets_operation_succeed() {
        let attempts = Cell::new(0);
        let recoveries = Cell::new(0);
        let mut strategy = Retry::new(config(5, 10))
            .with_operation(|| {
                attempts.set(attempts.get() + 1);
                if recoveries.get() == 2 {
                    Ok(())
                } else {
                    Err(TestError("expected error"))
                }
            })
            .with_recovery(|_err| {
                recoveries.set(recoveries.get() + 1);
                Ok(())
            });

        let outcome = strategy.run();

        assert!(outcome.is_success());
        assert_eq!(strategy.last_error(), None);
        assert_eq!(attempts.get(), 3);
        assert_eq!(recoveries.get(), 2);
    }

    #[test]
    fn test_recovery_receives_each_failure() {
        let attempts = Cell::new(0);
        let recovered = Cell::new(false);
        let mut strategy = Retry::new(config(5, 10))
            .with_operation(|| {
                attempts.set(attempts.get() + 1);
                match attempts.get() {
                    1 => Err(TestError("expected error 1")),
                    2 => Err(TestError("expected error 2")),
                    _ if recovered.get() => Ok(()),
                    _ => Err(TestError("whatever")),
                }
            })
            .with_recovery(|err| {
                if *err == TestError("expected error 2") {
                    recovered.set(true);
                }
                Ok(())
            });

        let outcome = strategy.run();

        assert!(outcome.is_success());
        assert!(recovered.get());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_resolve_mode_short_circuits_on_recovery() {
        let attempts = Cell::new(0);
        let recoveries = Cell::new(0);
        let mut strategy = Retry::new(config(5, 10).with_recovery_mode(RecoveryMode::Resolve))
            .with_operation(|| {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(TestError("down"))
            })
            .with_recovery(|_err| {
                recoveries.set(recoveries.get() + 1);
                if recoveries.get() < 2 {
                    Err(TestError("recovery failed"))
                } else {
                    Ok(())
                }
            });

        let outcome = strategy.run();

        assert_eq!(outcome, RunOutcome::Recovered);
        assert_eq!(strategy.last_error(), None);
        // no further operation invocation once recovery resolves attempt 2
        assert_eq!(attempts.get(), 2);
        assert_eq!(recoveries.get(), 2);
    }

    #[test]
    fn test_resolve_mode_carries_latest_recovery_failure() {
        let attempts = Cell::new(0);
        let recoveries = Cell::new(0);
        let mut strategy = Retry::new(config(3, 0).with_recovery_mode(RecoveryMode::Resolve))
            .with_operation(|| {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(TestError("operation failed"))
            })
            .with_recovery(|_err| {
                recoveries.set(recoveries.get() + 1);
                Err(TestError("recovery failed"))
            });

        let outcome = strategy.run();

        // most recently produced failure wins, here the callback's
        assert_eq!(outcome.error(), Some(&TestError("recovery failed")));
        assert_eq!(outcome.status(), Some(StrategyError::MaxAttemptsReached));
        assert_eq!(attempts.get(), 3);
        assert_eq!(recoveries.get(), 3);
    }

    #[test]
    fn test_later_operation_failure_supersedes_recovery_failure() {
        let attempts = Cell::new(0);
        let mut strategy = Retry::new(config(2, 0))
            .with_operation(|| {
                attempts.set(attempts.get() + 1);
                Err::<(), _>(TestError("operation failed"))
            })
            .with_recovery(|_err| Err(TestError("recovery failed")));

        let outcome = strategy.run();

        assert_eq!(outcome.error(), Some(&TestError("operation failed")));
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_zero_max_attempts_invokes_nothing() {
        let attempts = Cell::new(0);
        let mut strategy = Retry::new(config(0, 10)).with_operation(|| {
            attempts.set(attempts.get() + 1);
            Ok::<_, TestError>(())
        });

        let outcome = strategy.run();

        assert_eq!(outcome, RunOutcome::Misconfigured(StrategyError::MaxAttemptsIsZero));
        assert!(outcome.error().is_none());
        assert_eq!(strategy.last_error(), Some(StrategyError::MaxAttemptsIsZero));
        assert_eq!(attempts.get(), 0);
    }

    #[test]
    fn test_missing_operation_is_configuration_error() {
        let mut strategy: Retry<(), TestError> = Retry::new(config(3, 10));

        let outcome = strategy.run();

        assert_eq!(outcome, RunOutcome::Misconfigured(StrategyError::ExecuteMissing));
        assert_eq!(strategy.last_error(), Some(StrategyError::ExecuteMissing));
    }

    #[test]
    fn test_each_run_gets_fresh_budget_and_success_clears_last_error() {
        let attempts = Cell::new(0);
        let healthy = Cell::new(false);
        let mut strategy = Retry::new(config(2, 0)).with_operation(|| {
            attempts.set(attempts.get() + 1);
            if healthy.get() {
                Ok(())
            } else {
                Err(TestError("down"))
            }
        });

        strategy.run();
        assert_eq!(attempts.get(), 2);
        assert_eq!(strategy.last_error(), Some(StrategyError::MaxAttemptsReached));

        strategy.run();
        assert_eq!(attempts.get(), 4);

        healthy.set(true);
        assert!(strategy.run().is_success());
        assert_eq!(attempts.get(), 5);
        assert_eq!(strategy.last_error(), None);
    }

    #[test]
    fn test_config_changes_apply_to_next_run() {
        let attempts = Cell::new(0);
        let mut strategy = Retry::new(config(0, 0)).with_operation(|| {
            attempts.set(attempts.get() + 1);
            Err::<(), _>(TestError("down"))
        });

        strategy.run();
        assert_eq!(strategy.last_error(), Some(StrategyError::MaxAttemptsIsZero));
        assert_eq!(attempts.get(), 0);

        strategy.config_mut().max_attempts = 3;
        strategy.run();
        assert_eq!(strategy.last_error(), Some(StrategyError::MaxAttemptsReached));
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_async_succeeds_eventually() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let outcome = retry_async(&config(3, 10), |_attempt| {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError("temporary failure"))
                } else {
                    Ok("success")
                }
            }
        })
        .await;

        assert_eq!(outcome, RunOutcome::Success("success"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_async_fails_after_max_attempts() {
        let start = tokio::time::Instant::now();

        let outcome =
            retry_async(&config(2, 500), |_attempt| async { Err::<(), _>(TestError("persistent failure")) })
                .await;

        assert_eq!(outcome.status(), Some(StrategyError::MaxAttemptsReached));
        assert_eq!(outcome.error(), Some(&TestError("persistent failure")));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_async_with_resolving_recovery() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let mut recoveries = 0;

        let outcome = retry_async_with_recovery(
            &config(4, 100).with_recovery_mode(RecoveryMode::Resolve),
            |_attempt| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError("down"))
                }
            },
            |_err: &TestError| {
                recoveries += 1;
                Ok(())
            },
        )
        .await;

        assert_eq!(outcome, RunOutcome::Recovered);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(recoveries, 1);
    }

    #[tokio::test]
    async fn test_retry_async_rejects_zero_attempts() {
        let outcome = retry_async(&config(0, 10), |_attempt| async { Ok::<_, TestError>(()) }).await;
        assert_eq!(outcome, RunOutcome::Misconfigured(StrategyError::MaxAttemptsIsZero));
    }
}
