use std::cell::Cell;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use resilience::{
    CircuitBreaker, CircuitBreakerConfig, Retry, RetryConfig, RunOutcome,
    SharedCircuitBreaker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,resilience=debug")),
        )
        .init();

    tracing::info!("Starting resilience demo");

    demo_retry()?;
    demo_circuit_breaker();
    demo_shared_circuit_breaker().await?;

    tracing::info!("Demo complete");

    Ok(())
}

/// Flaky operation that needs a recovery step before it succeeds
fn demo_retry() -> anyhow::Result<()> {
    let calls = Cell::new(0);
    let reconnected = Cell::new(false);

    let mut retry = Retry::new(RetryConfig::new(4, Duration::from_millis(200)))
        .with_operation(|| {
            calls.set(calls.get() + 1);
            if reconnected.get() && calls.get() >= 3 {
                Ok("payload")
            } else {
                Err(anyhow::anyhow!("connection reset"))
            }
        })
        .with_recovery(|err| {
            tracing::info!(error = %err, "Reconnecting");
            reconnected.set(true);
            Ok(())
        });

    match retry.run() {
        RunOutcome::Success(value) => {
            tracing::info!(value = value, calls = calls.get(), "✅ Retry succeeded");
        }
        RunOutcome::Recovered => tracing::info!("✅ Retry resolved by recovery"),
        RunOutcome::Failed { error, status } => {
            tracing::error!(error = %error, status = ?status, "❌ Retry gave up");
        }
        RunOutcome::Misconfigured(e) => return Err(e.into()),
    }

    Ok(())
}

/// Always-failing dependency: open, reject, wait out the ban, try again
fn demo_circuit_breaker() {
    let calls = Cell::new(0);
    let mut breaker = CircuitBreaker::new(CircuitBreakerConfig::new(2, Duration::from_secs(1)))
        .with_operation(|| {
            calls.set(calls.get() + 1);
            Err::<(), _>("service unavailable")
        });

    for call in 1..=3 {
        let outcome = breaker.run();
        tracing::info!(
            call = call,
            invocations = calls.get(),
            error = ?outcome.error(),
            last_error = ?breaker.last_error(),
            "Circuit breaker call"
        );
    }

    std::thread::sleep(Duration::from_millis(1100));

    let outcome = breaker.run();
    tracing::info!(
        call = 4,
        invocations = calls.get(),
        error = ?outcome.error(),
        last_error = ?breaker.last_error(),
        "Circuit breaker call after ban"
    );
}

async fn demo_shared_circuit_breaker() -> anyhow::Result<()> {
    let breaker = SharedCircuitBreaker::new(CircuitBreakerConfig::aggressive());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(async move { Err::<(), String>(format!("worker {} failed", i)) })
                    .await
            })
        })
        .collect();

    for handle in handles {
        match handle.await {
            Ok(outcome) => tracing::info!(
                error = ?outcome.error(),
                status = ?outcome.status(),
                "Shared breaker call"
            ),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }

    let snapshot = serde_json::to_string(&breaker.snapshot().await)?;
    tracing::info!(
        snapshot = %snapshot,
        "📊 Shared breaker status"
    );

    Ok(())
}
