// ============================================================================
// Strategies
// ============================================================================
//
// - retry.rs           - bounded re-execution with fixed delay and recovery
// - circuit_breaker.rs - attempt counting across calls, ban after the bound
// - shared.rs          - async, lock-protected circuit breaker for shared use
//
// ============================================================================

pub mod circuit_breaker;
pub mod retry;
pub mod shared;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use retry::{retry_async, retry_async_with_recovery, Retry};
pub use shared::SharedCircuitBreaker;

/// Caller-supplied unit of fallible work
pub type Operation<'a, T, E> = Box<dyn FnMut() -> Result<T, E> + 'a>;

/// Remediation step invoked with the last failure between retry attempts
pub type RecoveryFn<'a, E> = Box<dyn FnMut(&E) -> Result<(), E> + 'a>;
