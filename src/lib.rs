// ============================================================================
// Resilience primitives
// ============================================================================
//
// Two independent strategies for wrapping a fallible operation:
//
// - Retry:          re-run up to a bound with a fixed delay, optionally asking
//                   a recovery callback to clear each failure
// - CircuitBreaker: one invocation per call, ban further calls for a fixed
//                   timeout once the failure bound is reached
//
// Each `run` returns a `RunOutcome` carrying the operation's payload; the
// strategies also keep a sticky `last_error()` classification.
//
// ============================================================================

pub mod config;
pub mod errors;
pub mod outcome;
pub mod strategies;

pub use config::{CircuitBreakerConfig, RecoveryMode, RetryConfig};
pub use errors::StrategyError;
pub use outcome::RunOutcome;
pub use strategies::{
    retry_async, retry_async_with_recovery, BreakerSnapshot, CircuitBreaker, CircuitState, Retry,
    SharedCircuitBreaker,
};
