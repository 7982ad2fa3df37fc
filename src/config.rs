use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::StrategyError;

// ============================================================================
// Strategy Configuration
// ============================================================================
//
// Plain data read at the start of every `run` call. Durations are encoded as
// integer milliseconds so configs can be embedded in JSON/TOML files:
//
//   { "max_attempts": 5, "delay_ms": 250, "recovery_mode": "resolve" }
//   { "max_attempts": 3, "ban_timeout_ms": 30000 }
//
// ============================================================================

/// What a successful recovery callback means for the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Failure is cleared and the loop moves on to the next attempt.
    /// The callback is not consulted after the final attempt.
    #[default]
    Retry,
    /// Failure is treated as resolved and `run` returns success immediately.
    Resolve,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of operation invocations per run
    pub max_attempts: u32,
    /// Fixed delay between a failed attempt and the next one
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,
    #[serde(default)]
    pub recovery_mode: RecoveryMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(100),
            recovery_mode: RecoveryMode::Retry,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            recovery_mode: RecoveryMode::Retry,
        }
    }

    pub fn with_recovery_mode(mut self, mode: RecoveryMode) -> Self {
        self.recovery_mode = mode;
        self
    }

    /// Create a retry config for high-value operations (more retries)
    pub fn aggressive() -> Self {
        Self::new(5, Duration::from_millis(50))
    }

    /// Create a retry config for quick failures (fewer retries)
    pub fn conservative() -> Self {
        Self::new(2, Duration::from_millis(200))
    }

    /// A zero delay is allowed; only the attempt bound is checked.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.max_attempts == 0 {
            return Err(StrategyError::MaxAttemptsIsZero);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub max_attempts: u32,
    /// Time the circuit stays open once opened
    #[serde(rename = "ban_timeout_ms", with = "millis")]
    pub ban_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            ban_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(max_attempts: u32, ban_timeout: Duration) -> Self {
        Self {
            max_attempts,
            ban_timeout,
        }
    }

    /// Open quickly and stay open longer
    pub fn aggressive() -> Self {
        Self::new(2, Duration::from_secs(60))
    }

    /// Tolerate more failures, recover sooner
    pub fn conservative() -> Self {
        Self::new(10, Duration::from_secs(10))
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.max_attempts == 0 {
            return Err(StrategyError::MaxAttemptsIsZero);
        }
        if self.ban_timeout.is_zero() {
            return Err(StrategyError::BanTimeoutIsZero);
        }
        Ok(())
    }
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }

    pub fn serialize_option<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }
}
