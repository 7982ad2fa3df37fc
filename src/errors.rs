// ============================================================================
// Strategy Errors
// ============================================================================
//
// Classification of why a `run` call ended the way it did. This is the
// "sticky" channel exposed through `last_error()`; the operation's own
// failure payload travels separately in `RunOutcome`.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    #[error("no operation configured to execute")]
    ExecuteMissing,

    #[error("max attempts must be greater than zero")]
    MaxAttemptsIsZero,

    #[error("ban timeout must be greater than zero")]
    BanTimeoutIsZero,

    #[error("max attempts reached")]
    MaxAttemptsReached,

    #[error("circuit is open, ban still active")]
    CircuitOpen,
}

impl StrategyError {
    /// True for errors detected before any operation invocation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StrategyError::ExecuteMissing
                | StrategyError::MaxAttemptsIsZero
                | StrategyError::BanTimeoutIsZero
        )
    }
}
