use crate::errors::StrategyError;

// ============================================================================
// Run Outcome
// ============================================================================
//
// Immutable result of a single `run` call. Carries both the operation's
// payload (success value or failure) and the strategy's classification.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome<T, E> {
    /// Operation returned a value
    Success(T),
    /// A recovery callback resolved the failure, no value was produced
    Recovered,
    /// Operation (or recovery callback) failed
    Failed {
        error: E,
        status: Option<StrategyError>,
    },
    /// Nothing was invoked because the strategy is misconfigured
    Misconfigured(StrategyError),
}

impl<T, E> RunOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_) | RunOutcome::Recovered)
    }

    /// The failure payload, if any. Misconfiguration never carries one.
    pub fn error(&self) -> Option<&E> {
        match self {
            RunOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Classification matching the strategy's `last_error()` after the call.
    pub fn status(&self) -> Option<StrategyError> {
        match self {
            RunOutcome::Failed { status, .. } => *status,
            RunOutcome::Misconfigured(e) => Some(*e),
            RunOutcome::Success(_) | RunOutcome::Recovered => None,
        }
    }

    /// Collapse into the payload channel only: `Ok(Some(v))` on success,
    /// `Ok(None)` when recovered or misconfigured, `Err(e)` on failure.
    pub fn into_result(self) -> Result<Option<T>, E> {
        match self {
            RunOutcome::Success(value) => Ok(Some(value)),
            RunOutcome::Recovered | RunOutcome::Misconfigured(_) => Ok(None),
            RunOutcome::Failed { error, .. } => Err(error),
        }
    }
}
