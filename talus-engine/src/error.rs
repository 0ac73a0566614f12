//! Error types for the simulation core.

use thiserror::Error;

/// Errors raised by the simulation core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A caller-supplied argument was rejected.
    #[error("bad input: {what}")]
    BadInput {
        /// What was wrong with the input.
        what: String,
    },

    /// A dependent component was not ready.
    #[error("initialization failed: {what}")]
    InitFailed {
        /// What was missing.
        what: String,
    },

    /// A controller callback failed.
    #[error("controller error: {0}")]
    Controller(String),

    /// The step-size controller exhausted its failure quota; the integrator
    /// cannot make progress.
    #[error("integration failure at t = {t}: {consecutive} consecutive rejected steps")]
    StepFailure {
        /// Simulation time at which progress stalled.
        t: f64,
        /// Number of consecutive rejected trial steps.
        consecutive: u32,
    },

    /// Telemetry recording failed.
    #[error(transparent)]
    Telemetry(#[from] talus_telemetry::TelemetryError),

    /// The rigid-body layer rejected a state or model.
    #[error(transparent)]
    Rigid(#[from] talus_rigid::RigidError),
}

impl EngineError {
    /// Create a [`EngineError::BadInput`].
    #[must_use]
    pub fn bad_input(what: impl Into<String>) -> Self {
        Self::BadInput { what: what.into() }
    }

    /// Create a [`EngineError::InitFailed`].
    #[must_use]
    pub fn init_failed(what: impl Into<String>) -> Self {
        Self::InitFailed { what: what.into() }
    }

    /// Whether this error came from input validation.
    #[must_use]
    pub fn is_bad_input(&self) -> bool {
        matches!(self, Self::BadInput { .. })
    }

    /// Whether this is a fatal in-run integration failure.
    #[must_use]
    pub fn is_step_failure(&self) -> bool {
        matches!(self, Self::StepFailure { .. })
    }
}

/// Error type surfaced by controller callbacks.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ControlError(pub String);

impl ControlError {
    /// Create a controller error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<ControlError> for EngineError {
    fn from(err: ControlError) -> Self {
        Self::Controller(err.0)
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(EngineError::bad_input("x0 size").is_bad_input());
        assert!(!EngineError::bad_input("x0 size").is_step_failure());
        assert!(EngineError::StepFailure {
            t: 0.1,
            consecutive: 500
        }
        .is_step_failure());
    }

    #[test]
    fn test_control_error_converts() {
        let err: EngineError = ControlError::new("diverged").into();
        assert!(matches!(err, EngineError::Controller(_)));
    }
}
