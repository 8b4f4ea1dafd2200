//! Shutdown errors.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShutdownError {
    /// The step did not settle within its own budget.
    #[error("step '{step}' timed out after {}ms", .timeout.as_millis())]
    StepTimeout { step: String, timeout: Duration },

    /// The step's executor returned an error or panicked.
    #[error("step '{step}' failed: {message}")]
    StepError { step: String, message: String },

    /// The aggregate shutdown budget expired; forced mode was entered.
    #[error("shutdown timed out after {}ms", .timeout.as_millis())]
    ShutdownTimeout { timeout: Duration },

    /// Cleanup was still running when the force-kill grace expired.
    #[error("cleanup still running {}ms after forced shutdown", .timeout.as_millis())]
    ForceKillTimeout { timeout: Duration },

    /// A step with this id is already registered.
    #[error("shutdown step '{0}' already registered")]
    DuplicateStep(String),
}
