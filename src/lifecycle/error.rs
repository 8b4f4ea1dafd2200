//! Lifecycle errors.

use thiserror::Error;

use crate::lifecycle::hooks::HookKind;
use crate::lifecycle::phase::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The requested transition is not in the adjacency table.
    /// State is left untouched.
    #[error("illegal phase transition: {from} -> {to}")]
    PhaseTransition { from: Phase, to: Phase },

    /// A hook set or shutdown handler failed during a transition.
    #[error("{hook} hook of '{component}' failed: {message}")]
    Hook {
        component: String,
        hook: HookKind,
        message: String,
    },

    /// The signal source could not be installed.
    #[error("failed to install signal handlers: {0}")]
    SignalInstall(String),
}
