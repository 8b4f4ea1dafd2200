//! Lifecycle phase state machine.
//!
//! # State Transitions
//! ```text
//! Stopped → Initializing: initialize()
//! Initializing → Running: start() after every on_start hook succeeded
//! Initializing → Stopped: an on_initialize hook failed
//! Running → ShuttingDown: stop() / shutdown()
//! ShuttingDown → Stopped: teardown finished
//! ```
//!
//! `shutdown()` is the one caller allowed to enter `ShuttingDown` from any
//! non-stopped phase; see [`Phase::can_shut_down`].

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Stopped,
    Initializing,
    Running,
    ShuttingDown,
}

impl Phase {
    /// Phases reachable from `self` through a regular transition.
    pub fn successors(self) -> &'static [Phase] {
        match self {
            Phase::Stopped => &[Phase::Initializing],
            Phase::Initializing => &[Phase::Running, Phase::Stopped],
            Phase::Running => &[Phase::ShuttingDown],
            Phase::ShuttingDown => &[Phase::Stopped],
        }
    }

    pub fn can_transition_to(self, next: Phase) -> bool {
        self.successors().contains(&next)
    }

    /// `shutdown()` may start from any phase except `Stopped`.
    pub fn can_shut_down(self) -> bool {
        self != Phase::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Stopped => "stopped",
            Phase::Initializing => "initializing",
            Phase::Running => "running",
            Phase::ShuttingDown => "shutting-down",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 4] = [
        Phase::Stopped,
        Phase::Initializing,
        Phase::Running,
        Phase::ShuttingDown,
    ];

    #[test]
    fn adjacency_table() {
        let legal = [
            (Phase::Stopped, Phase::Initializing),
            (Phase::Initializing, Phase::Running),
            (Phase::Initializing, Phase::Stopped),
            (Phase::Running, Phase::ShuttingDown),
            (Phase::ShuttingDown, Phase::Stopped),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn shutdown_from_any_live_phase() {
        assert!(!Phase::Stopped.can_shut_down());
        assert!(Phase::Initializing.can_shut_down());
        assert!(Phase::Running.can_shut_down());
        assert!(Phase::ShuttingDown.can_shut_down());
    }

    #[test]
    fn display_names() {
        assert_eq!(Phase::ShuttingDown.to_string(), "shutting-down");
        assert_eq!(serde_json::to_value(Phase::ShuttingDown).unwrap(), "shutting-down");
    }
}
