//! Shutdown reports.

use serde::Serialize;

/// Final state of one cleanup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Completed,
    Failed,
    TimedOut,
    /// Not run because forced mode was active.
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::TimedOut => "timed-out",
            StepStatus::Skipped => "skipped",
        }
    }

    /// Failed and timed-out steps both count as failures.
    pub fn is_failure(self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub required: bool,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one shutdown run. Built once, then shared read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub reason: String,
    pub duration_ms: u64,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub handlers_failed: usize,
    /// In execution order.
    pub steps: Vec<StepReport>,
    pub force_shutdown: bool,
    pub timeout_reached: bool,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.steps_failed == 0 && self.handlers_failed == 0 && !self.force_shutdown
    }

    pub fn step(&self, id: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.status.is_failure())
    }
}
