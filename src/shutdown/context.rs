//! Per-run shutdown state.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::bus::message::now_ms;
use crate::shutdown::error::ShutdownError;
use crate::shutdown::report::{ShutdownReport, StepReport, StepStatus};
use crate::shutdown::step::ShutdownStep;

#[derive(Default)]
struct Progress {
    completed: Vec<String>,
    failed: Vec<(String, ShutdownError)>,
    skipped: Vec<String>,
    steps: Vec<StepReport>,
    handlers_failed: usize,
}

/// Shared between the step loop and the aggregate timer of one run.
pub struct ShutdownContext {
    reason: String,
    start_time: u64,
    started_at: Instant,
    total_timeout: Duration,
    steps: Vec<ShutdownStep>,
    force_shutdown: AtomicBool,
    timeout_reached: AtomicBool,
    finished: AtomicBool,
    progress: Mutex<Progress>,
}

impl ShutdownContext {
    pub(crate) fn new(reason: String, total_timeout: Duration, steps: Vec<ShutdownStep>) -> Self {
        Self {
            reason,
            start_time: now_ms(),
            started_at: Instant::now(),
            total_timeout,
            steps,
            force_shutdown: AtomicBool::new(false),
            timeout_reached: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Milliseconds since the epoch at which the run began.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Sorted snapshot taken when the run began.
    pub fn steps(&self) -> &[ShutdownStep] {
        &self.steps
    }

    pub fn is_forced(&self) -> bool {
        self.force_shutdown.load(Ordering::SeqCst)
    }

    pub fn is_timeout_reached(&self) -> bool {
        self.timeout_reached.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Enter forced mode. Returns false if it was already active.
    pub(crate) fn force(&self) -> bool {
        !self.force_shutdown.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn mark_timeout(&self) {
        self.timeout_reached.store(true, Ordering::SeqCst);
        self.force();
    }

    pub(crate) fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub(crate) fn record_completed(&self, step: &ShutdownStep, elapsed: Duration) {
        let mut progress = self.progress.lock();
        progress.completed.push(step.id.clone());
        progress.steps.push(step_report(step, StepStatus::Completed, elapsed, None));
    }

    pub(crate) fn record_failed(&self, step: &ShutdownStep, elapsed: Duration, error: ShutdownError) {
        let status = match error {
            ShutdownError::StepTimeout { .. } => StepStatus::TimedOut,
            _ => StepStatus::Failed,
        };
        let mut progress = self.progress.lock();
        progress
            .steps
            .push(step_report(step, status, elapsed, Some(error.to_string())));
        progress.failed.push((step.id.clone(), error));
    }

    pub(crate) fn record_skipped(&self, step: &ShutdownStep) {
        let mut progress = self.progress.lock();
        progress.skipped.push(step.id.clone());
        progress
            .steps
            .push(step_report(step, StepStatus::Skipped, Duration::ZERO, None));
    }

    pub(crate) fn record_handler_failure(&self) {
        self.progress.lock().handlers_failed += 1;
    }

    pub fn completed_step_ids(&self) -> Vec<String> {
        self.progress.lock().completed.clone()
    }

    pub fn failed_steps(&self) -> Vec<(String, ShutdownError)> {
        self.progress.lock().failed.clone()
    }

    pub fn skipped_step_ids(&self) -> Vec<String> {
        self.progress.lock().skipped.clone()
    }

    /// JSON view of the run so far, published with `shutdown:timeout`.
    pub fn summary(&self) -> Value {
        let progress = self.progress.lock();
        let failed: Vec<Value> = progress
            .failed
            .iter()
            .map(|(id, err)| json!({ "step": id, "error": err.to_string() }))
            .collect();
        json!({
            "reason": self.reason,
            "start_time": self.start_time,
            "elapsed_ms": self.elapsed().as_millis() as u64,
            "total_timeout_ms": self.total_timeout.as_millis() as u64,
            "steps": self.steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            "completed": progress.completed,
            "failed": failed,
            "skipped": progress.skipped,
            "force_shutdown": self.is_forced(),
            "timeout_reached": self.is_timeout_reached(),
        })
    }

    pub fn report(&self) -> ShutdownReport {
        let progress = self.progress.lock();
        ShutdownReport {
            reason: self.reason.clone(),
            duration_ms: self.elapsed().as_millis() as u64,
            steps_completed: progress.completed.len(),
            steps_failed: progress.failed.len(),
            steps_skipped: progress.skipped.len(),
            handlers_failed: progress.handlers_failed,
            steps: progress.steps.clone(),
            force_shutdown: self.is_forced(),
            timeout_reached: self.is_timeout_reached(),
        }
    }
}

fn step_report(
    step: &ShutdownStep,
    status: StepStatus,
    elapsed: Duration,
    error: Option<String>,
) -> StepReport {
    StepReport {
        id: step.id.clone(),
        name: step.name.clone(),
        priority: step.priority,
        required: step.required,
        status,
        duration_ms: elapsed.as_millis() as u64,
        error,
    }
}
