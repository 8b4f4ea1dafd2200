//! Cleanup steps and their registry.

use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::BoxError;
use crate::shutdown::error::ShutdownError;

pub type StepResult = Result<(), BoxError>;

/// Zero-argument async cleanup action.
pub type StepExecutor = Arc<dyn Fn() -> BoxFuture<'static, StepResult> + Send + Sync>;

/// Wrap an async closure as a [`StepExecutor`].
pub fn step_executor<F, Fut>(f: F) -> StepExecutor
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// One prioritized, time-bounded cleanup action.
#[derive(Clone)]
pub struct ShutdownStep {
    pub id: String,
    pub name: String,
    /// Higher runs first.
    pub priority: i32,
    pub timeout: Duration,
    /// Still runs after forced mode is entered (when so configured).
    pub required: bool,
    pub executor: StepExecutor,
}

impl ShutdownStep {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        priority: i32,
        timeout: Duration,
        executor: StepExecutor,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            timeout,
            required: false,
            executor,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

impl fmt::Debug for ShutdownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

struct Entry {
    seq: u64,
    step: ShutdownStep,
}

/// Steps kept sorted by priority (desc), then insertion order.
#[derive(Default)]
pub(crate) struct StepRegistry {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl StepRegistry {
    pub(crate) fn add(&mut self, step: ShutdownStep) -> Result<(), ShutdownError> {
        if self.entries.iter().any(|e| e.step.id == step.id) {
            return Err(ShutdownError::DuplicateStep(step.id));
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry { seq, step });
        self.entries.sort_by(|a, b| {
            b.step
                .priority
                .cmp(&a.step.priority)
                .then(a.seq.cmp(&b.seq))
        });
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<ShutdownStep> {
        let pos = self.entries.iter().position(|e| e.step.id == id)?;
        Some(self.entries.remove(pos).step)
    }

    pub(crate) fn replace_executor(&mut self, id: &str, executor: StepExecutor) -> bool {
        match self.entries.iter_mut().find(|e| e.step.id == id) {
            Some(entry) => {
                entry.step.executor = executor;
                true
            }
            None => false,
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<ShutdownStep> {
        self.entries.iter().map(|e| e.step.clone()).collect()
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.step.id.clone()).collect()
    }
}
