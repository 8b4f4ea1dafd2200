//! ShutdownOrchestrator - ordered, time-bounded cleanup.
//!
//! ```text
//! execute_graceful_shutdown(reason)
//!   │
//!   ├─ snapshot steps (priority ↓, insertion order)
//!   ├─ spawn aggregate timer ── timeout ──► force mode ── force_kill ──► kill()
//!   ├─ for each step: skip if forced (unless required) else
//!   │      spawn executor, race against step timeout
//!   ├─ shutdown handlers, newest first
//!   └─ report ──► shutdown:completed | shutdown:error
//! ```
//!
//! Only one run ever happens per orchestrator. Every later or concurrent
//! call resolves to the report of that run.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::message::{now_ms, priority};
use crate::bus::{MessageBus, PublishOptions};
use crate::config::ShutdownConfig;
use crate::lifecycle::hooks::{
    HandlerId, HookResult, LifecycleHooks, RegisteredHandler, ShutdownHandler,
};
use crate::observability::metrics;
use crate::shutdown::context::ShutdownContext;
use crate::shutdown::defaults::default_steps;
use crate::shutdown::error::ShutdownError;
use crate::shutdown::report::ShutdownReport;
use crate::shutdown::step::{ShutdownStep, StepExecutor, StepRegistry};

/// Called when cleanup overruns the force-kill grace.
pub type KillAction = Arc<dyn Fn() + Send + Sync>;

type SharedRun = Shared<BoxFuture<'static, ShutdownReport>>;

const SOURCE: &str = "shutdown-orchestrator";

pub struct ShutdownOrchestrator {
    config: ShutdownConfig,
    bus: Option<Arc<MessageBus>>,
    steps: Mutex<StepRegistry>,
    handlers: Mutex<Vec<RegisteredHandler>>,
    next_handler_id: AtomicU64,
    run: Mutex<Option<SharedRun>>,
    current: Mutex<Option<Arc<ShutdownContext>>>,
    last_report: Mutex<Option<ShutdownReport>>,
    started: Notify,
    kill: KillAction,
}

impl ShutdownOrchestrator {
    /// Build an orchestrator, seeding the built-in steps unless disabled.
    pub fn new(config: ShutdownConfig, bus: Option<Arc<MessageBus>>) -> Self {
        let mut registry = StepRegistry::default();
        if config.seed_default_steps {
            for step in default_steps(&config) {
                if let Err(e) = registry.add(step) {
                    warn!(error = %e, "Skipping built-in step");
                }
            }
        }
        Self {
            config,
            bus,
            steps: Mutex::new(registry),
            handlers: Mutex::new(Vec::new()),
            next_handler_id: AtomicU64::new(1),
            run: Mutex::new(None),
            current: Mutex::new(None),
            last_report: Mutex::new(None),
            started: Notify::new(),
            kill: Arc::new(|| std::process::exit(1)),
        }
    }

    /// Replace the process exit performed after the force-kill grace.
    pub fn with_kill_action(mut self, kill: KillAction) -> Self {
        self.kill = kill;
        self
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    // --- Steps and handlers ---

    pub fn add_cleanup_step(&self, step: ShutdownStep) -> Result<(), ShutdownError> {
        let id = step.id.clone();
        let priority = step.priority;
        self.steps.lock().add(step)?;
        debug!(step = %id, priority, "Cleanup step added");
        Ok(())
    }

    pub fn remove_cleanup_step(&self, id: &str) -> bool {
        self.steps.lock().remove(id).is_some()
    }

    /// Swap the work done by an existing step, keeping its slot.
    pub fn replace_step_executor(&self, id: &str, executor: StepExecutor) -> bool {
        self.steps.lock().replace_executor(id, executor)
    }

    /// Step ids in execution order.
    pub fn step_ids(&self) -> Vec<String> {
        self.steps.lock().ids()
    }

    pub fn add_shutdown_handler(&self, name: impl Into<String>, handler: ShutdownHandler) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push(RegisteredHandler {
            id,
            name: name.into(),
            handler,
        });
        id
    }

    pub fn remove_shutdown_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|h| h.id != id);
        before != handlers.len()
    }

    // --- Run control ---

    /// Run the shutdown sequence once and return its report.
    ///
    /// The run is spawned onto the runtime, so dropping the returned future
    /// does not cancel it.
    pub async fn execute_graceful_shutdown(self: &Arc<Self>, reason: impl Into<String>) -> ShutdownReport {
        let run = {
            let mut slot = self.run.lock();
            match &*slot {
                Some(run) => {
                    debug!("Shutdown already in progress, joining it");
                    run.clone()
                }
                None => {
                    let run = self.begin(reason.into());
                    *slot = Some(run.clone());
                    run
                }
            }
        };
        self.started.notify_waiters();
        run.await
    }

    /// Start a run in the background.
    pub fn trigger(self: &Arc<Self>, reason: impl Into<String>) -> JoinHandle<ShutdownReport> {
        let this = Arc::clone(self);
        let reason = reason.into();
        tokio::spawn(async move { this.execute_graceful_shutdown(reason).await })
    }

    /// Put the in-flight run into forced mode. Returns false when no run is
    /// active or it was already forced.
    pub fn force(&self) -> bool {
        let ctx = self.current.lock().clone();
        match ctx {
            Some(ctx) if !ctx.is_finished() => {
                let entered = ctx.force();
                if entered {
                    warn!(reason = %ctx.reason(), "Forced shutdown requested");
                }
                entered
            }
            _ => false,
        }
    }

    /// Wait for the current run, or the next one to start.
    pub async fn wait(&self) -> ShutdownReport {
        loop {
            let notified = self.started.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let run = self.run.lock().clone();
            if let Some(run) = run {
                return run.await;
            }
            notified.await;
        }
    }

    /// True while a run is executing.
    pub fn is_shutting_down(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|ctx| !ctx.is_finished())
            .unwrap_or(false)
    }

    pub fn last_report(&self) -> Option<ShutdownReport> {
        self.last_report.lock().clone()
    }

    /// Hook set that runs the shutdown from the controller's `on_shutdown`.
    pub fn lifecycle_hooks(self: &Arc<Self>) -> Arc<dyn LifecycleHooks> {
        Arc::new(OrchestratorHooks {
            orchestrator: Arc::clone(self),
        })
    }

    fn begin(self: &Arc<Self>, reason: String) -> SharedRun {
        let ctx = Arc::new(ShutdownContext::new(
            reason,
            self.config.timeout(),
            self.steps.lock().snapshot(),
        ));
        *self.current.lock() = Some(Arc::clone(&ctx));

        let this = Arc::clone(self);
        let task = tokio::spawn({
            let ctx = Arc::clone(&ctx);
            async move { this.run_steps(ctx).await }
        });

        let this = Arc::clone(self);
        async move {
            let report = match task.await {
                Ok(report) => report,
                Err(e) => {
                    error!(error = %e, "Shutdown run aborted");
                    ctx.finish();
                    ctx.report()
                }
            };
            *this.last_report.lock() = Some(report.clone());
            report
        }
        .boxed()
        .shared()
    }

    async fn run_steps(self: Arc<Self>, ctx: Arc<ShutdownContext>) -> ShutdownReport {
        info!(
            reason = %ctx.reason(),
            steps = ctx.steps().len(),
            timeout_ms = self.config.timeout_ms,
            "Graceful shutdown started"
        );
        self.publish(
            "shutdown:started",
            json!({ "reason": ctx.reason(), "timestamp": ctx.start_time() }),
        )
        .await;

        let timer_stop = Arc::new(Notify::new());
        self.spawn_timer(Arc::clone(&ctx), Arc::clone(&timer_stop));

        for step in ctx.steps() {
            if ctx.is_forced() && !(step.required && self.config.run_required_when_forced) {
                debug!(step = %step.id, "Skipping step in forced mode");
                ctx.record_skipped(step);
                metrics::record_shutdown_step("skipped", Duration::ZERO);
                continue;
            }

            let started = Instant::now();
            let outcome = self.run_step(step).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(()) => {
                    debug!(step = %step.id, elapsed_ms = elapsed.as_millis() as u64, "Step completed");
                    ctx.record_completed(step, elapsed);
                    metrics::record_shutdown_step("completed", elapsed);
                    self.publish(
                        "shutdown:step-completed",
                        json!({
                            "step": step.id,
                            "duration": elapsed.as_millis() as u64,
                            "timestamp": now_ms(),
                        }),
                    )
                    .await;
                }
                Err(err) => {
                    warn!(step = %step.id, error = %err, required = step.required, "Step failed");
                    let status = match err {
                        ShutdownError::StepTimeout { .. } => "timed-out",
                        _ => "failed",
                    };
                    metrics::record_shutdown_step(status, elapsed);
                    self.publish(
                        "shutdown:step-failed",
                        json!({
                            "step": step.id,
                            "error": err.to_string(),
                            "timestamp": now_ms(),
                        }),
                    )
                    .await;
                    ctx.record_failed(step, elapsed, err);
                }
            }
        }

        self.run_handlers(&ctx).await;

        ctx.finish();
        // The timer may be mid-publish; a stored permit ends it at its next wait.
        timer_stop.notify_one();

        let report = ctx.report();
        metrics::record_shutdown_complete(ctx.elapsed(), report.force_shutdown);
        info!(
            reason = %report.reason,
            duration_ms = report.duration_ms,
            completed = report.steps_completed,
            failed = report.steps_failed,
            skipped = report.steps_skipped,
            forced = report.force_shutdown,
            "Graceful shutdown finished"
        );

        let report_json = serde_json::to_value(&report).unwrap_or(Value::Null);
        if report.steps_failed > 0 {
            let error = format!("{} cleanup step(s) failed", report.steps_failed);
            self.publish(
                "shutdown:error",
                json!({ "error": error, "report": report_json, "timestamp": now_ms() }),
            )
            .await;
        } else {
            self.publish(
                "shutdown:completed",
                json!({ "report": report_json, "timestamp": now_ms() }),
            )
            .await;
        }
        report
    }

    /// Race the step's executor against its own timeout.
    async fn run_step(&self, step: &ShutdownStep) -> Result<(), ShutdownError> {
        let executor = Arc::clone(&step.executor);
        let mut task = tokio::spawn(async move { executor().await });

        match tokio::time::timeout(step.timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(ShutdownError::StepError {
                step: step.id.clone(),
                message: e.to_string(),
            }),
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    join_err.to_string()
                };
                Err(ShutdownError::StepError {
                    step: step.id.clone(),
                    message,
                })
            }
            Err(_) => {
                if self.config.abort_timed_out_steps {
                    task.abort();
                }
                Err(ShutdownError::StepTimeout {
                    step: step.id.clone(),
                    timeout: step.timeout,
                })
            }
        }
    }

    async fn run_handlers(&self, ctx: &ShutdownContext) {
        let handlers: Vec<(String, ShutdownHandler)> = self
            .handlers
            .lock()
            .iter()
            .rev()
            .map(|h| (h.name.clone(), Arc::clone(&h.handler)))
            .collect();

        let budget = self.config.handler_timeout();
        for (name, handler) in handlers {
            let call = AssertUnwindSafe(async move { handler().await }).catch_unwind();
            let failure = match tokio::time::timeout(budget, call).await {
                Ok(Ok(Ok(()))) => None,
                Ok(Ok(Err(e))) => Some(e.to_string()),
                Ok(Err(panic)) => Some(panic_message(panic)),
                Err(_) => Some(format!("timed out after {}ms", budget.as_millis())),
            };
            if let Some(error) = failure {
                warn!(handler = %name, error = %error, "Shutdown handler failed");
                ctx.record_handler_failure();
            }
        }
    }

    fn spawn_timer(self: &Arc<Self>, ctx: Arc<ShutdownContext>, stop: Arc<Notify>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let timeout = this.config.timeout();
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {}
                _ = stop.notified() => return,
            }
            if ctx.is_finished() {
                return;
            }
            ctx.mark_timeout();
            warn!(error = %ShutdownError::ShutdownTimeout { timeout }, "Entering forced shutdown");
            this.publish(
                "shutdown:timeout",
                json!({ "context": ctx.summary(), "timestamp": now_ms() }),
            )
            .await;

            let grace = this.config.force_kill_timeout();
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                _ = stop.notified() => return,
            }
            if ctx.is_finished() {
                return;
            }
            error!(error = %ShutdownError::ForceKillTimeout { timeout: grace }, "Killing process");
            (this.kill)();
        });
    }

    async fn publish(&self, topic: &str, payload: Value) {
        let Some(bus) = &self.bus else {
            return;
        };
        let opts = PublishOptions::from_source(SOURCE).priority(priority::HIGH);
        if let Err(e) = bus.publish(topic, payload, opts).await {
            debug!(topic, error = %e, "Shutdown event not published");
        }
    }
}

struct OrchestratorHooks {
    orchestrator: Arc<ShutdownOrchestrator>,
}

#[async_trait]
impl LifecycleHooks for OrchestratorHooks {
    async fn on_shutdown(&self) -> HookResult {
        let report = self.orchestrator.execute_graceful_shutdown("lifecycle").await;
        if !report.is_clean() {
            debug!(failed = report.steps_failed, "Shutdown finished with failures");
        }
        Ok(())
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
