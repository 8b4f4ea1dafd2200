//! Lifecycle controller.
//!
//! # Responsibilities
//! - Own the phase state machine and reject illegal transitions
//! - Run registered hook sets, in registration order, on each transition
//! - Run shutdown handlers in reverse registration order on shutdown
//! - Install signal handlers on construction, remove them on full shutdown
//!
//! # Design Decisions
//! - Transitions are serialized by an async mutex; hooks must not drive
//!   transitions on the controller that is running them
//! - Initialize/start/stop fail fast; shutdown is best-effort and reports
//!   the first failure only after settling in `Stopped`
//! - `on_error` is dispatched on its own path after a failure

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bus::message::now_ms;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::hooks::{
    HandlerId, HookId, HookKind, LifecycleHooks, RegisteredHandler, RegisteredHooks,
    ShutdownHandler,
};
use crate::lifecycle::notify::SignalNotifier;
use crate::lifecycle::phase::Phase;
use crate::lifecycle::signals::{SignalKind, SignalSource};
use crate::observability::metrics;

struct ControllerState {
    phase: Phase,
    start_time: Option<u64>,
    started_at: Option<Instant>,
    components: BTreeSet<String>,
    screens: BTreeSet<String>,
    last_error: Option<LifecycleError>,
}

/// Snapshot of the controller state.
#[derive(Debug, Clone)]
pub struct LifecycleState {
    pub phase: Phase,
    /// Milliseconds since the epoch of the last `initialize()`.
    pub start_time: Option<u64>,
    pub uptime: Option<Duration>,
    pub registered_components: Vec<String>,
    pub registered_screens: Vec<String>,
    pub last_error: Option<LifecycleError>,
}

pub struct LifecycleController {
    state: Mutex<ControllerState>,
    hooks: Mutex<Vec<RegisteredHooks>>,
    handlers: Mutex<Vec<RegisteredHandler>>,
    next_id: AtomicU64,
    transition: tokio::sync::Mutex<()>,
    signals: Option<Arc<dyn SignalSource>>,
    signals_installed: AtomicBool,
    notifier: SignalNotifier,
}

impl LifecycleController {
    /// Controller without signal handling.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ControllerState {
                phase: Phase::Stopped,
                start_time: None,
                started_at: None,
                components: BTreeSet::new(),
                screens: BTreeSet::new(),
                last_error: None,
            }),
            hooks: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            transition: tokio::sync::Mutex::new(()),
            signals: None,
            signals_installed: AtomicBool::new(false),
            notifier: SignalNotifier::new(),
        }
    }

    /// Controller that installs `source` immediately and reinstalls it on
    /// the first `initialize()` after each full shutdown.
    pub fn with_signal_source(source: Arc<dyn SignalSource>) -> Result<Self, LifecycleError> {
        let mut controller = Self::new();
        controller.signals = Some(source);
        controller.install_signals()?;
        Ok(controller)
    }

    /// Receive every signal reported by the installed source.
    pub fn subscribe_signals(&self) -> broadcast::Receiver<SignalKind> {
        self.notifier.subscribe()
    }

    pub fn signals_installed(&self) -> bool {
        self.signals_installed.load(Ordering::SeqCst)
    }

    fn install_signals(&self) -> Result<(), LifecycleError> {
        let Some(source) = &self.signals else {
            return Ok(());
        };
        if self.signals_installed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let notifier = self.notifier.clone();
        source.install(Arc::new(move |kind| {
            notifier.notify(kind);
        }))?;
        self.signals_installed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn uninstall_signals(&self) {
        if let Some(source) = &self.signals {
            if self.signals_installed.swap(false, Ordering::SeqCst) {
                source.uninstall();
            }
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn state(&self) -> LifecycleState {
        let state = self.state.lock();
        LifecycleState {
            phase: state.phase,
            start_time: state.start_time,
            uptime: state.started_at.map(|t| t.elapsed()),
            registered_components: state.components.iter().cloned().collect(),
            registered_screens: state.screens.iter().cloned().collect(),
            last_error: state.last_error.clone(),
        }
    }

    pub fn last_error(&self) -> Option<LifecycleError> {
        self.state.lock().last_error.clone()
    }

    // --- Registration ---

    pub fn register_hooks(&self, name: impl Into<String>, hooks: Arc<dyn LifecycleHooks>) -> HookId {
        let id = HookId(self.next_id());
        let name = name.into();
        debug!(hooks = %name, "Hook set registered");
        self.hooks.lock().push(RegisteredHooks { id, name, hooks });
        id
    }

    pub fn unregister_hooks(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.lock();
        let before = hooks.len();
        hooks.retain(|h| h.id != id);
        before != hooks.len()
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Track a component for diagnostics. Returns false if already known.
    pub fn register_component(&self, name: impl Into<String>) -> bool {
        self.state.lock().components.insert(name.into())
    }

    pub fn unregister_component(&self, name: &str) -> bool {
        self.state.lock().components.remove(name)
    }

    pub fn register_screen(&self, name: impl Into<String>) -> bool {
        self.state.lock().screens.insert(name.into())
    }

    pub fn unregister_screen(&self, name: &str) -> bool {
        self.state.lock().screens.remove(name)
    }

    /// Add a teardown callback run by `shutdown()`, newest first.
    pub fn add_shutdown_handler(&self, name: impl Into<String>, handler: ShutdownHandler) -> HandlerId {
        let id = HandlerId(self.next_id());
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

    // --- Transitions ---

    fn check_transition(&self, to: Phase) -> Result<Phase, LifecycleError> {
        let from = self.phase();
        if from.can_transition_to(to) {
            Ok(from)
        } else {
            Err(LifecycleError::PhaseTransition { from, to })
        }
    }

    fn set_phase(&self, to: Phase) {
        let from = {
            let mut state = self.state.lock();
            std::mem::replace(&mut state.phase, to)
        };
        if from != to {
            info!(from = %from, to = %to, "Lifecycle phase changed");
            metrics::record_phase(to);
        }
    }

    /// `Stopped → Initializing`, then every `on_initialize` hook in order.
    ///
    /// A failing hook aborts the remaining hooks and returns the controller
    /// to `Stopped`.
    pub async fn initialize(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        self.check_transition(Phase::Initializing)?;

        if let Err(e) = self.install_signals() {
            self.handle_error(&e).await;
            return Err(e);
        }

        {
            let mut state = self.state.lock();
            state.start_time = Some(now_ms());
            state.started_at = Some(Instant::now());
            state.last_error = None;
        }
        self.set_phase(Phase::Initializing);

        if let Err(e) = self.run_hooks(HookKind::Initialize).await {
            self.handle_error(&e).await;
            self.set_phase(Phase::Stopped);
            return Err(e);
        }
        Ok(())
    }

    /// `Initializing → Running` once every `on_start` hook succeeded.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        self.check_transition(Phase::Running)?;

        if let Err(e) = self.run_hooks(HookKind::Start).await {
            self.handle_error(&e).await;
            return Err(e);
        }
        self.set_phase(Phase::Running);
        Ok(())
    }

    /// `Running → ShuttingDown → Stopped` after every `on_stop` hook
    /// succeeded. No-op when already stopped; a failing hook leaves the
    /// controller running.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        let from = self.phase();
        if from == Phase::Stopped {
            debug!("stop() on a stopped controller");
            return Ok(());
        }
        if from != Phase::Running {
            return Err(LifecycleError::PhaseTransition {
                from,
                to: Phase::ShuttingDown,
            });
        }

        if let Err(e) = self.run_hooks(HookKind::Stop).await {
            self.handle_error(&e).await;
            return Err(e);
        }
        self.set_phase(Phase::ShuttingDown);
        self.set_phase(Phase::Stopped);
        Ok(())
    }

    /// Tear everything down, best-effort.
    ///
    /// Runs `on_stop` (if running) and `on_shutdown` on every hook set, then
    /// the shutdown handlers newest-first, clears the registries, removes the
    /// signal handlers and settles in `Stopped`. The first failure is
    /// returned afterwards. From `Stopped` only the final cleanup runs.
    pub async fn shutdown(&self) -> Result<(), LifecycleError> {
        let _guard = self.transition.lock().await;
        let from = self.phase();
        if !from.can_shut_down() {
            self.finish_shutdown();
            return Ok(());
        }

        self.set_phase(Phase::ShuttingDown);
        let started = Instant::now();
        let mut failures = Vec::new();

        if from == Phase::Running {
            failures.extend(self.run_hooks_best_effort(HookKind::Stop).await);
        }
        failures.extend(self.run_hooks_best_effort(HookKind::Shutdown).await);
        failures.extend(self.run_shutdown_handlers().await);

        for failure in &failures {
            self.handle_error(failure).await;
        }

        self.finish_shutdown();
        self.set_phase(Phase::Stopped);
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            failures = failures.len(),
            "Lifecycle shutdown complete"
        );

        match failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn finish_shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.components.clear();
            state.screens.clear();
            state.started_at = None;
        }
        self.uninstall_signals();
    }

    fn snapshot_hooks(&self) -> Vec<(String, Arc<dyn LifecycleHooks>)> {
        self.hooks
            .lock()
            .iter()
            .map(|h| (h.name.clone(), Arc::clone(&h.hooks)))
            .collect()
    }

    async fn run_hooks(&self, kind: HookKind) -> Result<(), LifecycleError> {
        for (name, hooks) in self.snapshot_hooks() {
            debug!(hooks = %name, hook = %kind, "Running hook");
            kind.invoke(hooks.as_ref())
                .await
                .map_err(|e| hook_error(&name, kind, e.to_string()))?;
        }
        Ok(())
    }

    async fn run_hooks_best_effort(&self, kind: HookKind) -> Vec<LifecycleError> {
        let mut failures = Vec::new();
        for (name, hooks) in self.snapshot_hooks() {
            if let Err(e) = kind.invoke(hooks.as_ref()).await {
                warn!(hooks = %name, hook = %kind, error = %e, "Hook failed during shutdown");
                failures.push(hook_error(&name, kind, e.to_string()));
            }
        }
        failures
    }

    async fn run_shutdown_handlers(&self) -> Vec<LifecycleError> {
        let handlers: Vec<(String, ShutdownHandler)> = self
            .handlers
            .lock()
            .iter()
            .rev()
            .map(|h| (h.name.clone(), Arc::clone(&h.handler)))
            .collect();

        let mut failures = Vec::new();
        for (name, handler) in handlers {
            if let Err(e) = handler().await {
                warn!(handler = %name, error = %e, "Shutdown handler failed");
                failures.push(hook_error(&name, HookKind::Shutdown, e.to_string()));
            }
        }
        failures
    }

    /// Record `err` and hand it to every hook set's `on_error`.
    async fn handle_error(&self, err: &LifecycleError) {
        error!(error = %err, phase = %self.phase(), "Lifecycle transition failed");
        self.state.lock().last_error = Some(err.clone());
        for (_, hooks) in self.snapshot_hooks() {
            hooks.on_error(err).await;
        }
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.uninstall_signals();
    }
}

fn hook_error(component: &str, hook: HookKind, message: String) -> LifecycleError {
    LifecycleError::Hook {
        component: component.to_string(),
        hook,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::hooks::{shutdown_handler, HookResult};
    use crate::lifecycle::signals::ManualSignalSource;
    use async_trait::async_trait;

    /// Records every hook call as "<name>:<hook>".
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_on: Option<HookKind>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                fail_on: None,
            })
        }

        fn failing(name: &'static str, log: &Arc<Mutex<Vec<String>>>, kind: HookKind) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                fail_on: Some(kind),
            })
        }

        fn record(&self, kind: HookKind) -> HookResult {
            self.log.lock().push(format!("{}:{}", self.name, kind));
            if self.fail_on == Some(kind) {
                return Err(format!("{} refused", self.name).into());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LifecycleHooks for Recorder {
        async fn on_initialize(&self) -> HookResult {
            self.record(HookKind::Initialize)
        }

        async fn on_start(&self) -> HookResult {
            self.record(HookKind::Start)
        }

        async fn on_stop(&self) -> HookResult {
            self.record(HookKind::Stop)
        }

        async fn on_shutdown(&self) -> HookResult {
            self.record(HookKind::Shutdown)
        }

        async fn on_error(&self, _error: &LifecycleError) {
            self.log.lock().push(format!("{}:on_error", self.name));
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn full_cycle_then_start_is_rejected() {
        let controller = LifecycleController::new();
        controller.initialize().await.unwrap();
        assert_eq!(controller.phase(), Phase::Initializing);
        controller.start().await.unwrap();
        assert_eq!(controller.phase(), Phase::Running);
        controller.stop().await.unwrap();
        assert_eq!(controller.phase(), Phase::Stopped);
        controller.shutdown().await.unwrap();

        let err = controller.start().await.unwrap_err();
        assert_eq!(
            err,
            LifecycleError::PhaseTransition {
                from: Phase::Stopped,
                to: Phase::Running
            }
        );
        assert_eq!(controller.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn hooks_run_in_registration_order() {
        let calls = log();
        let controller = LifecycleController::new();
        controller.register_hooks("a", Recorder::new("a", &calls));
        controller.register_hooks("b", Recorder::new("b", &calls));

        controller.initialize().await.unwrap();
        controller.start().await.unwrap();
        controller.stop().await.unwrap();

        assert_eq!(
            *calls.lock(),
            vec![
                "a:on_initialize",
                "b:on_initialize",
                "a:on_start",
                "b:on_start",
                "a:on_stop",
                "b:on_stop",
            ]
        );
    }

    #[tokio::test]
    async fn illegal_transition_leaves_state_untouched() {
        let controller = LifecycleController::new();
        assert!(controller.start().await.is_err());
        assert_eq!(controller.phase(), Phase::Stopped);
        assert!(controller.last_error().is_none());

        controller.initialize().await.unwrap();
        let err = controller.initialize().await.unwrap_err();
        assert!(matches!(err, LifecycleError::PhaseTransition { .. }));
        assert_eq!(controller.phase(), Phase::Initializing);
    }

    #[tokio::test]
    async fn failing_initialize_aborts_and_reports() {
        let calls = log();
        let controller = LifecycleController::new();
        controller.register_hooks("a", Recorder::failing("a", &calls, HookKind::Initialize));
        controller.register_hooks("b", Recorder::new("b", &calls));

        let err = controller.initialize().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Hook { hook: HookKind::Initialize, .. }));
        assert_eq!(controller.phase(), Phase::Stopped);
        assert_eq!(controller.last_error(), Some(err));
        // b never initialized; on_error reached both through the error path.
        assert_eq!(*calls.lock(), vec!["a:on_initialize", "a:on_error", "b:on_error"]);
    }

    #[tokio::test]
    async fn failing_start_stays_initializing() {
        let calls = log();
        let controller = LifecycleController::new();
        controller.register_hooks("a", Recorder::failing("a", &calls, HookKind::Start));

        controller.initialize().await.unwrap();
        assert!(controller.start().await.is_err());
        assert_eq!(controller.phase(), Phase::Initializing);
    }

    #[tokio::test]
    async fn failing_stop_stays_running() {
        let calls = log();
        let controller = LifecycleController::new();
        controller.register_hooks("a", Recorder::failing("a", &calls, HookKind::Stop));

        controller.initialize().await.unwrap();
        controller.start().await.unwrap();
        assert!(controller.stop().await.is_err());
        assert_eq!(controller.phase(), Phase::Running);
    }

    #[tokio::test]
    async fn shutdown_is_best_effort_and_lifo() {
        let calls = log();
        let controller = LifecycleController::new();
        controller.register_hooks("a", Recorder::failing("a", &calls, HookKind::Stop));
        controller.register_hooks("b", Recorder::new("b", &calls));
        for name in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            controller.add_shutdown_handler(
                name,
                shutdown_handler(move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.lock().push(format!("handler:{}", name));
                        let result: HookResult = if name == "second" {
                            Err("handler broke".into())
                        } else {
                            Ok(())
                        };
                        result
                    }
                }),
            );
        }
        controller.register_component("editor");
        controller.register_screen("main");

        controller.initialize().await.unwrap();
        controller.start().await.unwrap();
        let err = controller.shutdown().await.unwrap_err();

        assert!(matches!(err, LifecycleError::Hook { hook: HookKind::Stop, .. }));
        assert_eq!(controller.phase(), Phase::Stopped);
        let state = controller.state();
        assert!(state.registered_components.is_empty());
        assert!(state.registered_screens.is_empty());

        let calls = calls.lock().clone();
        let ordered: Vec<_> = calls.iter().filter(|c| !c.ends_with("on_error")).cloned().collect();
        assert_eq!(
            ordered,
            vec![
                "a:on_initialize",
                "b:on_initialize",
                "a:on_start",
                "b:on_start",
                "a:on_stop",
                "b:on_stop",
                "a:on_shutdown",
                "b:on_shutdown",
                "handler:third",
                "handler:second",
                "handler:first",
            ]
        );
    }

    #[tokio::test]
    async fn shutdown_from_initializing_skips_stop_hooks() {
        let calls = log();
        let controller = LifecycleController::new();
        controller.register_hooks("a", Recorder::new("a", &calls));
        controller.initialize().await.unwrap();
        controller.shutdown().await.unwrap();
        assert_eq!(*calls.lock(), vec!["a:on_initialize", "a:on_shutdown"]);
        assert_eq!(controller.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn signal_handlers_follow_the_cycle() {
        let source = Arc::new(ManualSignalSource::new());
        let controller = LifecycleController::with_signal_source(source.clone()).unwrap();
        let mut signals = controller.subscribe_signals();
        assert!(source.is_installed());

        assert!(source.raise(SignalKind::Terminate));
        assert_eq!(signals.recv().await.unwrap(), SignalKind::Terminate);

        controller.initialize().await.unwrap();
        controller.shutdown().await.unwrap();
        assert!(!source.is_installed());
        assert!(!controller.signals_installed());

        controller.initialize().await.unwrap();
        assert!(source.is_installed());
        assert_eq!(source.install_count(), 2);
        controller.shutdown().await.unwrap();
        assert!(!source.is_installed());
    }

    #[tokio::test]
    async fn registries_track_components() {
        let controller = LifecycleController::new();
        assert!(controller.register_component("editor"));
        assert!(!controller.register_component("editor"));
        assert!(controller.unregister_component("editor"));
        assert!(!controller.unregister_component("editor"));

        let id = controller.register_hooks("x", Recorder::new("x", &log()));
        assert_eq!(controller.hook_count(), 1);
        assert!(controller.unregister_hooks(id));
        assert!(!controller.unregister_hooks(id));
    }
}
