//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGINT, SIGTERM and SIGQUIT (and optionally panics)
//! - Translate them into [`SignalKind`] values for the installed handler
//! - Remove everything again on uninstall so repeated init/shutdown cycles
//!   do not stack handlers
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Sources are injectable; tests use [`ManualSignalSource`]
//! - The source never acts on a signal itself, it only reports it

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::panic::PanicHookInfo;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::lifecycle::error::LifecycleError;

/// A terminal event reported by a [`SignalSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SignalKind {
    Interrupt,
    Terminate,
    Quit,
    Panic,
}

impl SignalKind {
    /// Shutdown reason string.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Interrupt => "SIGINT",
            SignalKind::Terminate => "SIGTERM",
            SignalKind::Quit => "SIGQUIT",
            SignalKind::Panic => "panic",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type SignalHandler = Arc<dyn Fn(SignalKind) + Send + Sync>;

/// Something that can deliver terminal signals to a handler.
pub trait SignalSource: Send + Sync {
    /// Start reporting signals to `handler`. Installing twice is a no-op.
    fn install(&self, handler: SignalHandler) -> Result<(), LifecycleError>;

    /// Stop reporting signals and release any OS registration.
    fn uninstall(&self);

    fn is_installed(&self) -> bool;
}

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Tokio-backed source for the real process signals.
pub struct OsSignalSource {
    capture_panics: bool,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Hook that was active before install; put back on uninstall.
    previous_hook: Arc<Mutex<Option<PanicHook>>>,
}

impl OsSignalSource {
    pub fn new(capture_panics: bool) -> Self {
        Self {
            capture_panics,
            task: Mutex::new(None),
            previous_hook: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(unix)]
    fn spawn_listener(
        runtime: &tokio::runtime::Handle,
        handler: SignalHandler,
    ) -> Result<JoinHandle<()>, LifecycleError> {
        use tokio::signal::unix::{signal, SignalKind as UnixSignal};

        let _enter = runtime.enter();
        let install = |kind: UnixSignal| {
            signal(kind).map_err(|e| LifecycleError::SignalInstall(e.to_string()))
        };
        let mut interrupt = install(UnixSignal::interrupt())?;
        let mut terminate = install(UnixSignal::terminate())?;
        let mut quit = install(UnixSignal::quit())?;

        Ok(runtime.spawn(async move {
            loop {
                let kind = tokio::select! {
                    Some(()) = interrupt.recv() => SignalKind::Interrupt,
                    Some(()) = terminate.recv() => SignalKind::Terminate,
                    Some(()) = quit.recv() => SignalKind::Quit,
                    else => break,
                };
                info!(signal = %kind, "Signal received");
                handler(kind);
            }
        }))
    }

    #[cfg(not(unix))]
    fn spawn_listener(
        runtime: &tokio::runtime::Handle,
        handler: SignalHandler,
    ) -> Result<JoinHandle<()>, LifecycleError> {
        Ok(runtime.spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = %SignalKind::Interrupt, "Signal received");
                handler(SignalKind::Interrupt);
            }
        }))
    }
}

impl Default for OsSignalSource {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SignalSource for OsSignalSource {
    fn install(&self, handler: SignalHandler) -> Result<(), LifecycleError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LifecycleError::SignalInstall(e.to_string()))?;

        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }
        *task = Some(Self::spawn_listener(&runtime, Arc::clone(&handler))?);

        if self.capture_panics {
            let mut slot = self.previous_hook.lock();
            if slot.is_none() {
                *slot = Some(std::panic::take_hook());
                drop(slot);
                let previous = Arc::clone(&self.previous_hook);
                std::panic::set_hook(Box::new(move |info| {
                    error!(panic = %info, "Unhandled panic, requesting shutdown");
                    handler(SignalKind::Panic);
                    if let Some(hook) = previous.lock().as_ref() {
                        hook(info);
                    }
                }));
            }
        }

        debug!(capture_panics = self.capture_panics, "Signal handlers installed");
        Ok(())
    }

    fn uninstall(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            debug!("Signal handlers removed");
        }
        let previous = self.previous_hook.lock().take();
        if let Some(hook) = previous {
            std::panic::set_hook(hook);
            debug!("Panic hook restored");
        }
    }

    fn is_installed(&self) -> bool {
        self.task.lock().is_some()
    }
}

/// In-memory source for tests and embedders that own signal handling.
#[derive(Default)]
pub struct ManualSignalSource {
    handler: Mutex<Option<SignalHandler>>,
    installs: AtomicUsize,
}

impl ManualSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `kind` to the installed handler. Returns false when nothing
    /// is installed.
    pub fn raise(&self, kind: SignalKind) -> bool {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                handler(kind);
                true
            }
            None => false,
        }
    }

    /// Number of successful installs so far.
    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

impl SignalSource for ManualSignalSource {
    fn install(&self, handler: SignalHandler) -> Result<(), LifecycleError> {
        let mut slot = self.handler.lock();
        if slot.is_none() {
            *slot = Some(handler);
            self.installs.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn uninstall(&self) {
        self.handler.lock().take();
    }

    fn is_installed(&self) -> bool {
        self.handler.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_source_delivers_only_while_installed() {
        let source = ManualSignalSource::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        assert!(!source.raise(SignalKind::Interrupt));
        source
            .install(Arc::new(move |kind| sink.lock().push(kind)))
            .unwrap();
        assert!(source.is_installed());
        assert!(source.raise(SignalKind::Terminate));

        source.uninstall();
        assert!(!source.raise(SignalKind::Quit));
        assert_eq!(*seen.lock(), vec![SignalKind::Terminate]);
        assert_eq!(source.install_count(), 1);
    }

    #[test]
    fn os_source_needs_runtime() {
        let source = OsSignalSource::new(false);
        let err = source.install(Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, LifecycleError::SignalInstall(_)));
        assert!(!source.is_installed());
    }

    #[tokio::test]
    async fn os_source_install_and_uninstall() {
        let source = OsSignalSource::new(false);
        source.install(Arc::new(|_| {})).unwrap();
        assert!(source.is_installed());
        source.install(Arc::new(|_| {})).unwrap();
        source.uninstall();
        assert!(!source.is_installed());
    }

    #[test]
    fn reason_strings() {
        assert_eq!(SignalKind::Interrupt.to_string(), "SIGINT");
        assert_eq!(SignalKind::Panic.as_str(), "panic");
    }

    #[tokio::test]
    async fn uninstall_restores_the_application_panic_hook() {
        const MARKER: &str = "panic-hook-restore-marker";
        let app_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&app_calls);
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<&str>() == Some(&MARKER) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let reported = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&reported);
        let source = OsSignalSource::new(true);
        source
            .install(Arc::new(move |kind| {
                if kind == SignalKind::Panic {
                    sink.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();

        // Installed: the source reports and still chains to the app hook.
        assert!(std::panic::catch_unwind(|| {
            std::panic::panic_any(MARKER);
        })
        .is_err());
        assert!(reported.load(Ordering::SeqCst) >= 1);
        assert_eq!(app_calls.load(Ordering::SeqCst), 1);

        source.uninstall();
        let reported_before = reported.load(Ordering::SeqCst);
        assert!(std::panic::catch_unwind(|| {
            std::panic::panic_any(MARKER);
        })
        .is_err());
        assert_eq!(app_calls.load(Ordering::SeqCst), 2);
        assert_eq!(reported.load(Ordering::SeqCst), reported_before);

        drop(std::panic::take_hook());
    }
}
