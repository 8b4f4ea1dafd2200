//! Runtime wiring.
//!
//! # Responsibilities
//! - Create the bus, controller and orchestrator from one `AppConfig`
//! - Register the orchestrator as a controller hook set
//! - Bridge OS signals into shutdown runs
//! - Drive initialize → start → wait → shutdown
//!
//! # Design Decisions
//! - The orchestrator is reached through the controller's `on_shutdown`, so
//!   a signal-triggered run and `shutdown()` resolve to the same report
//! - The bus is closed last so `shutdown:completed` still reaches subscribers

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{error, info};

use crate::bus::MessageBus;
use crate::config::AppConfig;
use crate::lifecycle::{LifecycleController, LifecycleError, OsSignalSource, SignalSource};
use crate::shutdown::{KillAction, ShutdownOrchestrator, ShutdownReport, SignalBridge};

/// Injectable pieces, mainly for tests.
#[derive(Default)]
pub struct RuntimeOptions {
    /// `None` disables signal handling entirely.
    pub signals: Option<Arc<dyn SignalSource>>,
    /// Replaces the default `process::exit(1)` after the force-kill grace.
    pub kill: Option<KillAction>,
}

pub struct Runtime {
    config: AppConfig,
    bus: Arc<MessageBus>,
    controller: Arc<LifecycleController>,
    orchestrator: Arc<ShutdownOrchestrator>,
    bridge: Mutex<Option<SignalBridge>>,
}

impl Runtime {
    /// Build a runtime using the OS signal source when the config enables it.
    ///
    /// Must be called from within a tokio runtime when signals are enabled.
    pub fn new(config: AppConfig) -> Result<Self, LifecycleError> {
        let signals: Option<Arc<dyn SignalSource>> = if config.lifecycle.install_signal_handlers {
            Some(Arc::new(OsSignalSource::new(config.lifecycle.capture_panics)))
        } else {
            None
        };
        Self::with_options(
            config,
            RuntimeOptions {
                signals,
                kill: None,
            },
        )
    }

    pub fn with_options(config: AppConfig, options: RuntimeOptions) -> Result<Self, LifecycleError> {
        let bus = Arc::new(MessageBus::new(config.bus.clone()));

        let controller = match options.signals {
            Some(source) => LifecycleController::with_signal_source(source)?,
            None => LifecycleController::new(),
        };
        let controller = Arc::new(controller);

        let mut orchestrator = ShutdownOrchestrator::new(config.shutdown.clone(), Some(Arc::clone(&bus)));
        if let Some(kill) = options.kill {
            orchestrator = orchestrator.with_kill_action(kill);
        }
        let orchestrator = Arc::new(orchestrator);
        controller.register_hooks("shutdown-orchestrator", orchestrator.lifecycle_hooks());

        Ok(Self {
            config,
            bus,
            controller,
            orchestrator,
            bridge: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    pub fn orchestrator(&self) -> &Arc<ShutdownOrchestrator> {
        &self.orchestrator
    }

    /// Spawn the signal bridge, then initialize and start the controller.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        {
            let mut bridge = self.bridge.lock();
            if bridge.is_none() {
                *bridge = Some(SignalBridge::spawn(
                    Arc::clone(&self.orchestrator),
                    self.controller.subscribe_signals(),
                ));
            }
        }
        self.controller.initialize().await?;
        self.controller.start().await?;
        info!(
            steps = self.orchestrator.step_ids().len(),
            subscribers = self.bus.subscriber_count(),
            "Runtime started"
        );
        Ok(())
    }

    /// Request a shutdown run without waiting for it.
    pub fn trigger(&self, reason: impl Into<String>) {
        self.orchestrator.trigger(reason);
    }

    /// Start, block until a shutdown run begins, then tear down.
    pub async fn run_until_shutdown(&self) -> Result<ShutdownReport, LifecycleError> {
        if let Err(e) = self.start().await {
            error!(error = %e, "Runtime failed to start");
            self.shutdown().await?;
            return Err(e);
        }
        let report = self.orchestrator.wait().await;
        info!(reason = %report.reason, "Shutdown run finished, tearing down");
        self.shutdown().await
    }

    /// Shut the controller down and return the orchestrator's report.
    ///
    /// The report is produced even when a hook failed; the failure is
    /// returned instead and the report stays available via `last_report()`.
    pub async fn shutdown(&self) -> Result<ShutdownReport, LifecycleError> {
        let lifecycle = self.controller.shutdown().await;
        let report = self.orchestrator.execute_graceful_shutdown("shutdown").await;

        if let Some(bridge) = self.bridge.lock().take() {
            bridge.stop();
        }
        self.bus.close();

        lifecycle.map(|()| report)
    }
}
