//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the runtime.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Message bus sizing.
    pub bus: BusConfig,

    /// Lifecycle controller settings (signal handling).
    pub lifecycle: LifecycleConfig,

    /// Shutdown orchestration budgets and step tuning.
    pub shutdown: ShutdownConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Message bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BusConfig {
    /// Queue bound; the oldest message is dropped beyond it.
    pub max_queue_size: usize,

    /// Number of delivered messages kept for introspection.
    pub history_size: usize,

    /// Deliveries averaged for the latency metric.
    pub latency_window: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            history_size: 100,
            latency_window: 100,
        }
    }
}

/// Lifecycle controller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Install SIGINT/SIGTERM/SIGQUIT handlers.
    pub install_signal_handlers: bool,

    /// Treat a panic as a terminal signal.
    pub capture_panics: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            install_signal_handlers: true,
            capture_panics: true,
        }
    }
}

/// Shutdown orchestrator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Aggregate budget before forced mode, in milliseconds.
    pub timeout_ms: u64,

    /// Additional grace after forced mode before the process is killed.
    pub force_kill_timeout_ms: u64,

    /// Per-handler budget for supplementary shutdown handlers.
    pub handler_timeout_ms: u64,

    /// Keep running `required` steps after forced mode is entered.
    pub run_required_when_forced: bool,

    /// Abort a step's task when it overruns instead of detaching it.
    pub abort_timed_out_steps: bool,

    /// Seed the eight built-in cleanup steps.
    pub seed_default_steps: bool,

    /// Adjustments applied to seeded steps.
    pub steps: Vec<StepOverride>,
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn force_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.force_kill_timeout_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            force_kill_timeout_ms: 10_000,
            handler_timeout_ms: 1000,
            run_required_when_forced: true,
            abort_timed_out_steps: false,
            seed_default_steps: true,
            steps: Vec::new(),
        }
    }
}

/// Override for one seeded cleanup step, matched by id.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StepOverride {
    pub id: String,

    #[serde(default)]
    pub priority: Option<i32>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub required: Option<bool>,

    /// Set to false to drop the step entirely.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Colourise log output.
    pub log_ansi: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "tui_lifecycle=info".to_string(),
            log_ansi: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}
