//! Graceful shutdown subsystem.
//!
//! # Data Flow
//! ```text
//! SIGINT/SIGTERM ─► SignalBridge ─► trigger(reason)
//! controller.shutdown() ─► on_shutdown hook ─► execute_graceful_shutdown
//!                                                  │
//!            steps (priority ↓) under per-step and aggregate timeouts
//!                                                  │
//!                       ShutdownReport + shutdown:* events on the bus
//! ```
//!
//! # Design Decisions
//! - One run per orchestrator; later calls get the same report
//! - Failing or hanging steps never stop the sequence
//! - Forced mode skips optional steps; the process is only killed after a
//!   second, longer grace period

pub mod bridge;
pub mod context;
pub mod defaults;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod step;

pub use bridge::SignalBridge;
pub use context::ShutdownContext;
pub use defaults::{default_step_ids, default_steps, is_default_step};
pub use error::ShutdownError;
pub use orchestrator::{KillAction, ShutdownOrchestrator};
pub use report::{ShutdownReport, StepReport, StepStatus};
pub use step::{step_executor, ShutdownStep, StepExecutor, StepResult};
