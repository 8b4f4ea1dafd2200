//! Lifecycle and shutdown core for terminal UI applications.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌─────────────┐  hooks   ┌───────────────────────┐
//!   │  lifecycle  │ ───────► │ shutdown orchestrator │
//!   │ controller  │          │  steps + timeouts     │
//!   └──────┬──────┘          └──────────┬────────────┘
//!          │ signals                    │ shutdown:* events
//!          ▼                            ▼
//!   ┌─────────────┐          ┌───────────────────────┐
//!   │   signal    │ trigger  │      message bus      │
//!   │   bridge    │ ───────► │ priority pub/sub      │
//!   └─────────────┘          └───────────────────────┘
//! ```
//!
//! [`Runtime`] wires all of it from one [`AppConfig`].

// Core subsystems
pub mod bus;
pub mod lifecycle;
pub mod shutdown;

// Cross-cutting concerns
pub mod config;
pub mod observability;

pub mod runtime;

pub use bus::MessageBus;
pub use config::AppConfig;
pub use lifecycle::{LifecycleController, Phase};
pub use runtime::{Runtime, RuntimeOptions};
pub use shutdown::{ShutdownOrchestrator, ShutdownReport};
