//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Phases (phase.rs):
//!     stopped → initializing → running → shutting-down → stopped
//!
//! Controller (controller.rs):
//!     initialize() → on_initialize hooks
//!     start()      → on_start hooks
//!     stop()       → on_stop hooks
//!     shutdown()   → on_stop + on_shutdown hooks → handlers (LIFO) → cleanup
//!
//! Signals (signals.rs, notify.rs):
//!     SIGINT/SIGTERM/SIGQUIT/panic → SignalSource → SignalNotifier → subscribers
//! ```
//!
//! # Design Decisions
//! - Illegal transitions are rejected before any hook runs
//! - Hook failures go through a separate `on_error` path
//! - Signal handlers live exactly as long as the controller is not fully
//!   shut down

pub mod controller;
pub mod error;
pub mod hooks;
pub mod notify;
pub mod phase;
pub mod signals;

pub use controller::{LifecycleController, LifecycleState};
pub use error::LifecycleError;
pub use hooks::{shutdown_handler, HandlerId, HookId, HookKind, HookResult, LifecycleHooks, ShutdownHandler};
pub use notify::SignalNotifier;
pub use phase::Phase;
pub use signals::{ManualSignalSource, OsSignalSource, SignalHandler, SignalKind, SignalSource};
