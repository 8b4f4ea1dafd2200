//! Hook sets and shutdown handlers.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::bus::BoxError;
use crate::lifecycle::error::LifecycleError;

pub type HookResult = Result<(), BoxError>;

/// Callbacks a component registers for phase transitions.
///
/// Every method is optional. Returning `Err` fails the transition.
/// `on_error` is never called by the per-phase runner; the controller
/// invokes it separately after any transition failure.
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn on_initialize(&self) -> HookResult {
        Ok(())
    }

    async fn on_start(&self) -> HookResult {
        Ok(())
    }

    async fn on_stop(&self) -> HookResult {
        Ok(())
    }

    async fn on_shutdown(&self) -> HookResult {
        Ok(())
    }

    async fn on_error(&self, _error: &LifecycleError) {}
}

/// Phase hooks reachable through the generic runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Initialize,
    Start,
    Stop,
    Shutdown,
}

impl HookKind {
    pub(crate) async fn invoke(self, hooks: &dyn LifecycleHooks) -> HookResult {
        match self {
            HookKind::Initialize => hooks.on_initialize().await,
            HookKind::Start => hooks.on_start().await,
            HookKind::Stop => hooks.on_stop().await,
            HookKind::Shutdown => hooks.on_shutdown().await,
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::Initialize => "on_initialize",
            HookKind::Start => "on_start",
            HookKind::Stop => "on_stop",
            HookKind::Shutdown => "on_shutdown",
        })
    }
}

/// Handle returned by `register_hooks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(pub(crate) u64);

/// Handle returned by `add_shutdown_handler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

/// Unordered teardown callback, run LIFO after the ordered work.
pub type ShutdownHandler = Arc<dyn Fn() -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Wrap an async closure as a [`ShutdownHandler`].
pub fn shutdown_handler<F, Fut>(f: F) -> ShutdownHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

pub(crate) struct RegisteredHooks {
    pub(crate) id: HookId,
    pub(crate) name: String,
    pub(crate) hooks: Arc<dyn LifecycleHooks>,
}

pub(crate) struct RegisteredHandler {
    pub(crate) id: HandlerId,
    pub(crate) name: String,
    pub(crate) handler: ShutdownHandler,
}
