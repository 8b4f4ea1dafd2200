//! Signal → shutdown adapter.

use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::lifecycle::SignalKind;
use crate::shutdown::orchestrator::ShutdownOrchestrator;

/// Turns terminal signals into shutdown runs.
///
/// The first signal triggers a run with the signal name as reason; any
/// signal received while a run is in flight forces it.
pub struct SignalBridge {
    task: JoinHandle<()>,
}

impl SignalBridge {
    pub fn spawn(
        orchestrator: Arc<ShutdownOrchestrator>,
        mut signals: broadcast::Receiver<SignalKind>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut triggered = false;
            loop {
                match signals.recv().await {
                    Ok(kind) => {
                        if triggered || orchestrator.is_shutting_down() {
                            if orchestrator.force() {
                                warn!(signal = %kind, "Repeated signal, forcing shutdown");
                            }
                        } else {
                            info!(signal = %kind, "Signal received, starting shutdown");
                            triggered = true;
                            orchestrator.trigger(kind.as_str());
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Signal bridge lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShutdownConfig;
    use crate::lifecycle::SignalNotifier;
    use crate::shutdown::step::{step_executor, ShutdownStep};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn first_signal_triggers_with_reason() {
        let orchestrator = Arc::new(ShutdownOrchestrator::new(ShutdownConfig::default(), None));
        let notifier = SignalNotifier::new();
        let _bridge = SignalBridge::spawn(Arc::clone(&orchestrator), notifier.subscribe());

        notifier.notify(SignalKind::Terminate);
        let report = tokio::time::timeout(Duration::from_secs(2), orchestrator.wait())
            .await
            .unwrap();
        assert_eq!(report.reason, "SIGTERM");
        assert_eq!(report.steps_completed, 8);
    }

    #[tokio::test]
    async fn second_signal_forces() {
        let orchestrator = Arc::new(ShutdownOrchestrator::new(
            ShutdownConfig {
                seed_default_steps: false,
                ..ShutdownConfig::default()
            },
            None,
        ));
        let gate = Arc::new(Notify::new());
        let entered = Arc::clone(&gate);
        orchestrator
            .add_cleanup_step(ShutdownStep::new(
                "slow",
                "slow",
                2,
                Duration::from_millis(1000),
                step_executor(move || {
                    let entered = Arc::clone(&entered);
                    async move {
                        entered.notify_one();
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(())
                    }
                }),
            ))
            .unwrap();
        orchestrator
            .add_cleanup_step(ShutdownStep::new(
                "later",
                "later",
                1,
                Duration::from_millis(100),
                step_executor(|| async { Ok(()) }),
            ))
            .unwrap();

        let notifier = SignalNotifier::new();
        let bridge = SignalBridge::spawn(Arc::clone(&orchestrator), notifier.subscribe());
        notifier.notify(SignalKind::Interrupt);
        gate.notified().await;
        notifier.notify(SignalKind::Interrupt);

        let report = orchestrator.wait().await;
        assert_eq!(report.reason, "SIGINT");
        assert!(report.force_shutdown);
        assert_eq!(report.steps_skipped, 1);

        bridge.stop();
    }
}
