//! Signal fan-out for the runtime.

use tokio::sync::broadcast;

use crate::lifecycle::signals::SignalKind;

/// Broadcasts received signals to every interested task.
///
/// The installed signal handler only calls [`notify`](Self::notify); the
/// shutdown bridge and any long-running task subscribe.
#[derive(Clone)]
pub struct SignalNotifier {
    /// Broadcast channel sender.
    tx: broadcast::Sender<SignalKind>,
}

impl SignalNotifier {
    /// Create a new notifier.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Subscribe to received signals.
    pub fn subscribe(&self) -> broadcast::Receiver<SignalKind> {
        self.tx.subscribe()
    }

    /// Forward a signal. Returns the number of receivers reached.
    pub fn notify(&self, kind: SignalKind) -> usize {
        self.tx.send(kind).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SignalNotifier {
    fn default() -> Self {
        Self::new()
    }
}
