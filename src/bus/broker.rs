//! MessageBus - priority-ordered pub/sub broker.
//!
//! ```text
//! ┌───────────┐ publish  ┌──────────────┐  drain  ┌───────────────────────┐
//! │ Producer  │ ───────► │ bounded FIFO │ ──────► │ subscribers (prio ↓)  │
//! └───────────┘          └──────────────┘         └───────────────────────┘
//!                           │ overflow                  │ Err / panic
//!                           ▼                           ▼
//!                      drop oldest                 counted, next one runs
//! ```
//!
//! Exactly one task drains the queue at a time. A publish issued while a
//! drain is in progress (including from inside a handler) only enqueues;
//! the active drainer picks it up, so per-bus delivery order is the queue
//! order.

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

use crate::bus::error::BusError;
use crate::bus::message::{now_ms, validate_message, Message, MessageId, PublishOptions};
use crate::bus::metrics::{BusMetrics, BusMetricsSnapshot};
use crate::bus::subscription::{
    handler, HandlerResult, MessageHandler, SubscribeOptions, SubscriberRegistry, SubscriptionId,
    SubscriptionInfo,
};
use crate::config::BusConfig;
use crate::observability::metrics;

struct BusState {
    registry: SubscriberRegistry,
    queue: VecDeque<Arc<Message>>,
    history: VecDeque<Arc<Message>>,
    metrics: BusMetrics,
    paused: bool,
    draining: bool,
    closed: bool,
}

/// In-process message broker.
///
/// Share it as `Arc<MessageBus>`; every method takes `&self`.
pub struct MessageBus {
    config: BusConfig,
    state: Mutex<BusState>,
    next_id: AtomicU64,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        let metrics = BusMetrics::new(config.latency_window);
        Self {
            state: Mutex::new(BusState {
                registry: SubscriberRegistry::default(),
                queue: VecDeque::new(),
                history: VecDeque::new(),
                metrics,
                paused: false,
                draining: false,
                closed: false,
            }),
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next message id.
    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Subscribe to every message with default options.
    pub fn subscribe<F, Fut>(&self, name: impl Into<String>, f: F) -> SubscriptionId
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_handler(name, SubscribeOptions::default(), handler(f))
    }

    /// Subscribe with a filter, delivery priority or initial activity flag.
    pub fn subscribe_with<F, Fut>(
        &self,
        name: impl Into<String>,
        options: SubscribeOptions,
        f: F,
    ) -> SubscriptionId
    where
        F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_handler(name, options, handler(f))
    }

    /// Subscribe with an already type-erased handler.
    pub fn subscribe_handler(
        &self,
        name: impl Into<String>,
        options: SubscribeOptions,
        handler: MessageHandler,
    ) -> SubscriptionId {
        let name = name.into();
        let priority = options.priority;
        let id = self.state.lock().registry.insert(name.clone(), options, handler, now_ms());
        debug!(subscription = %id, name = %name, priority, "Subscriber registered");
        id
    }

    /// Remove a subscription. Returns false for an unknown id.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.state.lock().registry.remove(id);
        if removed {
            debug!(subscription = %id, "Subscriber removed");
        }
        removed
    }

    /// Remove every subscription registered under `name`.
    pub fn unsubscribe_all(&self, name: &str) -> usize {
        let removed = self.state.lock().registry.remove_by_name(name);
        if removed > 0 {
            debug!(name = %name, removed, "Subscribers removed");
        }
        removed
    }

    /// Toggle delivery to a subscription without removing it.
    pub fn set_active(&self, id: &SubscriptionId, active: bool) -> bool {
        self.state.lock().registry.set_active(id, active)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.state.lock().registry.infos()
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Build, validate, enqueue and (unless paused) deliver a message.
    pub async fn publish(
        &self,
        kind: impl Into<String>,
        payload: Value,
        options: PublishOptions,
    ) -> Result<MessageId, BusError> {
        let message = options.into_message(self.next_message_id(), kind.into(), payload);
        self.publish_message(message).await
    }

    /// Publish a caller-built message.
    pub async fn publish_message(&self, message: Message) -> Result<MessageId, BusError> {
        let id = self.enqueue(message)?;
        self.drain().await;
        Ok(id)
    }

    fn enqueue(&self, message: Message) -> Result<MessageId, BusError> {
        if let Err(e) = validate_message(&message) {
            warn!(error = %e, kind = %message.kind(), source = %message.source(), "Rejected message");
            return Err(e);
        }

        let id = message.id();
        let kind = message.kind().to_string();
        let mut state = self.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }

        state.queue.push_back(Arc::new(message));
        while state.queue.len() > self.config.max_queue_size {
            if let Some(oldest) = state.queue.pop_front() {
                state.metrics.record_dropped();
                metrics::record_message_dropped("overflow");
                warn!(
                    dropped = %oldest.id(),
                    kind = %oldest.kind(),
                    max_queue_size = self.config.max_queue_size,
                    "Queue full, dropping oldest message"
                );
            }
        }

        let depth = state.queue.len();
        state.metrics.record_published(depth);
        metrics::record_message_published(depth);
        trace!(message = %id, kind = %kind, queue_depth = depth, "Message enqueued");
        Ok(id)
    }

    /// Deliver queued messages until the queue is empty or the bus pauses.
    async fn drain(&self) {
        {
            let mut state = self.state.lock();
            if state.draining || state.paused {
                return;
            }
            state.draining = true;
        }
        let mut guard = DrainGuard::new(self);

        loop {
            let next = {
                let mut state = self.state.lock();
                let next = if state.paused { None } else { state.queue.pop_front() };
                if next.is_none() {
                    state.draining = false;
                    guard.disarm();
                }
                next
            };

            match next {
                Some(message) => self.deliver(message).await,
                None => break,
            }
        }
    }

    async fn deliver(&self, message: Arc<Message>) {
        let started = Instant::now();

        let recipients = {
            let mut state = self.state.lock();
            if message.is_expired_at(now_ms()) {
                state.metrics.record_dropped();
                metrics::record_message_dropped("expired");
                debug!(message = %message.id(), kind = %message.kind(), "Message expired before delivery");
                return;
            }
            state.registry.recipients(&message)
        };

        for (id, handler) in recipients {
            let outcome = AssertUnwindSafe(handler(Arc::clone(&message)))
                .catch_unwind()
                .await;

            let mut state = self.state.lock();
            state.registry.record_delivery(&id, now_ms());
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("handler panicked".to_string()),
            };
            if let Some(error) = failure {
                state.metrics.record_handler_error();
                let subscriber = state.registry.name_of(&id).unwrap_or("<removed>").to_string();
                drop(state);
                metrics::record_handler_error(&subscriber);
                warn!(
                    subscription = %id,
                    subscriber = %subscriber,
                    message = %message.id(),
                    kind = %message.kind(),
                    error = %error,
                    "Message handler failed"
                );
            }
        }

        let elapsed = started.elapsed();
        let mut state = self.state.lock();
        state.metrics.record_processed(elapsed);
        state.history.push_back(Arc::clone(&message));
        while state.history.len() > self.config.history_size {
            state.history.pop_front();
        }
        metrics::record_message_processed(elapsed, state.queue.len());
    }

    /// Stop delivering. Publishes keep enqueueing.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if !state.paused {
            state.paused = true;
            debug!(queue_depth = state.queue.len(), "Message bus paused");
        }
    }

    /// Resume delivery and flush the backlog in FIFO order.
    pub async fn resume(&self) {
        {
            let mut state = self.state.lock();
            if !state.paused {
                return;
            }
            state.paused = false;
            debug!(backlog = state.queue.len(), "Message bus resumed");
        }
        self.drain().await;
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Deliver anything still queued. No-op while paused.
    pub async fn flush(&self) {
        self.drain().await;
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Most recent delivered messages, oldest first, at most `limit`.
    pub fn history(&self, limit: usize) -> Vec<Arc<Message>> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    pub fn metrics(&self) -> BusMetricsSnapshot {
        let state = self.state.lock();
        state.metrics.snapshot(state.queue.len(), state.registry.len())
    }

    pub fn reset_metrics(&self) {
        self.state.lock().metrics.reset();
    }

    /// Drop all subscribers and queued messages; later publishes fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let discarded = state.queue.len();
        state.queue.clear();
        state.registry.clear();
        debug!(discarded, "Message bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Clears the `draining` flag if the drain future is dropped mid-delivery.
///
/// A normal drain releases the flag under the same lock that observed the
/// empty queue, so a concurrent publisher either sees the flag cleared or
/// its message is picked up by this drainer.
struct DrainGuard<'a> {
    bus: &'a MessageBus,
    armed: bool,
}

impl<'a> DrainGuard<'a> {
    fn new(bus: &'a MessageBus) -> Self {
        Self { bus, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.bus.state.lock().draining = false;
            debug!("Drain cancelled mid-delivery, releasing drainer slot");
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
