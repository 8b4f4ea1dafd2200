//! Subscriber registry.
//!
//! # Responsibilities
//! - Hold subscriptions sorted by priority (desc), then insertion order
//! - Resolve the delivery set for a message (active + filter + target)
//! - Track per-subscription delivery statistics

use futures_util::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::bus::error::BoxError;
use crate::bus::filter::{glob_match, matches_filter, SubscriptionFilter};
use crate::bus::message::Message;

/// Result returned by message handlers.
pub type HandlerResult = Result<(), BoxError>;

/// Type-erased async message handler.
pub type MessageHandler = Arc<dyn Fn(Arc<Message>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

/// Unique subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Options accepted by `subscribe_with`.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub filter: Option<SubscriptionFilter>,
    /// Delivery order key; higher runs first.
    pub priority: i32,
    pub active: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            filter: None,
            priority: 0,
            active: true,
        }
    }
}

impl SubscribeOptions {
    pub fn filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

pub(crate) struct Subscription {
    id: SubscriptionId,
    name: String,
    filter: Option<SubscriptionFilter>,
    priority: i32,
    handler: MessageHandler,
    active: bool,
    subscribed_at: u64,
    messages_received: u64,
    last_message_at: Option<u64>,
    seq: u64,
}

impl Subscription {
    fn accepts(&self, message: &Message) -> bool {
        if !self.active {
            return false;
        }
        if let Some(filter) = &self.filter {
            if !matches_filter(message, filter) {
                return false;
            }
        }
        self.is_addressed_by(message)
    }

    /// True when the message carries no target or a target pattern names
    /// this subscription's id or name.
    fn is_addressed_by(&self, message: &Message) -> bool {
        let Some(target) = message.target() else {
            return true;
        };
        let id = self.id.to_string();
        target
            .patterns()
            .iter()
            .any(|pattern| glob_match(pattern, &self.name) || glob_match(pattern, &id))
    }

    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            name: self.name.clone(),
            filter: self.filter.clone(),
            priority: self.priority,
            active: self.active,
            subscribed_at: self.subscribed_at,
            messages_received: self.messages_received,
            last_message_at: self.last_message_at,
        }
    }
}

/// Read-only view of a subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub name: String,
    pub filter: Option<SubscriptionFilter>,
    pub priority: i32,
    pub active: bool,
    pub subscribed_at: u64,
    pub messages_received: u64,
    pub last_message_at: Option<u64>,
}

#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    subscriptions: Vec<Subscription>,
    next_seq: u64,
}

impl SubscriberRegistry {
    pub(crate) fn insert(
        &mut self,
        name: String,
        options: SubscribeOptions,
        handler: MessageHandler,
        now_ms: u64,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.subscriptions.push(Subscription {
            id,
            name,
            filter: options.filter,
            priority: options.priority,
            handler,
            active: options.active,
            subscribed_at: now_ms,
            messages_received: 0,
            last_message_at: None,
            seq,
        });
        self.subscriptions
            .sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        id
    }

    pub(crate) fn remove(&mut self, id: &SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != *id);
        before != self.subscriptions.len()
    }

    pub(crate) fn remove_by_name(&mut self, name: &str) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.name != name);
        before - self.subscriptions.len()
    }

    pub(crate) fn set_active(&mut self, id: &SubscriptionId, active: bool) -> bool {
        match self.subscriptions.iter_mut().find(|s| s.id == *id) {
            Some(sub) => {
                sub.active = active;
                true
            }
            None => false,
        }
    }

    /// Subscribers that should receive `message`, in delivery order.
    pub(crate) fn recipients(&self, message: &Message) -> Vec<(SubscriptionId, MessageHandler)> {
        self.subscriptions
            .iter()
            .filter(|s| s.accepts(message))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect()
    }

    pub(crate) fn record_delivery(&mut self, id: &SubscriptionId, now_ms: u64) {
        if let Some(sub) = self.subscriptions.iter_mut().find(|s| s.id == *id) {
            sub.messages_received += 1;
            sub.last_message_at = Some(now_ms);
        }
    }

    pub(crate) fn name_of(&self, id: &SubscriptionId) -> Option<&str> {
        self.subscriptions
            .iter()
            .find(|s| s.id == *id)
            .map(|s| s.name.as_str())
    }

    pub(crate) fn infos(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions.iter().map(Subscription::info).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::message::MessageId;
    use serde_json::Value;

    fn noop() -> MessageHandler {
        handler(|_| async { Ok(()) })
    }

    fn msg(kind: &str) -> Message {
        Message::new(MessageId(1), kind, "test", Value::Null)
    }

    fn names(registry: &SubscriberRegistry, message: &Message) -> Vec<String> {
        registry
            .recipients(message)
            .into_iter()
            .map(|(id, _)| registry.name_of(&id).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn orders_by_priority_then_insertion() {
        let mut registry = SubscriberRegistry::default();
        registry.insert("low".into(), SubscribeOptions::default(), noop(), 1);
        registry.insert("high".into(), SubscribeOptions::default().priority(10), noop(), 1);
        registry.insert("low-2".into(), SubscribeOptions::default(), noop(), 1);
        registry.insert("mid".into(), SubscribeOptions::default().priority(5), noop(), 1);

        assert_eq!(names(&registry, &msg("x")), vec!["high", "mid", "low", "low-2"]);
    }

    #[test]
    fn inactive_and_filtered_are_skipped() {
        let mut registry = SubscriberRegistry::default();
        let a = registry.insert("a".into(), SubscribeOptions::default(), noop(), 1);
        registry.insert(
            "b".into(),
            SubscribeOptions::default().filter(SubscriptionFilter::for_type("other")),
            noop(),
            1,
        );
        registry.insert("c".into(), SubscribeOptions::default().inactive(), noop(), 1);

        assert_eq!(names(&registry, &msg("x")), vec!["a"]);
        assert!(registry.set_active(&a, false));
        assert!(names(&registry, &msg("x")).is_empty());
        assert!(!registry.set_active(&SubscriptionId::new(), true));
    }

    #[test]
    fn target_matches_name_or_id() {
        let mut registry = SubscriberRegistry::default();
        let editor = registry.insert("editor-main".into(), SubscribeOptions::default(), noop(), 1);
        registry.insert("status-bar".into(), SubscribeOptions::default(), noop(), 1);

        assert_eq!(names(&registry, &msg("x").with_target("editor-*")), vec!["editor-main"]);
        assert_eq!(
            names(&registry, &msg("x").with_target(editor.to_string())),
            vec!["editor-main"]
        );
        assert_eq!(names(&registry, &msg("x").with_target("*")).len(), 2);
        assert!(names(&registry, &msg("x").with_target("nobody")).is_empty());
    }

    #[test]
    fn removal() {
        let mut registry = SubscriberRegistry::default();
        let id = registry.insert("a".into(), SubscribeOptions::default(), noop(), 1);
        registry.insert("b".into(), SubscribeOptions::default(), noop(), 1);
        registry.insert("b".into(), SubscribeOptions::default(), noop(), 1);

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert_eq!(registry.remove_by_name("b"), 2);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn delivery_stats() {
        let mut registry = SubscriberRegistry::default();
        let id = registry.insert("a".into(), SubscribeOptions::default(), noop(), 1);
        registry.record_delivery(&id, 42);
        let info = &registry.infos()[0];
        assert_eq!(info.messages_received, 1);
        assert_eq!(info.last_message_at, Some(42));
    }
}
