//! Message envelope and publish-time validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bus::error::BusError;

/// Conventional message priorities. Any `i32` is accepted.
pub mod priority {
    pub const LOW: i32 = 0;
    pub const NORMAL: i32 = 1;
    pub const HIGH: i32 = 2;
    pub const CRITICAL: i32 = 3;
}

/// Monotonic message identifier. Zero is reserved as "unset".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Addressing hint restricting delivery to matching subscribers.
///
/// Patterns are matched against a subscriber's id or name and may contain
/// `*` wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageTarget {
    One(String),
    Many(Vec<String>),
}

impl MessageTarget {
    /// All target patterns as a slice.
    pub fn patterns(&self) -> &[String] {
        match self {
            MessageTarget::One(target) => std::slice::from_ref(target),
            MessageTarget::Many(targets) => targets,
        }
    }
}

impl From<&str> for MessageTarget {
    fn from(target: &str) -> Self {
        MessageTarget::One(target.to_string())
    }
}

impl From<String> for MessageTarget {
    fn from(target: String) -> Self {
        MessageTarget::One(target)
    }
}

impl From<Vec<String>> for MessageTarget {
    fn from(targets: Vec<String>) -> Self {
        MessageTarget::Many(targets)
    }
}

/// A published message.
///
/// Messages are shared as `Arc<Message>` once enqueued, so fields are only
/// reachable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    #[serde(rename = "type")]
    kind: String,
    source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<MessageTarget>,
    priority: i32,
    timestamp: u64,
    #[serde(default, rename = "ttl", skip_serializing_if = "Option::is_none")]
    ttl_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, Value>>,
    #[serde(rename = "data")]
    payload: Value,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(
        id: MessageId,
        kind: impl Into<String>,
        source: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id,
            kind: kind.into(),
            source: source.into(),
            target: None,
            priority: priority::NORMAL,
            timestamp: now_ms(),
            ttl_ms: None,
            metadata: None,
            payload,
        }
    }

    pub fn with_target(mut self, target: impl Into<MessageTarget>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(ttl.as_millis() as u64);
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Message type, e.g. `"shutdown:started"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> Option<&MessageTarget> {
        self.target.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_ms.map(Duration::from_millis)
    }

    pub fn metadata(&self) -> Option<&BTreeMap<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// True once `timestamp + ttl` lies in the past.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms >= self.timestamp.saturating_add(ttl),
            None => false,
        }
    }
}

/// Options accepted by [`MessageBus::publish`](crate::bus::MessageBus::publish).
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub source: String,
    pub target: Option<MessageTarget>,
    pub priority: Option<i32>,
    pub ttl: Option<Duration>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl PublishOptions {
    /// Options with only the source set.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn target(mut self, target: impl Into<MessageTarget>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    /// Assemble a message from these options.
    pub(crate) fn into_message(self, id: MessageId, kind: String, payload: Value) -> Message {
        let mut message = Message::new(id, kind, self.source, payload)
            .with_priority(self.priority.unwrap_or(priority::NORMAL));
        message.target = self.target;
        message.ttl_ms = self.ttl.map(|ttl| ttl.as_millis() as u64);
        message.metadata = self.metadata;
        message
    }
}

/// Check the fields every message must carry before it may be enqueued.
pub fn validate_message(message: &Message) -> Result<(), BusError> {
    if message.id.0 == 0 {
        return Err(BusError::InvalidMessage("message id is missing".into()));
    }
    if message.kind.trim().is_empty() {
        return Err(BusError::InvalidMessage("message type is empty".into()));
    }
    if message.source.trim().is_empty() {
        return Err(BusError::InvalidMessage("message source is empty".into()));
    }
    if message.timestamp == 0 {
        return Err(BusError::InvalidMessage("timestamp must be positive".into()));
    }
    if let Some(target) = &message.target {
        let patterns = target.patterns();
        if patterns.is_empty() || patterns.iter().any(|p| p.trim().is_empty()) {
            return Err(BusError::InvalidMessage("target must not be empty".into()));
        }
    }
    Ok(())
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Message {
        Message::new(MessageId(1), "ping", "tester", json!({"n": 1}))
    }

    #[test]
    fn valid_message_passes() {
        assert!(validate_message(&sample()).is_ok());
    }

    #[test]
    fn rejects_missing_fields() {
        let no_id = Message::new(MessageId(0), "ping", "a", Value::Null);
        assert!(matches!(validate_message(&no_id), Err(BusError::InvalidMessage(_))));

        let no_type = Message::new(MessageId(2), "  ", "a", Value::Null);
        assert!(validate_message(&no_type).is_err());

        let no_source = Message::new(MessageId(3), "ping", "", Value::Null);
        assert!(validate_message(&no_source).is_err());

        let no_time = sample().with_timestamp(0);
        assert!(validate_message(&no_time).is_err());

        let empty_target = sample().with_target(Vec::<String>::new());
        assert!(validate_message(&empty_target).is_err());
    }

    #[test]
    fn ttl_expiry() {
        let msg = sample().with_timestamp(1_000).with_ttl(Duration::from_millis(500));
        assert!(!msg.is_expired_at(1_499));
        assert!(msg.is_expired_at(1_500));
        assert!(!sample().is_expired_at(u64::MAX));
    }

    #[test]
    fn serializes_wire_shape() {
        let msg = sample().with_target("screen-*");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["data"], json!({"n": 1}));
        assert_eq!(value["target"], "screen-*");
        assert!(value.get("ttl").is_none());
    }

    #[test]
    fn options_build_message() {
        let msg = PublishOptions::from_source("a")
            .priority(priority::HIGH)
            .metadata("scope", json!("ui"))
            .into_message(MessageId(9), "render".into(), Value::Null);
        assert_eq!(msg.id(), MessageId(9));
        assert_eq!(msg.priority(), priority::HIGH);
        assert_eq!(msg.metadata().unwrap()["scope"], json!("ui"));
        assert_eq!(msg.id().to_string(), "msg-9");
    }
}
