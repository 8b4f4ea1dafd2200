//! Message bus subsystem.
//!
//! # Data Flow
//! ```text
//! publish(type, payload, opts)
//!     → message.rs (assign id + timestamp, validate)
//!     → broker.rs (bounded FIFO queue, drop-oldest on overflow)
//!     → filter.rs (type/source/target/priority/metadata predicates)
//!     → subscription.rs (active subscribers, priority order)
//!     → handler futures, one at a time
//!     → metrics.rs (counters, latency window, health score)
//! ```
//!
//! # Design Decisions
//! - Delivery order follows subscription priority, not message priority
//! - A failing handler never blocks the remaining subscribers
//! - The queue keeps filling while paused; resume drains it in FIFO order
//! - Locks are released before any handler is awaited

pub mod broker;
pub mod error;
pub mod filter;
pub mod message;
pub mod metrics;
pub mod subscription;

pub use broker::MessageBus;
pub use error::{BoxError, BusError};
pub use filter::{glob_match, matches_filter, PriorityRange, SubscriptionFilter};
pub use message::{validate_message, Message, MessageId, MessageTarget, PublishOptions};
pub use metrics::BusMetricsSnapshot;
pub use subscription::{
    handler, HandlerResult, MessageHandler, SubscribeOptions, SubscriptionId, SubscriptionInfo,
};
