//! Subscription filters and glob matching.
//!
//! # Matching Rules
//! - Every present field must match (AND across fields)
//! - List fields match when any entry matches (OR within a field)
//! - An empty list matches nothing
//! - `types`, `sources` and `targets` accept `*` wildcards

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::bus::message::Message;

/// Inclusive priority bounds. A missing bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl PriorityRange {
    pub fn contains(&self, priority: i32) -> bool {
        self.min.map_or(true, |min| priority >= min) && self.max.map_or(true, |max| priority <= max)
    }
}

/// Predicate narrowing which messages a subscription receives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionFilter {
    pub types: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub targets: Option<Vec<String>>,
    pub priority: Option<PriorityRange>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single message type (pattern).
    pub fn for_type(kind: impl Into<String>) -> Self {
        Self::new().with_type(kind)
    }

    pub fn with_type(mut self, kind: impl Into<String>) -> Self {
        self.types.get_or_insert_with(Vec::new).push(kind.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.get_or_insert_with(Vec::new).push(source.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.get_or_insert_with(Vec::new).push(target.into());
        self
    }

    pub fn with_priority_range(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        self.priority = Some(PriorityRange { min, max });
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Evaluate `filter` against `message`.
pub fn matches_filter(message: &Message, filter: &SubscriptionFilter) -> bool {
    if let Some(types) = &filter.types {
        if !types.iter().any(|p| glob_match(p, message.kind())) {
            return false;
        }
    }

    if let Some(sources) = &filter.sources {
        if !sources.iter().any(|p| glob_match(p, message.source())) {
            return false;
        }
    }

    if let Some(targets) = &filter.targets {
        let Some(target) = message.target() else {
            return false;
        };
        let hit = targets
            .iter()
            .any(|p| target.patterns().iter().any(|t| glob_match(p, t)));
        if !hit {
            return false;
        }
    }

    if let Some(range) = &filter.priority {
        if !range.contains(message.priority()) {
            return false;
        }
    }

    if let Some(expected) = &filter.metadata {
        let Some(actual) = message.metadata() else {
            return false;
        };
        if !expected.iter().all(|(k, v)| actual.get(k) == Some(v)) {
            return false;
        }
    }

    true
}

/// Match `value` against a pattern where `*` stands for any run of characters.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == value;
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();

    let (mut p, mut v) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while v < value.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = v;
            p += 1;
        } else if p < pattern.len() && pattern[p] == value[v] {
            p += 1;
            v += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            v = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
