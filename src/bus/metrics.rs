//! Bus counters, latency window and health score.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Running counters owned by the bus state.
#[derive(Debug)]
pub(crate) struct BusMetrics {
    published: u64,
    processed: u64,
    dropped: u64,
    errors: u64,
    peak_queue_depth: usize,
    latencies: VecDeque<Duration>,
    latency_window: usize,
    started_at: Instant,
}

impl BusMetrics {
    pub(crate) fn new(latency_window: usize) -> Self {
        Self {
            published: 0,
            processed: 0,
            dropped: 0,
            errors: 0,
            peak_queue_depth: 0,
            latencies: VecDeque::with_capacity(latency_window),
            latency_window: latency_window.max(1),
            started_at: Instant::now(),
        }
    }

    pub(crate) fn record_published(&mut self, queue_depth: usize) {
        self.published += 1;
        self.peak_queue_depth = self.peak_queue_depth.max(queue_depth);
    }

    pub(crate) fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    pub(crate) fn record_handler_error(&mut self) {
        self.errors += 1;
    }

    pub(crate) fn record_processed(&mut self, latency: Duration) {
        self.processed += 1;
        if self.latencies.len() == self.latency_window {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
    }

    /// Reset counters; uptime keeps counting from construction.
    pub(crate) fn reset(&mut self) {
        let started_at = self.started_at;
        *self = Self::new(self.latency_window);
        self.started_at = started_at;
    }

    pub(crate) fn snapshot(&self, queue_depth: usize, subscribers: usize) -> BusMetricsSnapshot {
        let average_latency_ms = if self.latencies.is_empty() {
            0.0
        } else {
            let total: Duration = self.latencies.iter().sum();
            total.as_secs_f64() * 1000.0 / self.latencies.len() as f64
        };

        BusMetricsSnapshot {
            total_published: self.published,
            total_processed: self.processed,
            total_dropped: self.dropped,
            total_errors: self.errors,
            queue_depth,
            peak_queue_depth: self.peak_queue_depth,
            subscribers,
            average_latency_ms,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            health_score: health_score(self.errors, self.processed, self.dropped, self.published),
        }
    }
}

/// Point-in-time copy of the bus metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusMetricsSnapshot {
    pub total_published: u64,
    pub total_processed: u64,
    pub total_dropped: u64,
    pub total_errors: u64,
    pub queue_depth: usize,
    pub peak_queue_depth: usize,
    pub subscribers: usize,
    pub average_latency_ms: f64,
    pub uptime_ms: u64,
    /// 0–100, see [`health_score`].
    pub health_score: f64,
}

/// `max(0, 100 - 2 * error% - 1.5 * drop%)`, with error% relative to processed
/// messages and drop% relative to published messages.
pub fn health_score(errors: u64, processed: u64, dropped: u64, published: u64) -> f64 {
    let error_rate = percentage(errors, processed);
    let drop_rate = percentage(dropped, published);
    (100.0 - 2.0 * error_rate - 1.5 * drop_rate).max(0.0)
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
