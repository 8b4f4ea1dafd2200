//! Shared utilities for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tui_lifecycle::bus::{MessageBus, SubscribeOptions};
use tui_lifecycle::config::AppConfig;
use tui_lifecycle::lifecycle::{ManualSignalSource, Phase};
use tui_lifecycle::{Runtime, RuntimeOptions};

/// Runtime with a manual signal source and a counting kill action.
pub struct TestRuntime {
    pub runtime: Arc<Runtime>,
    pub signals: Arc<ManualSignalSource>,
    pub kills: Arc<AtomicUsize>,
}

impl TestRuntime {
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

pub fn test_runtime(config: AppConfig) -> TestRuntime {
    let signals = Arc::new(ManualSignalSource::new());
    let kills = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&kills);
    let runtime = Runtime::with_options(
        config,
        RuntimeOptions {
            signals: Some(signals.clone()),
            kill: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        },
    )
    .unwrap();
    TestRuntime {
        runtime: Arc::new(runtime),
        signals,
        kills,
    }
}

/// Record the type of every message the bus delivers.
pub fn record_topics(bus: &MessageBus) -> Arc<Mutex<Vec<String>>> {
    let topics = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&topics);
    bus.subscribe_with("topic-recorder", SubscribeOptions::default(), move |msg| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(msg.kind().to_string());
            Ok(())
        }
    });
    topics
}

/// Poll until the controller reaches `phase`, failing after two seconds.
pub async fn wait_for_phase(runtime: &Runtime, phase: Phase) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while runtime.controller().phase() != phase {
        assert!(
            tokio::time::Instant::now() < deadline,
            "controller never reached {}",
            phase
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
