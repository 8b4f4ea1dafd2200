//! End-to-end lifecycle tests through the public runtime API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{record_topics, test_runtime, wait_for_phase};
use tui_lifecycle::config::{parse_config, AppConfig};
use tui_lifecycle::lifecycle::{LifecycleError, Phase, SignalKind, SignalSource};
use tui_lifecycle::shutdown::{step_executor, ShutdownStep, StepStatus};

#[tokio::test]
async fn signal_drives_full_shutdown() {
    let t = test_runtime(AppConfig::default());
    let topics = record_topics(t.runtime.bus());

    let runtime = Arc::clone(&t.runtime);
    let run = tokio::spawn(async move { runtime.run_until_shutdown().await });

    wait_for_phase(&t.runtime, Phase::Running).await;
    assert!(t.signals.raise(SignalKind::Terminate));

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("runtime did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(report.reason, "SIGTERM");
    assert_eq!(report.steps_completed, 8);
    assert_eq!(report.steps_failed, 0);
    assert!(!report.force_shutdown);

    assert_eq!(t.runtime.controller().phase(), Phase::Stopped);
    assert!(!t.signals.is_installed());
    assert!(t.runtime.bus().is_closed());
    assert_eq!(t.kill_count(), 0);

    let topics = topics.lock().clone();
    assert_eq!(topics.first().map(String::as_str), Some("shutdown:started"));
    assert_eq!(topics.last().map(String::as_str), Some("shutdown:completed"));
    assert_eq!(
        topics.iter().filter(|t| *t == "shutdown:step-completed").count(),
        8
    );
}

#[tokio::test]
async fn controller_rejects_start_after_full_cycle() {
    let t = test_runtime(AppConfig::default());
    let controller = t.runtime.controller();

    controller.initialize().await.unwrap();
    controller.start().await.unwrap();
    controller.stop().await.unwrap();
    controller.shutdown().await.unwrap();

    let err = controller.start().await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::PhaseTransition {
            from: Phase::Stopped,
            to: Phase::Running
        }
    ));
    assert_eq!(controller.phase(), Phase::Stopped);
}

#[tokio::test]
async fn explicit_shutdown_returns_the_run_report() {
    let t = test_runtime(AppConfig::default());
    t.runtime.start().await.unwrap();

    let first = t.runtime.shutdown().await.unwrap();
    assert_eq!(first.reason, "lifecycle");
    assert_eq!(first.steps_completed, 8);

    // A late signal or repeated call sees the same run.
    let second = t.runtime.shutdown().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(t.runtime.orchestrator().last_report(), Some(first));
}

#[tokio::test]
async fn configured_overrides_shape_the_run() {
    let config = parse_config(
        r#"
        [shutdown]
        timeout_ms = 2000
        force_kill_timeout_ms = 2000

        [[shutdown.steps]]
        id = "cleanup-temp-files"
        enabled = false

        [[shutdown.steps]]
        id = "final-cleanup"
        priority = 200
        "#,
    )
    .unwrap();
    let t = test_runtime(config);
    t.runtime.start().await.unwrap();

    let ids = t.runtime.orchestrator().step_ids();
    assert_eq!(ids.len(), 7);
    assert_eq!(ids[0], "final-cleanup");

    let report = t.runtime.shutdown().await.unwrap();
    assert_eq!(report.steps[0].id, "final-cleanup");
    assert!(report.step("cleanup-temp-files").is_none());
}

#[tokio::test]
async fn hung_cleanup_escalates_and_kills() {
    let config = parse_config(
        r#"
        [shutdown]
        timeout_ms = 40
        force_kill_timeout_ms = 40
        seed_default_steps = false
        "#,
    )
    .unwrap();
    let t = test_runtime(config);
    let topics = record_topics(t.runtime.bus());
    let orchestrator = t.runtime.orchestrator();

    orchestrator
        .add_cleanup_step(
            ShutdownStep::new(
                "flush-journal",
                "Flush journal",
                10,
                Duration::from_millis(300),
                step_executor(|| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }),
            )
            .required(true),
        )
        .unwrap();
    orchestrator
        .add_cleanup_step(ShutdownStep::new(
            "remove-cache",
            "Remove cache",
            5,
            Duration::from_millis(100),
            step_executor(|| async { Ok(()) }),
        ))
        .unwrap();

    t.runtime.start().await.unwrap();
    t.runtime.trigger("test");
    let report = t.runtime.orchestrator().wait().await;

    assert!(report.timeout_reached);
    assert!(report.force_shutdown);
    assert_eq!(
        report.step("flush-journal").map(|s| s.status),
        Some(StepStatus::TimedOut)
    );
    assert_eq!(
        report.step("remove-cache").map(|s| s.status),
        Some(StepStatus::Skipped)
    );
    assert_eq!(t.kill_count(), 1);

    t.runtime.shutdown().await.unwrap();
    let topics = topics.lock().clone();
    assert!(topics.iter().any(|t| t == "shutdown:timeout"));
    assert_eq!(topics.last().map(String::as_str), Some("shutdown:error"));
}
