//! Built-in cleanup steps.
//!
//! The executors are placeholders that only log; embedders swap in real work
//! with `replace_step_executor` once the owning component exists.

use std::time::Duration;
use tracing::debug;

use crate::config::ShutdownConfig;
use crate::shutdown::step::{step_executor, ShutdownStep};

/// `(id, name, priority, required, timeout_ms)`
const DEFAULT_STEPS: [(&str, &str, i32, bool, u64); 8] = [
    ("save-state", "Save application state", 100, false, 1000),
    ("cleanup-timers", "Clear timers and intervals", 90, true, 500),
    ("cleanup-resources", "Release managed resources", 80, true, 1000),
    ("cleanup-event-handlers", "Remove event handlers", 70, true, 500),
    ("cleanup-terminal", "Restore terminal state", 60, true, 1000),
    ("cleanup-connections", "Close open connections", 50, false, 2000),
    ("cleanup-temp-files", "Remove temporary files", 40, false, 1000),
    ("final-cleanup", "Final cleanup", 30, false, 500),
];

/// Ids of the built-in steps, highest priority first.
pub fn default_step_ids() -> impl Iterator<Item = &'static str> {
    DEFAULT_STEPS.iter().map(|&(id, ..)| id)
}

/// True when `id` names a built-in step.
pub fn is_default_step(id: &str) -> bool {
    default_step_ids().any(|known| known == id)
}

/// The eight built-in steps with `config.steps` overrides applied.
/// Disabled steps are left out.
pub fn default_steps(config: &ShutdownConfig) -> Vec<ShutdownStep> {
    DEFAULT_STEPS
        .iter()
        .filter_map(|&(id, name, priority, required, timeout_ms)| {
            let mut step = ShutdownStep::new(
                id,
                name,
                priority,
                Duration::from_millis(timeout_ms),
                step_executor(move || async move {
                    debug!(step = id, "Built-in cleanup step ran");
                    Ok(())
                }),
            )
            .required(required);

            if let Some(o) = config.steps.iter().find(|o| o.id == id) {
                if !o.enabled {
                    return None;
                }
                if let Some(priority) = o.priority {
                    step.priority = priority;
                }
                if let Some(timeout_ms) = o.timeout_ms {
                    step.timeout = Duration::from_millis(timeout_ms);
                }
                if let Some(required) = o.required {
                    step.required = required;
                }
            }
            Some(step)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepOverride;

    #[test]
    fn seeds_eight_steps_in_priority_order() {
        let steps = default_steps(&ShutdownConfig::default());
        let ids: Vec<_> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, default_step_ids().collect::<Vec<_>>());
        assert_eq!(ids.len(), 8);
        assert!(is_default_step("final-cleanup"));
        assert!(!is_default_step("final"));
        assert!(steps.windows(2).all(|w| w[0].priority > w[1].priority));

        let terminal = &steps[4];
        assert_eq!(terminal.id, "cleanup-terminal");
        assert!(terminal.required);
        assert_eq!(terminal.timeout, Duration::from_millis(1000));
    }

    #[test]
    fn overrides_tune_and_disable() {
        let config = ShutdownConfig {
            steps: vec![
                StepOverride {
                    id: "save-state".into(),
                    priority: Some(10),
                    timeout_ms: Some(250),
                    required: Some(true),
                    enabled: true,
                },
                StepOverride {
                    id: "cleanup-temp-files".into(),
                    priority: None,
                    timeout_ms: None,
                    required: None,
                    enabled: false,
                },
            ],
            ..ShutdownConfig::default()
        };
        let steps = default_steps(&config);
        assert_eq!(steps.len(), 7);
        assert!(steps.iter().all(|s| s.id != "cleanup-temp-files"));

        let save = steps.iter().find(|s| s.id == "save-state").unwrap();
        assert_eq!(save.priority, 10);
        assert_eq!(save.timeout, Duration::from_millis(250));
        assert!(save.required);
    }
}
