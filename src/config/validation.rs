//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes and timeouts > 0)
//! - Check that step overrides name a built-in step
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;
use crate::shutdown::defaults::is_default_step;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `shutdown.timeout_ms`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bus.max_queue_size == 0 {
        errors.push(ValidationError::new("bus.max_queue_size", "must be greater than zero"));
    }
    if config.bus.latency_window == 0 {
        errors.push(ValidationError::new("bus.latency_window", "must be greater than zero"));
    }

    let shutdown = &config.shutdown;
    if shutdown.timeout_ms == 0 {
        errors.push(ValidationError::new("shutdown.timeout_ms", "must be greater than zero"));
    }
    if shutdown.force_kill_timeout_ms < shutdown.timeout_ms {
        errors.push(ValidationError::new(
            "shutdown.force_kill_timeout_ms",
            "must not be shorter than shutdown.timeout_ms",
        ));
    }
    if shutdown.handler_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "shutdown.handler_timeout_ms",
            "must be greater than zero",
        ));
    }

    for (i, step) in shutdown.steps.iter().enumerate() {
        if !is_default_step(&step.id) {
            errors.push(ValidationError::new(
                format!("shutdown.steps[{}].id", i),
                format!("unknown step '{}'", step.id),
            ));
        }
        if step.timeout_ms == Some(0) {
            errors.push(ValidationError::new(
                format!("shutdown.steps[{}].timeout_ms", i),
                "must be greater than zero",
            ));
        }
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
