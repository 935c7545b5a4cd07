//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (unique dependency names and endpoint ids)
//! - Validate value ranges (budgets and thresholds > 0, parseable URLs)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::EngineConfig;
use std::collections::HashSet;
use url::Url;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate the full configuration, collecting every error.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than zero"));
    }
    if config.cache.max_bytes == 0 {
        errors.push(ValidationError::new("cache.max_bytes", "must be greater than zero"));
    }
    if config.cache.default_ttl_ms == 0 {
        errors.push(ValidationError::new("cache.default_ttl_ms", "must be greater than zero"));
    }
    if config.cache.sweep_interval_ms == 0 {
        errors.push(ValidationError::new("cache.sweep_interval_ms", "must be greater than zero"));
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be greater than zero"));
    }
    if config.breaker.success_threshold == 0 {
        errors.push(ValidationError::new("breaker.success_threshold", "must be greater than zero"));
    }
    if config.breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.reset_timeout_ms", "must be greater than zero"));
    }
    if config.breaker.half_open_max_calls == 0 {
        errors.push(ValidationError::new("breaker.half_open_max_calls", "must be greater than zero"));
    }

    if config.retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be greater than zero"));
    }
    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            "must not be smaller than base_delay_ms",
        ));
    }

    if config.timeouts.attempt_ms == 0 {
        errors.push(ValidationError::new("timeouts.attempt_ms", "must be greater than zero"));
    }
    if config.timeouts.operation_ms == 0 {
        errors.push(ValidationError::new("timeouts.operation_ms", "must be greater than zero"));
    }

    if config.health_check.interval_ms == 0 {
        errors.push(ValidationError::new("health_check.interval_ms", "must be greater than zero"));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::new("health_check.timeout_ms", "must be greater than zero"));
    }

    let mut dep_names = HashSet::new();
    for dep in &config.dependencies {
        let path = format!("dependencies.{}", dep.name);

        if dep.name.is_empty() {
            errors.push(ValidationError::new("dependencies", "dependency name must not be empty"));
        } else if !dep_names.insert(dep.name.clone()) {
            errors.push(ValidationError::new(&path, "duplicate dependency name"));
        }

        if dep.endpoints.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.endpoints", path),
                "at least one endpoint is required",
            ));
        }
        if dep.unhealthy_threshold == 0 {
            errors.push(ValidationError::new(
                format!("{}.unhealthy_threshold", path),
                "must be greater than zero",
            ));
        }
        if dep.healthy_threshold == 0 {
            errors.push(ValidationError::new(
                format!("{}.healthy_threshold", path),
                "must be greater than zero",
            ));
        }

        let mut endpoint_ids = HashSet::new();
        for endpoint in &dep.endpoints {
            let endpoint_path = format!("{}.endpoints.{}", path, endpoint.id);

            if endpoint.id.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.endpoints", path),
                    "endpoint id must not be empty",
                ));
            } else if !endpoint_ids.insert(endpoint.id.clone()) {
                errors.push(ValidationError::new(&endpoint_path, "duplicate endpoint id"));
            }

            if let Err(e) = Url::parse(&endpoint.url) {
                errors.push(ValidationError::new(
                    format!("{}.url", endpoint_path),
                    format!("invalid URL '{}': {}", endpoint.url, e),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
