//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, backoff bounds ordered)
//! - Reject duplicate or empty backend lists
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before the orchestrator starts; invalid config is fatal at startup

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let intervals = [
        ("registry.refresh_interval_ms", config.registry.refresh_interval_ms),
        ("supervisor.tick_interval_ms", config.supervisor.tick_interval_ms),
        ("manager.connect_backoff_ms", config.manager.connect_backoff_ms),
        ("manager.tick_interval_ms", config.manager.tick_interval_ms),
        ("worker.refresh_interval_ms", config.worker.refresh_interval_ms),
        ("worker.reconnect_base_ms", config.worker.reconnect_base_ms),
        ("health.mysql_timeout_ms", config.health.mysql_timeout_ms),
        ("health.postgres_timeout_ms", config.health.postgres_timeout_ms),
        ("health.mongodb_timeout_ms", config.health.mongodb_timeout_ms),
    ];
    for (field, value) in intervals {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.worker.reconnect_max_ms < config.worker.reconnect_base_ms {
        errors.push(ValidationError::new(
            "worker.reconnect_max_ms",
            "must not be smaller than worker.reconnect_base_ms",
        ));
    }

    if config.supervisor.backends.is_empty() {
        errors.push(ValidationError::new(
            "supervisor.backends",
            "at least one backend class is required",
        ));
    }
    let mut seen = HashSet::new();
    for backend in &config.supervisor.backends {
        if !seen.insert(backend) {
            errors.push(ValidationError::new(
                "supervisor.backends",
                format!("duplicate backend class '{}'", backend),
            ));
        }
    }

    if config.store.path.trim().is_empty() {
        errors.push(ValidationError::new("store.path", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::BackendClass;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_duplicate_backends_rejected() {
        let mut config = AppConfig::default();
        config.supervisor.backends = vec![BackendClass::MySql, BackendClass::MySql];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "supervisor.backends");
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = AppConfig::default();
        config.worker.reconnect_base_ms = 1_000;
        config.worker.reconnect_max_ms = 10;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());
        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
