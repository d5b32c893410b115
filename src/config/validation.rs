//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (users reference existing dialers)
//! - Validate value ranges and address syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
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

/// Check a parsed config.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("invalid socket address {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.cache.max_transports == 0 {
        errors.push(ValidationError::new("cache.max_transports", "must be at least 1"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }

    let mut dialer_names = HashSet::new();
    for (i, dialer) in config.dialers.iter().enumerate() {
        if dialer.name.is_empty() {
            errors.push(ValidationError::new(format!("dialers[{}].name", i), "must not be empty"));
        } else if !dialer_names.insert(dialer.name.as_str()) {
            errors.push(ValidationError::new(
                format!("dialers[{}].name", i),
                format!("duplicate dialer {:?}", dialer.name),
            ));
        }
        if let Some(local) = &dialer.local_address {
            if local.parse::<IpAddr>().is_err() {
                errors.push(ValidationError::new(
                    format!("dialers[{}].local_address", i),
                    format!("invalid IP address {:?}", local),
                ));
            }
        }
    }

    let mut usernames = HashSet::new();
    for (i, user) in config.auth.users.iter().enumerate() {
        if user.username.is_empty() {
            errors.push(ValidationError::new(format!("auth.users[{}].username", i), "must not be empty"));
        } else if !usernames.insert(user.username.as_str()) {
            errors.push(ValidationError::new(
                format!("auth.users[{}].username", i),
                format!("duplicate user {:?}", user.username),
            ));
        }
        if let Some(dialer) = &user.dialer {
            if !dialer_names.contains(dialer.as_str()) {
                errors.push(ValidationError::new(
                    format!("auth.users[{}].dialer", i),
                    format!("unknown dialer {:?}", dialer),
                ));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address {:?}", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
