//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and value ranges
//! - Reject reserved container names that are empty or collide
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{:?} is not a socket address", value)));
    }
}

/// Validate `config`, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.backend.address.trim().is_empty() {
        errors.push(ValidationError::new("backend.address", "must not be empty"));
    }
    if let Some(prefix) = &config.backend.object_prefix {
        let well_formed = prefix
            .strip_prefix('/')
            .is_some_and(|rest| !rest.contains('?') && rest.split('/').all(|s| !s.is_empty()));
        if !well_formed {
            errors.push(ValidationError::new(
                "backend.object_prefix",
                "must look like /device/partition",
            ));
        }
    }
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }

    let reserved = &config.filters.reserved;
    let names = [
        ("filters.reserved.binaries", &reserved.binaries),
        ("filters.reserved.dependencies", &reserved.dependencies),
        ("filters.reserved.images", &reserved.images),
    ];
    for (i, &(field, name)) in names.iter().enumerate() {
        if name.is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        } else if names[..i].iter().any(|(_, other)| *other == name) {
            errors.push(ValidationError::new(field, format!("duplicates container {:?}", name)));
        }
    }

    if let Some(path) = &config.filters.metadata_path {
        if path.trim().is_empty() {
            errors.push(ValidationError::new("filters.metadata_path", "must not be empty when set"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
