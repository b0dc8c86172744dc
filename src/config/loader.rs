//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::spec::Tier;

    #[test]
    fn test_shipped_config_is_valid() {
        let config = parse_config(include_str!("../../config/gateway.toml")).unwrap();
        assert_eq!(config.filters.tier, Tier::Proxy);
        assert_eq!(config.filters.metadata_path.as_deref(), Some("config/filters.json"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [listener]
            bind_address = "127.0.0.1:8080"

            [backend]
            address = "127.0.0.1:6200"

            [filters]
            tier = "object"
            metadata_path = "/etc/filter-gateway/filters.json"
            function_dir = "/opt/functions"

            [timeouts]
            request_secs = 10

            [observability]
            log_level = "debug"
            metrics_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.address, "127.0.0.1:6200");
        assert_eq!(config.filters.tier, Tier::Object);
        assert_eq!(config.filters.function_dir, "/opt/functions");
        assert_eq!(config.timeouts.request_secs, 10);
    }

    #[test]
    fn test_rejects_invalid() {
        let err = parse_config("[timeouts]\nrequest_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("timeouts.request_secs"));

        let err = parse_config("[filters]\ntier = \"edge\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/gateway.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
