//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::filter::spec::Tier;

/// Root configuration for the filter gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Storage backend requests are forwarded to.
    pub backend: BackendConfig,

    /// Filter execution settings.
    pub filters: FiltersConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend address (e.g., "127.0.0.1:6000").
    pub address: String,

    /// Device and partition placed in front of object paths when the proxy
    /// tier forwards to an object tier (e.g., "/sda1/0" sends
    /// `/v1/AUTH_a/c/o` as `/sda1/0/AUTH_a/c/o`). Unset forwards paths as-is.
    pub object_prefix: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:6000".to_string(),
            object_prefix: None,
        }
    }
}

/// What to do when the account metadata lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Fail the request.
    #[default]
    Propagate,
    /// Treat filtering as disabled for the account.
    FailClosed,
}

/// Filter execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Tier this gateway instance runs as.
    pub tier: Tier,

    /// JSON file with account metadata and filter sets. Without one, no
    /// account has filtering enabled.
    pub metadata_path: Option<String>,

    /// Directory holding computed-function executables.
    pub function_dir: String,

    /// Behavior on account metadata lookup failure.
    pub lookup_failure: LookupFailurePolicy,

    /// Containers holding filter artifacts.
    pub reserved: ReservedContainers,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            tier: Tier::Proxy,
            metadata_path: None,
            function_dir: "/var/lib/filter-gateway/functions".to_string(),
            lookup_failure: LookupFailurePolicy::default(),
            reserved: ReservedContainers::default(),
        }
    }
}

/// Containers storing filter binaries, their dependencies and images.
/// Requests to them are never filtered.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReservedContainers {
    pub binaries: String,
    pub dependencies: String,
    pub images: String,
}

impl ReservedContainers {
    pub fn contains(&self, container: &str) -> bool {
        container == self.binaries || container == self.dependencies || container == self.images
    }
}

impl Default for ReservedContainers {
    fn default() -> Self {
        Self {
            binaries: "storlet".to_string(),
            dependencies: "dependency".to_string(),
            images: "docker_images".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.filters.tier, Tier::Proxy);
        assert_eq!(config.filters.lookup_failure, LookupFailurePolicy::Propagate);
        assert!(config.filters.metadata_path.is_none());
        assert_eq!(config.timeouts.request_secs, 30);
    }

    #[test]
    fn test_partial_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [filters]
            tier = "object"
            lookup_failure = "fail_closed"

            [filters.reserved]
            images = "images"
            "#,
        )
        .unwrap();
        assert_eq!(config.filters.tier, Tier::Object);
        assert_eq!(config.filters.lookup_failure, LookupFailurePolicy::FailClosed);
        assert_eq!(config.filters.reserved.images, "images");
        assert_eq!(config.filters.reserved.binaries, "storlet");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_reserved_contains() {
        let reserved = ReservedContainers::default();
        assert!(reserved.contains("storlet"));
        assert!(reserved.contains("dependency"));
        assert!(reserved.contains("docker_images"));
        assert!(!reserved.contains("photos"));
    }
}
