//! In-process filters and their registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use tracing::Span;

use crate::config::GatewayConfig;
use crate::engine::builtin;
use crate::filter::error::BoxError;
use crate::filter::spec::FilterSpec;
use crate::filter::target::{FilterTarget, RequestMetadata};

/// A filter compiled into the gateway.
#[async_trait]
pub trait NativeFilter: Send + Sync {
    async fn execute(
        &self,
        target: &mut FilterTarget<'_>,
        input: Body,
        metadata: &RequestMetadata,
    ) -> Result<Body, BoxError>;
}

/// Builds a [`NativeFilter`] for one execution.
///
/// `span` is scoped to the filter and serves as its logger.
pub trait NativeFilterFactory: Send + Sync {
    fn create(
        &self,
        spec: &FilterSpec,
        config: &GatewayConfig,
        span: Span,
    ) -> Result<Box<dyn NativeFilter>, BoxError>;
}

impl<F> NativeFilterFactory for F
where
    F: Fn(&FilterSpec, &GatewayConfig, Span) -> Result<Box<dyn NativeFilter>, BoxError> + Send + Sync,
{
    fn create(
        &self,
        spec: &FilterSpec,
        config: &GatewayConfig,
        span: Span,
    ) -> Result<Box<dyn NativeFilter>, BoxError> {
        self(spec, config, span)
    }
}

/// Native filter factories keyed by entry point. Populated at startup,
/// read-only afterwards.
#[derive(Clone, Default)]
pub struct NativeFilterRegistry {
    factories: HashMap<String, Arc<dyn NativeFilterFactory>>,
}

impl NativeFilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the filters shipped with the gateway.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::PASSTHROUGH, builtin::passthrough_factory);
        registry.register(builtin::AUDIT, builtin::audit_factory);
        registry
    }

    /// Register `factory` under `entry_point`, replacing any previous one.
    pub fn register<T: NativeFilterFactory + 'static>(&mut self, entry_point: impl Into<String>, factory: T) {
        self.factories.insert(entry_point.into(), Arc::new(factory));
    }

    pub fn get(&self, entry_point: &str) -> Option<&Arc<dyn NativeFilterFactory>> {
        self.factories.get(entry_point)
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.contains_key(entry_point)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for NativeFilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entry_points: Vec<_> = self.factories.keys().collect();
        entry_points.sort();
        f.debug_struct("NativeFilterRegistry")
            .field("entry_points", &entry_points)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl NativeFilter for Nop {
        async fn execute(
            &self,
            _target: &mut FilterTarget<'_>,
            input: Body,
            _metadata: &RequestMetadata,
        ) -> Result<Body, BoxError> {
            Ok(input)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = NativeFilterRegistry::with_builtins();
        assert!(registry.contains(builtin::PASSTHROUGH));
        assert!(registry.contains(builtin::AUDIT));
        assert!(!registry.contains("missing"));
        assert_eq!(registry.len(), 2);
        assert!(format!("{:?}", registry).contains("audit"));
    }

    #[test]
    fn test_register_closure_factory() {
        let mut registry = NativeFilterRegistry::new();
        assert!(registry.is_empty());
        registry.register(
            "nop",
            |_: &FilterSpec, _: &GatewayConfig, _: Span| -> Result<Box<dyn NativeFilter>, BoxError> {
                Ok(Box::new(Nop))
            },
        );
        assert!(registry.get("nop").is_some());
    }
}
