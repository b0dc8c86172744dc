//! Native filters shipped with the gateway.

use async_trait::async_trait;
use axum::body::Body;
use futures_util::TryStreamExt;
use tracing::Span;

use crate::config::GatewayConfig;
use crate::engine::native::NativeFilter;
use crate::filter::error::BoxError;
use crate::filter::spec::FilterSpec;
use crate::filter::target::{FilterTarget, RequestMetadata};

pub const PASSTHROUGH: &str = "passthrough";
pub const AUDIT: &str = "audit";

/// Hands the body on unchanged.
pub struct Passthrough;

#[async_trait]
impl NativeFilter for Passthrough {
    async fn execute(
        &self,
        _target: &mut FilterTarget<'_>,
        input: Body,
        _metadata: &RequestMetadata,
    ) -> Result<Body, BoxError> {
        Ok(input)
    }
}

pub fn passthrough_factory(
    _spec: &FilterSpec,
    _config: &GatewayConfig,
    _span: Span,
) -> Result<Box<dyn NativeFilter>, BoxError> {
    Ok(Box::new(Passthrough))
}

/// Counts the bytes streaming through and logs the total once the stream is
/// finished or dropped.
pub struct Audit {
    span: Span,
}

#[async_trait]
impl NativeFilter for Audit {
    async fn execute(
        &self,
        target: &mut FilterTarget<'_>,
        input: Body,
        metadata: &RequestMetadata,
    ) -> Result<Body, BoxError> {
        let mut tally = Tally {
            span: self.span.clone(),
            object: metadata.context.to_string(),
            method: metadata.context.method().to_string(),
            direction: if target.is_request() { "request" } else { "response" },
            bytes: 0,
        };
        // The closure must own the whole tally so its drop logs the total.
        let stream = input
            .into_data_stream()
            .inspect_ok(move |chunk| tally.record(chunk.len()));
        Ok(Body::from_stream(stream))
    }
}

pub fn audit_factory(
    _spec: &FilterSpec,
    _config: &GatewayConfig,
    span: Span,
) -> Result<Box<dyn NativeFilter>, BoxError> {
    Ok(Box::new(Audit { span }))
}

struct Tally {
    span: Span,
    object: String,
    method: String,
    direction: &'static str,
    bytes: u64,
}

impl Tally {
    fn record(&mut self, len: usize) {
        self.bytes += len as u64;
    }
}

impl Drop for Tally {
    fn drop(&mut self) {
        self.span.in_scope(|| {
            tracing::info!(
                object = %self.object,
                method = %self.method,
                direction = self.direction,
                bytes = self.bytes,
                "Audit"
            );
        });
    }
}
