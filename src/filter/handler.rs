//! Per-request lifecycle hooks.
//!
//! # Responsibilities
//! - Hold the request for the duration of its filtering
//! - Decide eligibility, looking up the account only on the proxy tier
//! - Narrow the full filter set to each lifecycle point and run the controller
//! - Keep PUT framing valid after the body has been transformed
//!
//! # Lifecycle
//! ```text
//! PUT: on_pre_put
//! GET: on_pre_get → (backend) → on_post_get
//! ```
//! Each hook runs at most once; anything else is a `HookOrder` error.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response};

use crate::config::LookupFailurePolicy;
use crate::filter::context::{eligibility, Eligibility, Ineligible, RequestContext};
use crate::filter::controller::{ExecutionReport, FilterController};
use crate::filter::delegation;
use crate::filter::error::FilterError;
use crate::filter::spec::{select, FilterSet, LifecyclePoint, Tier};
use crate::filter::target::{AppHandle, FilterTarget, RequestMetadata};
use crate::metadata::MetadataStore;
use crate::observability::metrics;

/// Header explicitly asking for filter execution.
pub const RUN_FILTER_HEADER: &str = "x-run-filter";
/// Response header marking a static large object manifest.
pub const STATIC_LARGE_OBJECT_HEADER: &str = "x-static-large-object";

/// Drives the filter lifecycle of one request.
pub struct FilterHandler {
    request: Request<Body>,
    context: RequestContext,
    controller: Arc<FilterController>,
    app: AppHandle,
    last_hook: Option<LifecyclePoint>,
}

impl FilterHandler {
    pub fn new(
        request: Request<Body>,
        context: RequestContext,
        controller: Arc<FilterController>,
        app: AppHandle,
    ) -> Self {
        Self {
            request,
            context,
            controller,
            app,
            last_hook: None,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn request(&self) -> &Request<Body> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Body> {
        &mut self.request
    }

    /// Release the request, with every hook applied so far, for forwarding.
    pub fn into_request(self) -> Request<Body> {
        self.request
    }

    /// Move the request out for forwarding while keeping the handler for
    /// response hooks. An empty request is left behind.
    pub fn take_request(&mut self) -> Request<Body> {
        std::mem::take(&mut self.request)
    }

    /// Hand the peer tier the filters it owns at a later `point` of this request.
    ///
    /// Merged with any delegation signal already on the request, which keeps
    /// its entries. Returns the number of filters now delegated.
    pub fn delegate_ahead(&mut self, filters: &FilterSet, point: LifecyclePoint) -> Result<usize, FilterError> {
        let tier = self.controller.tier();
        let mut ahead: FilterSet = select(filters, point)
            .into_iter()
            .filter(|(_, spec)| spec.tier != tier)
            .collect();
        if ahead.is_empty() {
            return Ok(0);
        }

        let headers = self.request.headers_mut();
        if let Some(existing) = delegation::take(headers)? {
            let mut combined = existing;
            delegation::merge(&mut combined, ahead);
            ahead = combined;
        }
        delegation::attach(headers, &ahead)?;
        Ok(ahead.len())
    }

    /// Decide whether this request takes part in filtering.
    ///
    /// On the proxy tier this costs one account lookup. A failed lookup either
    /// disables filtering or propagates, depending on `policy`.
    pub async fn check_eligibility(
        &mut self,
        store: &dyn MetadataStore,
        policy: LookupFailurePolicy,
    ) -> Result<Eligibility, FilterError> {
        let tier = self.controller.tier();
        let reserved = &self.controller.config().filters.reserved;

        if self.is_manifest_get() {
            return Ok(Eligibility::NotApplicable(Ineligible::ManifestRequest));
        }

        // Cheap checks first so reserved containers never reach the store.
        let structural = eligibility(&self.context, tier, reserved, true);
        if !structural.is_eligible() || tier == Tier::Object {
            return Ok(structural);
        }

        let enabled = match store.account_meta(self.context.account()).await {
            Ok(meta) => meta.filtering_enabled,
            Err(e) => match policy {
                LookupFailurePolicy::FailClosed => {
                    tracing::warn!(
                        account = %self.context.account(),
                        error = %e,
                        "Account lookup failed, treating filtering as disabled"
                    );
                    false
                }
                LookupFailurePolicy::Propagate => return Err(e.into()),
            },
        };

        Ok(eligibility(&self.context, tier, reserved, enabled))
    }

    /// Whether the client explicitly asked for filter execution.
    pub fn is_explicit_trigger(&self) -> bool {
        self.request.headers().contains_key(RUN_FILTER_HEADER)
    }

    /// Whether the request is a byte-range read.
    pub fn is_range_request(&self) -> bool {
        self.request.headers().contains_key(header::RANGE)
    }

    /// Whether this GET asks for the raw multi-part manifest.
    pub fn is_manifest_get(&self) -> bool {
        self.request
            .uri()
            .query()
            .map(|query| {
                query.split('&').any(|pair| {
                    let mut kv = pair.splitn(2, '=');
                    kv.next() == Some("multipart-manifest") && kv.next() == Some("get")
                })
            })
            .unwrap_or(false)
    }

    /// Whether `response` is a static large object assembled from segments.
    pub fn is_large_object_response(&self, response: &Response<Body>) -> bool {
        let is_slo = response.headers().contains_key(STATIC_LARGE_OBJECT_HEADER);
        tracing::debug!(object = %self.context, is_slo, "Checked for static large object");
        is_slo
    }

    /// Run `PreGet` filters against the held request.
    pub async fn on_pre_get(&mut self, filters: &FilterSet) -> Result<ExecutionReport, FilterError> {
        self.advance(LifecyclePoint::PreGet)?;
        let selected = select(filters, LifecyclePoint::PreGet);
        if selected.is_empty() {
            return Ok(ExecutionReport::default());
        }

        tracing::info!(object = %self.context, filters = selected.len(), "Executing filters on pre-get");
        let started = Instant::now();
        let metadata = self.metadata();
        let result = self
            .controller
            .execute(&mut FilterTarget::Request(&mut self.request), &selected, &metadata)
            .await;
        metrics::record_hook(LifecyclePoint::PreGet, started);
        result
    }

    /// Run `PostGet` filters against `response` and return it.
    ///
    /// On the object tier, proxy-owned filters are delegated back on the
    /// response. The proxy tier only runs its own.
    pub async fn on_post_get(
        &mut self,
        mut response: Response<Body>,
        filters: &FilterSet,
    ) -> Result<Response<Body>, FilterError> {
        self.advance(LifecyclePoint::PostGet)?;
        let mut selected = select(filters, LifecyclePoint::PostGet);
        if self.controller.tier() == Tier::Proxy {
            // Object-tier post-get filters travelled ahead with the request.
            selected.retain(|_, spec| spec.tier == Tier::Proxy);
        }
        if selected.is_empty() {
            return Ok(response);
        }

        tracing::info!(object = %self.context, filters = selected.len(), "Executing filters on post-get");
        let started = Instant::now();
        let metadata = self.metadata();
        let result = self
            .controller
            .execute(&mut FilterTarget::Response(&mut response), &selected, &metadata)
            .await;
        metrics::record_hook(LifecyclePoint::PostGet, started);
        let report = result?;

        // The stored length no longer describes a rewritten body.
        if !report.executed.is_empty() {
            response.headers_mut().remove(header::CONTENT_LENGTH);
        }
        Ok(response)
    }

    /// Run `PrePut` filters against the held request.
    ///
    /// Filters may change the body length, so once any ran the known content
    /// length is dropped and the request switches to chunked transfer.
    pub async fn on_pre_put(&mut self, filters: &FilterSet) -> Result<ExecutionReport, FilterError> {
        self.advance(LifecyclePoint::PrePut)?;
        let selected = select(filters, LifecyclePoint::PrePut);
        if selected.is_empty() {
            return Ok(ExecutionReport::default());
        }

        tracing::info!(object = %self.context, filters = selected.len(), "Executing filters on pre-put");
        let started = Instant::now();
        let metadata = self.metadata();
        let report = self
            .controller
            .execute(&mut FilterTarget::Request(&mut self.request), &selected, &metadata)
            .await;
        metrics::record_hook(LifecyclePoint::PrePut, started);
        let report = report?;

        let headers = self.request.headers_mut();
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        Ok(report)
    }

    fn metadata(&self) -> RequestMetadata {
        RequestMetadata::new(self.context.clone(), self.app.clone())
    }

    fn advance(&mut self, next: LifecyclePoint) -> Result<(), FilterError> {
        let allowed = matches!(
            (self.last_hook, next),
            (None, _) | (Some(LifecyclePoint::PreGet), LifecyclePoint::PostGet)
        );
        if !allowed {
            return Err(FilterError::HookOrder {
                attempted: next,
                previous: self.last_hook,
            });
        }
        self.last_hook = Some(next);
        Ok(())
    }
}
