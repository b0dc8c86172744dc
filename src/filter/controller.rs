//! Filter execution controller.
//!
//! # Responsibilities
//! - Partition a filter set into local and delegated filters
//! - Run local filters in ascending key order, each consuming the previous output
//! - Attach the delegation signal for the peer tier
//! - Install the final stream as the request or response body
//!
//! # Design Decisions
//! - One immutable controller per process, shared through `Arc`
//! - Per-call state lives on the stack of `execute`
//! - Filters run strictly one after another; position encodes data dependencies
//! - Fail fast: an engine error aborts the chain before any delegation is written
//!   and drops the in-flight body

use std::sync::Arc;

use axum::body::Body;

use crate::config::GatewayConfig;
use crate::engine::{ComputedFunctionEngine, NativeFilterRegistry};
use crate::filter::delegation;
use crate::filter::error::FilterError;
use crate::filter::spec::{FilterKind, FilterSet, FilterSpec, OrderingKey, Tier};
use crate::filter::target::{FilterTarget, RequestMetadata};
use crate::observability::metrics;

/// What one `execute` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Keys executed locally, in execution order.
    pub executed: Vec<OrderingKey>,
    /// Keys handed to the peer tier.
    pub delegated: Vec<OrderingKey>,
}

impl ExecutionReport {
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.delegated.is_empty()
    }
}

/// Runs filter chains for the local tier.
pub struct FilterController {
    tier: Tier,
    config: Arc<GatewayConfig>,
    natives: Arc<NativeFilterRegistry>,
    functions: Arc<dyn ComputedFunctionEngine>,
}

impl FilterController {
    pub fn new(
        config: Arc<GatewayConfig>,
        natives: Arc<NativeFilterRegistry>,
        functions: Arc<dyn ComputedFunctionEngine>,
    ) -> Self {
        Self {
            tier: config.filters.tier,
            config,
            natives,
            functions,
        }
    }

    /// Tier this controller executes for.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Execute `filters` against `target`.
    ///
    /// Local filters run in ascending key order; filters owned by the other
    /// tier are written to the delegation header. The body is only replaced if
    /// at least one filter ran locally.
    pub async fn execute(
        &self,
        target: &mut FilterTarget<'_>,
        filters: &FilterSet,
        metadata: &RequestMetadata,
    ) -> Result<ExecutionReport, FilterError> {
        let mut report = ExecutionReport::default();
        let mut current: Option<Body> = None;
        let mut delegated = FilterSet::new();

        for (key, spec) in filters {
            if spec.tier != self.tier {
                delegated.insert(*key, spec.clone());
                report.delegated.push(*key);
                continue;
            }

            let input = match current.take() {
                Some(body) => body,
                None => target.take_body(),
            };

            tracing::debug!(
                tier = %self.tier,
                key = %key,
                kind = spec.kind.as_str(),
                entry_point = %spec.entry_point,
                object = %metadata.context,
                "Executing filter"
            );

            let output = match self.run_one(target, spec, input, metadata).await {
                Ok(output) => output,
                Err(e) => {
                    metrics::record_filter_failure(self.tier);
                    tracing::error!(
                        tier = %self.tier,
                        key = %key,
                        entry_point = %spec.entry_point,
                        error = %e,
                        "Filter failed, aborting chain"
                    );
                    return Err(e);
                }
            };

            metrics::record_filter_execution(self.tier, spec.kind);
            current = Some(output);
            report.executed.push(*key);
        }

        if !delegated.is_empty() {
            delegation::attach(target.headers_mut(), &delegated)?;
            metrics::record_filter_delegations(self.tier, delegated.len());
            tracing::debug!(
                tier = %self.tier,
                delegated = ?report.delegated,
                "Delegated filters to peer tier"
            );
        }

        if let Some(body) = current {
            target.replace_body(body);
        }

        Ok(report)
    }

    async fn run_one(
        &self,
        target: &mut FilterTarget<'_>,
        spec: &FilterSpec,
        input: Body,
        metadata: &RequestMetadata,
    ) -> Result<Body, FilterError> {
        let execution_error = |source| FilterError::Execution {
            entry_point: spec.entry_point.clone(),
            source,
        };

        match spec.kind {
            FilterKind::ComputedFunction => self
                .functions
                .run(target, spec, input)
                .await
                .map_err(execution_error),
            FilterKind::Native => {
                let factory = self
                    .natives
                    .get(&spec.entry_point)
                    .ok_or_else(|| FilterError::UnknownEntryPoint(spec.entry_point.clone()))?;
                let span = tracing::info_span!(
                    "native_filter",
                    entry_point = %spec.entry_point,
                    tier = %self.tier
                );
                let filter = factory
                    .create(spec, &self.config, span)
                    .map_err(execution_error)?;
                filter
                    .execute(target, input, metadata)
                    .await
                    .map_err(execution_error)
            }
        }
    }
}

impl std::fmt::Debug for FilterController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterController")
            .field("tier", &self.tier)
            .field("natives", &self.natives)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use axum::http::{Request, Response};

    use super::testing::*;
    use super::*;
    use crate::filter::delegation::{DELEGATION_HEADER, DELEGATION_VERSION_HEADER};
    use crate::filter::spec::fixtures::{filter, native};
    use crate::filter::spec::LifecyclePoint;

    async fn body_string(body: Body) -> String {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn put_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("PUT")
            .uri("/v1/acct/cont/obj")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_runs_local_filters_in_key_order() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &["first", "second", "third"]);

        let mut set = FilterSet::new();
        set.insert(OrderingKey(20), native("third", Tier::Proxy, LifecyclePoint::PrePut));
        set.insert(OrderingKey(3), native("first", Tier::Proxy, LifecyclePoint::PrePut));
        set.insert(OrderingKey(10), native("second", Tier::Proxy, LifecyclePoint::PrePut));

        let mut req = put_request("data");
        let report = controller
            .execute(&mut FilterTarget::Request(&mut req), &set, &metadata())
            .await
            .unwrap();

        assert_eq!(log.calls(), vec!["first", "second", "third"]);
        assert_eq!(report.executed, vec![OrderingKey(3), OrderingKey(10), OrderingKey(20)]);
        assert_eq!(body_string(req.into_body()).await, "data[first][second][third]");
    }

    #[tokio::test]
    async fn test_partition_is_complete_and_disjoint() {
        let log = CallLog::default();
        let controller = controller(Tier::Object, &log, &["n1", "n2"]);

        let mut set = FilterSet::new();
        set.insert(OrderingKey(1), native("n1", Tier::Object, LifecyclePoint::PostGet));
        set.insert(OrderingKey(2), native("p1", Tier::Proxy, LifecyclePoint::PostGet));
        set.insert(OrderingKey(3), filter("f1", Tier::Object, FilterKind::ComputedFunction, LifecyclePoint::PostGet));
        set.insert(OrderingKey(4), native("p2", Tier::Proxy, LifecyclePoint::PostGet));
        set.insert(OrderingKey(5), native("n2", Tier::Object, LifecyclePoint::PostGet));

        let mut resp = Response::new(Body::from("x"));
        let report = controller
            .execute(&mut FilterTarget::Response(&mut resp), &set, &metadata())
            .await
            .unwrap();

        let mut all: Vec<_> = report.executed.iter().chain(&report.delegated).copied().collect();
        all.sort();
        assert_eq!(all, set.keys().copied().collect::<Vec<_>>());
        assert!(report.executed.iter().all(|k| !report.delegated.contains(k)));

        let delegated = delegation::decode(&resp.headers()[DELEGATION_HEADER]).unwrap();
        assert_eq!(delegated.keys().copied().collect::<Vec<_>>(), vec![OrderingKey(2), OrderingKey(4)]);
        assert_eq!(log.calls(), vec!["n1", "f1", "n2"]);
    }

    #[tokio::test]
    async fn test_request_input_body_replaced() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &["n"]);
        let mut set = FilterSet::new();
        set.insert(OrderingKey(1), native("n", Tier::Proxy, LifecyclePoint::PrePut));

        let mut req = put_request("in");
        controller
            .execute(&mut FilterTarget::Request(&mut req), &set, &metadata())
            .await
            .unwrap();
        assert_eq!(body_string(req.into_body()).await, "in[n]");
    }

    #[tokio::test]
    async fn test_response_output_body_replaced() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &[]);
        let mut set = FilterSet::new();
        set.insert(OrderingKey(1), filter("fn", Tier::Proxy, FilterKind::ComputedFunction, LifecyclePoint::PostGet));

        let mut resp = Response::new(Body::from("out"));
        controller
            .execute(&mut FilterTarget::Response(&mut resp), &set, &metadata())
            .await
            .unwrap();
        assert_eq!(body_string(resp.into_body()).await, "out[fn]");
    }

    #[tokio::test]
    async fn test_only_remote_filters_leave_body_alone() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &[]);
        let mut set = FilterSet::new();
        set.insert(OrderingKey(5), native("remote", Tier::Object, LifecyclePoint::PrePut));

        let mut req = put_request("untouched");
        let report = controller
            .execute(&mut FilterTarget::Request(&mut req), &set, &metadata())
            .await
            .unwrap();

        assert!(report.executed.is_empty());
        assert!(log.calls().is_empty());
        assert_eq!(req.headers()[DELEGATION_VERSION_HEADER], "1");
        assert_eq!(body_string(req.into_body()).await, "untouched");
    }

    #[tokio::test]
    async fn test_empty_set_is_identity() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &[]);

        let mut req = put_request("same");
        let headers_before = req.headers().clone();
        let report = controller
            .execute(&mut FilterTarget::Request(&mut req), &FilterSet::new(), &metadata())
            .await
            .unwrap();

        assert!(report.is_empty());
        assert!(log.calls().is_empty());
        assert_eq!(req.headers(), &headers_before);
        assert_eq!(body_string(req.into_body()).await, "same");
    }

    #[tokio::test]
    async fn test_failure_aborts_without_delegation() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &["n"]);
        let mut set = FilterSet::new();
        set.insert(OrderingKey(1), native("remote", Tier::Object, LifecyclePoint::PrePut));
        set.insert(OrderingKey(2), filter("explode", Tier::Proxy, FilterKind::ComputedFunction, LifecyclePoint::PrePut));
        set.insert(OrderingKey(3), native("n", Tier::Proxy, LifecyclePoint::PrePut));

        let mut req = put_request("data");
        let err = controller
            .execute(&mut FilterTarget::Request(&mut req), &set, &metadata())
            .await
            .unwrap_err();

        assert!(matches!(err, FilterError::Execution { ref entry_point, .. } if entry_point == "explode"));
        assert_eq!(log.calls(), vec!["explode"]);
        assert!(req.headers().get(DELEGATION_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_unknown_native_entry_point() {
        let log = CallLog::default();
        let controller = controller(Tier::Proxy, &log, &[]);
        let mut set = FilterSet::new();
        set.insert(OrderingKey(1), native("ghost", Tier::Proxy, LifecyclePoint::PrePut));

        let mut req = put_request("data");
        let err = controller
            .execute(&mut FilterTarget::Request(&mut req), &set, &metadata())
            .await
            .unwrap_err();
        assert_eq!(err.entry_point(), Some("ghost"));
        assert!(matches!(err, FilterError::UnknownEntryPoint(_)));
    }

    #[tokio::test]
    async fn test_shared_across_concurrent_requests() {
        let log = CallLog::default();
        let controller = Arc::new(controller(Tier::Proxy, &log, &["n"]));
        let mut set = FilterSet::new();
        set.insert(OrderingKey(1), native("n", Tier::Proxy, LifecyclePoint::PrePut));
        let set = Arc::new(set);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let controller = controller.clone();
            let set = set.clone();
            tasks.push(tokio::spawn(async move {
                let mut req = Request::builder().body(Body::from(format!("r{}", i))).unwrap();
                controller
                    .execute(&mut FilterTarget::Request(&mut req), &set, &metadata())
                    .await
                    .unwrap();
                let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
                (i, String::from_utf8(bytes.to_vec()).unwrap())
            }));
        }
        for task in tasks {
            let (i, body) = task.await.unwrap();
            assert_eq!(body, format!("r{}[n]", i));
        }
        assert_eq!(log.calls().len(), 8);
    }
}
