//! HTTP server setup and the filtering pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with the pipeline handler
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener, stop on the shutdown signal
//! - Run lifecycle hooks around each eligible request
//! - Forward requests to the storage backend, streaming bodies both ways
//!
//! # Pipeline
//! ```text
//! request → proxy: strip client delegation headers
//!         → extract context ──(unparseable)──────────────────────┐
//!         → eligibility ──(not applicable)────────────────────────┤
//!         → resolve filters (+ object: merge proxy delegation)    │
//!         → PUT: on_pre_put                                       │
//!           GET: on_pre_get, delegate post-get peer filters       │
//!         → forward ◀─────────────────────────────────────────────┘
//!         → GET: merge response delegation, on_post_get
//!         → response
//! ```

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Method, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{BackendConfig, FiltersConfig, GatewayConfig, LookupFailurePolicy};
use crate::engine::{ComputedFunctionEngine, NativeFilterRegistry, ProcessEngine};
use crate::filter::context::{Eligibility, RequestContext};
use crate::filter::controller::FilterController;
use crate::filter::delegation;
use crate::filter::error::{FilterError, MetadataLookupError};
use crate::filter::handler::FilterHandler;
use crate::filter::spec::{FilterSet, LifecyclePoint, Tier};
use crate::filter::target::AppHandle;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::metadata::{FileMetadataStore, MetadataDocument, MetadataStore};
use crate::observability::metrics;

/// Errors raised while assembling the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid backend address '{0}'")]
    InvalidBackend(String),

    #[error("failed to load filter metadata: {0}")]
    Metadata(#[from] MetadataLookupError),
}

/// Storage backend the gateway forwards to.
///
/// Also handed to native filters as the application handle, so they can
/// issue their own requests to storage.
#[derive(Clone)]
pub struct StorageBackend {
    pub client: Client<HttpConnector, Body>,
    pub authority: Authority,
    object_prefix: Option<String>,
}

impl StorageBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ServerError> {
        let authority = Authority::from_str(&config.address)
            .map_err(|_| ServerError::InvalidBackend(config.address.clone()))?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Ok(Self {
            client,
            authority,
            object_prefix: config.object_prefix.clone(),
        })
    }

    /// Path an object request takes on the backend.
    ///
    /// With an object prefix the API version segment is swapped for the
    /// device and partition the object tier expects.
    fn object_path(&self, context: &RequestContext, original: &str) -> Option<String> {
        let prefix = self.object_prefix.as_deref()?;
        Some(format!(
            "{}/{}/{}/{}",
            prefix,
            context.account(),
            context.container(),
            context.object()
        ))
        .filter(|path| path != original)
    }
}

/// Load the metadata store named by the filter settings.
///
/// Without a metadata file the store is empty and only delegated filters run.
pub fn load_metadata_store(filters: &FiltersConfig) -> Result<Arc<FileMetadataStore>, ServerError> {
    let store = match &filters.metadata_path {
        Some(path) => FileMetadataStore::load(Path::new(path))?,
        None => FileMetadataStore::from_document(MetadataDocument::default()),
    };
    Ok(Arc::new(store))
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<FilterController>,
    pub store: Arc<dyn MetadataStore>,
    pub backend: Arc<StorageBackend>,
    pub policy: LookupFailurePolicy,
}

impl AppState {
    fn tier(&self) -> Tier {
        self.controller.tier()
    }

    fn app_handle(&self) -> AppHandle {
        self.backend.clone()
    }
}

/// HTTP server running the filtering pipeline for one tier.
pub struct HttpServer {
    router: Router,
    config: Arc<GatewayConfig>,
    file_store: Option<Arc<FileMetadataStore>>,
}

impl HttpServer {
    /// Build a server from configuration alone, with the built-in native
    /// filters and computed functions run as processes from `function_dir`.
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let store = load_metadata_store(&config.filters)?;
        let engine = ProcessEngine::new(&config.filters.function_dir);
        let mut server = Self::with_parts(
            config,
            store.clone(),
            NativeFilterRegistry::with_builtins(),
            Arc::new(engine),
        )?;
        server.file_store = Some(store);
        Ok(server)
    }

    /// Build a server from explicit parts.
    pub fn with_parts(
        config: GatewayConfig,
        store: Arc<dyn MetadataStore>,
        natives: NativeFilterRegistry,
        functions: Arc<dyn ComputedFunctionEngine>,
    ) -> Result<Self, ServerError> {
        let config = Arc::new(config);
        let backend = Arc::new(StorageBackend::new(&config.backend)?);
        let controller = Arc::new(FilterController::new(config.clone(), Arc::new(natives), functions));

        tracing::info!(
            tier = %controller.tier(),
            backend = %backend.authority,
            "Filter pipeline ready"
        );

        let state = AppState {
            controller,
            store,
            backend,
            policy: config.filters.lookup_failure,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            file_store: None,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(filter_handler))
            .route("/", any(filter_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tier = %self.config.filters.tier, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The file-backed store loaded by [`HttpServer::new`], for watching.
    pub fn file_store(&self) -> Option<Arc<FileMetadataStore>> {
        self.file_store.clone()
    }

    /// The router, for serving in tests or embedding.
    pub fn into_router(self) -> Router {
        self.router
    }
}

async fn filter_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let request_id = request_id(request.headers()).to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Delegation is only trusted between tiers. Clients reach the proxy.
    if state.tier() == Tier::Proxy && delegation::strip(request.headers_mut()) {
        tracing::warn!(request_id = %request_id, path = %path, "Dropped client-supplied delegation headers");
    }

    let filterable = method == Method::GET || method == Method::PUT;
    let context = match RequestContext::extract(state.tier(), method.as_str(), &path) {
        Ok(context) => {
            if let Err(status) = route_object_path(&state, &mut request, &context) {
                return finish(&method, Err(status), false);
            }
            if !filterable {
                return pass_through(&state, request, &request_id).await;
            }
            context
        }
        Err(e) => {
            tracing::debug!(request_id = %request_id, path = %path, error = %e, "Not an object request");
            return pass_through(&state, request, &request_id).await;
        }
    };

    let mut handler = FilterHandler::new(request, context, state.controller.clone(), state.app_handle());

    let eligibility = handler.check_eligibility(state.store.as_ref(), state.policy).await;
    match eligibility {
        Ok(Eligibility::Eligible) => {}
        Ok(Eligibility::NotApplicable(reason)) => {
            tracing::debug!(
                request_id = %request_id,
                object = %handler.context(),
                reason = reason.as_str(),
                "Filtering not applicable"
            );
            return pass_through(&state, handler.into_request(), &request_id).await;
        }
        Err(e) => return failure(&method, &request_id, e),
    }

    let mut filters = match resolve_filters(&state, &mut handler).await {
        Ok(filters) => filters,
        Err(e) => return failure(&method, &request_id, e),
    };

    if filters.is_empty() {
        return pass_through(&state, handler.into_request(), &request_id).await;
    }

    tracing::debug!(
        request_id = %request_id,
        object = %handler.context(),
        filters = filters.len(),
        explicit = handler.is_explicit_trigger(),
        range = handler.is_range_request(),
        "Filtering request"
    );

    if method == Method::PUT {
        if let Err(e) = handler.on_pre_put(&filters).await {
            return failure(&method, &request_id, e);
        }
        return finish(&method, forward(&state, handler.into_request(), &request_id).await, true);
    }

    if let Err(e) = handler.on_pre_get(&filters).await {
        return failure(&method, &request_id, e);
    }
    // Only the proxy tier has a peer downstream to hand post-get filters to.
    if state.tier() == Tier::Proxy {
        if let Err(e) = handler.delegate_ahead(&filters, LifecyclePoint::PostGet) {
            return failure(&method, &request_id, e);
        }
    }

    let mut response = match forward(&state, handler.take_request(), &request_id).await {
        Ok(response) => response,
        Err(status) => return finish(&method, Err(status), true),
    };

    // Behind the proxy sits the object tier; behind the object tier, storage.
    if state.tier() == Tier::Proxy {
        match delegation::take(response.headers_mut()) {
            Ok(Some(delegated)) => {
                delegation::merge(&mut filters, delegated);
            }
            Ok(None) => {}
            Err(e) => return failure(&method, &request_id, e),
        }
    } else {
        delegation::strip(response.headers_mut());
    }

    if state.tier() == Tier::Object && handler.is_large_object_response(&response) {
        return finish(&method, Ok(response), true);
    }

    match handler.on_post_get(response, &filters).await {
        Ok(response) => finish(&method, Ok(response), true),
        Err(e) => failure(&method, &request_id, e),
    }
}

/// Rewrite an object request's path for the backend when the proxy tier has
/// an object prefix configured.
fn route_object_path(state: &AppState, request: &mut Request<Body>, context: &RequestContext) -> Result<(), StatusCode> {
    if state.tier() != Tier::Proxy {
        return Ok(());
    }
    let Some(path) = state.backend.object_path(context, request.uri().path()) else {
        return Ok(());
    };
    let path_and_query = match request.uri().query() {
        Some(query) => format!("{}?{}", path, query),
        None => path,
    };

    let mut uri_parts = request.uri().clone().into_parts();
    uri_parts.path_and_query = Some(PathAndQuery::from_str(&path_and_query).map_err(|e| {
        tracing::error!(path = %path_and_query, error = %e, "Failed to build object path");
        StatusCode::BAD_GATEWAY
    })?);
    *request.uri_mut() = Uri::from_parts(uri_parts).map_err(|e| {
        tracing::error!(error = %e, "Failed to build object URI");
        StatusCode::BAD_GATEWAY
    })?;
    Ok(())
}

/// Filters configured for the object. On the object tier, plus whatever the
/// proxy tier delegated.
async fn resolve_filters(state: &AppState, handler: &mut FilterHandler) -> Result<FilterSet, FilterError> {
    let context = handler.context().clone();
    let mut filters = state.store.resolve_filters(&context).await?;
    if state.tier() != Tier::Object {
        return Ok(filters);
    }
    if let Some(delegated) = delegation::take(handler.request_mut().headers_mut())? {
        let added = delegation::merge(&mut filters, delegated);
        tracing::debug!(object = %context, added, "Merged delegated filters");
    }
    Ok(filters)
}

async fn pass_through(state: &AppState, request: Request<Body>, request_id: &str) -> Response {
    let method = request.method().clone();
    finish(&method, forward(state, request, request_id).await, false)
}

/// Send `request` to the storage backend. Bodies stream in both directions.
async fn forward(state: &AppState, request: Request<Body>, request_id: &str) -> Result<Response<Body>, StatusCode> {
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.backend.authority.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.uri = Uri::from_parts(uri_parts).map_err(|e| {
        tracing::error!(request_id = %request_id, error = %e, "Failed to build backend URI");
        StatusCode::BAD_GATEWAY
    })?;

    match state.backend.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(parts, Body::new(body)))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Backend request failed");
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

fn finish(method: &Method, result: Result<Response<Body>, StatusCode>, filtered: bool) -> Response {
    let response = match result {
        Ok(response) => response,
        Err(status) => (status, "Backend request failed").into_response(),
    };
    metrics::record_request(method.as_str(), response.status().as_u16(), filtered);
    response
}

fn failure(method: &Method, request_id: &str, err: FilterError) -> Response {
    let status = error_status(&err);
    tracing::warn!(request_id = %request_id, status = status.as_u16(), error = %err, "Filtering failed");
    metrics::record_request(method.as_str(), status.as_u16(), true);
    (status, err.to_string()).into_response()
}

fn error_status(err: &FilterError) -> StatusCode {
    match err {
        FilterError::MetadataLookup(_) => StatusCode::SERVICE_UNAVAILABLE,
        FilterError::DelegationDecoding(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let lookup = FilterError::MetadataLookup(MetadataLookupError::Unavailable("down".into()));
        assert_eq!(error_status(&lookup), StatusCode::SERVICE_UNAVAILABLE);

        let decoding = FilterError::DelegationDecoding("bad json".into());
        assert_eq!(error_status(&decoding), StatusCode::BAD_REQUEST);

        let unknown = FilterError::UnknownEntryPoint("missing".into());
        assert_eq!(error_status(&unknown), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_bad_gateway() {
        use tower::ServiceExt;

        let mut config = GatewayConfig::default();
        config.backend.address = "127.0.0.1:1".into();
        let router = HttpServer::new(config).unwrap().into_router();

        let request = Request::get("/healthcheck").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_storage_backend_rejects_bad_address() {
        let mut config = BackendConfig::default();
        assert!(StorageBackend::new(&config).is_ok());
        config.address = "not an address".into();
        assert!(matches!(
            StorageBackend::new(&config),
            Err(ServerError::InvalidBackend(_))
        ));
    }

    #[test]
    fn test_object_path_swaps_version_for_prefix() {
        let context = RequestContext::extract(Tier::Proxy, "GET", "/v1/AUTH_a/c/dir/o").unwrap();

        let backend = StorageBackend::new(&BackendConfig::default()).unwrap();
        assert_eq!(backend.object_path(&context, "/v1/AUTH_a/c/dir/o"), None);

        let config = BackendConfig {
            object_prefix: Some("/sda1/0".into()),
            ..BackendConfig::default()
        };
        let backend = StorageBackend::new(&config).unwrap();
        assert_eq!(
            backend.object_path(&context, "/v1/AUTH_a/c/dir/o").as_deref(),
            Some("/sda1/0/AUTH_a/c/dir/o")
        );
    }

    #[tokio::test]
    async fn test_http_server_new_keeps_file_store() {
        let server = HttpServer::new(GatewayConfig::default()).unwrap();
        assert!(server.file_store().is_some());

        let parts = HttpServer::with_parts(
            GatewayConfig::default(),
            load_metadata_store(&FiltersConfig::default()).unwrap(),
            NativeFilterRegistry::with_builtins(),
            Arc::new(ProcessEngine::new(std::env::temp_dir())),
        )
        .unwrap();
        assert!(parts.file_store().is_none());
    }
}
