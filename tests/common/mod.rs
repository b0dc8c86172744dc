//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::any,
    Router,
};
use tokio::net::TcpListener;

use filter_gateway::config::GatewayConfig;
use filter_gateway::engine::{ComputedFunctionEngine, NativeFilterRegistry};
use filter_gateway::filter::Tier;
use filter_gateway::metadata::MetadataStore;
use filter_gateway::{HttpServer, Shutdown};

/// One request as seen by the mock storage backend.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// In-memory object store: PUT stores the body under its path, GET returns it.
#[derive(Clone, Default)]
pub struct MockStorage {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockStorage {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Recorded {
        self.requests().pop().expect("storage saw no requests")
    }

    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    pub fn put_object(&self, path: &str, body: &'static str) {
        self.objects.lock().unwrap().insert(path.to_string(), Bytes::from_static(body.as_bytes()));
    }
}

async fn storage_handler(
    State(storage): State<MockStorage>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    storage.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        headers,
        body: body.clone(),
    });

    if method == Method::PUT {
        storage.objects.lock().unwrap().insert(path, body);
        (StatusCode::CREATED, Bytes::new())
    } else if method == Method::GET {
        match storage.object(&path) {
            Some(body) => (StatusCode::OK, body),
            None => (StatusCode::NOT_FOUND, Bytes::new()),
        }
    } else {
        (StatusCode::NO_CONTENT, Bytes::new())
    }
}

/// Start the mock storage backend on an ephemeral port.
pub async fn start_storage() -> (SocketAddr, MockStorage) {
    let storage = MockStorage::default();
    let app = Router::new()
        .route("/{*path}", any(storage_handler))
        .with_state(storage.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, storage)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Directory holding an executable `upper` computed function.
///
/// Written once per test binary so no gateway spawns it while another test
/// still has it open for writing.
#[cfg(unix)]
pub fn function_dir() -> &'static std::path::Path {
    use std::os::unix::fs::PermissionsExt;

    static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("upper");
        std::fs::write(&script, "#!/bin/sh\nexec tr 'a-z' 'A-Z'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        dir
    })
    .path()
}

pub fn gateway_config(tier: Tier, backend: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.filters.tier = tier;
    config.backend.address = backend.to_string();
    config.observability.metrics_enabled = false;
    config
}

/// Gateway running in the background until the returned handle is dropped.
pub struct RunningGateway {
    pub addr: SocketAddr,
    _shutdown: ShutdownOnDrop,
}

struct ShutdownOnDrop(Shutdown);

impl Drop for ShutdownOnDrop {
    fn drop(&mut self) {
        self.0.trigger();
    }
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(
    config: GatewayConfig,
    store: Arc<dyn MetadataStore>,
    natives: NativeFilterRegistry,
    functions: Arc<dyn ComputedFunctionEngine>,
) -> RunningGateway {
    let server = HttpServer::with_parts(config, store, natives, functions).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    RunningGateway {
        addr,
        _shutdown: ShutdownOnDrop(shutdown),
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
