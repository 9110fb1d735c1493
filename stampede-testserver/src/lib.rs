use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_TOKEN: &str = "/authorizationprovider/connect/token";
pub const PATH_NODES: &str = "/topologymanagement/api/v6/nodes";
pub const PATH_LIVENESS: &str = "/liveness";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STATUS: &str = "/status/{code}";

pub const DEFAULT_CLIENT_ID: &str = "stampede";
pub const DEFAULT_CLIENT_SECRET: &str = "stampede-secret";

const TOKEN_PREFIX: &str = "token-";

#[derive(Debug, Clone)]
pub struct TestServerConfig {
    /// Accepted `(client_id, client_secret)` pairs.
    pub clients: Vec<(String, String)>,
    pub token_expires_in: u64,
    /// Artificial latency of the nodes endpoint.
    pub nodes_delay: Duration,
}

impl Default for TestServerConfig {
    fn default() -> Self {
        Self {
            clients: vec![(
                DEFAULT_CLIENT_ID.to_string(),
                DEFAULT_CLIENT_SECRET.to_string(),
            )],
            token_expires_in: 3600,
            nodes_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    tokens_issued: Arc<AtomicU64>,
    tokens_rejected: Arc<AtomicU64>,
    nodes_authorized: Arc<AtomicU64>,
    nodes_unauthorized: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn tokens_issued(&self) -> u64 {
        self.tokens_issued.load(Ordering::Relaxed)
    }

    pub fn tokens_rejected(&self) -> u64 {
        self.tokens_rejected.load(Ordering::Relaxed)
    }

    pub fn nodes_authorized(&self) -> u64 {
        self.nodes_authorized.load(Ordering::Relaxed)
    }

    pub fn nodes_unauthorized(&self) -> u64 {
        self.nodes_unauthorized.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub token: String,
    pub nodes: String,
    pub liveness: String,
    pub slow: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            token: format!("{base_url}{PATH_TOKEN}"),
            nodes: format!("{base_url}{PATH_NODES}"),
            liveness: format!("{base_url}{PATH_LIVENESS}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }
}

#[derive(Clone)]
struct AppState {
    config: Arc<TestServerConfig>,
    stats: TestServerStats,
}

#[derive(Debug, Deserialize)]
struct TokenForm {
    grant_type: String,
    client_id: String,
    client_secret: String,
    #[serde(default)]
    response_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    token_type: &'static str,
}

#[derive(Debug, Serialize)]
struct Node {
    id: u64,
    name: String,
    topology: String,
}

async fn handle_token(State(state): State<AppState>, Form(form): Form<TokenForm>) -> Response {
    TestServerStats::inc(&state.stats.requests_total);

    let known = state
        .config
        .clients
        .iter()
        .any(|(id, secret)| *id == form.client_id && *secret == form.client_secret);

    if form.grant_type != "client_credentials"
        || form.response_type.as_deref().is_some_and(|t| t != "token")
    {
        TestServerStats::inc(&state.stats.tokens_rejected);
        return (StatusCode::BAD_REQUEST, "unsupported grant").into_response();
    }
    if !known {
        TestServerStats::inc(&state.stats.tokens_rejected);
        return (StatusCode::UNAUTHORIZED, "invalid client").into_response();
    }

    TestServerStats::inc(&state.stats.tokens_issued);
    Json(TokenResponse {
        access_token: format!("{TOKEN_PREFIX}{}", form.client_id),
        expires_in: state.config.token_expires_in,
        token_type: "Bearer",
    })
    .into_response()
}

fn bearer_is_valid(config: &TestServerConfig, headers: &HeaderMap) -> bool {
    let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    else {
        return false;
    };

    token
        .strip_prefix(TOKEN_PREFIX)
        .is_some_and(|id| config.clients.iter().any(|(known, _)| known == id))
}

async fn handle_nodes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    TestServerStats::inc(&state.stats.requests_total);

    if !bearer_is_valid(&state.config, &headers) {
        TestServerStats::inc(&state.stats.nodes_unauthorized);
        return StatusCode::UNAUTHORIZED.into_response();
    }
    TestServerStats::inc(&state.stats.nodes_authorized);

    if !state.config.nodes_delay.is_zero() {
        sleep(state.config.nodes_delay).await;
    }

    let topology = query
        .get("topologies")
        .cloned()
        .unwrap_or_else(|| "0".to_string());
    let nodes: Vec<Node> = (1..=3)
        .map(|id| Node {
            id,
            name: format!("node-{id}"),
            topology: topology.clone(),
        })
        .collect();

    Json(nodes).into_response()
}

async fn handle_liveness(State(state): State<AppState>) -> &'static str {
    TestServerStats::inc(&state.stats.requests_total);
    "Healthy"
}

async fn handle_slow(State(state): State<AppState>) -> &'static str {
    TestServerStats::inc(&state.stats.requests_total);
    sleep(Duration::from_millis(50)).await;
    "slow"
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> StatusCode {
    TestServerStats::inc(&state.stats.requests_total);
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

pub fn router(config: TestServerConfig, stats: TestServerStats) -> Router {
    let state = AppState {
        config: Arc::new(config),
        stats,
    };

    Router::new()
        .route(PATH_TOKEN, post(handle_token))
        .route(PATH_NODES, get(handle_nodes))
        .route(PATH_LIVENESS, get(handle_liveness))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_STATUS, get(handle_status))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerConfig::default()).await
    }

    pub async fn start_with(config: TestServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(config, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
