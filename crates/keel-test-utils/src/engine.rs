//! A scriptable fake container engine.
//!
//! [`FakeEngine`] serves a small slice of the engine API with axum, over a
//! unix socket in a temp directory or over loopback TCP. The `/events` feed
//! plays back scripted [`EventSession`]s, one per connection, and records the
//! query string of every connection so reconnect behaviour can be asserted.
//! `/info` records the `Host` header it was sent.

use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::{TcpListener, UnixListener};
use tokio::task::JoinHandle;

use keel_config::EventsConfig;
use keel_core::{Client, Endpoint, Scheme};

/// What one `/events` connection gets.
#[derive(Debug, Clone)]
pub enum EventSession {
    /// 200, stream these chunks, then close the connection.
    Frames(Vec<String>),
    /// 200, stream these chunks, then keep the connection open.
    Hold(Vec<String>),
    /// Reply with this status and body.
    Status(u16, String),
    /// Reply with this status, send the body, then keep the connection open.
    StatusHold(u16, String),
}

#[derive(Default)]
struct EngineState {
    containers: Mutex<BTreeMap<String, Value>>,
    sessions: Mutex<VecDeque<EventSession>>,
    event_queries: Mutex<Vec<Option<String>>>,
    hosts: Mutex<Vec<String>>,
}

/// A running fake engine. Stops when dropped.
pub struct FakeEngine {
    endpoint: Endpoint,
    state: Arc<EngineState>,
    task: JoinHandle<()>,
    _temp_dir: Option<TempDir>,
}

impl FakeEngine {
    /// Serve on a unix socket inside a fresh temp directory.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path: PathBuf = temp_dir.path().join("engine.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind engine socket");

        let state = Arc::new(EngineState::default());
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            endpoint: Endpoint::unix(socket_path),
            state,
            task,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Serve plain HTTP on an ephemeral loopback port.
    pub async fn start_tcp() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind engine port");
        let addr: SocketAddr = listener.local_addr().expect("no local addr");

        let state = Arc::new(EngineState::default());
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            endpoint: Endpoint::network(Scheme::Http, addr.ip().to_string(), Some(addr.port())),
            state,
            task,
            _temp_dir: None,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// A client for this engine whose event stream retries after `retry_delay_ms`.
    pub fn client(&self, retry_delay_ms: u64) -> Client {
        let events = EventsConfig {
            retry_delay_ms,
            ..EventsConfig::default()
        };
        Client::new(self.endpoint(), &events).expect("failed to build client")
    }

    pub fn add_container(&self, id: &str, details: Value) {
        self.state
            .containers
            .lock()
            .unwrap()
            .insert(id.to_string(), details);
    }

    /// Queue sessions for upcoming `/events` connections. Once the script
    /// runs out, connections are held open with no events.
    pub fn script_events(&self, sessions: impl IntoIterator<Item = EventSession>) {
        self.state.sessions.lock().unwrap().extend(sessions);
    }

    /// Raw query string of every `/events` connection, in order.
    pub fn event_queries(&self) -> Vec<Option<String>> {
        self.state.event_queries.lock().unwrap().clone()
    }

    /// `Host` header of every `/info` request, in order.
    pub fn request_hosts(&self) -> Vec<String> {
        self.state.hosts.lock().unwrap().clone()
    }

    pub fn event_connections(&self) -> usize {
        self.state.event_queries.lock().unwrap().len()
    }

    /// Poll until at least `count` `/events` connections were seen.
    pub async fn wait_for_event_connections(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.event_connections() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.event_connections() >= count
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn router(state: Arc<EngineState>) -> Router {
    Router::new()
        .route("/_ping", get(handle_ping))
        .route("/info", get(handle_info))
        .route("/version", get(handle_version))
        .route("/containers/json", get(handle_containers))
        .route("/containers/{id}/json", get(handle_container_inspect))
        .route("/containers/{id}/start", post(handle_container_start))
        .route("/events", get(handle_events))
        .with_state(state)
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_ping() -> &'static str {
    "OK"
}

async fn handle_info(State(state): State<Arc<EngineState>>, headers: HeaderMap) -> Json<Value> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    state.hosts.lock().unwrap().push(host.to_string());
    let containers = state.containers.lock().unwrap().len();
    Json(json!({
        "ID": "fake-engine",
        "Name": "keel-fake",
        "Containers": containers,
    }))
}

async fn handle_version() -> Json<Value> {
    Json(json!({
        "Version": "24.0.7",
        "ApiVersion": "1.43",
        "Os": "linux",
    }))
}

async fn handle_containers(State(state): State<Arc<EngineState>>) -> Json<Value> {
    let containers = state.containers.lock().unwrap();
    Json(Value::Array(containers.values().cloned().collect()))
}

async fn handle_container_inspect(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
) -> Response {
    match state.containers.lock().unwrap().get(&id) {
        Some(details) => Json(details.clone()).into_response(),
        None => not_found(&id),
    }
}

async fn handle_container_start(
    State(state): State<Arc<EngineState>>,
    Path(id): Path<String>,
) -> Response {
    if state.containers.lock().unwrap().contains_key(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(&id)
    }
}

async fn handle_events(
    State(state): State<Arc<EngineState>>,
    RawQuery(query): RawQuery,
) -> Response {
    state.event_queries.lock().unwrap().push(query);
    let session = state.sessions.lock().unwrap().pop_front();

    match session {
        Some(EventSession::Frames(frames)) => stream_response(Body::from_stream(chunks(frames))),
        Some(EventSession::Hold(frames)) => stream_response(Body::from_stream(
            chunks(frames).chain(stream::pending()),
        )),
        Some(EventSession::Status(status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response(),
        Some(EventSession::StatusHold(status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Body::from_stream(chunks(vec![body]).chain(stream::pending())),
        )
            .into_response(),
        None => stream_response(Body::from_stream(
            stream::pending::<Result<Bytes, Infallible>>(),
        )),
    }
}

fn chunks(frames: Vec<String>) -> impl futures::Stream<Item = Result<Bytes, Infallible>> {
    stream::iter(frames.into_iter().map(|frame| Ok(Bytes::from(frame))))
}

fn stream_response(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("No such container: {id}") })),
    )
        .into_response()
}
