//! Transport resolver: one logical request against either transport.
//!
//! The engine is reached over a unix domain socket (hyper HTTP/1.1 over
//! `tokio::net::UnixStream`, one connection per request) or over TCP
//! (`reqwest`, optionally with client TLS). Callers never see which.
//!
//! ```text
//!   RequestSpec ──▶ build_target ──▶ Target ──┬─▶ Unix  (hyper)
//!                                              └─▶ Network (reqwest + TLS)
//!                                                        │
//!                        ResponseOutcome ◀── classify ◀──┘
//! ```
//!
//! The transport never retries. Reconnection is the event stream's job.

pub mod outcome;
pub mod target;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HOST, USER_AGENT};
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::UnixStream;
use tracing::debug;
use zeroize::Zeroize;

use crate::build_info;
use crate::endpoint::Endpoint;
use crate::error::ClientError;
use crate::query::Query;

pub use outcome::{ResponseOutcome, classify};
pub use target::{Target, build_target};

/// `Host` header sent on unix-socket requests, whose URL authority is not a
/// conventional host name.
pub const UNIX_HOST_HEADER: &str = "localhost";

/// Most bytes of a rejected streaming response kept for the error report.
pub const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// How long to wait for a rejected streaming response's body.
pub const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// One logical API call.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Option<Query>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A streaming response: status plus a stream of raw body chunks.
pub struct StreamResponse {
    pub status: u16,
    pub body: BoxStream<'static, Result<Bytes, ClientError>>,
}

impl StreamResponse {
    /// Read the body into a lossy UTF-8 string, stopping at
    /// [`ERROR_BODY_LIMIT`] bytes or after [`ERROR_BODY_TIMEOUT`], whichever
    /// comes first. A body held open by the peer yields what arrived so far.
    pub async fn into_text(self) -> String {
        let mut text = Vec::new();
        let mut body = self.body;
        let read = async {
            while let Some(Ok(chunk)) = body.next().await {
                text.extend_from_slice(&chunk);
                if text.len() >= ERROR_BODY_LIMIT {
                    text.truncate(ERROR_BODY_LIMIT);
                    break;
                }
            }
        };
        if tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await.is_err() {
            debug!(read = text.len(), "error body still open, reporting partial text");
        }
        String::from_utf8_lossy(&text).into_owned()
    }
}

/// Dispatches requests to one endpoint.
///
/// Cheap to clone and safe to share between concurrent callers: it holds the
/// immutable endpoint and, for network endpoints, a pooled `reqwest` client
/// configured with the endpoint's TLS material.
#[derive(Clone)]
pub struct Transport {
    endpoint: Arc<Endpoint>,
    http: Option<reqwest::Client>,
}

impl Transport {
    pub fn new(endpoint: Endpoint) -> Result<Self, ClientError> {
        let http = match &endpoint {
            Endpoint::UnixSocket(_) => None,
            Endpoint::Network { .. } => Some(build_http_client(&endpoint)?),
        };
        Ok(Self {
            endpoint: Arc::new(endpoint),
            http,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn target(&self, path: &str, query: Option<&Query>) -> Target {
        build_target(&self.endpoint, path, query)
    }

    /// Build the target for `spec`, send it once, and classify the response.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ResponseOutcome, ClientError> {
        let target = self.target(&spec.path, spec.query.as_ref());
        self.dispatch(spec.method.clone(), &target, spec.body.as_ref())
            .await
    }

    /// Send one request and classify the response.
    pub async fn dispatch(
        &self,
        method: Method,
        target: &Target,
        body: Option<&Value>,
    ) -> Result<ResponseOutcome, ClientError> {
        debug!(%method, %target, "engine request");

        let (status, bytes) = match target {
            Target::Unix {
                socket,
                path_and_query,
            } => {
                let resp = unix_send(socket, method.clone(), path_and_query, body).await?;
                let status = resp.status().as_u16();
                let bytes = resp
                    .into_body()
                    .collect()
                    .await
                    .map_err(|e| connection_error(target, format!("failed to read body: {e}")))?
                    .to_bytes();
                (status, bytes)
            }
            Target::Network { url } => {
                let resp = self.network_send(method.clone(), url, body).await?;
                let status = resp.status().as_u16();
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| connection_error(target, format!("failed to read body: {e}")))?;
                (status, bytes)
            }
        };

        debug!(%method, %target, status, "engine response");
        classify(&method, status, &bytes)
    }

    /// Open a GET whose body is consumed incrementally (the event feed).
    pub async fn open_stream(&self, target: &Target) -> Result<StreamResponse, ClientError> {
        debug!(%target, "opening engine stream");
        match target {
            Target::Unix {
                socket,
                path_and_query,
            } => {
                let resp = unix_send(socket, Method::GET, path_and_query, None).await?;
                let status = resp.status().as_u16();
                let body = resp
                    .into_body()
                    .into_data_stream()
                    .map_err(|e| ClientError::Stream(e.to_string()))
                    .boxed();
                Ok(StreamResponse { status, body })
            }
            Target::Network { url } => {
                let resp = self.network_send(Method::GET, url, None).await?;
                let status = resp.status().as_u16();
                let body = resp
                    .bytes_stream()
                    .map_err(|e| ClientError::Stream(e.to_string()))
                    .boxed();
                Ok(StreamResponse { status, body })
            }
        }
    }

    async fn network_send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let client = self
            .http
            .as_ref()
            .ok_or_else(|| ClientError::Request(format!("no network client for {url}")))?;

        let mut request = client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(|e| ClientError::Connection {
            target: url.to_string(),
            reason: e.to_string(),
        })
    }
}

fn connection_error(target: &Target, reason: String) -> ClientError {
    ClientError::Connection {
        target: target.authority(),
        reason,
    }
}

/// Send one HTTP/1.1 request over a fresh unix-socket connection.
async fn unix_send(
    socket: &Path,
    method: Method,
    path_and_query: &str,
    body: Option<&Value>,
) -> Result<Response<Incoming>, ClientError> {
    let connect_err = |reason: String| ClientError::Connection {
        target: socket.display().to_string(),
        reason,
    };

    let stream = UnixStream::connect(socket)
        .await
        .map_err(|e| connect_err(e.to_string()))?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(io)
        .await
        .map_err(|e| connect_err(format!("HTTP handshake failed: {e}")))?;

    // Drive the connection in the background
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "engine connection closed with error");
        }
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(path_and_query)
        .header(HOST, UNIX_HOST_HEADER)
        .header(USER_AGENT, build_info::user_agent());

    let req_body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            let bytes = serde_json::to_vec(value)
                .map_err(|e| ClientError::Request(format!("failed to serialize body: {e}")))?;
            Full::new(Bytes::from(bytes))
        }
        None => Full::new(Bytes::new()),
    };

    let req = builder
        .body(req_body)
        .map_err(|e| ClientError::Request(format!("failed to build request: {e}")))?;

    sender
        .send_request(req)
        .await
        .map_err(|e| connect_err(format!("request failed: {e}")))
}

/// Build the pooled network client, installing the endpoint's CA as a root
/// and its certificate + key as the client identity.
fn build_http_client(endpoint: &Endpoint) -> Result<reqwest::Client, ClientError> {
    let tls_err = |reason: String| ClientError::Connection {
        target: endpoint.to_string(),
        reason,
    };

    let mut builder = reqwest::Client::builder().user_agent(build_info::user_agent());

    if let Some(tls) = endpoint.tls() {
        let ca = reqwest::Certificate::from_pem(tls.ca())
            .map_err(|e| tls_err(format!("invalid CA certificate: {e}")))?;

        let mut identity_pem = Vec::with_capacity(tls.cert().len() + tls.key().len() + 1);
        identity_pem.extend_from_slice(tls.cert());
        identity_pem.push(b'\n');
        identity_pem.extend_from_slice(tls.key());
        let identity = reqwest::Identity::from_pem(&identity_pem);
        identity_pem.zeroize();
        let identity = identity.map_err(|e| tls_err(format!("invalid client identity: {e}")))?;

        builder = builder
            .tls_built_in_root_certs(false)
            .add_root_certificate(ca)
            .identity(identity);
    }

    builder
        .build()
        .map_err(|e| tls_err(format!("failed to build HTTP client: {e}")))
}
