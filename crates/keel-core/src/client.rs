//! High-level engine client.
//!
//! [`EngineApi`] is the seam between the transport and the resource helpers:
//! one required method sends a [`RequestSpec`] and returns its classified
//! [`ResponseOutcome`]; the `get`/`post`/`delete`/`list` primitives the
//! helpers use are provided on top of it. [`Client`] implements it over a
//! real [`Transport`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use keel_config::{ClientConfig, EventsConfig};

use crate::BoxFuture;
use crate::command::{CommandRunner, EngineCli};
use crate::endpoint::{CERT_PATH_VAR, Endpoint, HOST_VAR, TLS_VERIFY_VAR};
use crate::error::ClientError;
use crate::events::EventStream;
use crate::query::Query;
use crate::resources::{Containers, Images, Networks, Nodes, Services, Volumes};
use crate::transport::{RequestSpec, ResponseOutcome, Transport};

/// How `list` addresses a resource bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSelector {
    /// The whole bucket: `bucket`.
    All,
    /// One resource by identifier: `bucket/<id>`.
    Id(String),
    /// The bucket root with a query: `bucket?filters=…`.
    Filters(Query),
}

impl From<&str> for ListSelector {
    fn from(id: &str) -> Self {
        ListSelector::Id(id.to_string())
    }
}

impl From<Query> for ListSelector {
    fn from(query: Query) -> Self {
        ListSelector::Filters(query)
    }
}

/// Request primitives over one engine.
///
/// Implementations must be `Send + Sync`; helpers hold them as
/// `Arc<dyn EngineApi>`. Every provided method resolves to the decoded
/// success body, `None` for an absent resource (404 on a non-POST call),
/// or [`ClientError::Protocol`] for any other non-success status.
pub trait EngineApi: Send + Sync {
    /// Send one request and classify the response.
    fn execute(&self, spec: RequestSpec) -> BoxFuture<'_, Result<ResponseOutcome, ClientError>>;

    fn call(&self, spec: RequestSpec) -> BoxFuture<'_, Result<Option<Value>, ClientError>> {
        Box::pin(async move { self.execute(spec).await?.into_result() })
    }

    fn get(
        &self,
        path: &str,
        query: Option<Query>,
    ) -> BoxFuture<'_, Result<Option<Value>, ClientError>> {
        let mut spec = RequestSpec::get(path);
        if let Some(query) = query {
            spec = spec.with_query(query);
        }
        self.call(spec)
    }

    fn post(
        &self,
        path: &str,
        body: Option<Value>,
    ) -> BoxFuture<'_, Result<Option<Value>, ClientError>> {
        let mut spec = RequestSpec::post(path);
        if let Some(body) = body {
            spec = spec.with_body(body);
        }
        self.call(spec)
    }

    fn delete(&self, path: &str) -> BoxFuture<'_, Result<Option<Value>, ClientError>> {
        self.call(RequestSpec::delete(path))
    }

    fn list(
        &self,
        bucket: &str,
        selector: ListSelector,
    ) -> BoxFuture<'_, Result<Option<Value>, ClientError>> {
        match selector {
            ListSelector::All => self.get(bucket, None),
            ListSelector::Id(id) => self.get(&format!("{bucket}/{id}"), None),
            ListSelector::Filters(query) => self.get(bucket, Some(query)),
        }
    }
}

/// Client for one engine endpoint.
///
/// Cheap to clone; clones share the transport's connection pool.
#[derive(Clone)]
pub struct Client {
    transport: Transport,
    events: EventsConfig,
    runner: Arc<dyn CommandRunner>,
    cli_env: BTreeMap<String, String>,
}

impl Client {
    pub fn new(endpoint: Endpoint, events: &EventsConfig) -> Result<Self, ClientError> {
        let cli_env = cli_env(&endpoint);
        Ok(Self {
            transport: Transport::new(endpoint)?,
            events: events.clone(),
            runner: Arc::new(EngineCli::default()),
            cli_env,
        })
    }

    /// Resolve the endpoint (config, then environment, then the local
    /// socket), load TLS material if requested, and build the client.
    pub async fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let endpoint =
            Endpoint::from_env(&config.engine)
                .await
                .map_err(|e| ClientError::Connection {
                    target: config
                        .engine
                        .host
                        .clone()
                        .unwrap_or_else(|| HOST_VAR.to_string()),
                    reason: e.to_string(),
                })?;
        tracing::debug!(%endpoint, "resolved engine endpoint");
        Self::new(endpoint, &config.events)
    }

    /// Replace the runner used for CLI-driven operations.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.transport.endpoint()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub async fn info(&self) -> Result<Option<Value>, ClientError> {
        self.get("info", None).await
    }

    pub async fn version(&self) -> Result<Option<Value>, ClientError> {
        self.get("version", None).await
    }

    /// Whether the engine answers `_ping`. A 404 means it does not.
    pub async fn ping(&self) -> Result<bool, ClientError> {
        match self.execute(RequestSpec::get("_ping")).await {
            Ok(ResponseOutcome::Success(_)) => Ok(true),
            // The engine answers `_ping` with a plain-text "OK".
            Err(ClientError::Decode(_)) => Ok(true),
            Ok(ResponseOutcome::Empty) => Ok(false),
            Ok(ResponseOutcome::Failure { status, body }) => {
                Err(ClientError::Protocol { status, body })
            }
            Err(e) => Err(e),
        }
    }

    /// Start consuming the event feed. The stream reconnects on its own
    /// until aborted or dropped.
    pub fn events(&self, query: Option<Query>) -> EventStream {
        EventStream::start(
            self.transport.clone(),
            query.unwrap_or_default(),
            &self.events,
        )
    }

    fn api(&self) -> Arc<dyn EngineApi> {
        Arc::new(self.clone())
    }

    pub fn containers(&self) -> Containers {
        Containers::new(self.api())
    }

    pub fn images(&self) -> Images {
        Images::new(self.api(), self.runner.clone(), self.cli_env.clone())
    }

    pub fn networks(&self) -> Networks {
        Networks::new(self.api(), self.runner.clone(), self.cli_env.clone())
    }

    pub fn nodes(&self) -> Nodes {
        Nodes::new(self.api())
    }

    pub fn services(&self) -> Services {
        Services::new(self.api())
    }

    pub fn volumes(&self) -> Volumes {
        Volumes::new(self.api())
    }
}

impl EngineApi for Client {
    fn execute(&self, spec: RequestSpec) -> BoxFuture<'_, Result<ResponseOutcome, ClientError>> {
        Box::pin(async move { self.transport.execute(&spec).await })
    }
}

/// Environment that points the engine CLI at the same engine, with the
/// same client certificates when the endpoint carries TLS material.
fn cli_env(endpoint: &Endpoint) -> BTreeMap<String, String> {
    let host = match endpoint {
        Endpoint::UnixSocket(path) => format!("unix://{}", path.display()),
        Endpoint::Network { host, port, .. } => match port {
            Some(port) => format!("tcp://{host}:{port}"),
            None => format!("tcp://{host}"),
        },
    };
    let mut env = BTreeMap::from([(HOST_VAR.to_string(), host)]);

    if let Some(tls) = endpoint.tls() {
        env.insert(TLS_VERIFY_VAR.to_string(), "1".to_string());
        if let Some(dir) = tls.dir() {
            env.insert(CERT_PATH_VAR.to_string(), dir.display().to_string());
        }
    }
    env
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Records every request and replies from a script, then with `Null`.
    #[derive(Default)]
    pub struct RecordingApi {
        requests: Mutex<Vec<RequestSpec>>,
        replies: Mutex<VecDeque<ResponseOutcome>>,
    }

    impl RecordingApi {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn replying(outcome: ResponseOutcome) -> Arc<Self> {
            let api = Self::default();
            api.replies.lock().unwrap().push_back(outcome);
            Arc::new(api)
        }

        pub fn requests(&self) -> Vec<RequestSpec> {
            self.requests.lock().unwrap().clone()
        }

        /// `METHOD /path?query` of every recorded request.
        pub fn lines(&self) -> Vec<String> {
            self.requests()
                .iter()
                .map(|spec| {
                    let query = spec
                        .query
                        .as_ref()
                        .and_then(Query::encode)
                        .map(|q| format!("?{q}"))
                        .unwrap_or_default();
                    format!("{} {}{}", spec.method, spec.path, query)
                })
                .collect()
        }
    }

    impl EngineApi for RecordingApi {
        fn execute(
            &self,
            spec: RequestSpec,
        ) -> BoxFuture<'_, Result<ResponseOutcome, ClientError>> {
            self.requests.lock().unwrap().push(spec);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ResponseOutcome::Success(Value::Null));
            Box::pin(async move { Ok(reply) })
        }
    }
}
