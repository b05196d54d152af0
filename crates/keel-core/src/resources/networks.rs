use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::client::{EngineApi, ListSelector};
use crate::command::{CommandError, CommandRunner};
use crate::error::ClientError;

/// Inputs for network creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: String,
    pub driver: String,
    /// Restrict external access to the network.
    pub internal: bool,
}

impl NetworkParams {
    /// A `bridge` network named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            internal: false,
        }
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    /// `network create --driver <d> [--internal] <name>`
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "network".to_string(),
            "create".to_string(),
            "--driver".to_string(),
            self.driver.clone(),
        ];
        if self.internal {
            args.push("--internal".to_string());
        }
        args.push(self.name.clone());
        args
    }
}

/// Network operations.
pub struct Networks {
    api: Arc<dyn EngineApi>,
    runner: Arc<dyn CommandRunner>,
    env: BTreeMap<String, String>,
}

impl Networks {
    pub fn new(
        api: Arc<dyn EngineApi>,
        runner: Arc<dyn CommandRunner>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self { api, runner, env }
    }

    /// Filters: `driver`, `id`, `label`, `name`, `type`.
    pub async fn list(&self, selector: ListSelector) -> Result<Option<Value>, ClientError> {
        self.api.list("networks", selector).await
    }

    /// Create a network through the engine CLI. Returns the network id.
    pub async fn create(&self, params: &NetworkParams) -> Result<String, CommandError> {
        tracing::info!(name = %params.name, driver = %params.driver, "creating network");
        let stdout = self
            .runner
            .run(&params.to_args(), &self.env)
            .await?
            .into_stdout()?;
        Ok(stdout.trim().to_string())
    }

    pub async fn connect(
        &self,
        network: &str,
        container: &str,
    ) -> Result<Option<Value>, ClientError> {
        self.api
            .post(
                &format!("networks/{network}/connect"),
                Some(json!({ "Container": container })),
            )
            .await
    }

    pub async fn disconnect(
        &self,
        network: &str,
        container: &str,
        force: bool,
    ) -> Result<Option<Value>, ClientError> {
        self.api
            .post(
                &format!("networks/{network}/disconnect"),
                Some(json!({ "Container": container, "Force": force })),
            )
            .await
    }

    pub async fn remove(&self, network: &str) -> Result<Option<Value>, ClientError> {
        self.api.delete(&format!("networks/{network}")).await
    }
}
