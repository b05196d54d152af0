use std::sync::Arc;

use serde_json::Value;

use crate::client::{EngineApi, ListSelector};
use crate::error::ClientError;

/// Volume operations.
pub struct Volumes {
    api: Arc<dyn EngineApi>,
}

impl Volumes {
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        Self { api }
    }

    /// Filters: `name`, `dangling`, `driver`.
    pub async fn list(&self, selector: ListSelector) -> Result<Option<Value>, ClientError> {
        self.api.list("volumes", selector).await
    }

    /// Create a volume from `{"Name", "Driver", "DriverOpts", "Labels"}`.
    pub async fn create(&self, params: Value) -> Result<Option<Value>, ClientError> {
        self.api.post("volumes/create", Some(params)).await
    }

    pub async fn remove(&self, name: &str) -> Result<Option<Value>, ClientError> {
        self.api.delete(&format!("volumes/{name}")).await
    }
}
