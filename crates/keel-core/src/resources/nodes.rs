use std::sync::Arc;

use serde_json::Value;

use super::version_query;
use crate::client::{EngineApi, ListSelector};
use crate::error::ClientError;
use crate::transport::RequestSpec;

/// Swarm node operations.
pub struct Nodes {
    api: Arc<dyn EngineApi>,
}

impl Nodes {
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        Self { api }
    }

    /// Filters: `id`, `name`, `membership`, `role`.
    pub async fn list(&self, selector: ListSelector) -> Result<Option<Value>, ClientError> {
        self.api.list("nodes", selector).await
    }

    /// Update a node's spec (`Availability`, `Name`, `Role`, `Labels`).
    /// `version` must match the node's current object version.
    pub async fn update(
        &self,
        id: &str,
        params: Value,
        version: u64,
    ) -> Result<Option<Value>, ClientError> {
        let spec = RequestSpec::post(format!("nodes/{id}/update"))
            .with_query(version_query(version))
            .with_body(params);
        self.api.call(spec).await
    }

    pub async fn remove(&self, id: &str) -> Result<Option<Value>, ClientError> {
        self.api.delete(&format!("nodes/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingApi;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_node_paths() {
        let api = RecordingApi::new();
        let nodes = Nodes::new(api.clone());

        nodes.list(ListSelector::All).await.unwrap();
        nodes
            .update("node1", json!({"Availability": "drain"}), 42)
            .await
            .unwrap();
        nodes.remove("node1").await.unwrap();

        assert_eq!(
            api.lines(),
            vec![
                "GET nodes",
                "POST nodes/node1/update?version=42",
                "DELETE nodes/node1",
            ]
        );
        assert_eq!(
            api.requests()[1].body,
            Some(json!({"Availability": "drain"}))
        );
    }
}
