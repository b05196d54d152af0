use std::sync::Arc;

use serde_json::Value;

use super::version_query;
use crate::client::{EngineApi, ListSelector};
use crate::error::ClientError;
use crate::transport::RequestSpec;

/// Swarm service operations.
pub struct Services {
    api: Arc<dyn EngineApi>,
}

impl Services {
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        Self { api }
    }

    /// Filters: `id`, `name`.
    pub async fn list(&self, selector: ListSelector) -> Result<Option<Value>, ClientError> {
        self.api.list("services", selector).await
    }

    pub async fn create(&self, params: Value) -> Result<Option<Value>, ClientError> {
        self.api.post("services/create", Some(params)).await
    }

    /// Update a service. Takes the same spec as [`create`](Self::create);
    /// `version` must match the service's current object version.
    pub async fn update(
        &self,
        id: &str,
        version: u64,
        params: Value,
    ) -> Result<Option<Value>, ClientError> {
        let spec = RequestSpec::post(format!("services/{id}/update"))
            .with_query(version_query(version))
            .with_body(params);
        self.api.call(spec).await
    }

    pub async fn remove(&self, id: &str) -> Result<Option<Value>, ClientError> {
        self.api.delete(&format!("services/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingApi;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_service_paths() {
        let api = RecordingApi::new();
        let services = Services::new(api.clone());

        services.list("web".into()).await.unwrap();
        services.create(json!({"Name": "web"})).await.unwrap();
        services
            .update("web", 7, json!({"Name": "web", "Mode": {"Replicated": {"Replicas": 3}}}))
            .await
            .unwrap();
        services.remove("web").await.unwrap();

        assert_eq!(
            api.lines(),
            vec![
                "GET services/web",
                "POST services/create",
                "POST services/web/update?version=7",
                "DELETE services/web",
            ]
        );
    }
}
