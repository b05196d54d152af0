use std::sync::Arc;

use serde_json::Value;

use crate::client::{EngineApi, ListSelector};
use crate::error::ClientError;
use crate::query::Query;
use crate::transport::RequestSpec;

/// Container operations.
pub struct Containers {
    api: Arc<dyn EngineApi>,
}

impl Containers {
    pub fn new(api: Arc<dyn EngineApi>) -> Self {
        Self { api }
    }

    /// List containers. An [`ListSelector::Id`] inspects that container.
    pub async fn list(&self, selector: ListSelector) -> Result<Option<Value>, ClientError> {
        match selector {
            ListSelector::All => self.api.get("containers/json", None).await,
            ListSelector::Id(id) => self.inspect(&id).await,
            ListSelector::Filters(query) => self.api.get("containers/json", Some(query)).await,
        }
    }

    /// `None` when the container does not exist.
    pub async fn inspect(&self, id: &str) -> Result<Option<Value>, ClientError> {
        self.api.get(&format!("containers/{id}/json"), None).await
    }

    pub async fn start(&self, id: &str) -> Result<Option<Value>, ClientError> {
        self.api.post(&format!("containers/{id}/start"), None).await
    }

    pub async fn stop(&self, id: &str) -> Result<Option<Value>, ClientError> {
        self.api.post(&format!("containers/{id}/stop"), None).await
    }

    pub async fn remove(&self, id: &str, force: bool) -> Result<Option<Value>, ClientError> {
        let mut spec = RequestSpec::delete(format!("containers/{id}"));
        if force {
            spec = spec.with_query(Query::new().param("force", true));
        }
        self.api.call(spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingApi;
    use crate::transport::ResponseOutcome;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_container_paths() {
        let api = RecordingApi::new();
        let containers = Containers::new(api.clone());

        containers.list(ListSelector::All).await.unwrap();
        containers
            .list(Query::new().param("all", 1).into())
            .await
            .unwrap();
        containers.list("abc".into()).await.unwrap();
        containers.start("abc").await.unwrap();
        containers.stop("abc").await.unwrap();
        containers.remove("abc", false).await.unwrap();
        containers.remove("abc", true).await.unwrap();

        assert_eq!(
            api.lines(),
            vec![
                "GET containers/json",
                "GET containers/json?all=1",
                "GET containers/abc/json",
                "POST containers/abc/start",
                "POST containers/abc/stop",
                "DELETE containers/abc",
                "DELETE containers/abc?force=true",
            ]
        );
    }

    #[tokio::test]
    async fn test_inspect_missing_container_is_none() {
        let api = RecordingApi::replying(ResponseOutcome::Empty);
        let containers = Containers::new(api);
        assert_eq!(containers.inspect("missing").await.unwrap(), None);
    }
}
