use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::client::EngineApi;
use crate::command::{CommandError, CommandRunner};
use crate::error::ClientError;
use crate::query::Query;
use crate::transport::RequestSpec;

/// Extra inputs for an image build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildParams {
    pub labels: BTreeMap<String, String>,
    pub build_args: BTreeMap<String, String>,
}

/// Image operations.
pub struct Images {
    api: Arc<dyn EngineApi>,
    runner: Arc<dyn CommandRunner>,
    env: BTreeMap<String, String>,
}

impl Images {
    pub fn new(
        api: Arc<dyn EngineApi>,
        runner: Arc<dyn CommandRunner>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self { api, runner, env }
    }

    /// `None` when the image does not exist.
    pub async fn inspect(&self, name: &str) -> Result<Option<Value>, ClientError> {
        self.api.get(&format!("images/{name}/json"), None).await
    }

    /// Build `context` (a directory or URL) through the engine CLI, tagging
    /// the result `name:<tag>` for every tag. Returns the image id.
    pub async fn build(
        &self,
        context: &str,
        name: &str,
        tags: &[String],
        params: &BuildParams,
    ) -> Result<String, CommandError> {
        let args = build_args(context, name, tags, params);
        tracing::info!(%name, ?tags, "building image");
        let stdout = self.runner.run(&args, &self.env).await?.into_stdout()?;
        Ok(stdout.trim().to_string())
    }

    pub async fn push(&self, image: &str, tag: Option<&str>) -> Result<Option<Value>, ClientError> {
        let mut spec = RequestSpec::post(format!("images/{image}/push"));
        if let Some(tag) = tag {
            spec = spec.with_query(Query::new().param("tag", tag));
        }
        self.api.call(spec).await
    }

    /// Tag `name_or_id` into `repo`, optionally with `tag`.
    pub async fn tag(
        &self,
        name_or_id: &str,
        repo: &str,
        tag: Option<&str>,
    ) -> Result<Option<Value>, ClientError> {
        let mut query = Query::new().param("repo", repo);
        if let Some(tag) = tag {
            query = query.param("tag", tag);
        }
        let spec = RequestSpec::post(format!("images/{name_or_id}/tag")).with_query(query);
        self.api.call(spec).await
    }
}

/// `build -t name:tag… --label k=v… --build-arg k=v… -q <context>`
pub fn build_args(context: &str, name: &str, tags: &[String], params: &BuildParams) -> Vec<String> {
    let mut args = vec!["build".to_string()];

    for tag in tags {
        args.extend(["-t".to_string(), format!("{name}:{tag}")]);
    }
    for (key, value) in &params.labels {
        args.extend(["--label".to_string(), format!("{key}={value}")]);
    }
    for (key, value) in &params.build_args {
        args.extend(["--build-arg".to_string(), format!("{key}={value}")]);
    }

    args.push("-q".to_string());
    args.push(context.to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::RecordingApi;
    use crate::command::mock::RecordingRunner;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_args() {
        let params = BuildParams {
            labels: BTreeMap::from([("team".to_string(), "infra".to_string())]),
            build_args: BTreeMap::from([("RUST_VERSION".to_string(), "1.93".to_string())]),
        };
        let args = build_args("./app", "registry.local/app", &strings(&["1.0", "latest"]), &params);
        assert_eq!(
            args,
            strings(&[
                "build",
                "-t",
                "registry.local/app:1.0",
                "-t",
                "registry.local/app:latest",
                "--label",
                "team=infra",
                "--build-arg",
                "RUST_VERSION=1.93",
                "-q",
                "./app",
            ])
        );
    }

    #[tokio::test]
    async fn test_build_returns_trimmed_image_id() {
        let runner = Arc::new(RecordingRunner::replying("sha256:deadbeef\n"));
        let images = Images::new(RecordingApi::new(), runner.clone(), BTreeMap::new());

        let id = images
            .build(".", "app", &strings(&["dev"]), &BuildParams::default())
            .await
            .unwrap();
        assert_eq!(id, "sha256:deadbeef");
        assert_eq!(runner.calls(), vec![strings(&["build", "-t", "app:dev", "-q", "."])]);
    }

    #[tokio::test]
    async fn test_build_failure_surfaces_stderr() {
        let runner = Arc::new(RecordingRunner::failing("no Dockerfile\n"));
        let images = Images::new(RecordingApi::new(), runner, BTreeMap::new());
        let err = images
            .build(".", "app", &[], &BuildParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_image_paths() {
        let api = RecordingApi::new();
        let runner = Arc::new(RecordingRunner::replying(""));
        let images = Images::new(api.clone(), runner, BTreeMap::new());

        images.inspect("app").await.unwrap();
        images.push("app", None).await.unwrap();
        images.push("app", Some("1.0")).await.unwrap();
        images.tag("app", "registry.local/app", None).await.unwrap();
        images.tag("app", "registry.local/app", Some("1.0")).await.unwrap();

        assert_eq!(
            api.lines(),
            vec![
                "GET images/app/json",
                "POST images/app/push",
                "POST images/app/push?tag=1.0",
                "POST images/app/tag?repo=registry.local%2Fapp",
                "POST images/app/tag?repo=registry.local%2Fapp&tag=1.0",
            ]
        );
    }
}
