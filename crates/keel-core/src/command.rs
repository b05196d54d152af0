//! External command-line tool invocation.
//!
//! A few engine operations are driven through the engine's own CLI rather
//! than the HTTP API (image builds, network creation), and the connection
//! environment of a managed machine is read from `docker-machine env`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use crate::BoxFuture;

/// Default engine CLI binary.
pub const ENGINE_CLI: &str = "docker";

/// Default machine-management CLI binary.
pub const MACHINE_CLI: &str = "docker-machine";

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("command exited with status {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Captured result of one command run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout of a successful run, or [`CommandError::Failed`].
    pub fn into_stdout(self) -> Result<String, CommandError> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(CommandError::Failed {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs an external program with arguments and extra environment.
///
/// Implementations must be `Send + Sync`; resource helpers share them as
/// `Arc<dyn CommandRunner>`.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        args: &'a [String],
        env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<CommandOutput, CommandError>>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct EngineCli {
    program: PathBuf,
}

impl EngineCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runner for the machine-management CLI.
    pub fn machine() -> Self {
        Self::new(MACHINE_CLI)
    }

    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

impl Default for EngineCli {
    fn default() -> Self {
        Self::new(ENGINE_CLI)
    }
}

impl CommandRunner for EngineCli {
    fn run<'a>(
        &'a self,
        args: &'a [String],
        env: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<CommandOutput, CommandError>> {
        Box::pin(async move {
            tracing::debug!(
                program = %self.program.display(),
                args = ?args,
                "running engine CLI"
            );

            let output = tokio::process::Command::new(&self.program)
                .args(args)
                .envs(env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|e| CommandError::Spawn {
                    program: self.program.display().to_string(),
                    reason: e.to_string(),
                })?;

            let output = CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
            };
            tracing::debug!(exit_code = ?output.exit_code, "engine CLI finished");
            Ok(output)
        })
    }
}

/// Connection environment of a managed machine, from `docker-machine env`.
///
/// The result feeds [`Endpoint::resolve`](crate::endpoint::Endpoint::resolve)
/// as its environment lookup.
pub async fn machine_env(
    runner: &dyn CommandRunner,
    machine: &str,
) -> Result<BTreeMap<String, String>, CommandError> {
    let args = ["env".to_string(), machine.to_string()];
    let stdout = runner.run(&args, &BTreeMap::new()).await?.into_stdout()?;
    Ok(parse_machine_env(&stdout))
}

/// Parse `export KEY="value"` lines. Comments and other lines are ignored.
pub fn parse_machine_env(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("export "))
        .filter_map(|assignment| assignment.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
