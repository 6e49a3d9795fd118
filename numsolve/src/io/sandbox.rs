//! Isolated code execution.
//!
//! A [`Sandbox`] hands out sessions; each [`SandboxSession`] owns a private
//! environment that persists across `run` calls (installed packages stay
//! importable) and is torn down when the session is dropped.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::io::config::SandboxConfig;
use crate::io::process::{CommandOutput, SpawnFailed, run_command_with_timeout};

/// Reported for a successful run that printed nothing.
pub const NO_OUTPUT: &str = "No output";

/// Outcome of one code execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub succeeded: bool,
    /// Trimmed stdout (or [`NO_OUTPUT`] for a silent success).
    pub output: String,
    /// Error or traceback text for a failed run.
    pub error_detail: Option<String>,
}

impl Execution {
    pub fn success(output: impl Into<String>) -> Self {
        let output = output.into();
        let trimmed = output.trim();
        Self {
            succeeded: true,
            output: if trimmed.is_empty() {
                NO_OUTPUT.to_string()
            } else {
                trimmed.to_string()
            },
            error_detail: None,
        }
    }

    pub fn failure(output: impl Into<String>, error_detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: output.into().trim().to_string(),
            error_detail: Some(error_detail.into()),
        }
    }

    /// Error text if present, else the captured output.
    pub fn error_text(&self) -> &str {
        self.error_detail.as_deref().unwrap_or(&self.output)
    }
}

/// The execution environment cannot be provided at all. Fatal for a run.
#[derive(Debug, Clone)]
pub struct SandboxUnavailable {
    pub reason: String,
}

impl fmt::Display for SandboxUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sandbox unavailable: {}", self.reason)
    }
}

impl std::error::Error for SandboxUnavailable {}

/// One isolated environment, scoped to a single candidate or step.
#[async_trait]
pub trait SandboxSession: Send {
    /// Execute `code`. Program failures are an unsuccessful [`Execution`], not an `Err`.
    async fn run(&mut self, code: &str) -> Result<Execution>;

    /// Install a dependency. Best-effort: failures are logged and swallowed.
    async fn install(&mut self, command: &str);
}

/// Factory for sandbox sessions.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn SandboxSession>>;
}

/// Sandbox backed by a local Python interpreter and a per-session temp directory.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    config: SandboxConfig,
}

impl PythonSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Sandbox for PythonSandbox {
    async fn open_session(&self) -> Result<Box<dyn SandboxSession>> {
        let dir = tempfile::Builder::new()
            .prefix("numsolve-")
            .tempdir()
            .context("create sandbox directory")?;
        let site = dir.path().join("site");
        tokio::fs::create_dir_all(&site)
            .await
            .with_context(|| format!("create {}", site.display()))?;
        debug!(dir = %dir.path().display(), "opened sandbox session");
        Ok(Box::new(PythonSession {
            config: self.config.clone(),
            dir,
            site,
            runs: 0,
        }))
    }
}

struct PythonSession {
    config: SandboxConfig,
    dir: TempDir,
    site: PathBuf,
    runs: u32,
}

impl PythonSession {
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.python);
        cmd.current_dir(self.dir.path())
            .env("PYTHONPATH", &self.site)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONNOUSERSITE", "1");
        cmd
    }

    async fn spawn(&self, cmd: Command, timeout: Duration) -> Result<CommandOutput> {
        run_command_with_timeout(cmd, None, timeout, self.config.output_limit_bytes)
            .await
            .map_err(|err| match err.downcast_ref::<SpawnFailed>() {
                Some(spawn) => SandboxUnavailable {
                    reason: spawn.to_string(),
                }
                .into(),
                None => err,
            })
    }
}

#[async_trait]
impl SandboxSession for PythonSession {
    #[instrument(skip_all, fields(run = self.runs + 1, code_bytes = code.len()))]
    async fn run(&mut self, code: &str) -> Result<Execution> {
        self.runs += 1;
        let script = self.dir.path().join(format!("script_{}.py", self.runs));
        tokio::fs::write(&script, code)
            .await
            .with_context(|| format!("write {}", script.display()))?;

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut cmd = self.command();
        cmd.arg("-s").arg(&script);
        let output = self.spawn(cmd, timeout).await?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "code execution timed out");
            return Ok(Execution::failure(
                output.stdout_text(),
                format!("execution timed out after {}s", timeout.as_secs()),
            ));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            let detail = if stderr.trim().is_empty() {
                format!("process exited with status {:?}", output.status.code())
            } else {
                stderr.trim().to_string()
            };
            debug!(exit_code = ?output.status.code(), "code execution failed");
            return Ok(Execution::failure(output.stdout_text(), detail));
        }
        Ok(Execution::success(output.stdout_text()))
    }

    #[instrument(skip_all, fields(command = %command))]
    async fn install(&mut self, command: &str) {
        let packages = pip_arguments(command);
        if packages.is_empty() {
            warn!("install command names no packages");
            return;
        }
        let mut cmd = self.command();
        cmd.args(["-m", "pip", "install", "--quiet", "--disable-pip-version-check"])
            .arg("--target")
            .arg(&self.site)
            .args(&packages);
        let timeout = Duration::from_secs(self.config.install_timeout_secs);
        match self.spawn(cmd, timeout).await {
            Ok(output) if output.succeeded() => info!(?packages, "installed packages"),
            Ok(output) => warn!(
                ?packages,
                timed_out = output.timed_out,
                stderr = %output.stderr_text().trim(),
                "install failed"
            ),
            Err(err) => warn!(?packages, err = %format!("{err:#}"), "install failed"),
        }
    }
}

/// Arguments after `pip install` (or `pip3 install`), stopping at shell separators.
pub fn pip_arguments(command: &str) -> Vec<String> {
    let mut tokens = command.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token == "install" {
            break;
        }
        if tokens.peek().is_none() {
            return Vec::new();
        }
    }
    tokens
        .take_while(|t| !matches!(*t, "&&" | ";" | "|" | "||"))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_success_reports_no_output() {
        assert_eq!(Execution::success("  \n").output, NO_OUTPUT);
        assert_eq!(Execution::success(" 42\n").output, "42");
    }

    #[test]
    fn pip_arguments_skip_the_install_prefix() {
        assert_eq!(pip_arguments("pip install numpy scipy"), ["numpy", "scipy"]);
        assert_eq!(pip_arguments("pip3 install -U torch && echo ok"), ["-U", "torch"]);
        assert!(pip_arguments("pip").is_empty());
        assert!(pip_arguments("pip install").is_empty());
    }

    #[tokio::test]
    async fn missing_interpreter_is_unavailable() {
        let sandbox = PythonSandbox::new(SandboxConfig {
            python: "numsolve-missing-python".to_string(),
            ..SandboxConfig::default()
        });
        let mut session = sandbox.open_session().await.expect("session");
        let err = session.run("print(1)").await.unwrap_err();
        assert!(err.downcast_ref::<SandboxUnavailable>().is_some());
    }

    #[tokio::test]
    async fn failing_program_is_an_unsuccessful_execution() {
        // `false` stands in for the interpreter and exits 1 without stderr.
        let sandbox = PythonSandbox::new(SandboxConfig {
            python: "false".to_string(),
            ..SandboxConfig::default()
        });
        let mut session = sandbox.open_session().await.expect("session");
        let execution = session.run("print(1)").await.expect("run");
        assert!(!execution.succeeded);
        assert!(execution.error_text().contains("status"));
    }
}
