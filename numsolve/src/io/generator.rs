//! Text generation abstraction.
//!
//! The [`TextGenerator`] trait decouples the pipeline from the model backend
//! (currently a command-line client fed on stdin). Tests use scripted
//! generators that return predetermined completions without spawning processes.

use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::io::config::GeneratorConfig;
use crate::io::process::{SpawnFailed, run_command_with_timeout};

/// Stateless prompt-in, text-out capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// The generation backend cannot be reached at all. Fatal for a run.
#[derive(Debug, Clone)]
pub struct GeneratorUnavailable {
    pub reason: String,
}

impl fmt::Display for GeneratorUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "text generator unavailable: {}", self.reason)
    }
}

impl std::error::Error for GeneratorUnavailable {}

/// True when `err` means the generator cannot be reached.
pub fn is_unavailable(err: &anyhow::Error) -> bool {
    err.downcast_ref::<GeneratorUnavailable>().is_some()
}

/// Generate text, degrading non-fatal failures to `None`.
///
/// [`GeneratorUnavailable`] is propagated; every other error is logged and the
/// caller falls back to its deterministic path.
pub async fn generate_or_degrade(
    generator: &dyn TextGenerator,
    prompt: &str,
    purpose: &str,
) -> Result<Option<String>> {
    match generator.generate(prompt).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if is_unavailable(&err) => Err(err),
        Err(err) => {
            warn!(purpose, err = %format!("{err:#}"), "generation degraded, using fallback");
            Ok(None)
        }
    }
}

/// Generator that spawns the configured command and pipes the prompt to stdin.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("generator command is empty"));
        }
        Ok(Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.command[0], prompt_bytes = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);

        let output = match run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .await
        {
            Ok(output) => output,
            Err(err) => {
                if let Some(spawn) = err.downcast_ref::<SpawnFailed>() {
                    return Err(GeneratorUnavailable {
                        reason: spawn.to_string(),
                    }
                    .into());
                }
                return Err(err.context("run generator command"));
            }
        };

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator exited with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }

        let text = output.stdout_text();
        debug!(completion_bytes = text.len(), "generator completed");
        Ok(text)
    }
}
