//! Tools available to the step agent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::core::extract::strip_code_fences;
use crate::healing::run_with_self_healing;
use crate::io::config::SearchConfig;
use crate::io::generator::TextGenerator;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptBuilder, ToolSummary};
use crate::io::sandbox::Sandbox;

/// A named capability the step agent may invoke with free-text input.
///
/// Tool failures are reported back as observation text. Only unreachable
/// capabilities (see [`crate::io::is_fatal`]) are returned as errors.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, input: &str) -> Result<String>;

    fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// Runs complete Python programs in a fresh sandbox session.
pub struct SandboxTool {
    sandbox: Arc<dyn Sandbox>,
    generator: Arc<dyn TextGenerator>,
    prompts: PromptBuilder,
    max_install_attempts: u32,
}

impl SandboxTool {
    pub const NAME: &'static str = "python_sandbox";

    pub fn new(
        sandbox: Arc<dyn Sandbox>,
        generator: Arc<dyn TextGenerator>,
        prompts: PromptBuilder,
        max_install_attempts: u32,
    ) -> Self {
        Self {
            sandbox,
            generator,
            prompts,
            max_install_attempts,
        }
    }
}

#[async_trait]
impl Tool for SandboxTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Run a complete Python program and return its stdout. Missing modules are installed automatically. Call only with finished code."
    }

    #[instrument(skip_all, fields(tool = "python_sandbox"))]
    async fn invoke(&self, input: &str) -> Result<String> {
        let code = strip_code_fences(input);
        let mut session = self.sandbox.open_session().await?;
        let outcome = run_with_self_healing(
            session.as_mut(),
            self.generator.as_ref(),
            self.prompts,
            &code,
            self.max_install_attempts,
        )
        .await?;
        let execution = outcome.execution;
        if execution.succeeded {
            Ok(execution.output)
        } else {
            Ok(format!("Error: {}", execution.error_text()))
        }
    }
}

/// Lookup backed by an external command; the query is the last argument.
pub struct SearchTool {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SearchTool {
    pub const NAME: &'static str = "search";

    /// `None` when no search command is configured.
    pub fn from_config(config: &SearchConfig, output_limit_bytes: usize) -> Option<Self> {
        config.is_enabled().then(|| Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes,
        })
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Search the web and reference works (papers, encyclopedias) for background on a method or formula."
    }

    #[instrument(skip_all, fields(tool = "search"))]
    async fn invoke(&self, input: &str) -> Result<String> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).arg(input.trim());
        let output =
            match run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes).await {
                Ok(output) => output,
                Err(err) => {
                    warn!(err = %format!("{err:#}"), "search command failed to run");
                    return Ok(format!("Error: search unavailable: {err:#}"));
                }
            };
        if output.timed_out {
            return Ok(format!("Error: search timed out after {}s", self.timeout.as_secs()));
        }
        if !output.status.success() {
            return Ok(format!(
                "Error: search exited with status {:?}: {}",
                output.status.code(),
                output.stderr_text().trim()
            ));
        }
        let text = output.stdout_text();
        let text = text.trim();
        if text.is_empty() {
            Ok("No results".to_string())
        } else {
            Ok(text.to_string())
        }
    }
}
