//! Self-healing execution: install missing modules and retry.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::missing_module;
use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::PromptBuilder;
use crate::io::sandbox::{Execution, SandboxSession};

/// Result of running code with dependency recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealingOutcome {
    /// Final execution (success, other failure, or attempts exhausted).
    pub execution: Execution,
    /// Number of `run` calls made. Never exceeds the attempt ceiling.
    pub executions: u32,
    /// Install commands issued, in order.
    pub installs: Vec<String>,
}

/// Run `code`, installing modules reported missing and retrying.
///
/// Each retry is preceded by exactly one install. Any failure that does not
/// name a missing module ends the loop immediately. When `max_attempts` runs
/// are spent, the outcome is a failure naming the ceiling and the last error.
#[instrument(skip_all, fields(max_attempts))]
pub async fn run_with_self_healing(
    session: &mut dyn SandboxSession,
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    code: &str,
    max_attempts: u32,
) -> Result<HealingOutcome> {
    let max_attempts = max_attempts.max(1);
    let mut installs = Vec::new();
    let mut executions = 0;

    loop {
        let execution = session.run(code).await?;
        executions += 1;

        if execution.succeeded {
            debug!(executions, "execution succeeded");
            return Ok(HealingOutcome {
                execution,
                executions,
                installs,
            });
        }

        let Some(module) = missing_module(execution.error_text()).map(str::to_string) else {
            debug!(executions, "execution failed without a missing module");
            return Ok(HealingOutcome {
                execution,
                executions,
                installs,
            });
        };

        if executions >= max_attempts {
            warn!(executions, %module, "install attempts exhausted");
            let error = format!(
                "Max install attempts ({max_attempts}) reached. Last error: {}",
                execution.error_text()
            );
            return Ok(HealingOutcome {
                execution: Execution::failure(execution.output, error),
                executions,
                installs,
            });
        }

        let command = install_command(generator, prompts, &module).await?;
        info!(%module, %command, attempt = executions, "installing missing module");
        session.install(&command).await;
        installs.push(command);
    }
}

/// Install command for `module`: the model's first line when it is a
/// `pip install` command, else `pip install <module>`.
pub async fn install_command(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    module: &str,
) -> Result<String> {
    let fallback = format!("pip install {module}");
    let prompt = match prompts.install(module) {
        Ok(prompt) => prompt,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "install prompt unavailable");
            return Ok(fallback);
        }
    };
    let Some(text) = generate_or_degrade(generator, &prompt, "install command").await? else {
        return Ok(fallback);
    };
    let command = text
        .lines()
        .map(str::trim)
        .map(|line| line.trim_matches('`').trim())
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if command.starts_with("pip install") {
        Ok(command.to_string())
    } else {
        Ok(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedGenerator, ScriptedSandbox};

    const MISSING_SCIPY: &str = "Traceback (most recent call last):\nModuleNotFoundError: No module named 'scipy'";

    fn prompts() -> PromptBuilder {
        PromptBuilder::new(10_000)
    }

    #[tokio::test]
    async fn installs_each_missing_module_then_succeeds() {
        let sandbox = ScriptedSandbox::new(vec![
            Execution::failure("", MISSING_SCIPY),
            Execution::failure("", "No module named 'sympy'"),
            Execution::failure("", "No module named 'mpmath'"),
            Execution::success("{\"method\": \"Secant\", \"success\": true}"),
        ]);
        let generator = ScriptedGenerator::new().respond("### Install Contract", "pip install scipy");
        let mut session = sandbox.session();

        let outcome = run_with_self_healing(&mut session, &generator, prompts(), "code", 5)
            .await
            .expect("heal");

        assert!(outcome.execution.succeeded);
        assert_eq!(outcome.executions, 4);
        assert_eq!(outcome.installs.len(), 3);
        assert_eq!(sandbox.installs().len(), 3);
        assert_eq!(sandbox.installs()[0], "pip install scipy");
        // Unscripted replies fall back to the module name.
        assert_eq!(outcome.installs[1], "pip install sympy");
    }

    #[tokio::test]
    async fn stops_at_attempt_ceiling() {
        let sandbox = ScriptedSandbox::new(vec![Execution::failure("", MISSING_SCIPY); 4]);
        let generator = ScriptedGenerator::new();
        let mut session = sandbox.session();

        let outcome = run_with_self_healing(&mut session, &generator, prompts(), "code", 3)
            .await
            .expect("heal");

        assert!(!outcome.execution.succeeded);
        assert_eq!(outcome.executions, 3);
        assert_eq!(outcome.installs.len(), 2);
        assert_eq!(sandbox.runs().len(), 3);
        let error = outcome.execution.error_text();
        assert!(error.starts_with("Max install attempts (3) reached. Last error:"));
        assert!(error.contains("No module named 'scipy'"));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let sandbox = ScriptedSandbox::new(vec![Execution::failure("", "ZeroDivisionError")]);
        let generator = ScriptedGenerator::new();
        let mut session = sandbox.session();

        let outcome = run_with_self_healing(&mut session, &generator, prompts(), "code", 5)
            .await
            .expect("heal");

        assert_eq!(outcome.executions, 1);
        assert!(outcome.installs.is_empty());
        assert_eq!(outcome.execution.error_text(), "ZeroDivisionError");
    }

    #[tokio::test]
    async fn fenced_pip_reply_is_accepted() {
        let generator =
            ScriptedGenerator::new().respond("### Install Contract", "```\npip install torch\n```");
        let command = install_command(&generator, prompts(), "torch").await.expect("command");
        assert_eq!(command, "pip install torch");
    }

    #[tokio::test]
    async fn unavailable_generator_is_fatal() {
        let generator = ScriptedGenerator::unavailable();
        let err = install_command(&generator, prompts(), "torch").await.unwrap_err();
        assert!(crate::io::generator::is_unavailable(&err));
    }
}
