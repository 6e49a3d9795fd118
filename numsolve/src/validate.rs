//! Validation engine: synthesize, execute, and measure each candidate.

use anyhow::Result;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{info, instrument, warn};

use crate::core::metrics::parse_metrics;
use crate::core::types::{Candidate, StructuredResult};
use crate::healing::run_with_self_healing;
use crate::io::config::{MAX_CANDIDATES, ValidationConfig};
use crate::io::generator::TextGenerator;
use crate::io::is_fatal;
use crate::io::prompt::{CodeRequest, PromptBuilder};
use crate::io::sandbox::Sandbox;
use crate::synth::synthesize;

/// Problem description shared by every candidate.
#[derive(Debug, Clone, Copy)]
pub struct Problem<'a> {
    pub task: &'a str,
    pub short_form: Option<&'a str>,
    pub domain_hint: Option<&'a str>,
}

/// Capabilities and limits for one validation pass.
#[derive(Clone, Copy)]
pub struct Validator<'a> {
    pub generator: &'a dyn TextGenerator,
    pub sandbox: &'a dyn Sandbox,
    pub prompts: PromptBuilder,
    pub config: &'a ValidationConfig,
}

impl<'a> Validator<'a> {
    /// One result per candidate, in input order, for at most `max_candidates`
    /// (never more than [`MAX_CANDIDATES`]).
    ///
    /// Each candidate runs in its own sandbox session. With `concurrency > 1`
    /// several candidates are in flight at once; output order is unchanged.
    #[instrument(skip_all, fields(candidates = candidates.len(), concurrency = self.config.concurrency))]
    pub async fn validate(
        &self,
        problem: Problem<'_>,
        candidates: &[Candidate],
    ) -> Result<Vec<StructuredResult>> {
        let limit = self.config.max_candidates.min(MAX_CANDIDATES);
        if candidates.len() > limit {
            warn!(
                dropped = candidates.len() - limit,
                limit, "too many candidates, validating the first ones only"
            );
        }
        stream::iter(candidates.iter().take(limit))
            .map(|candidate| self.validate_one(problem, candidate))
            .buffered(self.config.concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await
    }

    /// Validate a single candidate. Only unreachable capabilities are errors.
    #[instrument(skip_all, fields(method = %candidate.method_name))]
    pub async fn validate_one(
        &self,
        problem: Problem<'_>,
        candidate: &Candidate,
    ) -> Result<StructuredResult> {
        let method = candidate.method_name.as_str();
        let request = CodeRequest {
            method,
            task: problem.task,
            short_form: problem.short_form,
            domain_hint: problem.domain_hint,
            tol: self.config.tol,
            maxiter: self.config.maxiter,
        };
        let synthesized = synthesize(self.generator, self.prompts, &request).await?;

        let mut session = self.sandbox.open_session().await?;
        let healed = run_with_self_healing(
            session.as_mut(),
            self.generator,
            self.prompts,
            &synthesized.code,
            self.config.max_install_attempts,
        )
        .await;
        drop(session);

        let outcome = match healed {
            Ok(outcome) => outcome,
            Err(err) if is_fatal(&err) => return Err(err),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "candidate execution errored");
                return Ok(StructuredResult::execution_failed(
                    method,
                    String::new(),
                    format!("{err:#}"),
                ));
            }
        };

        let execution = outcome.execution;
        let result = if execution.succeeded {
            parse_metrics(&execution.output).into_result(method, execution.output)
        } else {
            let error = execution.error_text().to_string();
            StructuredResult::execution_failed(method, execution.output, error)
        };
        info!(
            success = result.success,
            iterations = ?result.iterations,
            residual = ?result.residual,
            executions = outcome.executions,
            installs = outcome.installs.len(),
            source = ?synthesized.source,
            "candidate validated"
        );
        Ok(result)
    }
}
