//! Stage sequencing for a whole run.
//!
//! `Classify → Research → Validate → Plan → Run(i)… → Final`. Stages are
//! strictly sequential; each one is bounded by the remaining run budget.

use std::future::Future;
use std::time::Instant;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::agents::classifier::classify;
use crate::agents::planner::make_plan;
use crate::agents::researcher::{propose_methods, research};
use crate::agents::step_agent::StepAgent;
use crate::agents::synthesizer::synthesize_answer;
use crate::core::budget::remaining_budget;
use crate::core::catalog::candidate_methods;
use crate::core::selector::{is_degraded, pick_best};
use crate::core::state::{PipelineState, Stage};
use crate::core::types::{Candidate, Classification, Plan, Research, StructuredResult};
use crate::io::config::SolverConfig;
use crate::io::generator::TextGenerator;
use crate::io::prompt::PromptBuilder;
use crate::io::sandbox::Sandbox;
use crate::looping::run_plan;
use crate::step::StepOutcome;
use crate::validate::{Problem, Validator};

/// Progress notifications, emitted after each stage completes.
#[derive(Debug)]
pub enum StageEvent<'a> {
    Classified(&'a Classification),
    Researched(&'a Research),
    Validated {
        results: &'a [StructuredResult],
        best: Option<&'a StructuredResult>,
        degraded: bool,
    },
    Planned(&'a Plan),
    StepFinished(&'a StepOutcome),
    Finished(&'a str),
}

impl StageEvent<'_> {
    pub fn stage(&self) -> Stage {
        match self {
            StageEvent::Classified(_) => Stage::Classify,
            StageEvent::Researched(_) => Stage::Research,
            StageEvent::Validated { .. } => Stage::Validate,
            StageEvent::Planned(_) => Stage::Plan,
            StageEvent::StepFinished(step) => Stage::Run(step.index),
            StageEvent::Finished(_) => Stage::Final,
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: PipelineState,
    /// No candidate succeeded; the winner came from the fallback tier.
    pub degraded: bool,
}

/// Results of a validation-only pass.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub classification: Classification,
    pub candidates: Vec<String>,
    pub results: Vec<StructuredResult>,
    pub best: Option<StructuredResult>,
    pub degraded: bool,
}

/// Capabilities and configuration for a run.
#[derive(Clone, Copy)]
pub struct Pipeline<'a> {
    pub generator: &'a dyn TextGenerator,
    pub sandbox: &'a dyn Sandbox,
    pub step_agent: &'a dyn StepAgent,
    pub config: &'a SolverConfig,
}

impl<'a> Pipeline<'a> {
    fn prompts(&self) -> PromptBuilder {
        PromptBuilder::new(self.config.prompt_budget_bytes)
    }

    fn validator(&self) -> Validator<'a> {
        Validator {
            generator: self.generator,
            sandbox: self.sandbox,
            prompts: self.prompts(),
            config: &self.config.validation,
        }
    }

    /// Run every stage and return the terminal state.
    ///
    /// Only unreachable capabilities, an exhausted run budget, or internal
    /// invariant violations are errors; everything else degrades.
    #[instrument(skip_all)]
    pub async fn run<F>(&self, task: &str, mut on_event: F) -> Result<RunOutcome>
    where
        F: FnMut(StageEvent<'_>),
    {
        let deadline = Instant::now() + self.config.run_timeout();
        let prompts = self.prompts();
        let mut state = PipelineState::new(task);

        info!(stage = ?Stage::Classify, "stage started");
        let classification = within(deadline, classify(self.generator, prompts, task)).await?;
        on_event(StageEvent::Classified(&classification));

        info!(stage = ?Stage::Research, "stage started");
        let proposal = within(
            deadline,
            research(
                self.generator,
                prompts,
                task,
                &classification,
                self.config.validation.max_candidates,
            ),
        )
        .await?;
        on_event(StageEvent::Researched(&proposal));

        info!(stage = ?Stage::Validate, "stage started");
        let problem = Problem {
            task,
            short_form: classification.short_form.as_deref(),
            domain_hint: classification.domain_hint.as_deref(),
        };
        let results = within(
            deadline,
            self.validator().validate(problem, &proposal.candidates()),
        )
        .await?;
        let best = pick_best(&results).cloned();
        let degraded = is_degraded(&results);
        if degraded {
            warn!(candidates = results.len(), "no candidate succeeded, using fallback ranking");
        }
        on_event(StageEvent::Validated {
            results: &results,
            best: best.as_ref(),
            degraded,
        });
        state.classification = Some(classification);
        state.research = Some(proposal);
        state.validation_results = results;
        state.best_algorithm = best;

        info!(stage = ?Stage::Plan, "stage started");
        let method = state
            .selected_method()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("no candidate method to plan for"))?;
        let plan = within(
            deadline,
            make_plan(
                self.generator,
                prompts,
                task,
                &method,
                state.classification.as_ref(),
            ),
        )
        .await?;
        on_event(StageEvent::Planned(&plan));
        state.plan = Some(plan);

        run_plan(&mut state, self.step_agent, deadline, |step| {
            on_event(StageEvent::StepFinished(step))
        })
        .await?;

        info!(stage = ?Stage::Final, "stage started");
        let annotated = state.annotated_plan();
        let answer = within(
            deadline,
            synthesize_answer(self.generator, prompts, task, &annotated),
        )
        .await?;
        on_event(StageEvent::Finished(&answer));
        state.final_response = Some(answer);

        Ok(RunOutcome { state, degraded })
    }

    /// Classify, validate `methods` (or proposed ones when empty), and select.
    #[instrument(skip_all, fields(methods = methods.len()))]
    pub async fn validate_only(&self, task: &str, methods: &[String]) -> Result<ValidationReport> {
        let deadline = Instant::now() + self.config.run_timeout();
        let prompts = self.prompts();
        let limit = self.config.validation.max_candidates;

        let classification = within(deadline, classify(self.generator, prompts, task)).await?;
        let mut names: Vec<String> = methods.to_vec();
        if names.is_empty() {
            names = within(deadline, propose_methods(self.generator, prompts, task, limit)).await?;
        }
        if names.is_empty() {
            names = candidate_methods(classification.category.as_deref(), limit);
        }

        let candidates: Vec<Candidate> = names.iter().map(|n| Candidate::new(n.as_str())).collect();
        let problem = Problem {
            task,
            short_form: classification.short_form.as_deref(),
            domain_hint: classification.domain_hint.as_deref(),
        };
        let results = within(deadline, self.validator().validate(problem, &candidates)).await?;
        let best = pick_best(&results).cloned();
        let degraded = is_degraded(&results);
        Ok(ValidationReport {
            classification,
            candidates: names,
            results,
            best,
            degraded,
        })
    }
}

/// Await `fut` within the remaining run budget.
async fn within<T>(deadline: Instant, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(remaining_budget(deadline)?, fut)
        .await
        .map_err(|_| anyhow!("run timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::sandbox::Execution;
    use crate::test_support::{ScriptedGenerator, ScriptedSandbox, ScriptedStepAgent};

    #[tokio::test]
    async fn events_follow_stage_order() {
        let generator = ScriptedGenerator::new()
            .respond("### Plan Contract", r#"{"steps": ["one", "two"]}"#)
            .respond("### Final Answer Contract", "x = 1.3247");
        let sandbox = ScriptedSandbox::new(vec![Execution::success(
            r#"{"method":"Bisection","success":true,"iterations":20,"residual":1e-7}"#,
        )]);
        let agent = ScriptedStepAgent::default();
        let config = SolverConfig {
            validation: crate::io::config::ValidationConfig {
                max_candidates: 1,
                ..Default::default()
            },
            ..SolverConfig::default()
        };
        let pipeline = Pipeline {
            generator: &generator,
            sandbox: &sandbox,
            step_agent: &agent,
            config: &config,
        };

        let mut stages = Vec::new();
        let outcome = pipeline
            .run("Solve: x^3 - x - 1 = 0 on (1, 2)", |event| stages.push(event.stage()))
            .await
            .expect("run");

        assert_eq!(
            stages,
            [
                Stage::Classify,
                Stage::Research,
                Stage::Validate,
                Stage::Plan,
                Stage::Run(0),
                Stage::Run(1),
                Stage::Final
            ]
        );
        assert!(!outcome.degraded);
        assert!(outcome.state.is_terminal());
        assert_eq!(outcome.state.final_response.as_deref(), Some("x = 1.3247"));
    }

    #[tokio::test]
    async fn validate_only_uses_given_methods() {
        let generator = ScriptedGenerator::new();
        let sandbox = ScriptedSandbox::new(vec![
            Execution::failure("", "boom"),
            Execution::success(r#"{"method":"Secant","success":true,"iterations":6,"residual":1e-9}"#),
        ]);
        let agent = ScriptedStepAgent::default();
        let config = SolverConfig::default();
        let pipeline = Pipeline {
            generator: &generator,
            sandbox: &sandbox,
            step_agent: &agent,
            config: &config,
        };

        let report = pipeline
            .validate_only(
                "Solve: x^3 - x - 1 = 0 on (1, 2)",
                &["Bisection".to_string(), "Secant".to_string()],
            )
            .await
            .expect("validate");

        assert_eq!(report.candidates, ["Bisection", "Secant"]);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.best.as_ref().map(|b| b.method.as_str()), Some("Secant"));
        assert!(!report.degraded);
        assert!(agent.requests().is_empty());
    }
}
