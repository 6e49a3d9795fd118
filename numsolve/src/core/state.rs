//! Run-wide pipeline state and the run-vs-finalize decision.

use anyhow::{Result, anyhow};
use serde::Serialize;

use crate::core::types::{Classification, Plan, Research, StructuredResult};

/// Pipeline stages in execution order. `Run` repeats once per plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "index", rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Research,
    Validate,
    Plan,
    Run(usize),
    Final,
}

/// What the execution loop does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Execute the plan step at this index.
    Run(usize),
    /// All steps are recorded; synthesize the final answer.
    Finalize,
}

/// Decide the next loop action from the number of steps already executed.
pub fn next_action(plan_len: usize, executed: usize) -> LoopAction {
    if executed < plan_len {
        LoopAction::Run(executed)
    } else {
        LoopAction::Finalize
    }
}

/// Mutable record shared by every stage of one run.
///
/// `past_steps` is append-only and always holds exactly one entry per plan
/// step already executed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    pub task: String,
    pub classification: Option<Classification>,
    pub research: Option<Research>,
    pub validation_results: Vec<StructuredResult>,
    pub best_algorithm: Option<StructuredResult>,
    pub plan: Option<Plan>,
    past_steps: Vec<String>,
    pub final_response: Option<String>,
}

impl PipelineState {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    pub fn past_steps(&self) -> &[String] {
        &self.past_steps
    }

    /// Next loop action. Errors when no plan has been recorded yet.
    pub fn next_action(&self) -> Result<LoopAction> {
        let plan = self
            .plan
            .as_ref()
            .ok_or_else(|| anyhow!("no plan recorded (plan stage has not run)"))?;
        Ok(next_action(plan.len(), self.past_steps.len()))
    }

    /// Append the output of the step at `index`.
    ///
    /// Rejects out-of-order indices so the length invariant always holds.
    pub fn record_step(&mut self, index: usize, output: String) -> Result<()> {
        match self.next_action()? {
            LoopAction::Run(expected) if expected == index => {
                self.past_steps.push(output);
                Ok(())
            }
            LoopAction::Run(expected) => Err(anyhow!(
                "step {index} recorded out of order (expected step {expected})"
            )),
            LoopAction::Finalize => Err(anyhow!(
                "step {index} recorded after every plan step was executed"
            )),
        }
    }

    /// True once `final_response` is set.
    pub fn is_terminal(&self) -> bool {
        self.final_response.is_some()
    }

    /// Method name to plan for: the selected result's method, else the first proposal.
    pub fn selected_method(&self) -> Option<&str> {
        self.best_algorithm
            .as_ref()
            .map(|best| best.method.as_str())
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                self.research
                    .as_ref()
                    .and_then(|r| r.candidate_methods.first())
                    .map(String::as_str)
            })
    }

    /// Plan rendered with results for executed steps.
    pub fn annotated_plan(&self) -> String {
        let steps = self.plan.as_ref().map(|p| p.steps.as_slice()).unwrap_or(&[]);
        annotated_plan(steps, &self.past_steps)
    }
}

/// Render `# N. step` lines, adding `Result: ...` for steps that have an output.
pub fn annotated_plan(steps: &[String], past_steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let mut entry = format!("# {}. {}\n", i + 1, step);
            if let Some(output) = past_steps.get(i) {
                entry.push_str(&format!("Result: {output}\n"));
            }
            entry
        })
        .collect::<Vec<_>>()
        .join("\n")
}
