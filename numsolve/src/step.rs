//! Execute a single plan step.

use std::time::Instant;

use anyhow::{Result, anyhow};
use tracing::{info, instrument};

use crate::agents::step_agent::{StepAgent, StepRequest};
use crate::core::budget::remaining_budget;
use crate::core::state::{LoopAction, PipelineState, Stage};

/// Output of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub step: String,
    pub output: String,
}

/// Context for the step at `index`: task, annotated plan, and the step text.
pub fn step_request(state: &PipelineState, index: usize) -> Result<StepRequest> {
    let plan = state
        .plan
        .as_ref()
        .ok_or_else(|| anyhow!("no plan recorded (plan stage has not run)"))?;
    let step = plan
        .steps
        .get(index)
        .ok_or_else(|| anyhow!("plan has no step {index} ({} steps)", plan.len()))?;
    Ok(StepRequest {
        index,
        task: state.task.clone(),
        annotated_plan: state.annotated_plan(),
        step: step.clone(),
    })
}

/// Run the next pending step and append its output to `past_steps`.
///
/// Errors when every step has already run, or when the run budget is spent.
#[instrument(skip_all)]
pub async fn run_step(
    state: &mut PipelineState,
    agent: &dyn StepAgent,
    deadline: Instant,
) -> Result<StepOutcome> {
    let index = match state.next_action()? {
        LoopAction::Run(index) => index,
        LoopAction::Finalize => return Err(anyhow!("every plan step has already run")),
    };
    let request = step_request(state, index)?;
    info!(stage = ?Stage::Run(index), step = %request.step, "executing step");

    let output = tokio::time::timeout(remaining_budget(deadline)?, agent.execute(&request))
        .await
        .map_err(|_| anyhow!("run timed out during step {}", index + 1))??;

    state.record_step(index, output.clone())?;
    Ok(StepOutcome {
        index,
        step: request.step,
        output,
    })
}
