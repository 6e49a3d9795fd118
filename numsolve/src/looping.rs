//! Plan execution loop: run every step, then stop for finalization.

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::agents::step_agent::StepAgent;
use crate::core::state::{LoopAction, PipelineState};
use crate::step::{StepOutcome, run_step};

/// Summary of a loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub steps_executed: usize,
}

/// Execute pending plan steps in order until [`LoopAction::Finalize`].
///
/// The decision is recomputed from `past_steps` before every step, so a plan
/// of N steps dispatches exactly N step executions (none for an empty plan).
/// Stops immediately on any error.
#[instrument(skip_all)]
pub async fn run_plan<F: FnMut(&StepOutcome)>(
    state: &mut PipelineState,
    agent: &dyn StepAgent,
    deadline: Instant,
    mut on_step: F,
) -> Result<LoopOutcome> {
    let mut steps_executed = 0usize;
    loop {
        match state.next_action()? {
            LoopAction::Finalize => {
                debug!(steps_executed, "plan complete");
                return Ok(LoopOutcome { steps_executed });
            }
            LoopAction::Run(_) => {
                let step = run_step(state, agent, deadline).await?;
                steps_executed += 1;
                on_step(&step);
            }
        }
    }
}
