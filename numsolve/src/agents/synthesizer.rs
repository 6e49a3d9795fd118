//! Final answer synthesis.

use anyhow::Result;
use tracing::{instrument, warn};

use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::PromptBuilder;

/// Write the final answer from the task and the annotated plan.
///
/// Without a usable completion the annotated plan itself is the answer.
#[instrument(skip_all)]
pub async fn synthesize_answer(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    task: &str,
    annotated_plan: &str,
) -> Result<String> {
    let prompt = prompts.final_answer(task, annotated_plan)?;
    let answer = generate_or_degrade(generator, &prompt, "final answer")
        .await?
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    match answer {
        Some(answer) => Ok(answer),
        None => {
            warn!("no final answer generated, returning the annotated plan");
            Ok(annotated_plan.to_string())
        }
    }
}
