//! Plan generation for the selected method.

use std::sync::LazyLock;

use anyhow::Result;
use jsonschema::Validator;
use tracing::{debug, instrument, warn};

use crate::core::schema::{PLAN_SCHEMA, bundled};
use crate::core::types::{Classification, Plan};
use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::PromptBuilder;

use super::parse_json_reply;

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| bundled(PLAN_SCHEMA));

/// Steps kept when a non-JSON reply is split into lines.
pub const MAX_FALLBACK_STEPS: usize = 10;

/// Build a plan for `method`.
///
/// A JSON reply is taken as-is (an empty `steps` list is a valid plan). Any
/// other reply is split into non-empty lines. When generation itself is
/// unavailable the plan is a single step applying the method.
#[instrument(skip_all, fields(method))]
pub async fn make_plan(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    task: &str,
    method: &str,
    classification: Option<&Classification>,
) -> Result<Plan> {
    let prompt = prompts.plan(task, method, classification)?;
    let Some(text) = generate_or_degrade(generator, &prompt, "plan").await? else {
        return Ok(Plan::new(vec![format!(
            "Apply the {method} method to the task and report the numerical result."
        )]));
    };
    match parse_json_reply::<Plan>(&text, &SCHEMA) {
        Ok(plan) => {
            debug!(steps = plan.len(), "model plan");
            Ok(plan)
        }
        Err(err) => {
            warn!(err = %err, "plan reply is not JSON, splitting lines");
            Ok(plan_from_lines(&text))
        }
    }
}

/// Non-empty trimmed lines, at most [`MAX_FALLBACK_STEPS`].
pub fn plan_from_lines(text: &str) -> Plan {
    Plan::new(
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(MAX_FALLBACK_STEPS)
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;

    #[tokio::test]
    async fn json_plan_is_used() {
        let generator = ScriptedGenerator::new().respond(
            "### Plan Contract",
            r#"{"steps": ["Define f(x)", "Iterate the secant update", "Report x"]}"#,
        );
        let plan = make_plan(&generator, PromptBuilder::new(10_000), "task", "Secant", None)
            .await
            .expect("plan");
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps[1], "Iterate the secant update");
    }

    #[tokio::test]
    async fn empty_step_list_is_a_valid_plan() {
        let generator = ScriptedGenerator::new().respond("### Plan Contract", r#"{"steps": []}"#);
        let plan = make_plan(&generator, PromptBuilder::new(10_000), "task", "Secant", None)
            .await
            .expect("plan");
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn prose_reply_is_split_into_at_most_ten_lines() {
        let reply = (1..=12).map(|i| format!("Step {i}\n\n")).collect::<String>();
        let generator = ScriptedGenerator::new().respond("### Plan Contract", &reply);
        let plan = make_plan(&generator, PromptBuilder::new(10_000), "task", "Secant", None)
            .await
            .expect("plan");
        assert_eq!(plan.len(), MAX_FALLBACK_STEPS);
        assert_eq!(plan.steps[0], "Step 1");
        assert_eq!(plan.steps[9], "Step 10");
    }

    #[tokio::test]
    async fn degraded_generation_plans_one_step() {
        let generator = ScriptedGenerator::new();
        let plan = make_plan(&generator, PromptBuilder::new(10_000), "task", "Bisection", None)
            .await
            .expect("plan");
        assert_eq!(plan.len(), 1);
        assert!(plan.steps[0].contains("Bisection"));
    }
}
