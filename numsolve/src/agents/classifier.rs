//! Classification stage.

use std::sync::LazyLock;

use anyhow::Result;
use jsonschema::Validator;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::classifier::classify_heuristic;
use crate::core::schema::{CLASSIFICATION_SCHEMA, bundled};
use crate::core::types::Classification;
use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::PromptBuilder;

use super::parse_json_reply;

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| bundled(CLASSIFICATION_SCHEMA));

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    category: Option<String>,
    short_form: Option<String>,
    domain_hint: Option<String>,
    notes: Option<String>,
    original_task: Option<String>,
}

/// Classify `task`, falling back to keyword heuristics.
///
/// `original_task` is always populated: a missing or blank value in the
/// reply is replaced with `task`.
#[instrument(skip_all)]
pub async fn classify(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    task: &str,
) -> Result<Classification> {
    let prompt = prompts.classify(task)?;
    let Some(text) = generate_or_degrade(generator, &prompt, "classification").await? else {
        return Ok(classify_heuristic(task));
    };
    match parse_json_reply::<ClassificationReply>(&text, &SCHEMA) {
        Ok(reply) => {
            debug!(category = ?reply.category, "model classification");
            Ok(Classification {
                category: non_blank(reply.category),
                short_form: non_blank(reply.short_form),
                domain_hint: non_blank(reply.domain_hint),
                notes: reply.notes.unwrap_or_default(),
                original_task: non_blank(reply.original_task).unwrap_or_else(|| task.to_string()),
            })
        }
        Err(err) => {
            warn!(err = %err, "unusable classification, using keyword heuristics");
            Ok(classify_heuristic(task))
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
