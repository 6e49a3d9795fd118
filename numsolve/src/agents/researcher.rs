//! Candidate proposal stage.

use std::sync::LazyLock;

use anyhow::Result;
use jsonschema::Validator;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::core::catalog::candidate_methods;
use crate::core::extract::split_method_list;
use crate::core::schema::{RESEARCH_SCHEMA, bundled};
use crate::core::types::{Classification, Research};
use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::PromptBuilder;

use super::parse_json_reply;

static SCHEMA: LazyLock<Validator> = LazyLock::new(|| bundled(RESEARCH_SCHEMA));

#[derive(Debug, Deserialize)]
struct ResearchReply {
    candidate_methods: Vec<String>,
    reasoning: Option<String>,
    research_actions: Option<String>,
}

/// Propose candidate methods for a classified task.
///
/// Falls back to the static catalog for the classification's category
/// (root finding when unknown), capped at `catalog_limit` entries.
#[instrument(skip_all, fields(category = ?classification.category))]
pub async fn research(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    task: &str,
    classification: &Classification,
    catalog_limit: usize,
) -> Result<Research> {
    let prompt = prompts.research(task, classification)?;
    if let Some(text) = generate_or_degrade(generator, &prompt, "research").await? {
        match parse_json_reply::<ResearchReply>(&text, &SCHEMA) {
            Ok(reply) => {
                let methods = clean_names(reply.candidate_methods);
                if !methods.is_empty() {
                    debug!(?methods, "model proposed methods");
                    return Ok(Research {
                        candidate_methods: methods,
                        reasoning: reply.reasoning.unwrap_or_default(),
                        research_actions: reply.research_actions.unwrap_or_default(),
                    });
                }
                warn!("research reply listed no usable methods");
            }
            Err(err) => warn!(err = %err, "unusable research reply"),
        }
    }
    let methods = candidate_methods(classification.category.as_deref(), catalog_limit);
    info!(?methods, "using catalog methods");
    Ok(Research {
        candidate_methods: methods,
        ..Research::default()
    })
}

/// Ask for a free-text method list when no classification-driven research ran.
///
/// Returns at most `limit` names; empty when the model gives nothing usable.
#[instrument(skip_all, fields(limit))]
pub async fn propose_methods(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    task: &str,
    limit: usize,
) -> Result<Vec<String>> {
    let prompt = prompts.methods(task)?;
    let Some(text) = generate_or_degrade(generator, &prompt, "method proposal").await? else {
        return Ok(Vec::new());
    };
    Ok(split_method_list(&text, limit))
}

fn clean_names(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;

    fn classification(category: Option<&str>) -> Classification {
        Classification {
            category: category.map(str::to_string),
            short_form: Some("x**3 - x - 1".to_string()),
            domain_hint: Some("(1,2)".to_string()),
            notes: String::new(),
            original_task: "task".to_string(),
        }
    }

    #[tokio::test]
    async fn model_methods_are_used_verbatim() {
        let generator = ScriptedGenerator::new().respond(
            "### Research Contract",
            r#"{"candidate_methods": ["Secant", " Bisection "], "reasoning": "bracketed", "research_actions": null}"#,
        );
        let research = research(
            &generator,
            PromptBuilder::new(10_000),
            "task",
            &classification(Some("root_finding")),
            6,
        )
        .await
        .expect("research");
        assert_eq!(research.candidate_methods, ["Secant", "Bisection"]);
        assert_eq!(research.reasoning, "bracketed");
        assert_eq!(research.research_actions, "");
    }

    #[tokio::test]
    async fn empty_method_list_uses_catalog() {
        let generator =
            ScriptedGenerator::new().respond("### Research Contract", r#"{"candidate_methods": []}"#);
        let research = research(
            &generator,
            PromptBuilder::new(10_000),
            "task",
            &classification(Some("integration")),
            6,
        )
        .await
        .expect("research");
        assert_eq!(
            research.candidate_methods,
            candidate_methods(Some("integration"), 6)
        );
    }

    #[tokio::test]
    async fn degraded_generation_with_unknown_category_uses_root_finding() {
        let generator = ScriptedGenerator::new();
        let research = research(
            &generator,
            PromptBuilder::new(10_000),
            "task",
            &classification(None),
            6,
        )
        .await
        .expect("research");
        assert_eq!(research.candidate_methods.first().map(String::as_str), Some("Bisection"));
    }

    #[tokio::test]
    async fn method_list_is_split_and_capped() {
        let generator = ScriptedGenerator::new()
            .respond("### Method Proposal Contract", "1. Bisection\n2. Secant, Newton; Brent");
        let methods = propose_methods(&generator, PromptBuilder::new(10_000), "task", 3)
            .await
            .expect("propose");
        assert_eq!(methods, ["Bisection", "Secant", "Newton"]);
    }
}
