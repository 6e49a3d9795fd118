//! JSON Schema checks for bundled wire formats.

use anyhow::{Context, Result, anyhow};
use jsonschema::{Draft, Validator};
use serde_json::Value;

pub const STRUCTURED_RESULT_SCHEMA: &str =
    include_str!("../../schemas/structured_result.schema.json");
pub const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");
pub const CLASSIFICATION_SCHEMA: &str = include_str!("../../schemas/classification.schema.json");
pub const RESEARCH_SCHEMA: &str = include_str!("../../schemas/research.schema.json");

/// Compile a schema (Draft 2020-12).
pub fn compile(raw: &str) -> Result<Validator> {
    let schema: Value = serde_json::from_str(raw).context("parse json schema")?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("compile json schema: {err}"))
}

/// Compile a bundled schema. Bundled schemas are compile-time constants.
pub(crate) fn bundled(raw: &'static str) -> Validator {
    compile(raw).expect("bundled schema should compile")
}

/// Violation messages for `instance`; empty when it conforms.
pub fn violations(validator: &Validator, instance: &Value) -> Vec<String> {
    validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect()
}
