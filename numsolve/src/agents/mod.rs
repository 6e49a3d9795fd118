//! Model-backed pipeline stages.
//!
//! Every agent renders a prompt, asks the [`TextGenerator`](crate::io::generator::TextGenerator),
//! and parses a schema-checked JSON reply. Any non-fatal problem falls back to a
//! deterministic result so a run always completes.

use anyhow::{Result, anyhow};
use jsonschema::Validator;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::extract::json_block;
use crate::core::schema::violations;

pub mod classifier;
pub mod planner;
pub mod researcher;
pub mod step_agent;
pub mod synthesizer;
pub mod tools;

/// Parse the JSON object embedded in `text` and check it against `schema`.
pub(crate) fn parse_json_reply<T: DeserializeOwned>(text: &str, schema: &Validator) -> Result<T> {
    let block = json_block(text).ok_or_else(|| anyhow!("reply contains no JSON object"))?;
    let value: Value = serde_json::from_str(block).map_err(|err| anyhow!("invalid JSON: {err}"))?;
    let problems = violations(schema, &value);
    if !problems.is_empty() {
        return Err(anyhow!("reply does not match schema: {}", problems.join("; ")));
    }
    serde_json::from_value(value).map_err(|err| anyhow!("unexpected reply shape: {err}"))
}
