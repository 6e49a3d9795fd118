//! Metric parsing: one structured result record out of arbitrary output.
//!
//! Only the first line shaped like a JSON object is considered. Later
//! JSON-looking lines (debug dumps, intermediate tables) are ignored.
//! Python's non-finite tokens (`NaN`, `Infinity`) are accepted; a non-finite
//! residual is kept as the matching `f64`.

use std::sync::LazyLock;

use jsonschema::Validator;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

use crate::core::extract::{first_json_line, quote_non_finite};
use crate::core::schema::{STRUCTURED_RESULT_SCHEMA, bundled, violations};
use crate::core::types::StructuredResult;

static RESULT_VALIDATOR: LazyLock<Validator> =
    LazyLock::new(|| bundled(STRUCTURED_RESULT_SCHEMA));

/// Fields recovered from execution output. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMetrics {
    pub method: Option<String>,
    pub success: Option<bool>,
    pub iterations: Option<i64>,
    pub result: Value,
    pub residual: Option<f64>,
    pub error: Option<String>,
    pub parse_error: Option<String>,
}

/// Wire shape of the record line.
#[derive(Debug, Deserialize)]
struct ResultRecord {
    method: Option<String>,
    success: Option<bool>,
    #[serde(default, deserialize_with = "integral")]
    iterations: Option<i64>,
    #[serde(default)]
    result: Value,
    #[serde(default, deserialize_with = "float_or_token")]
    residual: Option<f64>,
    error: Option<String>,
}

/// Integer counts, also written as integral floats (`12.0`).
fn integral<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(value) = number.as_i64() {
        return Ok(Some(value));
    }
    match number.as_f64() {
        Some(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Ok(Some(value as i64))
        }
        _ => Err(D::Error::custom(format!("expected an integral count, got {number}"))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireFloat {
    Number(f64),
    Token(String),
}

/// A number, or one of the quoted non-finite tokens.
fn float_or_token<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<WireFloat>::deserialize(deserializer)? {
        None => Ok(None),
        Some(WireFloat::Number(value)) => Ok(Some(value)),
        Some(WireFloat::Token(token)) => token
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got `{token}`"))),
    }
}

impl ParsedMetrics {
    fn parse_failure(message: impl Into<String>) -> Self {
        Self {
            parse_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Merge into a full result; the record's `method` overrides the candidate name.
    pub fn into_result(self, candidate: &str, raw_output: String) -> StructuredResult {
        StructuredResult {
            method: self.method.unwrap_or_else(|| candidate.to_string()),
            success: self.success.unwrap_or(false),
            iterations: self.iterations,
            result: self.result,
            residual: self.residual,
            error: self.error,
            raw_output,
            parse_error: self.parse_error,
        }
    }
}

/// Parse the first JSON-object line of `raw_output`.
pub fn parse_metrics(raw_output: &str) -> ParsedMetrics {
    let Some(line) = first_json_line(raw_output) else {
        return ParsedMetrics::parse_failure("no json line");
    };

    let value: Value = match serde_json::from_str(&quote_non_finite(line)) {
        Ok(value) => value,
        Err(err) => return ParsedMetrics::parse_failure(err.to_string()),
    };
    let problems = violations(&RESULT_VALIDATOR, &value);
    if !problems.is_empty() {
        return ParsedMetrics::parse_failure(format!(
            "result record does not match schema: {}",
            problems.join("; ")
        ));
    }
    match serde_json::from_value::<ResultRecord>(value) {
        Ok(record) => ParsedMetrics {
            method: record.method,
            success: record.success,
            iterations: record.iterations,
            result: record.result,
            residual: record.residual,
            error: record.error,
            parse_error: None,
        },
        Err(err) => ParsedMetrics::parse_failure(err.to_string()),
    }
}
