//! Shared records passed between pipeline stages.
//!
//! These types are fixed-shape contracts: every optional field is an explicit
//! `Option`, never an open-ended key/value bag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One proposed solution method under evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub method_name: String,
}

impl Candidate {
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
        }
    }
}

/// Standardized outcome of executing one candidate's generated code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    /// Method name; the record's own `method` field overrides the candidate name.
    pub method: String,
    pub success: bool,
    pub iterations: Option<i64>,
    /// Numeric answer or any JSON value the script reported (`Null` when absent).
    #[serde(default)]
    pub result: Value,
    pub residual: Option<f64>,
    pub error: Option<String>,
    /// Captured execution output the record was parsed from.
    pub raw_output: String,
    pub parse_error: Option<String>,
}

impl StructuredResult {
    /// Result for a candidate whose execution failed before producing a record.
    pub fn execution_failed(method: &str, raw_output: String, error: String) -> Self {
        Self {
            method: method.to_string(),
            success: false,
            iterations: None,
            result: Value::Null,
            residual: None,
            error: Some(error),
            raw_output,
            parse_error: None,
        }
    }
}

/// Ordered natural-language steps for the selected method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<String>,
}

impl Plan {
    pub fn new(steps: Vec<String>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Problem classification used to steer research and code synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Option<String>,
    /// Symbolic expression in Python syntax, e.g. `x**3 - x - 1`.
    pub short_form: Option<String>,
    /// Interval hint formatted `(a,b)`.
    pub domain_hint: Option<String>,
    pub notes: String,
    /// Verbatim task text. Always populated.
    pub original_task: String,
}

/// Candidate methods proposed for a classified problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Research {
    pub candidate_methods: Vec<String>,
    pub reasoning: String,
    pub research_actions: String,
}

impl Research {
    /// Candidates in proposal order.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidate_methods
            .iter()
            .map(|name| Candidate::new(name.as_str()))
            .collect()
    }
}
