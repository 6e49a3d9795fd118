//! Deterministic keyword classification of task text.
//!
//! Used when the model's classification is unusable. Keywords cover English
//! and Vietnamese phrasings of the supported problem families.

use serde::{Deserialize, Serialize};

use crate::core::extract::{equation_lhs, find_interval};
use crate::core::types::Classification;

/// Problem families recognised by the keyword heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    RootFinding,
    LinearSystem,
    Integration,
    OdeIvp,
    Pde,
    OptimizationUnconstrained,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::RootFinding => "root_finding",
            Category::LinearSystem => "linear_system",
            Category::Integration => "integration",
            Category::OdeIvp => "ode_ivp",
            Category::Pde => "pde",
            Category::OptimizationUnconstrained => "optimization_unconstrained",
            Category::Other => "other",
        }
    }
}

/// Checked in order; the first family with a matching keyword wins.
const RULES: &[(Category, &[&str])] = &[
    (Category::Integration, &["tích phân", "integral", "integrate"]),
    (
        Category::LinearSystem,
        &["hệ phương trình", "ma trận", "linear system", "matrix"],
    ),
    (
        Category::OdeIvp,
        &["phương trình vi phân", "differential equation", "initial value"],
    ),
    (Category::Pde, &["partial differential"]),
    (
        Category::RootFinding,
        &["tìm nghiệm", "giải phương trình", "= 0", "root of", "solve the equation"],
    ),
    (
        Category::OptimizationUnconstrained,
        &["tối ưu", "cực trị", "minimize", "maximize", "optimiz"],
    ),
];

/// Standalone words that identify a family but are too short for substring matching.
const WORD_RULES: &[(Category, &str)] = &[(Category::OdeIvp, "ode"), (Category::Pde, "pde")];

/// Classify task text by keyword.
pub fn classify_keywords(task: &str) -> Category {
    let lower = task.to_lowercase();
    for (category, keywords) in RULES {
        let word_hit = WORD_RULES
            .iter()
            .any(|(c, word)| c == category && has_word(&lower, word));
        if word_hit || keywords.iter().any(|keyword| lower.contains(keyword)) {
            return *category;
        }
    }
    Category::Other
}

/// Heuristic classification with expression and interval extraction.
pub fn classify_heuristic(task: &str) -> Classification {
    Classification {
        category: Some(classify_keywords(task).as_str().to_string()),
        short_form: equation_lhs(task),
        domain_hint: find_interval(task).map(|interval| interval.to_hint()),
        notes: "fallback".to_string(),
        original_task: task.to_string(),
    }
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}
