//! Prompt builder for every model call in the pipeline.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When a rendered prompt exceeds the byte budget, droppable sections go first
//! and the last remaining section is truncated.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, Value, context};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::core::types::Classification;

const TEMPLATES: &[(&str, &str)] = &[
    ("classify", include_str!("prompts/classify.md")),
    ("research", include_str!("prompts/research.md")),
    ("methods", include_str!("prompts/methods.md")),
    ("code", include_str!("prompts/code.md")),
    ("install", include_str!("prompts/install.md")),
    ("plan", include_str!("prompts/plan.md")),
    ("step", include_str!("prompts/step.md")),
    ("final", include_str!("prompts/final.md")),
];

/// Droppable sections, least important first.
const DROP_ORDER: &[&str] = &["transcript", "hints"];

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)
            .expect("bundled prompt template should be valid");
    }
    env
});

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("valid section regex")
});

/// Inputs for a code-synthesis prompt.
#[derive(Debug, Clone)]
pub struct CodeRequest<'a> {
    pub method: &'a str,
    pub task: &'a str,
    pub short_form: Option<&'a str>,
    pub domain_hint: Option<&'a str>,
    pub tol: f64,
    pub maxiter: u32,
}

/// Tool listing shown to the step agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}

/// One tool call and what it returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub tool: String,
    pub input: String,
    pub observation: String,
}

/// Inputs for one step-agent turn.
#[derive(Debug, Clone)]
pub struct StepPrompt<'a> {
    pub task: &'a str,
    /// Full plan with results of earlier steps.
    pub annotated_plan: &'a str,
    pub step: &'a str,
    pub tools: &'a [ToolSummary],
    pub transcript: &'a [TranscriptEntry],
    pub calls_left: u32,
}

#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(matches.len());

    for (i, caps) in matches.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(rendered.len());
        let required = kind.as_str() == "required";
        let content = rendered[marker.end()..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len = |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = *key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    let Some(last) = sections.last_mut() else {
        return;
    };
    if total <= budget {
        return;
    }
    let allowed = budget.saturating_sub(total - last.content.len());
    let before_len = last.content.len();
    const MARKER: &str = "\n[truncated]";
    if allowed > MARKER.len() {
        truncate_on_char_boundary(&mut last.content, allowed - MARKER.len());
        last.content.push_str(MARKER);
    } else {
        truncate_on_char_boundary(&mut last.content, allowed);
    }
    debug!(
        section = last.key,
        before_len,
        after_len = last.content.len(),
        "truncated section for budget"
    );
}

fn truncate_on_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds prompts within a byte budget.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    fn build(&self, name: &str, ctx: Value) -> Result<String> {
        let rendered = ENV
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .with_context(|| format!("render {name} prompt"))?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }

    pub fn classify(&self, task: &str) -> Result<String> {
        self.build("classify", context! { task => task.trim() })
    }

    pub fn research(&self, task: &str, classification: &Classification) -> Result<String> {
        self.build(
            "research",
            context! {
                task => task.trim(),
                category => classification.category.as_deref(),
                short_form => classification.short_form.as_deref(),
                domain_hint => classification.domain_hint.as_deref(),
            },
        )
    }

    pub fn methods(&self, task: &str) -> Result<String> {
        self.build("methods", context! { task => task.trim() })
    }

    pub fn code(&self, request: &CodeRequest<'_>) -> Result<String> {
        self.build(
            "code",
            context! {
                method => request.method,
                task => request.task.trim(),
                short_form => request.short_form.filter(|s| !s.trim().is_empty()),
                domain_hint => request.domain_hint.filter(|s| !s.trim().is_empty()),
                tol => request.tol,
                maxiter => request.maxiter,
            },
        )
    }

    pub fn install(&self, module: &str) -> Result<String> {
        self.build("install", context! { module => module })
    }

    pub fn plan(
        &self,
        task: &str,
        method: &str,
        classification: Option<&Classification>,
    ) -> Result<String> {
        self.build(
            "plan",
            context! {
                task => task.trim(),
                method => method,
                short_form => classification.and_then(|c| c.short_form.as_deref()),
                domain_hint => classification.and_then(|c| c.domain_hint.as_deref()),
            },
        )
    }

    pub fn step(&self, input: &StepPrompt<'_>) -> Result<String> {
        self.build(
            "step",
            context! {
                task => input.task.trim(),
                plan => input.annotated_plan.trim(),
                step => input.step.trim(),
                tools => input.tools,
                transcript => input.transcript,
                calls_left => input.calls_left,
            },
        )
    }

    pub fn final_answer(&self, task: &str, annotated_plan: &str) -> Result<String> {
        self.build(
            "final",
            context! { task => task.trim(), plan => annotated_plan.trim() },
        )
    }
}
