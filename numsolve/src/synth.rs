//! Candidate synthesis: model-written code with a hand-written fallback.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::{debug, info, instrument, warn};

use crate::core::extract::{parse_interval_hint, strip_code_fences};
use crate::io::generator::{TextGenerator, generate_or_degrade};
use crate::io::prompt::{CodeRequest, PromptBuilder};

static FALLBACKS: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("bisection", include_str!("templates/bisection.py"))
        .expect("bisection template should be valid");
    env.add_template("secant", include_str!("templates/secant.py"))
        .expect("secant template should be valid");
    env
});

/// Bracket used by the bisection fallback when no domain hint parses.
pub const DEFAULT_BRACKET: (f64, f64) = (-10.0, 10.0);
/// Starting points of the secant fallback.
pub const SECANT_START: (f64, f64) = (1.0, 2.0);

/// Hand-written implementations used when generation is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackTemplate {
    Bisection,
    Secant,
}

impl FallbackTemplate {
    /// Bisection for bisection-named methods; Secant for everything else.
    pub fn for_method(method: &str) -> Self {
        if method.to_lowercase().contains("bisection") {
            FallbackTemplate::Bisection
        } else {
            FallbackTemplate::Secant
        }
    }
}

/// Where the synthesized code came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeSource {
    Generated,
    Fallback(FallbackTemplate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedCode {
    pub code: String,
    pub source: CodeSource,
}

/// Generated code is accepted only if it prints something JSON-shaped.
pub fn is_usable_code(code: &str) -> bool {
    !code.trim().is_empty() && code.contains("print") && code.contains("json")
}

/// Produce code for one candidate method.
///
/// Non-fatal generation failures and unusable replies yield fallback code.
#[instrument(skip_all, fields(method = request.method))]
pub async fn synthesize(
    generator: &dyn TextGenerator,
    prompts: PromptBuilder,
    request: &CodeRequest<'_>,
) -> Result<SynthesizedCode> {
    let prompt = prompts.code(request)?;
    if let Some(text) = generate_or_degrade(generator, &prompt, "candidate code").await? {
        let code = strip_code_fences(&text);
        if is_usable_code(&code) {
            debug!(code_bytes = code.len(), "using generated code");
            return Ok(SynthesizedCode {
                code,
                source: CodeSource::Generated,
            });
        }
        warn!("generated code lacks a JSON print, using fallback template");
    }
    let template = FallbackTemplate::for_method(request.method);
    info!(?template, "rendering fallback template");
    Ok(SynthesizedCode {
        code: fallback_code(template, request)?,
        source: CodeSource::Fallback(template),
    })
}

/// Render a fallback template for the request's expression and limits.
pub fn fallback_code(template: FallbackTemplate, request: &CodeRequest<'_>) -> Result<String> {
    let expr = request
        .short_form
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("None");
    let tol = py_float(request.tol);
    let rendered = match template {
        FallbackTemplate::Bisection => {
            let (a, b) = request
                .domain_hint
                .and_then(parse_interval_hint)
                .map(|interval| (interval.lo, interval.hi))
                .unwrap_or(DEFAULT_BRACKET);
            FALLBACKS.get_template("bisection")?.render(context! {
                expr => expr,
                a => py_float(a),
                b => py_float(b),
                tol => tol,
                maxiter => request.maxiter,
            })
        }
        FallbackTemplate::Secant => FALLBACKS.get_template("secant")?.render(context! {
            expr => expr,
            x0 => py_float(SECANT_START.0),
            x1 => py_float(SECANT_START.1),
            tol => tol,
            maxiter => request.maxiter,
        }),
    };
    rendered.with_context(|| format!("render {template:?} fallback"))
}

/// Float literal Python parses back to the same value.
fn py_float(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;

    fn request<'a>(method: &'a str, domain_hint: Option<&'a str>) -> CodeRequest<'a> {
        CodeRequest {
            method,
            task: "Find the root of x**3 - x - 1 = 0 on (1, 2)",
            short_form: Some("x**3 - x - 1"),
            domain_hint,
            tol: 1e-6,
            maxiter: 200,
        }
    }

    #[test]
    fn usable_code_needs_print_and_json() {
        assert!(is_usable_code("import json\nprint(json.dumps({}))"));
        assert!(!is_usable_code("print(42)"));
        assert!(!is_usable_code("import json"));
        assert!(!is_usable_code(""));
    }

    #[test]
    fn unknown_methods_get_secant() {
        assert_eq!(FallbackTemplate::for_method("Bisection"), FallbackTemplate::Bisection);
        assert_eq!(FallbackTemplate::for_method("bisection method"), FallbackTemplate::Bisection);
        assert_eq!(FallbackTemplate::for_method("Newton-Raphson"), FallbackTemplate::Secant);
    }

    #[test]
    fn bisection_uses_domain_hint_bracket() {
        let code = fallback_code(FallbackTemplate::Bisection, &request("Bisection", Some("(1,2)")))
            .expect("render");
        assert!(code.contains("a, b = 1.0, 2.0"));
        assert!(code.contains("return x**3 - x - 1"));
        assert!(code.contains("while it < 200:"));
        assert!(code.contains("< 1e-6"));
        assert!(code.contains("\"method\": \"Bisection\""));
    }

    #[test]
    fn bisection_defaults_bracket_without_hint() {
        let code = fallback_code(FallbackTemplate::Bisection, &request("Bisection", Some("near one")))
            .expect("render");
        assert!(code.contains("a, b = -10.0, 10.0"));
    }

    #[test]
    fn missing_expression_renders_none() {
        let mut req = request("Secant", None);
        req.short_form = None;
        let code = fallback_code(FallbackTemplate::Secant, &req).expect("render");
        assert!(code.contains("return None"));
        assert!(code.contains("x0, x1 = 1.0, 2.0"));
        assert!(code.contains("\"method\": \"Secant\""));
    }

    #[tokio::test]
    async fn fenced_generated_code_is_used() {
        let generator = ScriptedGenerator::new().respond(
            "### Code Contract",
            "```python\nimport json\nprint(json.dumps({\"method\": \"Newton\", \"success\": True}))\n```",
        );
        let synthesized = synthesize(&generator, PromptBuilder::new(10_000), &request("Newton", None))
            .await
            .expect("synthesize");
        assert_eq!(synthesized.source, CodeSource::Generated);
        assert!(synthesized.code.starts_with("import json"));
        assert!(!synthesized.code.contains("```"));
    }

    #[tokio::test]
    async fn prose_reply_falls_back() {
        let generator = ScriptedGenerator::new().respond("### Code Contract", "I cannot help with that.");
        let synthesized =
            synthesize(&generator, PromptBuilder::new(10_000), &request("Bisection", Some("(1,2)")))
                .await
                .expect("synthesize");
        assert_eq!(
            synthesized.source,
            CodeSource::Fallback(FallbackTemplate::Bisection)
        );
    }

    #[tokio::test]
    async fn unavailable_generator_propagates() {
        let generator = ScriptedGenerator::unavailable();
        let err = synthesize(&generator, PromptBuilder::new(10_000), &request("Secant", None))
            .await
            .unwrap_err();
        assert!(crate::io::generator::is_unavailable(&err));
    }
}
