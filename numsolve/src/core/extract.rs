//! Best-effort structural extraction from free-form model and runtime text.
//!
//! Every function here is pure and returns `None`/empty on no match; callers
//! decide the fallback. Nothing outside this module inspects raw text shapes.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static JSON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("json block regex"));
static OPENING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:python|py)?[ \t]*\r?\n").expect("fence regex"));
static CLOSING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n```[ \t]*$").expect("fence regex"));
static MISSING_MODULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No module named '([^']+)'").expect("missing module regex"));
static INTERVAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(\s*([0-9.\-]+)\s*,\s*([0-9.\-]+)\s*\)").expect("interval regex")
});
static EQUATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+?)=\s*0").expect("equation regex"));
static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n,;]+").expect("list split regex"));
static ENUMERATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("enumeration regex"));
static NON_FINITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"|-?\bInfinity\b|\bNaN\b"#).expect("non-finite regex")
});

/// Closed numeric interval `[lo, hi]` as written in a task or hint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub lo: f64,
    pub hi: f64,
}

impl Interval {
    /// Render as a domain hint, e.g. `(1,2)`.
    pub fn to_hint(self) -> String {
        format!("({},{})", self.lo, self.hi)
    }
}

/// Span from the first `{` to the last `}` (greedy, across lines).
pub fn json_block(text: &str) -> Option<&str> {
    JSON_BLOCK_RE.find(text).map(|m| m.as_str())
}

/// First line that, trimmed, both starts with `{` and ends with `}`.
pub fn first_json_line(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('{') && line.ends_with('}'))
}

/// Quote the bare `NaN`, `Infinity` and `-Infinity` tokens Python's `json`
/// module emits, so the line parses as strict JSON. String contents are
/// left untouched.
pub fn quote_non_finite(line: &str) -> Cow<'_, str> {
    NON_FINITE_RE.replace_all(line, |caps: &Captures<'_>| {
        let token = &caps[0];
        if token.starts_with('"') {
            token.to_string()
        } else {
            format!("\"{token}\"")
        }
    })
}

/// Remove a surrounding markdown code fence and trim.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = OPENING_FENCE_RE.replace(trimmed, "");
    let without_close = CLOSING_FENCE_RE.replace(&without_open, "");
    without_close.trim().to_string()
}

/// Module name from a Python `No module named '...'` error.
pub fn missing_module(error: &str) -> Option<&str> {
    MISSING_MODULE_RE
        .captures(error)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// First parenthesized numeric pair in free text, e.g. `(1, 2)`.
pub fn find_interval(text: &str) -> Option<Interval> {
    let caps = INTERVAL_RE.captures(text)?;
    let lo = caps.get(1)?.as_str().parse().ok()?;
    let hi = caps.get(2)?.as_str().parse().ok()?;
    Some(Interval { lo, hi })
}

/// Parse a domain hint of the form `(a,b)` or `[a, b]`.
pub fn parse_interval_hint(hint: &str) -> Option<Interval> {
    let trimmed = hint.trim();
    let mut chars = trimmed.chars();
    chars.next()?;
    chars.next_back()?;
    let (lo, hi) = chars.as_str().split_once(',')?;
    Some(Interval {
        lo: lo.trim().parse().ok()?,
        hi: hi.trim().parse().ok()?,
    })
}

/// Left-hand side of the first `... = 0` equation, in Python power syntax.
///
/// Anything up to the last `:` on the captured line is treated as prose.
pub fn equation_lhs(text: &str) -> Option<String> {
    let captured = EQUATION_RE.captures(text)?.get(1)?.as_str();
    let expr = captured
        .rsplit_once(':')
        .map_or(captured, |(_, rest)| rest)
        .trim();
    if expr.is_empty() {
        return None;
    }
    Some(expr.replace('^', "**"))
}

/// Split a free-text method list on newlines, commas or semicolons.
///
/// Leading enumeration (`1. `) is removed; at most `limit` names are kept.
pub fn split_method_list(text: &str, limit: usize) -> Vec<String> {
    LIST_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| ENUMERATION_RE.replace(part, "").trim().to_string())
        .filter(|part| !part.is_empty())
        .take(limit)
        .collect()
}
