//! Deterministic winner selection over structured results.

use serde_json::Value;

use crate::core::types::StructuredResult;

/// Iteration count charged when a successful result does not report one.
pub const MISSING_ITERATIONS_PENALTY: f64 = 1000.0;
/// Magnitude used by the fallback tier when neither residual nor result is present.
pub const MISSING_VALUE_PENALTY: f64 = 1e9;

/// Score of a successful result (lower is better).
pub fn success_score(result: &StructuredResult) -> f64 {
    let iterations = result
        .iterations
        .map_or(MISSING_ITERATIONS_PENALTY, |it| it as f64);
    let residual = result.residual.unwrap_or(0.0).abs();
    finite_or_inf(iterations + residual)
}

/// Penalty used when no result succeeded: `|residual|`, else `|result|`, else `1e9`.
///
/// Values that do not coerce to a number are charged `+inf`.
pub fn fallback_penalty(result: &StructuredResult) -> f64 {
    if let Some(residual) = result.residual {
        return finite_or_inf(residual.abs());
    }
    match &result.result {
        Value::Null => MISSING_VALUE_PENALTY,
        other => coerce_number(other).map_or(f64::INFINITY, |v| finite_or_inf(v.abs())),
    }
}

/// Pick the best result.
///
/// Successful results are ranked by [`success_score`]. When none succeeded the
/// fallback tier ranks every result by [`fallback_penalty`]. Ties go to the
/// earliest result, so the outcome depends only on the input order. Returns
/// `None` only for an empty slice.
pub fn pick_best(results: &[StructuredResult]) -> Option<&StructuredResult> {
    let successes = results.iter().filter(|r| r.success);
    if let Some(best) = first_minimum(successes, success_score) {
        return Some(best);
    }
    first_minimum(results.iter(), fallback_penalty)
}

/// True when `pick_best` had to use the fallback tier.
pub fn is_degraded(results: &[StructuredResult]) -> bool {
    !results.iter().any(|r| r.success)
}

fn first_minimum<'a, I, F>(items: I, key: F) -> Option<&'a StructuredResult>
where
    I: Iterator<Item = &'a StructuredResult>,
    F: Fn(&StructuredResult) -> f64,
{
    let mut best: Option<(&StructuredResult, f64)> = None;
    for item in items {
        let score = key(item);
        match best {
            Some((_, best_score)) if score >= best_score => {}
            _ => best = Some((item, score)),
        }
    }
    best.map(|(item, _)| item)
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn finite_or_inf(value: f64) -> f64 {
    if value.is_nan() { f64::INFINITY } else { value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(method: &str, success: bool) -> StructuredResult {
        StructuredResult {
            method: method.to_string(),
            success,
            iterations: None,
            result: Value::Null,
            residual: None,
            error: None,
            raw_output: String::new(),
            parse_error: None,
        }
    }

    fn scored(method: &str, iterations: i64, residual: f64) -> StructuredResult {
        StructuredResult {
            iterations: Some(iterations),
            residual: Some(residual),
            ..result(method, true)
        }
    }

    #[test]
    fn lower_score_wins_between_successes() {
        let results = vec![scored("A", 20, 0.001), scored("B", 15, 0.01)];
        assert!((success_score(&results[0]) - 20.001).abs() < 1e-12);
        assert!((success_score(&results[1]) - 15.01).abs() < 1e-12);
        assert_eq!(pick_best(&results).expect("best").method, "B");
    }

    #[test]
    fn ties_go_to_the_earliest_success() {
        let results = vec![
            result("failed", false),
            scored("first", 10, 0.5),
            scored("second", 10, -0.5),
        ];
        assert_eq!(pick_best(&results).expect("best").method, "first");
    }

    #[test]
    fn any_success_beats_every_failure() {
        let mut failure = result("failed", false);
        failure.residual = Some(0.0);
        let slow = StructuredResult {
            iterations: None,
            residual: Some(5.0),
            ..result("slow", true)
        };
        let results = vec![failure, slow];
        let best = pick_best(&results).expect("best");
        assert!(best.success);
        assert_eq!(best.method, "slow");
        assert!((success_score(best) - 1005.0).abs() < 1e-12);
    }

    #[test]
    fn fallback_prefers_residual_then_result() {
        let mut first = result("first", false);
        first.residual = Some(0.05);
        let mut second = result("second", false);
        second.result = json!(0.9);
        let results = vec![first, second];
        assert!(is_degraded(&results));
        assert_eq!(pick_best(&results).expect("best").method, "first");
    }

    #[test]
    fn zero_values_are_real_values_in_the_fallback_tier() {
        let mut exact = result("exact", false);
        exact.residual = Some(0.0);
        exact.result = json!(7.5);
        let mut zero_result = result("zero_result", false);
        zero_result.result = json!(0);
        let mut false_result = result("false_result", false);
        false_result.result = json!(false);

        assert_eq!(fallback_penalty(&exact), 0.0);
        assert_eq!(fallback_penalty(&zero_result), 0.0);
        assert_eq!(fallback_penalty(&false_result), 0.0);

        let results = vec![result("empty", false), zero_result, exact];
        assert_eq!(pick_best(&results).expect("best").method, "zero_result");
    }

    #[test]
    fn non_finite_values_rank_last() {
        let mut diverged = result("diverged", false);
        diverged.residual = Some(f64::NAN);
        let mut overflow = result("overflow", false);
        overflow.result = json!("-Infinity");
        assert_eq!(fallback_penalty(&diverged), f64::INFINITY);
        assert_eq!(fallback_penalty(&overflow), f64::INFINITY);

        let blown = StructuredResult {
            iterations: Some(3),
            residual: Some(f64::NEG_INFINITY),
            ..result("blown", true)
        };
        let results = vec![blown, scored("steady", 50, 1e-8)];
        assert_eq!(pick_best(&results).expect("best").method, "steady");
    }

    #[test]
    fn fallback_charges_non_numeric_values_infinity() {
        let mut text = result("text", false);
        text.result = json!("not a number");
        let mut list = result("list", false);
        list.result = json!([1, 2]);
        let empty = result("empty", false);
        assert_eq!(fallback_penalty(&text), f64::INFINITY);
        assert_eq!(fallback_penalty(&list), f64::INFINITY);
        assert_eq!(fallback_penalty(&empty), MISSING_VALUE_PENALTY);

        let results = vec![text, list, empty];
        assert_eq!(pick_best(&results).expect("best").method, "empty");
    }

    #[test]
    fn fallback_coerces_numeric_strings() {
        let mut numeric = result("numeric", false);
        numeric.result = json!("-0.25");
        assert_eq!(fallback_penalty(&numeric), 0.25);
    }

    #[test]
    fn all_infinite_penalties_still_pick_the_first() {
        let mut a = result("a", false);
        a.result = json!({"x": 1});
        let mut b = result("b", false);
        b.result = json!("nan?");
        let results = vec![a, b];
        assert_eq!(pick_best(&results).expect("best").method, "a");
    }

    #[test]
    fn empty_input_has_no_winner() {
        assert!(pick_best(&[]).is_none());
    }

    #[test]
    fn selection_is_deterministic_for_a_given_order() {
        let results = vec![
            scored("a", 3, 0.1),
            result("b", false),
            scored("c", 2, 1.5),
            scored("d", 3, 0.1),
        ];
        let first = pick_best(&results).expect("best").method.clone();
        for _ in 0..5 {
            assert_eq!(pick_best(&results).expect("best").method, first);
        }
        assert_eq!(first, "a");
    }
}
