use serde_json::json;
use turnbench_types::{EvaluationMetric, ExpectedPattern};

use crate::error::EvalError;
use crate::matcher::matches;

pub fn turn_metric_name(turn_index: usize) -> String {
    format!("pattern_match_turn_{turn_index}")
}

/// Scores the `turn_index`-th responding turn against its expected patterns.
pub fn score_turn(
    turn_index: usize,
    response: &str,
    expected_patterns: &[ExpectedPattern],
) -> Result<EvaluationMetric, EvalError> {
    score_patterns(turn_metric_name(turn_index), turn_index, response, expected_patterns)
}

/// Partitions `expected_patterns` into matched and missing, in declaration order.
///
/// `value` is the exact matched fraction; the metric passes only when every pattern
/// matched. No patterns means a trivial pass.
pub fn score_patterns(
    name: String,
    turn_index: usize,
    response: &str,
    expected_patterns: &[ExpectedPattern],
) -> Result<EvaluationMetric, EvalError> {
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    for pattern in expected_patterns {
        if matches(response, pattern, turn_index).map_err(|err| err.in_metric(&name))? {
            matched.push(pattern.value.clone());
        } else {
            missing.push(pattern.value.clone());
        }
    }

    let total = expected_patterns.len();
    let value = if total == 0 {
        1.0
    } else {
        matched.len() as f64 / total as f64
    };
    let passed = missing.is_empty();

    Ok(EvaluationMetric::new(name, value, passed)
        .with_detail("matched", json!(matched))
        .with_detail("missing", json!(missing)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patterns_trivially_pass() {
        let metric = score_turn(2, "whatever", &[]).unwrap();
        assert_eq!(metric.name, "pattern_match_turn_2");
        assert_eq!(metric.value, 1.0);
        assert!(metric.passed);
        assert_eq!(metric.details["matched"], json!([]));
        assert_eq!(metric.details["missing"], json!([]));
    }

    #[test]
    fn test_partial_credit_does_not_pass() {
        let patterns = vec![
            ExpectedPattern::literal("chips"),
            ExpectedPattern::literal("soda"),
            ExpectedPattern::literal("water"),
        ];
        let metric = score_turn(0, "We have Chips and Water.", &patterns).unwrap();
        assert_eq!(metric.value, 2.0 / 3.0);
        assert!(!metric.passed);
        assert_eq!(metric.details["matched"], json!(["chips", "water"]));
        assert_eq!(metric.details["missing"], json!(["soda"]));
    }

    #[test]
    fn test_all_match_passes() {
        let patterns = vec![
            ExpectedPattern::literal("change"),
            ExpectedPattern::regex(r"\$3\.50"),
        ];
        let metric = score_turn(1, "Here is your change: $3.50", &patterns).unwrap();
        assert_eq!(metric.value, 1.0);
        assert!(metric.passed);
    }

    #[test]
    fn test_none_match() {
        let patterns = vec![ExpectedPattern::literal("$5.00")];
        let metric = score_turn(0, "No price information", &patterns).unwrap();
        assert_eq!(metric.value, 0.0);
        assert!(!metric.passed);
        assert_eq!(metric.details["missing"], json!(["$5.00"]));
    }

    #[test]
    fn test_value_is_exact_quotient() {
        let patterns: Vec<ExpectedPattern> = ["a", "b", "c", "zzz", "yyy", "xxx", "www"]
            .into_iter()
            .map(ExpectedPattern::literal)
            .collect();
        let metric = score_turn(0, "abc", &patterns).unwrap();
        assert_eq!(metric.value, 3.0 / 7.0);
        assert_eq!(metric.passed, metric.value == 1.0);
    }

    #[test]
    fn test_adding_a_matching_pattern_never_lowers_value() {
        let mut patterns = vec![ExpectedPattern::literal("apple"), ExpectedPattern::literal("kiwi")];
        let before = score_turn(0, "apple pie", &patterns).unwrap().value;
        patterns.push(ExpectedPattern::literal("pie"));
        let after = score_turn(0, "apple pie", &patterns).unwrap().value;
        assert!(after >= before);
    }

    #[test]
    fn test_regex_error_propagates_with_turn_index() {
        let patterns = vec![ExpectedPattern::literal("ok"), ExpectedPattern::regex("(")];
        let err = score_turn(4, "ok", &patterns).unwrap_err();
        assert!(matches!(err, EvalError::PatternCompilation { turn_index: 4, .. }));
        assert!(err.to_string().contains("in pattern_match_turn_4"));
    }

    #[test]
    fn test_regex_error_names_the_metric() {
        let patterns = vec![ExpectedPattern::regex("[unclosed")];
        let err = score_patterns("state_check_0".to_string(), 0, "ok", &patterns).unwrap_err();
        match &err {
            EvalError::PatternCompilation { metric, .. } => assert_eq!(metric, "state_check_0"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("in state_check_0"));
    }
}
