use regex::RegexBuilder;
use turnbench_types::{ExpectedPattern, MatchMode};

use crate::error::EvalError;
use crate::turn::turn_metric_name;

/// Checks whether `pattern` occurs in `text`, ignoring case.
///
/// Literal patterns use plain substring containment. Regex patterns are compiled
/// case-insensitively and searched anywhere in the text. A regex that does not compile
/// is an error carrying `turn_index`, never a silent non-match.
pub fn matches(text: &str, pattern: &ExpectedPattern, turn_index: usize) -> Result<bool, EvalError> {
    match pattern.mode {
        MatchMode::Literal => Ok(text
            .to_lowercase()
            .contains(&pattern.value.to_lowercase())),
        MatchMode::Regex => {
            let regex = RegexBuilder::new(&pattern.value)
                .case_insensitive(true)
                .build()
                .map_err(|source| EvalError::PatternCompilation {
                    pattern: pattern.value.clone(),
                    turn_index,
                    metric: turn_metric_name(turn_index),
                    source,
                })?;
            Ok(regex.is_match(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_case_insensitive() {
        let pattern = ExpectedPattern::literal("answer");
        assert!(matches("The Answer Is 8", &pattern, 0).unwrap());
        assert!(matches("the answer is 8", &ExpectedPattern::literal("ANSWER"), 0).unwrap());
    }

    #[test]
    fn test_literal_not_token_aware() {
        let pattern = ExpectedPattern::literal("cat");
        assert!(matches("concatenate", &pattern, 0).unwrap());
        assert!(!matches("dog", &pattern, 0).unwrap());
    }

    #[test]
    fn test_literal_keeps_regex_metacharacters() {
        let pattern = ExpectedPattern::literal("$3.50");
        assert!(matches("Your change is $3.50", &pattern, 0).unwrap());
        assert!(!matches("Your change is $3X50", &pattern, 0).unwrap());
    }

    #[test]
    fn test_regex_price() {
        let pattern = ExpectedPattern::regex(r"\$\d+\.\d{2}");
        assert!(matches("Price: $3.50", &pattern, 0).unwrap());
        assert!(!matches("Price: 3.50", &pattern, 0).unwrap());
    }

    #[test]
    fn test_regex_unanchored_and_case_insensitive() {
        let pattern = ExpectedPattern::regex(r"out of stock");
        assert!(matches("Sorry, A2 is OUT OF STOCK today.", &pattern, 0).unwrap());
    }

    #[test]
    fn test_malformed_regex_is_an_error() {
        let pattern = ExpectedPattern::regex("[unclosed");
        let err = matches("anything", &pattern, 3).unwrap_err();
        match err {
            EvalError::PatternCompilation { pattern, turn_index, metric, .. } => {
                assert_eq!(pattern, "[unclosed");
                assert_eq!(turn_index, 3);
                assert_eq!(metric, "pattern_match_turn_3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_literal_is_fine() {
        let pattern = ExpectedPattern::literal("[unclosed");
        assert!(matches("text with [unclosed bracket", &pattern, 0).unwrap());
    }
}
