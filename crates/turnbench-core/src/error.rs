use thiserror::Error;
use turnbench_types::DuplicateMetricName;

/// Errors that abort an evaluation. Validator failures are not errors; they become
/// failing metrics.
#[derive(Debug, Error)]
pub enum EvalError {
    /// `metric` names the turn metric or state check that holds the pattern.
    #[error("invalid regex pattern {pattern:?} in {metric}: {source}")]
    PatternCompilation {
        pattern: String,
        turn_index: usize,
        metric: String,
        #[source]
        source: regex::Error,
    },

    #[error("transcript mismatch: scenario expects {expected} responses, transcript has {actual}")]
    TranscriptMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    DuplicateMetric(#[from] DuplicateMetricName),

    #[error("validator name {0:?} collides with a reserved metric prefix")]
    ReservedValidatorName(String),
}

impl EvalError {
    /// Attributes a pattern compilation error to `metric`.
    pub(crate) fn in_metric(self, metric: &str) -> Self {
        match self {
            EvalError::PatternCompilation { pattern, turn_index, source, .. } => EvalError::PatternCompilation {
                pattern,
                turn_index,
                metric: metric.to_string(),
                source,
            },
            other => other,
        }
    }
}
