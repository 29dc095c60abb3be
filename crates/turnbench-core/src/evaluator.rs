use std::sync::{Arc, RwLock};

use serde_json::json;
use tracing::debug;
use turnbench_types::{EvaluationMetric, EvaluationResult, Transcript};

use crate::error::EvalError;
use crate::scenario::{Scenario, TurnKind};
use crate::turn::{score_patterns, score_turn};
use crate::validator::{run_validators, Validator, ValidatorRegistry};

const RESERVED_PREFIXES: [&str; 3] = ["pattern_match_turn_", "state_check_", "validator_"];
const TURN_PREVIEW_CHARS: usize = 100;

/// Scores transcripts against scenarios.
///
/// Validators registered here run for every scenario evaluated by this instance.
/// Registration may happen concurrently with evaluation.
#[derive(Default)]
pub struct Evaluator {
	registered: RwLock<ValidatorRegistry>,
}

impl Evaluator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a named validator. Re-registering a name replaces the previous one.
	pub fn register_validator(&self, name: impl Into<String>, validator: Arc<dyn Validator>) -> Result<(), EvalError> {
		let name = name.into();
		if RESERVED_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
			return Err(EvalError::ReservedValidatorName(name));
		}
		self.registered
			.write()
			.unwrap_or_else(|e| e.into_inner())
			.insert(name, validator);
		Ok(())
	}

	pub fn registered_names(&self) -> Vec<String> {
		self.snapshot().names()
	}

	fn snapshot(&self) -> ValidatorRegistry {
		self.registered.read().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Evaluates `transcript` against `scenario`.
	///
	/// The transcript must hold exactly one response per responding turn. Pattern
	/// compilation failures and count mismatches abort with no result.
	pub fn evaluate(&self, transcript: &Transcript, scenario: &Scenario) -> Result<EvaluationResult, EvalError> {
		let expected = scenario.responding_turn_count();
		let actual = transcript.responses.len();
		if expected != actual {
			return Err(EvalError::TranscriptMismatch { expected, actual });
		}

		let registered = self.snapshot();
		let mut builder = EvaluationResult::builder(scenario.name(), transcript.model_name())
			.metadata("scenario_description", json!(scenario.description()))
			.metadata("responding_turns", json!(expected))
			.metadata("validator_count", json!(scenario.validators().len() + registered.len()));

		let mut response_idx = 0usize;
		let mut state_idx = 0usize;

		for turn in scenario.turns() {
			let metric = match turn.kind {
				TurnKind::UserInput => {
					let response = &transcript.responses[response_idx].content;
					let metric = score_turn(response_idx, response, &turn.expected_patterns)?;
					response_idx += 1;
					metric
				}
				TurnKind::StateCheck => {
					let name = format!("state_check_{state_idx}");
					let metric = match response_idx.checked_sub(1) {
						Some(last) => score_patterns(
							name,
							state_idx,
							&transcript.responses[last].content,
							&turn.expected_patterns,
						)?
						.with_detail("checked_response", json!(last)),
						None => EvaluationMetric::new(name, 0.0, false)
							.with_detail("error", json!("no response precedes this state check")),
					};
					state_idx += 1;
					metric
				}
			};

			let metric = metric.with_detail("turn_content", json!(preview(&turn.content)));
			debug!(metric = %metric.name, value = metric.value, passed = metric.passed, "scored turn");
			builder.add_metric(metric)?;
		}

		for metric in run_validators(transcript, scenario, &registered) {
			debug!(metric = %metric.name, passed = metric.passed, "ran validator");
			builder.add_metric(metric)?;
		}

		let result = builder.finish();
		debug!(
			scenario = %result.scenario_name(),
			pass_rate = result.pass_rate(),
			overall_passed = result.overall_passed(),
			"evaluation finished"
		);
		Ok(result)
	}
}

fn preview(content: &str) -> String {
	content.chars().take(TURN_PREVIEW_CHARS).collect()
}
