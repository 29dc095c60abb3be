use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::warn;
use turnbench_types::{EvaluationMetric, Transcript};

use crate::scenario::Scenario;

/// A predicate over the whole transcript, for checks pattern matching cannot express.
pub trait Validator: Send + Sync {
	fn validate(&self, transcript: &Transcript, scenario: &Scenario) -> Result<bool>;

	/// Human readable label recorded in metric details.
	fn label(&self) -> Option<&str> {
		None
	}
}

struct ClosureValidator<F> {
	f: F,
	label: Option<String>,
}

impl<F> Validator for ClosureValidator<F>
where
	F: Fn(&Transcript, &Scenario) -> Result<bool> + Send + Sync,
{
	fn validate(&self, transcript: &Transcript, scenario: &Scenario) -> Result<bool> {
		(self.f)(transcript, scenario)
	}

	fn label(&self) -> Option<&str> {
		self.label.as_deref()
	}
}

/// Wrap a closure as a `Validator`.
pub fn from_fn<F>(f: F) -> Arc<dyn Validator>
where
	F: Fn(&Transcript, &Scenario) -> Result<bool> + Send + Sync + 'static,
{
	Arc::new(ClosureValidator { f, label: None })
}

/// Wrap a closure as a `Validator` carrying a label.
pub fn labeled<F>(label: impl Into<String>, f: F) -> Arc<dyn Validator>
where
	F: Fn(&Transcript, &Scenario) -> Result<bool> + Send + Sync + 'static,
{
	Arc::new(ClosureValidator { f, label: Some(label.into()) })
}

pub fn scenario_validator_name(index: usize) -> String {
	format!("validator_{index}")
}

/// Named validators in registration order. Re-inserting a name replaces the
/// predicate and keeps its original position.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
	entries: Vec<(String, Arc<dyn Validator>)>,
}

impl ValidatorRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&mut self, name: impl Into<String>, validator: Arc<dyn Validator>) {
		let name = name.into();
		match self.entries.iter_mut().find(|(n, _)| *n == name) {
			Some(entry) => entry.1 = validator,
			None => self.entries.push((name, validator)),
		}
	}

	pub fn contains(&self, name: &str) -> bool {
		self.entries.iter().any(|(n, _)| n == name)
	}

	pub fn names(&self) -> Vec<String> {
		self.entries.iter().map(|(n, _)| n.clone()).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Validator>)> {
		self.entries.iter().map(|(n, v)| (n.as_str(), v))
	}
}

/// Runs scenario validators (as `validator_{i}`) then registered validators (under
/// their own names). Each outcome becomes one metric; an error or panic in one
/// validator yields a failing metric and the rest still run.
pub fn run_validators(
	transcript: &Transcript,
	scenario: &Scenario,
	registered: &ValidatorRegistry,
) -> Vec<EvaluationMetric> {
	let mut metrics = Vec::with_capacity(scenario.validators().len() + registered.len());

	for (i, validator) in scenario.validators().iter().enumerate() {
		metrics.push(run_one(scenario_validator_name(i), "scenario", validator.as_ref(), transcript, scenario));
	}
	for (name, validator) in registered.iter() {
		metrics.push(run_one(name.to_string(), "registered", validator.as_ref(), transcript, scenario));
	}

	metrics
}

fn run_one(
	name: String,
	source: &str,
	validator: &dyn Validator,
	transcript: &Transcript,
	scenario: &Scenario,
) -> EvaluationMetric {
	let outcome = panic::catch_unwind(AssertUnwindSafe(|| validator.validate(transcript, scenario)));

	let metric = match outcome {
		Ok(Ok(passed)) => EvaluationMetric::new(name, if passed { 1.0 } else { 0.0 }, passed),
		Ok(Err(err)) => {
			warn!(validator = %name, error = %err, "validator returned an error");
			EvaluationMetric::new(name, 0.0, false).with_detail("error", json!(format!("{err:#}")))
		}
		Err(payload) => {
			let message = format!("validator panicked: {}", panic_message(payload.as_ref()));
			warn!(validator = %name, "{message}");
			EvaluationMetric::new(name, 0.0, false).with_detail("error", json!(message))
		}
	};

	let metric = metric.with_detail("source", json!(source));
	match validator.label() {
		Some(label) => metric.with_detail("validator", json!(label)),
		None => metric,
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"unknown panic payload".to_string()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use turnbench_types::ModelResponse;

	fn transcript_with(content: &str) -> Transcript {
		let mut transcript = Transcript::new();
		transcript.add_response(ModelResponse::new(content, "mock"));
		transcript
	}

	#[test]
	fn test_scenario_validators_are_named_by_position() {
		let scenario = Scenario::builder("s", "d")
			.validator(from_fn(|_, _| Ok(true)))
			.validator(from_fn(|_, _| Ok(false)))
			.build();
		let metrics = run_validators(&Transcript::new(), &scenario, &ValidatorRegistry::new());
		assert_eq!(metrics.len(), 2);
		assert_eq!(metrics[0].name, "validator_0");
		assert!(metrics[0].passed);
		assert_eq!(metrics[0].value, 1.0);
		assert_eq!(metrics[1].name, "validator_1");
		assert!(!metrics[1].passed);
		assert_eq!(metrics[1].value, 0.0);
	}

	#[test]
	fn test_error_and_panic_are_isolated() {
		let scenario = Scenario::builder("s", "d")
			.validator(from_fn(|_, _| anyhow::bail!("inventory went negative")))
			.validator(from_fn(|_, _| panic!("boom")))
			.validator(from_fn(|t, _| Ok(t.responses.len() == 1)))
			.build();
		let metrics = run_validators(&transcript_with("hi"), &scenario, &ValidatorRegistry::new());

		assert_eq!(metrics.len(), 3);
		for failing in &metrics[..2] {
			assert!(!failing.passed);
			assert_eq!(failing.value, 0.0);
			let error = failing.details["error"].as_str().unwrap();
			assert!(!error.is_empty());
		}
		assert!(metrics[0].details["error"].as_str().unwrap().contains("inventory went negative"));
		assert!(metrics[1].details["error"].as_str().unwrap().contains("boom"));
		assert!(metrics[2].passed);
	}

	#[test]
	fn test_registered_run_after_scenario_in_registration_order() {
		let scenario = Scenario::builder("s", "d")
			.validator(from_fn(|_, _| Ok(true)))
			.build();
		let mut registry = ValidatorRegistry::new();
		registry.insert("no_apology", labeled("no apology", |t, _| {
			Ok(t.responses.iter().all(|r| !r.content.to_lowercase().contains("sorry")))
		}));
		registry.insert("non_empty", from_fn(|t, _| Ok(!t.responses.is_empty())));

		let metrics = run_validators(&transcript_with("Sorry, out of stock"), &scenario, &registry);
		let names: Vec<_> = metrics.iter().map(|m| m.name.as_str()).collect();
		assert_eq!(names, ["validator_0", "no_apology", "non_empty"]);
		assert!(!metrics[1].passed);
		assert_eq!(metrics[1].details["validator"], "no apology");
		assert_eq!(metrics[1].details["source"], "registered");
		assert!(metrics[2].passed);
	}

	#[test]
	fn test_registry_replace_keeps_position() {
		let mut registry = ValidatorRegistry::new();
		registry.insert("a", from_fn(|_, _| Ok(true)));
		registry.insert("b", from_fn(|_, _| Ok(true)));
		registry.insert("a", from_fn(|_, _| Ok(false)));
		assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

		let scenario = Scenario::builder("s", "d").build();
		let metrics = run_validators(&Transcript::new(), &scenario, &registry);
		assert!(!metrics[0].passed);
	}
}
