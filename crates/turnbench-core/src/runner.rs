use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tabled::{Table, Tabled};
use tracing::{info, warn};
use turnbench_types::{EvaluationResult, Transcript};

use crate::adapter::ModelAdapter;
use crate::conversation::ConversationManager;
use crate::evaluator::Evaluator;
use crate::scenario::Scenario;

pub struct BenchBuilder {
	adapter: Option<Arc<dyn ModelAdapter>>,
	scenarios: Vec<Scenario>,
	evaluator: Option<Arc<Evaluator>>,
	concurrency: usize,
}

impl BenchBuilder {
	pub fn new() -> Self {
		Self {
			adapter: None,
			scenarios: Vec::new(),
			evaluator: None,
			concurrency: 4,
		}
	}

	pub fn adapter(mut self, adapter: Arc<dyn ModelAdapter>) -> Self {
		self.adapter = Some(adapter);
		self
	}

	pub fn scenarios<I>(mut self, scenarios: I) -> Self
	where
		I: IntoIterator<Item = Scenario>,
	{
		self.scenarios = scenarios.into_iter().collect();
		self
	}

	pub fn add_scenario(mut self, scenario: Scenario) -> Self {
		self.scenarios.push(scenario);
		self
	}

	/// Shares an evaluator (and its registered validators) with the bench.
	pub fn evaluator(mut self, evaluator: Arc<Evaluator>) -> Self {
		self.evaluator = Some(evaluator);
		self
	}

	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	pub fn build(self) -> Result<Bench> {
		Ok(Bench {
			adapter: self.adapter.ok_or_else(|| anyhow::anyhow!("adapter must be set"))?,
			scenarios: self.scenarios,
			evaluator: self.evaluator.unwrap_or_default(),
			concurrency: self.concurrency,
		})
	}
}

impl Default for BenchBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Runs a set of scenarios against one model adapter and evaluates each transcript.
pub struct Bench {
	adapter: Arc<dyn ModelAdapter>,
	scenarios: Vec<Scenario>,
	evaluator: Arc<Evaluator>,
	concurrency: usize,
}

#[derive(Debug)]
pub struct ScenarioRun {
	pub transcript: Transcript,
	pub result: EvaluationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
	Conversation,
	Evaluation,
}

impl fmt::Display for FailureKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FailureKind::Conversation => f.write_str("conversation"),
			FailureKind::Evaluation => f.write_str("evaluation"),
		}
	}
}

/// A scenario that produced no result.
#[derive(Debug, Clone)]
pub struct ScenarioFailure {
	pub scenario: String,
	pub kind: FailureKind,
	pub error: String,
}

#[derive(Debug, Default)]
pub struct BenchReport {
	pub runs: Vec<ScenarioRun>,
	pub failures: Vec<ScenarioFailure>,
}

enum Outcome {
	Run(ScenarioRun),
	Failed(ScenarioFailure),
}

impl Bench {
	pub fn builder() -> BenchBuilder {
		BenchBuilder::new()
	}

	pub fn evaluator(&self) -> &Arc<Evaluator> {
		&self.evaluator
	}

	/// Runs every scenario. Per-scenario failures are collected, never propagated.
	pub async fn run(&self) -> BenchReport {
		info!(
			model = %self.adapter.model_name(),
			scenarios = self.scenarios.len(),
			concurrency = self.concurrency,
			"starting bench"
		);

		let manager = Arc::new(ConversationManager::new(self.adapter.clone()));
		let evaluator = self.evaluator.clone();
		let stream = stream::iter(self.scenarios.iter()).map(move |scenario| {
			let manager = manager.clone();
			let evaluator = evaluator.clone();
			async move { run_one(&manager, &evaluator, scenario).await }
		});

		let outcomes: Vec<Outcome> = stream.buffered(self.concurrency).collect().await;

		let mut report = BenchReport::default();
		for outcome in outcomes {
			match outcome {
				Outcome::Run(run) => report.runs.push(run),
				Outcome::Failed(failure) => report.failures.push(failure),
			}
		}

		info!(
			completed = report.runs.len(),
			failed = report.failures.len(),
			pass_rate = report.aggregate_pass_rate(),
			"bench finished"
		);
		report
	}
}

async fn run_one(manager: &ConversationManager, evaluator: &Evaluator, scenario: &Scenario) -> Outcome {
	let transcript = match manager.run_scenario(scenario).await {
		Ok(transcript) => transcript,
		Err(err) => {
			warn!(scenario = %scenario.name(), error = %err, "conversation failed");
			return Outcome::Failed(ScenarioFailure {
				scenario: scenario.name().to_string(),
				kind: FailureKind::Conversation,
				error: format!("{err:#}"),
			});
		}
	};

	match evaluator.evaluate(&transcript, scenario) {
		Ok(result) => Outcome::Run(ScenarioRun { transcript, result }),
		Err(err) => {
			warn!(scenario = %scenario.name(), error = %err, "evaluation failed");
			Outcome::Failed(ScenarioFailure {
				scenario: scenario.name().to_string(),
				kind: FailureKind::Evaluation,
				error: err.to_string(),
			})
		}
	}
}

/// Mean of per-result pass rates; `0.0` for no results.
pub fn aggregate_pass_rate<'a, I>(results: I) -> f64
where
	I: IntoIterator<Item = &'a EvaluationResult>,
{
	let (sum, count) = results
		.into_iter()
		.fold((0.0, 0usize), |(sum, count), r| (sum + r.pass_rate(), count + 1));
	if count == 0 {
		0.0
	} else {
		sum / count as f64
	}
}

#[derive(Tabled)]
struct ScenarioRow {
	scenario: String,
	status: String,
	metrics: String,
	pass_rate: String,
	note: String,
}

impl BenchReport {
	pub fn results(&self) -> impl Iterator<Item = &EvaluationResult> {
		self.runs.iter().map(|run| &run.result)
	}

	pub fn aggregate_pass_rate(&self) -> f64 {
		aggregate_pass_rate(self.results())
	}

	/// True when every scenario produced a result and every result passed.
	pub fn all_passed(&self) -> bool {
		self.failures.is_empty() && self.results().all(|r| r.overall_passed())
	}

	pub fn summary_table(&self) -> String {
		let mut rows: Vec<ScenarioRow> = self
			.results()
			.map(|r| ScenarioRow {
				scenario: r.scenario_name().to_string(),
				status: if r.overall_passed() { "PASS" } else { "FAIL" }.to_string(),
				metrics: format!("{}/{}", r.passed_count(), r.metrics().len()),
				pass_rate: format!("{:.1}%", r.pass_rate() * 100.0),
				note: String::new(),
			})
			.collect();
		rows.extend(self.failures.iter().map(|f| ScenarioRow {
			scenario: f.scenario.clone(),
			status: "ERROR".to_string(),
			metrics: "-".to_string(),
			pass_rate: "-".to_string(),
			note: turnbench_types::truncate(format!("{}: {}", f.kind, f.error), 64),
		}));

		format!(
			"{}\n\nScenarios: {}  Errors: {}  Aggregate pass rate: {:.1}%\n",
			Table::new(rows),
			self.runs.len() + self.failures.len(),
			self.failures.len(),
			self.aggregate_pass_rate() * 100.0
		)
	}
}
