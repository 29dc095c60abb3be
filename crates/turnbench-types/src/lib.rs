use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tabled::Tabled;
use thiserror::Error;

/// How an expected pattern is located in a response. Matching is always case-insensitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
	#[default]
	Literal,
	Regex,
}

/// A literal substring or regular expression a response must contain.
///
/// Deserializes from either `{"value": "...", "mode": "regex"}` or a bare string,
/// which is taken as a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PatternRepr")]
pub struct ExpectedPattern {
	pub value: String,
	pub mode: MatchMode,
}

impl ExpectedPattern {
	pub fn literal(value: impl Into<String>) -> Self {
		Self { value: value.into(), mode: MatchMode::Literal }
	}

	pub fn regex(value: impl Into<String>) -> Self {
		Self { value: value.into(), mode: MatchMode::Regex }
	}
}

impl From<&str> for ExpectedPattern {
	fn from(value: &str) -> Self {
		Self::literal(value)
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
	Bare(String),
	Full {
		value: String,
		#[serde(default)]
		mode: MatchMode,
	},
}

impl From<PatternRepr> for ExpectedPattern {
	fn from(repr: PatternRepr) -> Self {
		match repr {
			PatternRepr::Bare(value) => Self::literal(value),
			PatternRepr::Full { value, mode } => Self { value, mode },
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	System,
	User,
	Assistant,
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Role::System => "system",
			Role::User => "user",
			Role::Assistant => "assistant",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	pub content: String,
}

impl Message {
	pub fn new(role: Role, content: impl Into<String>) -> Self {
		Self { role, content: content.into() }
	}

	pub fn system(content: impl Into<String>) -> Self {
		Self::new(Role::System, content)
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self::new(Role::User, content)
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self::new(Role::Assistant, content)
	}
}

/// A single completion returned by a model adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
	pub content: String,
	pub model: String,
	#[serde(default = "Utc::now")]
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

impl ModelResponse {
	pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
		Self {
			content: content.into(),
			model: model.into(),
			timestamp: Utc::now(),
			metadata: Map::new(),
		}
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}
}

/// The realized conversation: every message sent plus every response received, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
	#[serde(default)]
	pub messages: Vec<Message>,
	#[serde(default)]
	pub responses: Vec<ModelResponse>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
	#[serde(default = "Utc::now")]
	pub started_at: DateTime<Utc>,
}

impl Default for Transcript {
	fn default() -> Self {
		Self::new()
	}
}

impl Transcript {
	pub fn new() -> Self {
		Self {
			messages: Vec::new(),
			responses: Vec::new(),
			metadata: Map::new(),
			started_at: Utc::now(),
		}
	}

	pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
		self.messages.push(Message::new(role, content));
	}

	/// Records a response and mirrors it as an assistant message.
	pub fn add_response(&mut self, response: ModelResponse) {
		self.add_message(Role::Assistant, response.content.clone());
		self.responses.push(response);
	}

	pub fn last_response(&self) -> Option<&ModelResponse> {
		self.responses.last()
	}

	pub fn model_name(&self) -> &str {
		self.metadata
			.get("model_name")
			.and_then(|v| v.as_str())
			.unwrap_or("unknown")
	}
}

/// A single named, scored, pass/fail judgment.
///
/// `passed` is stored rather than derived from `value`: validator metrics are boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetric {
	pub name: String,
	pub value: f64,
	pub passed: bool,
	#[serde(default)]
	pub details: Map<String, Value>,
}

impl EvaluationMetric {
	pub fn new(name: impl Into<String>, value: f64, passed: bool) -> Self {
		Self {
			name: name.into(),
			value,
			passed,
			details: Map::new(),
		}
	}

	pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
		self.details.insert(key.into(), value);
		self
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate metric name: {0}")]
pub struct DuplicateMetricName(pub String);

/// Frozen outcome of evaluating one transcript against one scenario.
///
/// Built through [`ResultBuilder`]; there are no mutators once finished.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
	scenario_name: String,
	model_name: String,
	metrics: Vec<EvaluationMetric>,
	overall_passed: bool,
	evaluated_at: DateTime<Utc>,
	metadata: Map<String, Value>,
}

/// Accumulates metrics for a result, rejecting duplicate names.
#[derive(Debug)]
pub struct ResultBuilder {
	scenario_name: String,
	model_name: String,
	metrics: Vec<EvaluationMetric>,
	evaluated_at: DateTime<Utc>,
	metadata: Map<String, Value>,
}

impl ResultBuilder {
	pub fn new(scenario_name: impl Into<String>, model_name: impl Into<String>) -> Self {
		Self {
			scenario_name: scenario_name.into(),
			model_name: model_name.into(),
			metrics: Vec::new(),
			evaluated_at: Utc::now(),
			metadata: Map::new(),
		}
	}

	pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}

	pub fn add_metric(&mut self, metric: EvaluationMetric) -> Result<(), DuplicateMetricName> {
		if self.metrics.iter().any(|m| m.name == metric.name) {
			return Err(DuplicateMetricName(metric.name));
		}
		self.metrics.push(metric);
		Ok(())
	}

	pub fn metric(mut self, metric: EvaluationMetric) -> Result<Self, DuplicateMetricName> {
		self.add_metric(metric)?;
		Ok(self)
	}

	/// Freezes the result. `overall_passed` is computed here, once, and is vacuously
	/// true when no metrics were added.
	pub fn finish(self) -> EvaluationResult {
		let overall_passed = self.metrics.iter().all(|m| m.passed);
		EvaluationResult {
			scenario_name: self.scenario_name,
			model_name: self.model_name,
			metrics: self.metrics,
			overall_passed,
			evaluated_at: self.evaluated_at,
			metadata: self.metadata,
		}
	}
}

impl EvaluationResult {
	pub fn builder(scenario_name: impl Into<String>, model_name: impl Into<String>) -> ResultBuilder {
		ResultBuilder::new(scenario_name, model_name)
	}

	pub fn scenario_name(&self) -> &str {
		&self.scenario_name
	}

	pub fn model_name(&self) -> &str {
		&self.model_name
	}

	pub fn metrics(&self) -> &[EvaluationMetric] {
		&self.metrics
	}

	pub fn overall_passed(&self) -> bool {
		self.overall_passed
	}

	pub fn evaluated_at(&self) -> DateTime<Utc> {
		self.evaluated_at
	}

	pub fn metadata(&self) -> &Map<String, Value> {
		&self.metadata
	}

	pub fn get_metric(&self, name: &str) -> Option<&EvaluationMetric> {
		self.metrics.iter().find(|m| m.name == name)
	}

	pub fn passed_count(&self) -> usize {
		self.metrics.iter().filter(|m| m.passed).count()
	}

	/// Fraction of metrics that passed; `0.0` when there are none.
	pub fn pass_rate(&self) -> f64 {
		if self.metrics.is_empty() {
			return 0.0;
		}
		self.passed_count() as f64 / self.metrics.len() as f64
	}

	pub fn to_document(&self) -> ResultDocument {
		ResultDocument {
			scenario_name: self.scenario_name.clone(),
			model_name: self.model_name.clone(),
			metrics: self.metrics.clone(),
			overall_passed: self.overall_passed,
			pass_rate: self.pass_rate(),
			evaluated_at: self.evaluated_at,
			metadata: self.metadata.clone(),
		}
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<MetricRow> = self.metrics.iter().map(|m| MetricRow {
			metric: m.name.clone(),
			passed: if m.passed { "✓" } else { " " }.to_string(),
			value: format!("{:.3}", m.value),
			details: truncate(Value::Object(m.details.clone()).to_string(), 64),
		}).collect();

		let table_str = Table::new(rows).to_string();

		let summary_text = format!(
			"Scenario: {}  Model: {}  Metrics: {}  Passed: {}  Pass rate: {:.1}%  Overall: {}",
			self.scenario_name,
			self.model_name,
			self.metrics.len(),
			self.passed_count(),
			self.pass_rate() * 100.0,
			if self.overall_passed { "PASS" } else { "FAIL" }
		);

		format!("{}\n\n{}\n", table_str, summary_text)
	}
}

impl fmt::Display for EvaluationResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"EvaluationResult(scenario='{}', model='{}', pass_rate={:.2}%)",
			self.scenario_name,
			self.model_name,
			self.pass_rate() * 100.0
		)
	}
}

impl Serialize for EvaluationResult {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		self.to_document().serialize(serializer)
	}
}

/// Serialized shape of an [`EvaluationResult`]; `pass_rate` is computed when the
/// document is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
	pub scenario_name: String,
	pub model_name: String,
	pub metrics: Vec<EvaluationMetric>,
	pub overall_passed: bool,
	pub pass_rate: f64,
	pub evaluated_at: DateTime<Utc>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Tabled)]
struct MetricRow {
	metric: String,
	passed: String,
	value: String,
	details: String,
}

pub fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
