use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use turnbench_types::{ExpectedPattern, Message};

use crate::validator::Validator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
	/// Sent to the model as a user message; yields exactly one response.
	#[default]
	UserInput,
	/// Sends nothing; its patterns are checked against the latest response.
	StateCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
	#[serde(default)]
	pub kind: TurnKind,
	pub content: String,
	#[serde(default)]
	pub expected_patterns: Vec<ExpectedPattern>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

impl ConversationTurn {
	pub fn user_input<I, P>(content: impl Into<String>, expected_patterns: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<ExpectedPattern>,
	{
		Self {
			kind: TurnKind::UserInput,
			content: content.into(),
			expected_patterns: expected_patterns.into_iter().map(Into::into).collect(),
			metadata: Map::new(),
		}
	}

	pub fn state_check<I, P>(description: impl Into<String>, expected_patterns: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<ExpectedPattern>,
	{
		Self {
			kind: TurnKind::StateCheck,
			..Self::user_input(description, expected_patterns)
		}
	}

	pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.metadata.insert(key.into(), value);
		self
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub system_prompt: Option<String>,
	#[serde(default = "default_temperature")]
	pub temperature: f64,
	#[serde(default)]
	pub max_tokens: Option<u32>,
	#[serde(default)]
	pub stop_sequences: Vec<String>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}

fn default_temperature() -> f64 {
	0.7
}

impl ScenarioConfig {
	pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: description.into(),
			system_prompt: None,
			temperature: default_temperature(),
			max_tokens: None,
			stop_sequences: Vec::new(),
			metadata: Map::new(),
		}
	}
}

/// A sealed, named test case: ordered turns plus attached validators.
#[derive(Clone)]
pub struct Scenario {
	config: ScenarioConfig,
	turns: Vec<ConversationTurn>,
	validators: Vec<Arc<dyn Validator>>,
}

impl Scenario {
	pub fn builder(name: impl Into<String>, description: impl Into<String>) -> ScenarioBuilder {
		ScenarioBuilder::new(ScenarioConfig::new(name, description))
	}

	pub fn config(&self) -> &ScenarioConfig {
		&self.config
	}

	pub fn name(&self) -> &str {
		&self.config.name
	}

	pub fn description(&self) -> &str {
		&self.config.description
	}

	pub fn turns(&self) -> &[ConversationTurn] {
		&self.turns
	}

	pub fn validators(&self) -> &[Arc<dyn Validator>] {
		&self.validators
	}

	/// Number of turns that must each produce one model response.
	pub fn responding_turn_count(&self) -> usize {
		self.turns.iter().filter(|t| t.kind == TurnKind::UserInput).count()
	}

	pub fn system_message(&self) -> Option<Message> {
		self.config.system_prompt.as_ref().map(Message::system)
	}

	/// Serializable form, without validators.
	pub fn to_file(&self) -> ScenarioFile {
		ScenarioFile {
			config: self.config.clone(),
			turns: self.turns.clone(),
		}
	}
}

impl fmt::Debug for Scenario {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scenario")
			.field("name", &self.config.name)
			.field("turns", &self.turns.len())
			.field("validators", &self.validators.len())
			.finish()
	}
}

pub struct ScenarioBuilder {
	config: ScenarioConfig,
	turns: Vec<ConversationTurn>,
	validators: Vec<Arc<dyn Validator>>,
}

impl ScenarioBuilder {
	pub fn new(config: ScenarioConfig) -> Self {
		Self {
			config,
			turns: Vec::new(),
			validators: Vec::new(),
		}
	}

	pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
		self.config.system_prompt = Some(prompt.into());
		self
	}

	pub fn temperature(mut self, temperature: f64) -> Self {
		self.config.temperature = temperature;
		self
	}

	pub fn max_tokens(mut self, max_tokens: u32) -> Self {
		self.config.max_tokens = Some(max_tokens);
		self
	}

	pub fn stop_sequence(mut self, stop: impl Into<String>) -> Self {
		self.config.stop_sequences.push(stop.into());
		self
	}

	pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
		self.config.metadata.insert(key.into(), value);
		self
	}

	pub fn turn(mut self, turn: ConversationTurn) -> Self {
		self.turns.push(turn);
		self
	}

	pub fn turns<I>(mut self, turns: I) -> Self
	where
		I: IntoIterator<Item = ConversationTurn>,
	{
		self.turns.extend(turns);
		self
	}

	pub fn user_input<I, P>(self, content: impl Into<String>, expected_patterns: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<ExpectedPattern>,
	{
		self.turn(ConversationTurn::user_input(content, expected_patterns))
	}

	pub fn state_check<I, P>(self, description: impl Into<String>, expected_patterns: I) -> Self
	where
		I: IntoIterator<Item = P>,
		P: Into<ExpectedPattern>,
	{
		self.turn(ConversationTurn::state_check(description, expected_patterns))
	}

	pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
		self.validators.push(validator);
		self
	}

	pub fn build(self) -> Scenario {
		Scenario {
			config: self.config,
			turns: self.turns,
			validators: self.validators,
		}
	}
}

/// On-disk scenario definition (YAML or JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioFile {
	pub config: ScenarioConfig,
	#[serde(default)]
	pub turns: Vec<ConversationTurn>,
}

impl ScenarioFile {
	pub fn into_builder(self) -> ScenarioBuilder {
		ScenarioBuilder::new(self.config).turns(self.turns)
	}

	pub fn into_scenario(self) -> Scenario {
		self.into_builder().build()
	}
}
