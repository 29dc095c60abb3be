use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::debug;
use turnbench_types::{ModelResponse, Role, Transcript};

use crate::adapter::{GenerationParams, ModelAdapter};
use crate::scenario::{Scenario, TurnKind};

/// Drives a model adapter through a scenario, one user turn at a time.
pub struct ConversationManager {
	adapter: Arc<dyn ModelAdapter>,
}

impl ConversationManager {
	pub fn new(adapter: Arc<dyn ModelAdapter>) -> Self {
		Self { adapter }
	}

	pub fn adapter(&self) -> &Arc<dyn ModelAdapter> {
		&self.adapter
	}

	pub async fn run_scenario(&self, scenario: &Scenario) -> Result<Transcript> {
		let mut transcript = Transcript::new();
		transcript.metadata.insert("scenario_name".into(), json!(scenario.name()));
		transcript.metadata.insert("model_name".into(), json!(self.adapter.model_name()));

		if let Some(system) = scenario.system_message() {
			transcript.add_message(system.role, system.content);
		}

		let params = GenerationParams::from(scenario.config());
		let total = scenario.turns().len();

		for (i, turn) in scenario.turns().iter().enumerate() {
			match turn.kind {
				TurnKind::UserInput => {
					debug!(scenario = %scenario.name(), turn = i + 1, total, "sending user turn");
					transcript.add_message(Role::User, turn.content.clone());
					let response = self
						.adapter
						.generate(&transcript.messages, &params)
						.await
						.with_context(|| format!("turn {} of scenario {:?} failed", i + 1, scenario.name()))?;
					debug!(scenario = %scenario.name(), turn = i + 1, chars = response.content.len(), "received response");
					transcript.add_response(response);
				}
				TurnKind::StateCheck => {
					debug!(scenario = %scenario.name(), turn = i + 1, total, "state check, nothing sent");
				}
			}
		}

		Ok(transcript)
	}

	/// Appends one more user message and its response to an existing transcript.
	pub async fn continue_conversation(
		&self,
		transcript: &mut Transcript,
		user_input: impl Into<String>,
		params: &GenerationParams,
	) -> Result<ModelResponse> {
		transcript.add_message(Role::User, user_input);
		let response = self.adapter.generate(&transcript.messages, params).await?;
		transcript.add_response(response.clone());
		Ok(response)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::adapter::from_async_fn;
	use crate::adapters::mock::MockAdapter;
	use turnbench_types::Message;

	#[tokio::test]
	async fn test_run_scenario_sequences_messages() {
		let scenario = Scenario::builder("s", "d")
			.system_prompt("You are a vending machine.")
			.user_input("What do you have?", ["Chips"])
			.state_check("inventory intact", ["Chips"])
			.user_input("Buy chips", ["change"])
			.build();
		let adapter = Arc::new(MockAdapter::scripted("mock", ["We have Chips", "Here is your change"]));
		let manager = ConversationManager::new(adapter.clone());

		let transcript = manager.run_scenario(&scenario).await.unwrap();

		assert_eq!(transcript.responses.len(), 2);
		assert_eq!(transcript.model_name(), "mock");
		assert_eq!(transcript.metadata["scenario_name"], "s");
		assert_eq!(
			transcript.messages,
			vec![
				Message::system("You are a vending machine."),
				Message::user("What do you have?"),
				Message::assistant("We have Chips"),
				Message::user("Buy chips"),
				Message::assistant("Here is your change"),
			]
		);
		assert_eq!(adapter.call_count(), 2);
	}

	#[tokio::test]
	async fn test_adapter_sees_history() {
		let adapter = from_async_fn("counter", |messages, _| async move {
			Ok::<_, anyhow::Error>(format!("{} messages so far", messages.len()))
		});
		let scenario = Scenario::builder("s", "")
			.user_input("one", Vec::<&str>::new())
			.user_input("two", Vec::<&str>::new())
			.build();
		let transcript = ConversationManager::new(adapter).run_scenario(&scenario).await.unwrap();
		assert_eq!(transcript.responses[0].content, "1 messages so far");
		assert_eq!(transcript.responses[1].content, "3 messages so far");
	}

	#[tokio::test]
	async fn test_adapter_error_propagates() {
		let adapter = from_async_fn("broken", |_, _| async move {
			Err::<String, _>(anyhow::anyhow!("provider down"))
		});
		let scenario = Scenario::builder("s", "").user_input("hi", ["x"]).build();
		let err = ConversationManager::new(adapter).run_scenario(&scenario).await.unwrap_err();
		assert!(format!("{err:#}").contains("provider down"));
	}

	#[tokio::test]
	async fn test_continue_conversation() {
		let manager = ConversationManager::new(Arc::new(MockAdapter::default()));
		let mut transcript = Transcript::new();
		let response = manager
			.continue_conversation(&mut transcript, "anything left?", &GenerationParams::default())
			.await
			.unwrap();
		assert_eq!(response.content, "Mock response to: anything left?");
		assert_eq!(transcript.messages.len(), 2);
		assert_eq!(transcript.responses.len(), 1);
	}
}
