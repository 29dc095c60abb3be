use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use turnbench_types::{Message, ModelResponse};

use crate::scenario::ScenarioConfig;

/// Sampling parameters passed to every generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
	pub temperature: f64,
	#[serde(default)]
	pub max_tokens: Option<u32>,
	#[serde(default)]
	pub stop: Vec<String>,
}

impl Default for GenerationParams {
	fn default() -> Self {
		Self {
			temperature: 0.7,
			max_tokens: None,
			stop: Vec::new(),
		}
	}
}

impl From<&ScenarioConfig> for GenerationParams {
	fn from(config: &ScenarioConfig) -> Self {
		Self {
			temperature: config.temperature,
			max_tokens: config.max_tokens,
			stop: config.stop_sequences.clone(),
		}
	}
}

/// Anything that can answer a message sequence: a mock, a hosted provider, a local model.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
	fn model_name(&self) -> &str;
	async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<ModelResponse>;
}

pub fn validate_messages(messages: &[Message]) -> Result<()> {
	if messages.is_empty() {
		anyhow::bail!("message list is empty");
	}
	Ok(())
}

/// Wrap an async closure returning the response text as a `ModelAdapter`.
pub fn from_async_fn<F, Fut>(model_name: impl Into<String>, f: F) -> Arc<dyn ModelAdapter>
where
	F: Send + Sync + 'static + Fn(Vec<Message>, GenerationParams) -> Fut,
	Fut: Future<Output = Result<String>> + Send + 'static,
{
	struct ClosureAdapter<F, Fut>
	where
		F: Send + Sync + 'static + Fn(Vec<Message>, GenerationParams) -> Fut,
		Fut: Future<Output = Result<String>> + Send + 'static,
	{
		model_name: String,
		f: F,
	}

	#[async_trait]
	impl<F, Fut> ModelAdapter for ClosureAdapter<F, Fut>
	where
		F: Send + Sync + 'static + Fn(Vec<Message>, GenerationParams) -> Fut,
		Fut: Future<Output = Result<String>> + Send + 'static,
	{
		fn model_name(&self) -> &str {
			&self.model_name
		}

		async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<ModelResponse> {
			let content = (self.f)(messages.to_vec(), params.clone()).await?;
			Ok(ModelResponse::new(content, self.model_name.clone()))
		}
	}

	Arc::new(ClosureAdapter { model_name: model_name.into(), f })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_closure_adapter() {
		let adapter = from_async_fn("shouty", |messages, _params| async move {
			let last = messages.last().map(|m| m.content.to_uppercase()).unwrap_or_default();
			Ok::<_, anyhow::Error>(last)
		});
		let response = adapter
			.generate(&[Message::user("hello")], &GenerationParams::default())
			.await
			.unwrap();
		assert_eq!(response.content, "HELLO");
		assert_eq!(response.model, "shouty");
		assert_eq!(adapter.model_name(), "shouty");
	}

	#[test]
	fn test_params_from_config() {
		let mut config = ScenarioConfig::new("s", "d");
		config.max_tokens = Some(500);
		config.stop_sequences.push("END".into());
		let params = GenerationParams::from(&config);
		assert_eq!(params.temperature, 0.7);
		assert_eq!(params.max_tokens, Some(500));
		assert_eq!(params.stop, vec!["END".to_string()]);
	}

	#[test]
	fn test_validate_messages() {
		assert!(validate_messages(&[]).is_err());
		assert!(validate_messages(&[Message::user("x")]).is_ok());
	}
}
