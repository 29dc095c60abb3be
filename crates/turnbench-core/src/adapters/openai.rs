use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use turnbench_types::{Message, ModelResponse};

use crate::adapter::{validate_messages, GenerationParams, ModelAdapter};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Adapter for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiAdapter {
	client: reqwest::Client,
	base_url: String,
	api_key: String,
	model: String,
}

impl OpenAiAdapter {
	pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(120))
			.build()?;
		Ok(Self {
			client,
			base_url: DEFAULT_BASE_URL.to_string(),
			api_key: api_key.into(),
			model: model.into(),
		})
	}

	/// Reads the API key from `env_var`.
	pub fn from_env(model: impl Into<String>, env_var: &str) -> Result<Self> {
		let api_key = std::env::var(env_var)
			.with_context(|| format!("missing API key: set the {env_var} environment variable"))?;
		Self::new(model, api_key)
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into().trim_end_matches('/').to_string();
		self
	}

	fn request_body(&self, messages: &[Message], params: &GenerationParams) -> Value {
		let mut body = json!({
			"model": self.model,
			"messages": messages,
			"temperature": params.temperature,
		});
		if let Some(max_tokens) = params.max_tokens {
			body["max_tokens"] = json!(max_tokens);
		}
		if !params.stop.is_empty() {
			body["stop"] = json!(params.stop);
		}
		body
	}
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
	fn model_name(&self) -> &str {
		&self.model
	}

	async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<ModelResponse> {
		validate_messages(messages)?;

		let url = format!("{}/chat/completions", self.base_url);
		let resp = self
			.client
			.post(&url)
			.bearer_auth(&self.api_key)
			.json(&self.request_body(messages, params))
			.send()
			.await?;
		let status = resp.status();
		let body = resp.text().await?;
		parse_reply(status, &body, &self.model)
	}
}

/// Checks the status before parsing, so non-JSON error pages keep their status code.
fn parse_reply(status: reqwest::StatusCode, body: &str, requested_model: &str) -> Result<ModelResponse> {
	if !status.is_success() {
		anyhow::bail!("HTTP {}: {}", status.as_u16(), turnbench_types::truncate(body.to_string(), 500));
	}
	let v: Value = serde_json::from_str(body).context("invalid response from provider: body is not JSON")?;
	parse_completion(&v, requested_model)
}

fn parse_completion(v: &Value, requested_model: &str) -> Result<ModelResponse> {
	let choice = v
		.get("choices")
		.and_then(|c| c.get(0))
		.context("invalid response from provider: no choices")?;
	let content = choice
		.pointer("/message/content")
		.and_then(|c| c.as_str())
		.context("invalid response from provider: missing message content")?;
	let model = v.get("model").and_then(|m| m.as_str()).unwrap_or(requested_model);

	let mut response = ModelResponse::new(content, model);
	if let Some(reason) = choice.get("finish_reason").filter(|r| !r.is_null()) {
		response = response.with_metadata("finish_reason", reason.clone());
	}
	if let Some(usage) = v.get("usage") {
		response = response.with_metadata("usage", usage.clone());
	}
	Ok(response)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_request_body() {
		let adapter = OpenAiAdapter::new("gpt-4o-mini", "sk-test")
			.unwrap()
			.with_base_url("http://localhost:8080/v1/");
		assert_eq!(adapter.base_url, "http://localhost:8080/v1");

		let params = GenerationParams {
			temperature: 0.2,
			max_tokens: Some(64),
			stop: vec![],
		};
		let body = adapter.request_body(&[Message::system("sys"), Message::user("hi")], &params);
		assert_eq!(body["model"], "gpt-4o-mini");
		assert_eq!(body["messages"][1]["role"], "user");
		assert_eq!(body["messages"][1]["content"], "hi");
		assert_eq!(body["max_tokens"], 64);
		assert!(body.get("stop").is_none());
	}

	#[test]
	fn test_parse_completion() {
		let v = json!({
			"model": "gpt-4o-mini-2024",
			"choices": [{"message": {"role": "assistant", "content": "Chips are $1.50"}, "finish_reason": "stop"}],
			"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
		});
		let response = parse_completion(&v, "gpt-4o-mini").unwrap();
		assert_eq!(response.content, "Chips are $1.50");
		assert_eq!(response.model, "gpt-4o-mini-2024");
		assert_eq!(response.metadata["finish_reason"], "stop");
		assert_eq!(response.metadata["usage"]["total_tokens"], 15);
	}

	#[test]
	fn test_error_page_keeps_status() {
		let err = parse_reply(reqwest::StatusCode::BAD_GATEWAY, "<html>502 Bad Gateway</html>", "m").unwrap_err();
		let message = err.to_string();
		assert!(message.contains("HTTP 502"), "{message}");
		assert!(message.contains("Bad Gateway"));

		let err = parse_reply(reqwest::StatusCode::UNAUTHORIZED, r#"{"error": "bad key"}"#, "m").unwrap_err();
		assert!(err.to_string().starts_with("HTTP 401"));
	}

	#[test]
	fn test_success_body_must_be_json() {
		assert!(parse_reply(reqwest::StatusCode::OK, "not json", "m").is_err());
		let body = r#"{"choices": [{"message": {"content": "hi"}}]}"#;
		assert_eq!(parse_reply(reqwest::StatusCode::OK, body, "m").unwrap().content, "hi");
	}

	#[test]
	fn test_parse_completion_without_choices() {
		assert!(parse_completion(&json!({"choices": []}), "m").is_err());
	}
}
