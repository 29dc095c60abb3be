use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use turnbench_types::{Message, ModelResponse, Role};

use crate::adapter::{validate_messages, GenerationParams, ModelAdapter};

/// Returns scripted responses in order, then echoes the last user message.
pub struct MockAdapter {
    model_name: String,
    responses: Vec<String>,
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    index: usize,
    call_count: usize,
}

impl MockAdapter {
    /// Creates an echoing mock.
    pub fn new(model_name: impl Into<String>) -> Self {
        Self::scripted(model_name, Vec::<String>::new())
    }

    /// Creates a mock that replays `responses` before falling back to echoing.
    pub fn scripted<I, S>(model_name: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model_name: model_name.into(),
            responses: responses.into_iter().map(Into::into).collect(),
            state: Mutex::new(MockState::default()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).call_count
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = MockState::default();
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl ModelAdapter for MockAdapter {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<ModelResponse> {
        validate_messages(messages)?;

        let (content, call_count) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.call_count += 1;
            let content = match self.responses.get(state.index) {
                Some(scripted) => {
                    state.index += 1;
                    scripted.clone()
                }
                None => match messages.iter().rev().find(|m| m.role == Role::User) {
                    Some(user) => format!("Mock response to: {}", user.content),
                    None => "Mock response with no user input".to_string(),
                },
            };
            (content, state.call_count)
        };

        Ok(ModelResponse::new(content, self.model_name.clone())
            .with_metadata("call_count", json!(call_count))
            .with_metadata("temperature", json!(params.temperature))
            .with_metadata("max_tokens", json!(params.max_tokens)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_echo() {
        let mock = MockAdapter::scripted("mock", ["first", "second"]);
        let params = GenerationParams::default();
        let messages = vec![Message::system("be a vending machine"), Message::user("hi there")];

        assert_eq!(mock.generate(&messages, &params).await.unwrap().content, "first");
        assert_eq!(mock.generate(&messages, &params).await.unwrap().content, "second");
        let echoed = mock.generate(&messages, &params).await.unwrap();
        assert_eq!(echoed.content, "Mock response to: hi there");
        assert_eq!(echoed.metadata["call_count"], 3);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_no_user_message() {
        let mock = MockAdapter::default();
        let response = mock
            .generate(&[Message::system("sys")], &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(response.content, "Mock response with no user input");
        assert_eq!(response.model, "mock-model");
    }

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let mock = MockAdapter::default();
        assert!(mock.generate(&[], &GenerationParams::default()).await.is_err());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_rewinds_script() {
        let mock = MockAdapter::scripted("mock", ["only"]);
        let params = GenerationParams::default();
        let messages = [Message::user("q")];
        mock.generate(&messages, &params).await.unwrap();
        mock.reset();
        assert_eq!(mock.call_count(), 0);
        assert_eq!(mock.generate(&messages, &params).await.unwrap().content, "only");
    }
}
