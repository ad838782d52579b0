//! services/api/src/adapters/groq_llm.rs
//!
//! This module contains the adapter for the text-generation LLM (Groq, reached
//! through its OpenAI-compatible endpoint). It implements the
//! `TextGenerationService` port from the `core` crate.

use academy_core::ports::{ChatPrompt, PortError, PortResult, TextGenerationService};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client, error::OpenAIError,
};
use async_trait::async_trait;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
/// Without an API key every call fails with `Unavailable`, which callers turn
/// into their canned fallbacks.
#[derive(Clone)]
pub struct GroqTextAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl GroqTextAdapter {
    /// Creates a new `GroqTextAdapter`.
    pub fn new(api_key: Option<String>, api_base: &str, model: String) -> Self {
        let client = api_key.filter(|k| !k.trim().is_empty()).map(|key| {
            Client::with_config(OpenAIConfig::new().with_api_base(api_base).with_api_key(key))
        });
        Self { client, model }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }
}

fn build_messages(prompt: &ChatPrompt) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &prompt.system {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    );
    Ok(messages)
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for GroqTextAdapter {
    async fn complete(&self, prompt: &ChatPrompt) -> PortResult<String> {
        let Some(client) = &self.client else {
            return Err(PortError::Unavailable("GROQ_API_KEY_4 is not set".to_string()));
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(build_messages(prompt)?)
            .max_completion_tokens(prompt.max_tokens)
            .temperature(prompt.temperature)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Upstream(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PortError::Upstream("the model returned no text content".to_string()))?;

        debug!(model = %self.model, chars = content.chars().count(), "completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let adapter = GroqTextAdapter::new(Some("  ".to_string()), "https://api.groq.com/openai/v1", "m".to_string());
        assert!(!adapter.is_configured());
        let prompt = ChatPrompt {
            system: None,
            user: "hi".to_string(),
            max_tokens: 10,
            temperature: 0.5,
        };
        assert!(matches!(adapter.complete(&prompt).await, Err(PortError::Unavailable(_))));
    }

    #[test]
    fn system_turn_is_optional() {
        let mut prompt = ChatPrompt {
            system: Some("persona".to_string()),
            user: "hi".to_string(),
            max_tokens: 10,
            temperature: 0.5,
        };
        assert_eq!(build_messages(&prompt).unwrap().len(), 2);
        prompt.system = None;
        assert_eq!(build_messages(&prompt).unwrap().len(), 1);
    }
}
