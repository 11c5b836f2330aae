use async_trait::async_trait;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use regcheck_core::GatewaySettings;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("build LLM: {0}")]
    Build(String),
    #[error("chat: {0}")]
    Request(String),
    #[error("LLM returned {0}")]
    EmptyResponse(&'static str),
}

/// One completion call against an external model. No retries, no caching.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError>;
}

fn map_backend(provider: &str) -> Result<LLMBackend, GatewayError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(GatewayError::UnknownProvider(other.to_string())),
    }
}

/// Gateway backed by the `llm` crate. The request's model name overrides the
/// configured default so `/mcp` callers can pick their own.
#[derive(Debug, Clone)]
pub struct LlmGateway {
    settings: GatewaySettings,
}

impl LlmGateway {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        map_backend(&settings.provider)?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }
}

#[async_trait]
impl ModelGateway for LlmGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GatewayError> {
        let backend = map_backend(&self.settings.provider)?;
        let model = if request.model.is_empty() {
            self.settings.model.as_str()
        } else {
            request.model.as_str()
        };

        let mut builder = LLMBuilder::new()
            .backend(backend)
            .model(model)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens);

        if let Some(system) = &request.system {
            builder = builder.system(system);
        }
        if !self.settings.api_key.is_empty() {
            builder = builder.api_key(&self.settings.api_key);
        }

        let llm = builder
            .build()
            .map_err(|e| GatewayError::Build(e.to_string()))?;

        let messages = vec![ChatMessage::user().content(&request.prompt).build()];

        let response = llm
            .chat(&messages)
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let usage = response.usage().map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        match response.text() {
            Some(text) if !text.trim().is_empty() => Ok(Completion { text, usage }),
            Some(_) => Err(GatewayError::EmptyResponse("empty text")),
            None => Err(GatewayError::EmptyResponse("no text")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_provider_up_front() {
        let err = LlmGateway::new(GatewaySettings {
            provider: "acme".into(),
            api_key: "k".into(),
            model: "m".into(),
        })
        .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownProvider(p) if p == "acme"));
    }

    #[test]
    fn accepts_known_providers() {
        for provider in ["openai", "anthropic", "google", "ollama", "groq", "mistral", "deepseek"] {
            assert!(map_backend(provider).is_ok(), "{provider}");
        }
    }
}
