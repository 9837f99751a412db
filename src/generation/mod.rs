//! Text generation capability
//!
//! The harnesses only need "given a system prompt and a user message,
//! return an answer"; everything about the concrete model lives behind
//! [`GenerationProvider`]. One concrete binding ships here: a minimal
//! client for OpenAI-compatible chat-completions endpoints (Moonshot,
//! Zhipu, OpenAI and the like all speak this shape).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Provider initialization failed: {0}")]
    InitializationError(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Trait for text generation providers
///
/// Synchronous and potentially blocking, like the embedding capability;
/// callers decide how to schedule calls.
pub trait GenerationProvider: Send + Sync {
    /// Generate a completion for a system prompt + user message pair
    fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, GenerationError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Configuration for the generation capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai-compat"
    pub provider: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Chat-completions base URL (e.g. "https://api.moonshot.cn/v1")
    pub api_base: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai-compat".to_string(),
            api_key_env: "RAGPROBE_API_KEY".to_string(),
            api_base: "https://api.moonshot.cn/v1".to_string(),
            model: "moonshot-v1-8k".to_string(),
            temperature: 0.1,
        }
    }
}

/// Build a generation provider from configuration
///
/// Provider names map to constructors; an unrecognized name is an explicit
/// error, never a silent fallback.
pub fn create_generation_provider(
    config: &LlmConfig,
) -> Result<Box<dyn GenerationProvider>, GenerationError> {
    match config.provider.as_str() {
        "openai-compat" => Ok(Box::new(OpenAiCompatProvider::from_config(config)?)),
        other => Err(GenerationError::InitializationError(format!(
            "Unsupported generation provider: {}. Supported: openai-compat",
            other
        ))),
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Client for OpenAI-compatible chat-completions APIs
pub struct OpenAiCompatProvider {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| GenerationError::InitializationError(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        })
    }

    /// Build a provider from config, reading the API key from the
    /// configured environment variable
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GenerationError::InitializationError(format!(
                "API key environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Self::new(&config.api_base, api_key, &config.model, config.temperature)
    }
}

impl GenerationProvider for OpenAiCompatProvider {
    fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, GenerationError> {
        if user_message.trim().is_empty() {
            return Err(GenerationError::InvalidInput(
                "User message cannot be empty".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: self.temperature,
        };

        debug!("Requesting completion from {} ({})", self.api_base, self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .map_err(|e| GenerationError::GenerationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerationError::GenerationFailed(format!(
                "API returned status {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| GenerationError::GenerationFailed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| GenerationError::GenerationFailed("No choices in response".to_string()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
