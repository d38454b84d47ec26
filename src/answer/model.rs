//! Language model access.
//!
//! [`OpenAiChatModel`] speaks the OpenAI-compatible `/chat/completions`
//! protocol, which the Hugging Face router and most hosted providers accept.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::prompt::Prompt;
use crate::config::GenerationConfig;
use crate::error::ModelError;

/// Longest slice of an error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`, returning the raw model text.
    async fn generate(
        &self,
        prompt: &Prompt,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ModelError>;

    fn model_id(&self) -> &str;
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(
        api_base: &str,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::InvalidResponse(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            api_key,
            model,
        })
    }

    /// Build from `[generation]` settings, reading the key from the configured env var.
    pub fn from_settings(config: &GenerationConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ModelError::MissingApiKey(config.api_key_env.clone()))?;

        Self::new(
            &config.api_base,
            api_key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn headers(&self) -> Result<HeaderMap, ModelError> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ModelError::InvalidResponse("API key is not a valid header value".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

fn classify_request_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout
    } else {
        ModelError::InvalidResponse(e.to_string())
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn generate(
        &self,
        prompt: &Prompt,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ModelError> {
        let body = ChatRequest {
            model: &self.model,
            temperature,
            max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let text: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(ModelError::InvalidResponse(format!("{status}: {text}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout
            } else {
                ModelError::InvalidResponse(format!("malformed completion: {e}"))
            }
        })?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                target: "answer",
                "completion used {} tokens",
                usage.total_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_base() {
        let model = OpenAiChatModel::new(
            "https://router.huggingface.co/v1/",
            "key".to_string(),
            "m".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(model.endpoint(), "https://router.huggingface.co/v1/chat/completions");
        assert_eq!(model.model_id(), "m");
    }

    #[test]
    fn test_missing_api_key() {
        let config = GenerationConfig {
            api_key_env: "DQ_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            OpenAiChatModel::from_settings(&config),
            Err(ModelError::MissingApiKey(var)) if var == "DQ_TEST_KEY_THAT_IS_NEVER_SET"
        ));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Thirty days."}}],"usage":{"total_tokens":42}}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Thirty days."));
        assert_eq!(parsed.usage.unwrap().total_tokens, 42);

        let null_content = r#"{"choices":[{"message":{"content":null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(null_content).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
