//! Chat-completions generator over HTTP.
//!
//! Works with any endpoint that speaks the OpenAI chat-completions format.
//! The API key is read from an environment variable named in config.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Generator;
use crate::config::AiSettings;

/// Default API base URL
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// Default model when none is configured
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat-completions client
pub struct OpenAiGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response from the chat-completions API
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create from config, reading the key from `api_key_env`
    pub fn from_settings(settings: &AiSettings, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).with_context(|| {
            format!(
                "Environment variable {} is not set (it must hold the API key)",
                settings.api_key_env
            )
        })?;

        Self::new(
            settings.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT),
            settings.model.as_deref().unwrap_or(DEFAULT_MODEL),
            api_key,
            timeout,
        )
    }

    /// Build API URL
    fn api_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_prompt,
        });

        let response = self
            .client
            .post(self.api_url())
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages,
            })
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to reach {}; check network connectivity and the ai.endpoint setting",
                    self.api_url()
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Generation API error {}: {}", status, body.trim());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse generation response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .context("Generation response contained no text")
    }
}
