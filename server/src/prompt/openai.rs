use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::json;

use crate::error::AppResult;
use crate::server_config::cfg;
use crate::HttpClient;

use super::{ChatApiResponseOrError, ChatMessage, ChatModel};

const CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiChat {
    http_client: HttpClient,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiChat {
    pub fn new(http_client: HttpClient, api_key: String, model: String, temperature: f64) -> Self {
        Self {
            http_client,
            api_key,
            model,
            temperature,
        }
    }

    pub fn from_config(http_client: HttpClient) -> Self {
        Self::new(
            http_client,
            cfg.api_key.clone(),
            cfg.model.id.clone(),
            cfg.model.temperature,
        )
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> AppResult<String> {
        let resp = self
            .http_client
            .post(CHAT_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": &self.model,
                "temperature": self.temperature,
                "messages": messages,
            }))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(resp.clone())
            .context(format!("Could not parse chat response: {}", resp))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => {
                return Err(anyhow!("Chat API error: {}", error.error.message).into());
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        let choice = parsed.choices.first().context("No choices in response")?;
        tracing::debug!(
            total_tokens = parsed.usage.total_tokens,
            "Chat completion served"
        );

        Ok(choice.message.content.clone())
    }
}
