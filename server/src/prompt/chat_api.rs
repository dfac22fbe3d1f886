use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::{
    embed::api_endpoint,
    server_config::{ApiConfig, ModelConfig},
    HttpClient,
};

use super::{ChatCompletion, ChatMessage};

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ApiChat {
    http_client: HttpClient,
    endpoint: Url,
    api_key: String,
    model: String,
    temperature: f64,
}

impl ApiChat {
    pub fn new(
        http_client: HttpClient,
        api: &ApiConfig,
        model: &ModelConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http_client,
            endpoint: api_endpoint(&api.base_url, "chat/completions")?,
            api_key: api.key.clone(),
            model: model.chat_model.clone(),
            temperature: model.temperature,
        })
    }
}

#[async_trait]
impl ChatCompletion for ApiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        let resp = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&json!(
              {
                "model": &self.model,
                "temperature": self.temperature,
                "messages": messages,
              }
            ))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await?;

        let reply = parse_reply(resp)?;
        Ok(reply)
    }
}

fn parse_reply(resp: serde_json::Value) -> anyhow::Result<String> {
    let parsed = serde_json::from_value::<ChatApiResponseOrError>(resp.clone())
        .context(format!("Could not parse chat response: {}", resp))?;

    let parsed = match parsed {
        ChatApiResponseOrError::Error { error } => {
            return Err(anyhow!("Chat API error: {}", error.message));
        }
        ChatApiResponseOrError::Response(parsed) => parsed,
    };

    if let Some(usage) = &parsed.usage {
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Chat completion usage"
        );
    }

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .context("No choices in response")?;
    Ok(choice.message.content)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChoiceMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error { error: ChatApiError },
}
