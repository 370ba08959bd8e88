use super::{ChatMessage, ChatModel, Completion, ToolCall, ToolDefinition};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
}

#[derive(Serialize)]
struct ToolSpec<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Chat model backed by the OpenAI `/chat/completions` endpoint
pub struct OpenAiChat {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    retries: usize,
}

impl OpenAiChat {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.openai_base_url)?;
        let endpoint = base_url
            .join("chat/completions")
            .map_err(|e| Error::Config(format!("Invalid OpenAI base URL: {}", e)))?;
        let client = Client::builder().timeout(Duration::from_secs(120)).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key()?.to_string(),
            model: config.chat_model.clone(),
            retries: 2,
        })
    }

    async fn send(&self, request: &CompletionRequest<'_>) -> std::result::Result<CompletionResponse, (bool, Error)> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| (e.is_connect() || e.is_timeout(), Error::Llm(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|wrapper| wrapper.error.message)
                .unwrap_or(body);
            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            return Err((retryable, Error::Llm(format!("{}: {}", status, message))));
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| (false, Error::Llm(format!("Failed to parse completion: {}", e))))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<Completion> {
        let request = CompletionRequest {
            model: &self.model,
            messages,
            tools: tools
                .iter()
                .map(|function| ToolSpec {
                    kind: "function",
                    function,
                })
                .collect(),
        };

        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Requesting completion");

        let mut attempt = 0;
        let response = loop {
            match self.send(&request).await {
                Ok(response) => break response,
                Err((true, e)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Retrying completion request");
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err((_, e)) => return Err(e),
            }
        };

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| Error::Llm("Completion returned no choices".to_string()))?;

        Ok(Completion {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
