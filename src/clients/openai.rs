//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, DashScope, vLLM, LM Studio, …) by taking the base URL at
//! construction.

use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::clients::{ClientError, LanguageModel, ToolCallRequest, ToolHandler, ToolTrace};
use crate::message::Message;

const PROVIDER: &str = "openai";

/// Cap on request→tool→request rounds in one [`tool_call`] loop.
const MAX_TOOL_ROUNDS: usize = 4;

/// Chat client for OpenAI-compatible APIs.
#[derive(Clone)]
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiChatClient {
    /// `base_url` up to and excluding `/chat/completions`, e.g.
    /// `https://api.openai.com/v1`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ClientError::Http {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.0,
        })
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    async fn complete(&self, body: Value) -> Result<Value, ClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Http {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await.map_err(|e| ClientError::Decode {
            provider: PROVIDER,
            message: e.to_string(),
        })?;
        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .cloned()
            .ok_or(ClientError::Empty { provider: PROVIDER })
    }

    fn wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect()
    }

    fn extract_tool_calls(message: &Value) -> Result<Vec<ToolCallRequest>, ClientError> {
        let Some(calls) = message.get("tool_calls").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        calls
            .iter()
            .map(|call| {
                let id = call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let function = call.get("function").ok_or(ClientError::Decode {
                    provider: PROVIDER,
                    message: "tool call without function".into(),
                })?;
                let name = function
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or(ClientError::Decode {
                        provider: PROVIDER,
                        message: "tool call without name".into(),
                    })?
                    .to_string();
                let raw_args = function
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                let arguments =
                    serde_json::from_str(raw_args).map_err(|e| ClientError::Decode {
                        provider: PROVIDER,
                        message: format!("tool arguments: {e}"),
                    })?;
                Ok(ToolCallRequest {
                    id,
                    name,
                    arguments,
                })
            })
            .collect()
    }
}

/// Strips Markdown code fences some models wrap JSON output in.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiChatClient {
    #[instrument(skip(self, messages), err)]
    async fn chat(&self, messages: &[Message]) -> Result<String, ClientError> {
        let message = self
            .complete(json!({
                "model": self.model,
                "temperature": self.temperature,
                "messages": Self::wire_messages(messages),
            }))
            .await?;
        message
            .get("content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .ok_or(ClientError::Empty { provider: PROVIDER })
    }

    #[instrument(skip(self, messages), err)]
    async fn structured(&self, messages: &[Message]) -> Result<Value, ClientError> {
        let message = self
            .complete(json!({
                "model": self.model,
                "temperature": self.temperature,
                "messages": Self::wire_messages(messages),
                "response_format": {"type": "json_object"},
            }))
            .await?;
        let content = message
            .get("content")
            .and_then(Value::as_str)
            .ok_or(ClientError::Empty { provider: PROVIDER })?;
        serde_json::from_str(strip_fences(content)).map_err(|e| ClientError::Decode {
            provider: PROVIDER,
            message: format!("structured output: {e}"),
        })
    }

    #[instrument(skip(self, messages, tools), fields(tool_count = tools.len()), err)]
    async fn tool_call(
        &self,
        messages: &[Message],
        tools: &[Arc<dyn ToolHandler>],
    ) -> Result<ToolTrace, ClientError> {
        let tool_specs: Vec<Value> = tools
            .iter()
            .map(|t| {
                let spec = t.spec();
                json!({
                    "type": "function",
                    "function": {
                        "name": spec.name,
                        "description": spec.description,
                        "parameters": spec.parameters,
                    }
                })
            })
            .collect();

        let mut wire = Self::wire_messages(messages);
        let mut trace = ToolTrace::default();

        for _ in 0..MAX_TOOL_ROUNDS {
            let message = self
                .complete(json!({
                    "model": self.model,
                    "temperature": self.temperature,
                    "messages": wire,
                    "tools": tool_specs,
                }))
                .await?;

            let calls = Self::extract_tool_calls(&message)?;
            if calls.is_empty() {
                let reply = message
                    .get("content")
                    .and_then(Value::as_str)
                    .filter(|c| !c.is_empty())
                    .ok_or(ClientError::Empty { provider: PROVIDER })?;
                trace.messages.push(Message::assistant(reply));
                trace.reply = reply.to_string();
                return Ok(trace);
            }

            wire.push(message.clone());
            for call in calls {
                let handler = tools
                    .iter()
                    .find(|t| t.spec().name == call.name)
                    .ok_or_else(|| ClientError::Tool {
                        name: call.name.clone(),
                        message: "model requested an unregistered tool".into(),
                    })?;
                let payload = handler.invoke(call.arguments.clone()).await?;
                let payload_text =
                    serde_json::to_string(&payload).map_err(|e| ClientError::Decode {
                        provider: PROVIDER,
                        message: e.to_string(),
                    })?;
                trace.messages.push(Message::tool(payload_text.clone()));
                trace.tool_payloads.push(payload);
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": payload_text,
                }));
            }
        }

        Err(ClientError::Tool {
            name: "<loop>".into(),
            message: format!("model kept requesting tools after {MAX_TOOL_ROUNDS} rounds"),
        })
    }
}
