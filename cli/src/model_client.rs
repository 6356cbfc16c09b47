//! HTTP-backed [`ModelClient`] (C8's concrete implementation, out of scope
//! for `conveyor-core` per spec.md §1/§6). Grounded on the request/response
//! shape of the teacher's `codex-rs/core/src/client.rs`, trimmed to a single
//! non-streaming POST since this runtime has no SSE requirement, with the
//! same retry-with-backoff discipline.

use std::time::Duration;

use conveyor_core::error::CoreError;
use conveyor_core::error::Result;
use conveyor_core::model::ModelClient;
use conveyor_core::model::ModelDecision;
use conveyor_core::session::SessionState;
use conveyor_protocol::ContentPart;
use conveyor_protocol::Message;
use conveyor_protocol::Role;
use conveyor_protocol::ToolDescriptor;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

const MAX_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct HttpModelClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn post(&self, payload: &RequestPayload<'_>) -> Result<ResponsePayload> {
        let url = format!("{}/v1/responses", self.base_url.trim_end_matches('/'));

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.post(&url).json(payload);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<ResponsePayload>()
                        .await
                        .map_err(|e| CoreError::Model(format!("decoding model response: {e}")));
                }
                Ok(response) if attempt >= MAX_RETRIES => {
                    return Err(CoreError::Model(format!(
                        "model endpoint returned {}: {}",
                        response.status(),
                        response.text().await.unwrap_or_default()
                    )));
                }
                Err(e) if attempt >= MAX_RETRIES => {
                    return Err(CoreError::Model(format!("model request failed after {attempt} attempts: {e}")));
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestPayload<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    tools: &'a [ToolDescriptor],
    tool_choice: &'a str,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    #[serde(default)]
    tool_call: Option<WireToolCall>,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    tool_id: String,
    #[serde(default)]
    tool_use_id: Option<String>,
    #[serde(default)]
    args: Map<String, Value>,
}

fn render_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: json!(
                m.content
                    .iter()
                    .map(render_part)
                    .collect::<Vec<_>>()
            ),
        })
        .collect()
}

fn render_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({"type": "text", "text": text}),
        ContentPart::ToolUse { id, name, input } => json!({"type": "tool_use", "id": id, "name": name, "input": input}),
        ContentPart::ToolResult { tool_use_id, payload } => {
            json!({"type": "tool_result", "tool_use_id": tool_use_id, "payload": payload})
        }
    }
}

#[async_trait::async_trait]
impl ModelClient for HttpModelClient {
    async fn get_tool_call(
        &self,
        _query: &str,
        model: &str,
        tool_descriptions: &[ToolDescriptor],
        session: &SessionState,
    ) -> Result<ModelDecision> {
        let messages = {
            let ctx = session
                .context
                .lock()
                .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
            render_messages(ctx.messages())
        };

        let payload = RequestPayload {
            model,
            messages,
            tools: tool_descriptions,
            tool_choice: "auto",
        };

        let response = self.post(&payload).await?;

        match response.tool_call {
            Some(call) => Ok(ModelDecision::ToolCall {
                tool_id: call.tool_id,
                tool_use_id: call.tool_use_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                args: call.args,
            }),
            None => Ok(ModelDecision::Final {
                response: response.response.unwrap_or_default(),
            }),
        }
    }

    async fn generate_response(
        &self,
        _query: &str,
        model: &str,
        tool_descriptions: &[ToolDescriptor],
        session: &SessionState,
        options: conveyor_core::model::GenerateOptions,
    ) -> Result<Message> {
        let messages = {
            let ctx = session
                .context
                .lock()
                .map_err(|_| CoreError::Other("context window lock poisoned".to_string()))?;
            render_messages(ctx.messages())
        };

        let payload = RequestPayload {
            model,
            messages,
            tools: tool_descriptions,
            tool_choice: options.tool_choice.as_deref().unwrap_or("none"),
        };

        let response = self.post(&payload).await?;
        let text = response.response.unwrap_or_default();
        Ok(Message::new(
            uuid::Uuid::new_v4().to_string(),
            Role::Assistant,
            vec![ContentPart::Text(text)],
        ))
    }
}
