/// OpenAI-compatible chat completions backend (OpenAI, vLLM, Kimi, ...).
use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{LlmBackendDyn, StopReason, ToolCall, ToolDef, ToolResult, TurnResult};

const MAX_TOKENS: u32 = 4096;

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn convert_tools(tools: &[ToolDef]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()
    }

    /// Pull tool calls out of a non-streaming assistant message.
    fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
        let Some(raw) = message["tool_calls"].as_array() else {
            return Vec::new();
        };
        raw.iter()
            .map(|tc| {
                let id = tc["id"].as_str().unwrap_or("").to_string();
                let name = tc["function"]["name"].as_str().unwrap_or("").to_string();
                let input: Value = tc["function"]["arguments"]
                    .as_str()
                    .and_then(|s| serde_json::from_str(s).ok())
                    .unwrap_or(Value::Null);
                ToolCall {
                    id: if id.is_empty() {
                        format!("call_{}", Uuid::new_v4().simple())
                    } else {
                        id
                    },
                    name,
                    input,
                }
            })
            .collect()
    }
}

impl LlmBackendDyn for OpenAiBackend {
    fn complete_turn<'a>(
        &'a self,
        system: &'a str,
        history: &'a [Value],
        tools: &'a [ToolDef],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(TurnResult, Value)>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut messages = vec![json!({"role": "system", "content": system})];
            messages.extend_from_slice(history);

            let oai_tools = Self::convert_tools(tools);

            let mut body = json!({
                "model": self.model,
                "max_completion_tokens": MAX_TOKENS,
                "messages": messages,
            });
            if !oai_tools.is_empty() {
                body["tools"] = json!(oai_tools);
            }

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("OpenAI API error {status}: {text}");
            }

            let reply: Value = resp.json().await?;
            let choice = &reply["choices"][0];
            let message = &choice["message"];

            let text = message["content"].as_str().unwrap_or("").to_string();
            let tool_calls = Self::parse_tool_calls(message);

            let stop_reason = if choice["finish_reason"] == "tool_calls" || !tool_calls.is_empty()
            {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            };

            // Echo the assistant message back into history verbatim.
            let raw_assistant = message.clone();

            Ok((
                TurnResult {
                    stop_reason,
                    text,
                    tool_calls,
                },
                raw_assistant,
            ))
        })
    }

    fn make_user_message(&self, text: &str) -> Value {
        json!({"role": "user", "content": text})
    }

    fn make_tool_results(&self, results: &[ToolResult]) -> Vec<Value> {
        results
            .iter()
            .map(|r| {
                json!({
                    "role": "tool",
                    "tool_call_id": r.call_id,
                    "content": r.text,
                })
            })
            .collect()
    }
}
