/// Anthropic Messages API backend (Claude)
use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};

use super::{LlmBackendDyn, StopReason, ToolCall, ToolDef, ToolResult, TurnResult};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 4096;
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }

    fn convert_tools(tools: &[ToolDef]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect()
    }

    /// Split a non-streaming response's content blocks into text and
    /// tool_use calls.
    fn parse_content(content: &Value) -> (String, Vec<ToolCall>) {
        let mut text_chunks = Vec::new();
        let mut tool_calls = Vec::new();
        for block in content.as_array().into_iter().flatten() {
            match block["type"].as_str().unwrap_or("") {
                "text" => {
                    if let Some(t) = block["text"].as_str() {
                        text_chunks.push(t.to_string());
                    }
                }
                "tool_use" => {
                    tool_calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or("").to_string(),
                        name: block["name"].as_str().unwrap_or("").to_string(),
                        input: block["input"].clone(),
                    });
                }
                _ => {}
            }
        }
        (text_chunks.join(""), tool_calls)
    }
}

impl LlmBackendDyn for AnthropicBackend {
    fn complete_turn<'a>(
        &'a self,
        system: &'a str,
        history: &'a [Value],
        tools: &'a [ToolDef],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(TurnResult, Value)>> + Send + 'a>>
    {
        Box::pin(async move {
            let body = json!({
                "model": self.model,
                "max_tokens": MAX_TOKENS,
                "system": system,
                "tools": Self::convert_tools(tools),
                "messages": history,
            });

            let resp = self
                .client
                .post(API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("Anthropic API error {status}: {text}");
            }

            let reply: Value = resp.json().await?;
            let (text, tool_calls) = Self::parse_content(&reply["content"]);

            let stop_reason = if reply["stop_reason"] == "tool_use" {
                StopReason::ToolUse
            } else {
                StopReason::EndTurn
            };

            // History keeps the content blocks as returned.
            let raw_assistant = json!({
                "role": "assistant",
                "content": reply["content"].clone(),
            });

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
        // Anthropic expects all tool results in one user message.
        let blocks: Vec<Value> = results
            .iter()
            .map(|r| {
                json!({
                    "type": "tool_result",
                    "tool_use_id": r.call_id,
                    "content": r.text,
                })
            })
            .collect();
        vec![json!({"role": "user", "content": blocks})]
    }
}
