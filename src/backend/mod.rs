pub mod anthropic;
pub mod openai;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// A single tool definition passed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call returned by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Result of one LLM turn.
#[derive(Debug)]
pub struct TurnResult {
    pub stop_reason: StopReason,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
}

/// Tool result to feed back to the LLM.
pub struct ToolResult {
    pub call_id: String,
    pub text: String,
}

/// Factory: create the right backend from config.
pub fn create_backend(config: &Config) -> Box<dyn LlmBackendDyn> {
    match config.platform.as_str() {
        "anthropic" => Box::new(anthropic::AnthropicBackend::new(
            config.api_key.clone(),
            config.effective_model().to_string(),
        )),
        // Default: any OpenAI-compatible endpoint
        _ => Box::new(openai::OpenAiBackend::new(
            config.api_key.clone(),
            config.effective_model().to_string(),
            config.effective_base_url().to_string(),
        )),
    }
}

/// Object-safe LLM backend.
/// Hand-rolled boxed futures because `impl Future` in traits isn't
/// object-safe directly.
pub trait LlmBackendDyn: Send + Sync {
    /// One non-streaming model call: system prompt, prior messages, tools.
    /// Returns the parsed turn plus the raw assistant message to append
    /// to history.
    fn complete_turn<'a>(
        &'a self,
        system: &'a str,
        history: &'a [serde_json::Value],
        tools: &'a [ToolDef],
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(TurnResult, serde_json::Value)>> + Send + 'a>,
    >;

    fn make_user_message(&self, text: &str) -> serde_json::Value;
    fn make_tool_results(&self, results: &[ToolResult]) -> Vec<serde_json::Value>;
}
