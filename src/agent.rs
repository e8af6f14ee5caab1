/// Tool-calling agent loop — the brain of the butler.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::backend::{create_backend, StopReason, ToolResult};
use crate::config::Config;
use crate::tools::ToolRegistry;

const MAX_ITERATIONS: usize = 10;

/// Events emitted while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Assistant text
    Text { chunk: String },
    /// A tool is being called
    Action { name: String, label: String },
    /// Turn finished (end_turn)
    Done,
    /// Error
    Error { message: String },
}

pub struct Agent {
    config: Config,
    history: Vec<Value>,
}

impl Agent {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            history: Vec::new(),
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Build the system prompt, embedding the current device and schedule
    /// state so status questions can be answered without a tool call.
    fn system_prompt(&self, tools: &ToolRegistry) -> String {
        let device_ctx = tools.device_context();
        let schedule_ctx = tools.schedule_context();

        format!(
            "You are {}, a smart home assistant.\n\n\
            {device_ctx}\n\n\
            {schedule_ctx}\n\n\
            Your role:\n\
            1. Understand requests about the home and execute them with tools.\n\
            2. Answer status questions directly from the context above.\n\
            3. Schedule reminders and timed device actions when asked.\n\
            4. Be concise but friendly, and respond in the user's language.\n\n\
            Rules:\n\
            - Device commands go through control_light / control_ac / control_music.\n\
            - trigger_time for scheduling tools must be an RFC 3339 timestamp in the future.\n\
            - For \"every day at X\" use repeat=\"daily\", \"every week\" repeat=\"weekly\".\n\
            - To cancel or list schedules, use cancel_schedule / list_schedules.\n\n\
            Comfort requests name a feeling, not a device. Read the device context and act:\n\
            - \"It's too dark\" -> turn on lights or raise brightness.\n\
            - \"It's too bright\" -> lower brightness or turn lights off.\n\
            - \"It's too cold\" -> if the AC is cooling, raise the temperature or switch to heat; if off, turn on heat.\n\
            - \"It's too hot\" -> if the AC is off, turn on cooling; otherwise lower the temperature.\n\
            - \"It's too loud\" -> lower the music volume or pause it.\n\
            - \"It's too quiet\" -> play music or raise the volume.\n\
            Always check the current state first. If the room is unclear, ask.\n\
            You have up to {MAX_ITERATIONS} steps.",
            self.config.agent_name
        )
    }

    /// Run one user turn. Emits events via the sender; tool errors are fed
    /// back to the model as tool results rather than aborting the turn.
    pub async fn run(
        &mut self,
        user_input: String,
        tools: &ToolRegistry,
        tx: mpsc::Sender<AgentEvent>,
    ) -> Result<()> {
        let backend = create_backend(&self.config);

        let user_msg = backend.make_user_message(&user_input);
        self.history.push(user_msg);

        let system = self.system_prompt(tools);
        let tool_defs = tools.tool_defs();

        for _iteration in 0..MAX_ITERATIONS {
            let (result, raw_assistant) = backend
                .complete_turn(&system, &self.history, &tool_defs)
                .await?;

            self.history.push(raw_assistant);

            if !result.text.is_empty() {
                let _ = tx
                    .send(AgentEvent::Text {
                        chunk: result.text.clone(),
                    })
                    .await;
            }

            if result.stop_reason == StopReason::EndTurn {
                let _ = tx.send(AgentEvent::Done).await;
                return Ok(());
            }

            let mut tool_results = Vec::new();
            for tc in &result.tool_calls {
                let label = format_action_label(&tc.name, &tc.input);
                let _ = tx
                    .send(AgentEvent::Action {
                        name: tc.name.clone(),
                        label,
                    })
                    .await;

                let text = match tools.execute(&tc.name, &tc.input) {
                    Ok(out) => out.text,
                    Err(e) => format!("Tool error: {e}"),
                };

                tool_results.push(ToolResult {
                    call_id: tc.id.clone(),
                    text,
                });
            }

            let result_msgs = backend.make_tool_results(&tool_results);
            self.history.extend(result_msgs);
        }

        // Max iterations reached — force end
        let _ = tx
            .send(AgentEvent::Error {
                message: "Reached maximum steps.".to_string(),
            })
            .await;
        let _ = tx.send(AgentEvent::Done).await;
        Ok(())
    }

    /// Run a turn and collect the assistant text into one reply string.
    pub async fn run_collect(&mut self, user_input: String, tools: &ToolRegistry) -> Result<String> {
        let (tx, mut rx) = mpsc::channel(64);
        let collector = tokio::spawn(async move {
            let mut reply = String::new();
            while let Some(event) = rx.recv().await {
                if let AgentEvent::Text { chunk } = event {
                    if !reply.is_empty() {
                        reply.push('\n');
                    }
                    reply.push_str(&chunk);
                }
            }
            reply
        });

        self.run(user_input, tools, tx).await?;
        Ok(collector.await?)
    }
}

fn format_action_label(name: &str, input: &Value) -> String {
    match name {
        "control_light" => {
            let device = input["device"].as_str().unwrap_or("light");
            format!("💡 Adjusting {device}...")
        }
        "control_ac" => {
            let device = input["device"].as_str().unwrap_or("ac");
            format!("❄️ Adjusting {device}...")
        }
        "control_music" => {
            let device = input["device"].as_str().unwrap_or("music");
            format!("🎵 Adjusting {device}...")
        }
        "get_device_status" => "🏠 Checking devices...".to_string(),
        "schedule_reminder" | "schedule_device_action" => "⏰ Scheduling...".to_string(),
        "list_schedules" => "📋 Checking schedules...".to_string(),
        "cancel_schedule" => "🗑️ Cancelling...".to_string(),
        _ => format!("⚙️ {name}..."),
    }
}
