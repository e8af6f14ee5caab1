/// Scheduling tools — reminders and deferred device actions.
///
/// Trigger times arrive already resolved to absolute RFC 3339 timestamps;
/// turning "tomorrow at 9" into a timestamp is the reasoning layer's job.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::backend::ToolDef;
use crate::schedule::{Repeat, ScheduleError, ScheduleStore, TaskPayload, TaskStatus};

use super::device::require_str;
use super::{ToolError, ToolOutput};

/// Device tools a deferred action is allowed to replay.
const REPLAYABLE_TOOLS: &[&str] = &["control_light", "control_ac", "control_music"];

pub struct ScheduleTool {
    store: Arc<ScheduleStore>,
}

impl ScheduleTool {
    pub fn new(store: Arc<ScheduleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn tool_defs() -> Vec<ToolDef> {
        let trigger_time = json!({
            "type": "string",
            "description": "Absolute RFC 3339 timestamp, e.g. 2024-06-01T23:00:00Z"
        });
        let repeat = json!({
            "type": "string",
            "enum": ["once", "daily", "weekly"],
            "description": "Defaults to once"
        });
        vec![
            ToolDef {
                name: "schedule_reminder".to_string(),
                description: "Remind the user of something at a future time, \
                              optionally repeating."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string", "description": "What to remind about"},
                        "trigger_time": trigger_time,
                        "repeat": repeat
                    },
                    "required": ["message", "trigger_time"]
                }),
            },
            ToolDef {
                name: "schedule_device_action".to_string(),
                description: "Run a device tool at a future time, optionally repeating. \
                              tool: control_light/control_ac/control_music. \
                              arguments: the arguments that tool would take live."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "tool": {"type": "string", "enum": REPLAYABLE_TOOLS},
                        "arguments": {"type": "object"},
                        "trigger_time": trigger_time,
                        "repeat": repeat
                    },
                    "required": ["tool", "arguments", "trigger_time"]
                }),
            },
            ToolDef {
                name: "list_schedules".to_string(),
                description: "List scheduled tasks and reminders, optionally filtered \
                              by status (pending/fired/cancelled)."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "status": {"type": "string", "enum": ["pending", "fired", "cancelled"]}
                    }
                }),
            },
            ToolDef {
                name: "cancel_schedule".to_string(),
                description: "Cancel a pending scheduled task or reminder by id.".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string"}
                    },
                    "required": ["task_id"]
                }),
            },
        ]
    }

    pub fn schedule_reminder(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        let message = require_str(input, "message")?.to_string();
        let trigger_time = parse_trigger(input)?;
        let repeat = parse_repeat(input)?;

        let task = self
            .store
            .create(Utc::now(), trigger_time, repeat, TaskPayload::Reminder { message: message.clone() })
            .map_err(execution)?;

        let text = format!(
            "Reminder set for {}{}: {} [ID: {}]",
            task.trigger_time.format("%Y-%m-%d %H:%M"),
            repeat_suffix(repeat),
            message,
            task.id
        );
        Ok(ToolOutput::with_data(text, task_json(&task)?))
    }

    pub fn schedule_device_action(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        let tool = require_str(input, "tool")?.to_string();
        if !REPLAYABLE_TOOLS.contains(&tool.as_str()) {
            return Err(ToolError::InvalidArguments(format!(
                "`{tool}` cannot be scheduled; expected one of {REPLAYABLE_TOOLS:?}"
            )));
        }
        let arguments = input
            .get("arguments")
            .filter(|a| a.is_object())
            .cloned()
            .ok_or_else(|| {
                ToolError::InvalidArguments("`arguments` must be an object".to_string())
            })?;
        let trigger_time = parse_trigger(input)?;
        let repeat = parse_repeat(input)?;

        let task = self
            .store
            .create(
                Utc::now(),
                trigger_time,
                repeat,
                TaskPayload::DeviceAction {
                    tool: tool.clone(),
                    arguments,
                },
            )
            .map_err(execution)?;

        let text = format!(
            "Scheduled {} for {}{} [ID: {}]",
            tool,
            task.trigger_time.format("%Y-%m-%d %H:%M"),
            repeat_suffix(repeat),
            task.id
        );
        Ok(ToolOutput::with_data(text, task_json(&task)?))
    }

    pub fn list_schedules(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        let filter = match input.get("status").and_then(Value::as_str) {
            Some(s) => Some(TaskStatus::parse(s).ok_or_else(|| {
                ToolError::InvalidArguments(format!("unknown status `{s}`"))
            })?),
            None => None,
        };
        let tasks = self.store.list(filter);
        let data =
            serde_json::to_value(&tasks).map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutput::with_data(self.store.context(), data))
    }

    pub fn cancel_schedule(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        let task_id = require_str(input, "task_id")?;
        let task = self.store.cancel(task_id).map_err(execution)?;
        Ok(ToolOutput::with_data(
            format!("Cancelled: {}", task.payload.describe()),
            task_json(&task)?,
        ))
    }
}

fn parse_trigger(input: &Value) -> Result<DateTime<Utc>, ToolError> {
    let raw = require_str(input, "trigger_time")?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ToolError::InvalidArguments(format!("bad trigger_time `{raw}`: {e}")))
}

fn parse_repeat(input: &Value) -> Result<Repeat, ToolError> {
    match input.get("repeat").and_then(Value::as_str) {
        None => Ok(Repeat::Once),
        Some(s) => Repeat::parse(s)
            .ok_or_else(|| ToolError::InvalidArguments(format!("unknown repeat `{s}`"))),
    }
}

fn repeat_suffix(repeat: Repeat) -> &'static str {
    match repeat {
        Repeat::Once => "",
        Repeat::Daily => " (repeats daily)",
        Repeat::Weekly => " (repeats weekly)",
    }
}

fn execution(e: ScheduleError) -> ToolError {
    ToolError::Execution(e.to_string())
}

fn task_json(task: &crate::schedule::ScheduledTask) -> Result<Value, ToolError> {
    serde_json::to_value(task).map_err(|e| ToolError::Execution(e.to_string()))
}
