pub mod device;
pub mod schedule;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::backend::ToolDef;
use crate::devices::DeviceRegistry;
use crate::schedule::ScheduleStore;

/// Result from executing a tool: text for the model plus optional
/// structured data (updated device, created task, ...).
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolOutput {
    pub fn with_data(text: impl Into<String>, data: Value) -> Self {
        Self {
            text: text.into(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

/// All tools available to the agent and the scheduler loop. Holds no
/// state of its own — every call routes into the shared stores, so it is
/// freely shareable across chat turns and the background loop.
pub struct ToolRegistry {
    pub device: device::DeviceTool,
    pub schedule: schedule::ScheduleTool,
}

impl ToolRegistry {
    pub fn new(devices: Arc<DeviceRegistry>, schedules: Arc<ScheduleStore>) -> Self {
        Self {
            device: device::DeviceTool::new(devices),
            schedule: schedule::ScheduleTool::new(schedules),
        }
    }

    /// Return all tool definitions for the LLM.
    pub fn tool_defs(&self) -> Vec<ToolDef> {
        let mut defs = device::DeviceTool::tool_defs();
        defs.extend(schedule::ScheduleTool::tool_defs());
        defs
    }

    /// Execute a tool by name with given input.
    pub fn execute(&self, name: &str, input: &Value) -> Result<ToolOutput, ToolError> {
        match name {
            "control_light" => self.device.control_light(input),
            "control_ac" => self.device.control_ac(input),
            "control_music" => self.device.control_music(input),
            "get_device_status" => self.device.status(input),
            "schedule_reminder" => self.schedule.schedule_reminder(input),
            "schedule_device_action" => self.schedule.schedule_device_action(input),
            "list_schedules" => self.schedule.list_schedules(input),
            "cancel_schedule" => self.schedule.cancel_schedule(input),
            _ => Err(ToolError::UnknownTool(name.to_string())),
        }
    }

    /// Device summary for injecting into the system prompt.
    pub fn device_context(&self) -> String {
        self.device.registry().context()
    }

    /// Pending-schedule summary for injecting into the system prompt.
    pub fn schedule_context(&self) -> String {
        self.schedule.store().context()
    }
}
