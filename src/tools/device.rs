/// Immediate device tools — hands of the butler.
use std::sync::Arc;

use serde_json::{json, Value};

use crate::backend::ToolDef;
use crate::devices::{DeviceError, DevicePatch, DeviceRegistry, Room};

use super::{ToolError, ToolOutput};

pub struct DeviceTool {
    registry: Arc<DeviceRegistry>,
}

impl DeviceTool {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn tool_defs() -> Vec<ToolDef> {
        vec![
            ToolDef {
                name: "control_light".to_string(),
                description: "Switch a light on or off and/or set its brightness. \
                              device: the light's id (e.g. bedroom_light). \
                              brightness: 0-100."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "device": {"type": "string", "description": "Device id"},
                        "status": {"type": "string", "enum": ["on", "off"]},
                        "brightness": {"type": "integer", "minimum": 0, "maximum": 100}
                    },
                    "required": ["device"]
                }),
            },
            ToolDef {
                name: "control_ac".to_string(),
                description: "Switch an AC unit on or off, set its target temperature \
                              (16-30) and/or mode (cool/heat/auto)."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "device": {"type": "string", "description": "Device id"},
                        "status": {"type": "string", "enum": ["on", "off"]},
                        "temperature": {"type": "integer", "minimum": 16, "maximum": 30},
                        "mode": {"type": "string", "enum": ["cool", "heat", "auto"]}
                    },
                    "required": ["device"]
                }),
            },
            ToolDef {
                name: "control_music".to_string(),
                description: "Control a music player: switch on (play) or off (stop), \
                              set volume 0-100, or pick a track."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "device": {"type": "string", "description": "Device id"},
                        "status": {"type": "string", "enum": ["on", "off"]},
                        "volume": {"type": "integer", "minimum": 0, "maximum": 100},
                        "track": {"type": "string"}
                    },
                    "required": ["device"]
                }),
            },
            ToolDef {
                name: "get_device_status".to_string(),
                description: "Current status of every device, optionally filtered \
                              by room (bedroom/living_room/kitchen/study)."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "room": {
                            "type": "string",
                            "enum": ["bedroom", "living_room", "kitchen", "study"]
                        }
                    }
                }),
            },
        ]
    }

    /// Build the patch from tool arguments and apply it. The registry does
    /// the domain validation; anything it rejects surfaces as an
    /// execution error, structural problems as invalid arguments.
    fn control(&self, input: &Value, props: &[&str]) -> Result<ToolOutput, ToolError> {
        let device = require_str(input, "device")?;

        let mut patch = DevicePatch::default();
        if let Some(status) = input.get("status") {
            patch.status = Some(
                status
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidArguments("status must be a string".into()))?
                    .to_string(),
            );
        }
        for name in props {
            if let Some(value) = input.get(*name) {
                patch = patch.property(name, value.clone());
            }
        }
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments(
                "nothing to change: pass status and/or a property".to_string(),
            ));
        }

        let updated = self.registry.apply(device, &patch).map_err(execution)?;
        let text = format!(
            "{} in the {} is now {}",
            updated.kind.display_name(),
            updated.room.display_name(),
            updated.status
        );
        let data = serde_json::to_value(&updated).map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutput::with_data(text, data))
    }

    pub fn control_light(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        self.control(input, &["brightness"])
    }

    pub fn control_ac(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        self.control(input, &["temperature", "mode"])
    }

    pub fn control_music(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        self.control(input, &["volume", "track"])
    }

    pub fn status(&self, input: &Value) -> Result<ToolOutput, ToolError> {
        let devices = match input.get("room").and_then(Value::as_str) {
            Some(room_str) => {
                let room: Room = serde_json::from_value(json!(room_str)).map_err(|_| {
                    ToolError::InvalidArguments(format!("unknown room `{room_str}`"))
                })?;
                self.registry.in_room(room)
            }
            None => self.registry.list().into_values().collect(),
        };
        let data = serde_json::to_value(&devices).map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutput::with_data(self.registry.context(), data))
    }
}

fn execution(e: DeviceError) -> ToolError {
    ToolError::Execution(e.to_string())
}

pub(super) fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required string `{key}`")))
}
