/// Fast path for trivial commands — regex match, no model round trip.
use std::sync::Arc;

use regex::Regex;

use crate::devices::{DevicePatch, DeviceRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub matched: bool,
    pub response: String,
    pub action_taken: bool,
}

impl RuleResult {
    fn unmatched() -> Self {
        Self {
            matched: false,
            response: String::new(),
            action_taken: false,
        }
    }

    fn done(response: impl Into<String>) -> Self {
        Self {
            matched: true,
            response: response.into(),
            action_taken: true,
        }
    }

    fn failed(response: impl Into<String>) -> Self {
        Self {
            matched: true,
            response: response.into(),
            action_taken: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum RuleAction {
    LightOn,
    LightOff,
    AcOn,
    AcOff,
    MusicPlay,
    MusicPause,
}

/// Matches a handful of high-frequency phrasings ("turn off the bedroom
/// light") and applies them directly to the registry. Anything it does
/// not recognize falls through to the agent.
pub struct RuleEngine {
    registry: Arc<DeviceRegistry>,
    rules: Vec<(Regex, RuleAction)>,
}

impl RuleEngine {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        let rules = vec![
            (
                Regex::new(r"(?i)^(?:turn on|open)\s*(?:the\s+)?(.*?)\s*lights?$").unwrap(),
                RuleAction::LightOn,
            ),
            (
                Regex::new(r"(?i)^(?:turn off|close)\s*(?:the\s+)?(.*?)\s*lights?$").unwrap(),
                RuleAction::LightOff,
            ),
            (
                Regex::new(r"(?i)^turn on\s*(?:the\s+)?(.*?)\s*(?:ac|air\s*con)$").unwrap(),
                RuleAction::AcOn,
            ),
            (
                Regex::new(r"(?i)^turn off\s*(?:the\s+)?(.*?)\s*(?:ac|air\s*con)$").unwrap(),
                RuleAction::AcOff,
            ),
            (
                Regex::new(r"(?i)^play(?:\s+music)?$").unwrap(),
                RuleAction::MusicPlay,
            ),
            (
                Regex::new(r"(?i)^(?:pause|stop)(?:\s+music)?$").unwrap(),
                RuleAction::MusicPause,
            ),
        ];
        Self { registry, rules }
    }

    /// Try the input against every rule in order. A match always returns
    /// `matched: true`, even when the targeted device does not exist.
    pub fn process(&self, input: &str) -> RuleResult {
        let input = input.trim();
        for (pattern, action) in &self.rules {
            if let Some(caps) = pattern.captures(input) {
                let room = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                return self.apply(*action, room);
            }
        }
        RuleResult::unmatched()
    }

    fn apply(&self, action: RuleAction, room: &str) -> RuleResult {
        match action {
            RuleAction::LightOn => self.switch(room, "light", "on", Some(("brightness", 100))),
            RuleAction::LightOff => self.switch(room, "light", "off", Some(("brightness", 0))),
            RuleAction::AcOn => self.switch(room, "ac", "on", None),
            RuleAction::AcOff => self.switch(room, "ac", "off", None),
            RuleAction::MusicPlay => self.music("on", "Playing."),
            RuleAction::MusicPause => self.music("off", "Paused."),
        }
    }

    fn switch(
        &self,
        room: &str,
        suffix: &str,
        status: &str,
        property: Option<(&str, i64)>,
    ) -> RuleResult {
        let room = parse_room(room);
        let device_id = format!("{room}_{suffix}");

        let mut patch = DevicePatch::status(status);
        if let Some((name, value)) = property {
            patch = patch.property(name, serde_json::json!(value));
        }

        match self.registry.apply(&device_id, &patch) {
            Ok(device) => RuleResult::done(format!(
                "Turned {status} {} {}.",
                device.room.display_name(),
                device.kind.display_name()
            )),
            Err(_) => RuleResult::failed("Device not found."),
        }
    }

    /// Play resumes the first music player, pause stops every one that is
    /// currently on.
    fn music(&self, status: &str, response: &str) -> RuleResult {
        let patch = DevicePatch::status(status);
        let players: Vec<String> = self
            .registry
            .list()
            .into_values()
            .filter(|d| d.kind == crate::devices::DeviceKind::Music)
            .filter(|d| status == "on" || d.status == "on")
            .map(|d| d.id)
            .collect();

        if players.is_empty() {
            return RuleResult::failed(if status == "on" {
                "No music player found."
            } else {
                "Nothing is playing."
            });
        }

        for id in players {
            let _ = self.registry.apply(&id, &patch);
            if status == "on" {
                break; // resume just the first player
            }
        }
        RuleResult::done(response)
    }
}

/// Normalize a free-text room mention into the id segment the device ids
/// use. An empty mention means the living room.
fn parse_room(room: &str) -> String {
    let room = room.trim().to_lowercase();
    match room.as_str() {
        "" => "living_room".to_string(),
        "living room" => "living_room".to_string(),
        other => other.replace(' ', "_"),
    }
}
