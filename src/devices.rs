/// Device registry — authoritative in-memory state of the simulated home.
use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Room {
    Bedroom,
    LivingRoom,
    Kitchen,
    Study,
}

impl Room {
    pub fn display_name(&self) -> &'static str {
        match self {
            Room::Bedroom => "Bedroom",
            Room::LivingRoom => "Living Room",
            Room::Kitchen => "Kitchen",
            Room::Study => "Study",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Light,
    Ac,
    Music,
}

impl DeviceKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            DeviceKind::Light => "light",
            DeviceKind::Ac => "AC",
            DeviceKind::Music => "music player",
        }
    }
}

/// One device record. `properties` always carries every property the kind
/// knows about; irrelevant ones hold `null` rather than being omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub room: Room,
    pub kind: DeviceKind,
    pub status: String,
    pub properties: BTreeMap<String, Value>,
}

/// Partial update: only the fields present are written. Unmentioned
/// properties keep their previous values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl DevicePatch {
    pub fn status(value: &str) -> Self {
        Self {
            status: Some(value.to_string()),
            properties: BTreeMap::new(),
        }
    }

    pub fn property(mut self, name: &str, value: Value) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.properties.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceError {
    #[error("no device with id `{0}`")]
    NotFound(String),
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
}

// ── Per-kind property domains ─────────────────────────────────────

fn check_int_range(name: &str, value: &Value, min: i64, max: i64) -> Result<(), DeviceError> {
    match value.as_i64() {
        Some(n) if (min..=max).contains(&n) => Ok(()),
        _ => Err(DeviceError::InvalidPatch(format!(
            "{name} must be an integer between {min} and {max}, got {value}"
        ))),
    }
}

fn validate_property(kind: DeviceKind, name: &str, value: &Value) -> Result<(), DeviceError> {
    match (kind, name) {
        // null clears a property that can be absent (brightness, track)
        (DeviceKind::Light, "brightness") if value.is_null() => Ok(()),
        (DeviceKind::Light, "brightness") => check_int_range(name, value, 0, 100),
        (DeviceKind::Ac, "temperature") => check_int_range(name, value, 16, 30),
        (DeviceKind::Ac, "mode") => match value.as_str() {
            Some("cool" | "heat" | "auto") => Ok(()),
            _ => Err(DeviceError::InvalidPatch(format!(
                "mode must be one of cool/heat/auto, got {value}"
            ))),
        },
        (DeviceKind::Music, "volume") => check_int_range(name, value, 0, 100),
        (DeviceKind::Music, "track") if value.is_null() || value.is_string() => Ok(()),
        (DeviceKind::Music, "track") => Err(DeviceError::InvalidPatch(format!(
            "track must be a string or null, got {value}"
        ))),
        _ => Err(DeviceError::InvalidPatch(format!(
            "unknown property `{name}` for a {kind:?} device"
        ))),
    }
}

fn validate_status(value: &str) -> Result<(), DeviceError> {
    match value {
        "on" | "off" => Ok(()),
        other => Err(DeviceError::InvalidPatch(format!(
            "status must be `on` or `off`, got `{other}`"
        ))),
    }
}

// ── Registry ──────────────────────────────────────────────────────

/// Shared, lock-guarded device state. Every mutation goes through
/// `apply`; readers get snapshots, never references into the map.
pub struct DeviceRegistry {
    seed: Vec<Device>,
    inner: Mutex<BTreeMap<String, Device>>,
}

impl DeviceRegistry {
    pub fn new(seed: Vec<Device>) -> Self {
        let map = seed.iter().map(|d| (d.id.clone(), d.clone())).collect();
        Self {
            seed,
            inner: Mutex::new(map),
        }
    }

    /// The demo home: three lights, two AC units, one speaker.
    pub fn with_default_home() -> Self {
        fn device(
            id: &str,
            room: Room,
            kind: DeviceKind,
            status: &str,
            properties: &[(&str, Value)],
        ) -> Device {
            Device {
                id: id.to_string(),
                room,
                kind,
                status: status.to_string(),
                properties: properties
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }
        }

        Self::new(vec![
            device(
                "bedroom_light",
                Room::Bedroom,
                DeviceKind::Light,
                "off",
                &[("brightness", Value::Null)],
            ),
            device(
                "living_room_light",
                Room::LivingRoom,
                DeviceKind::Light,
                "on",
                &[("brightness", json!(80))],
            ),
            device(
                "kitchen_light",
                Room::Kitchen,
                DeviceKind::Light,
                "off",
                &[("brightness", Value::Null)],
            ),
            device(
                "bedroom_ac",
                Room::Bedroom,
                DeviceKind::Ac,
                "off",
                &[("temperature", json!(26)), ("mode", json!("cool"))],
            ),
            device(
                "living_room_ac",
                Room::LivingRoom,
                DeviceKind::Ac,
                "on",
                &[("temperature", json!(24)), ("mode", json!("cool"))],
            ),
            device(
                "living_room_music",
                Room::LivingRoom,
                DeviceKind::Music,
                "off",
                &[("volume", json!(50)), ("track", Value::Null)],
            ),
        ])
    }

    pub fn get(&self, id: &str) -> Result<Device, DeviceError> {
        self.inner
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))
    }

    /// Snapshot of every device, keyed by id. Mutating the returned map
    /// has no effect on the registry.
    pub fn list(&self) -> BTreeMap<String, Device> {
        self.inner.lock().unwrap().clone()
    }

    /// Validate and apply a patch atomically. Either every field in the
    /// patch is accepted and written, or nothing changes.
    pub fn apply(&self, id: &str, patch: &DevicePatch) -> Result<Device, DeviceError> {
        if patch.is_empty() {
            return Err(DeviceError::InvalidPatch("empty patch".to_string()));
        }

        let mut map = self.inner.lock().unwrap();
        let device = map
            .get_mut(id)
            .ok_or_else(|| DeviceError::NotFound(id.to_string()))?;

        if let Some(status) = &patch.status {
            validate_status(status)?;
        }
        for (name, value) in &patch.properties {
            validate_property(device.kind, name, value)?;
        }

        // Validation passed — now write.
        if let Some(status) = &patch.status {
            device.status = status.clone();
        }
        for (name, value) in &patch.properties {
            device.properties.insert(name.clone(), value.clone());
        }

        Ok(device.clone())
    }

    /// Devices in a single room, in id order.
    pub fn in_room(&self, room: Room) -> Vec<Device> {
        self.inner
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.room == room)
            .cloned()
            .collect()
    }

    /// Restore the seed catalog, discarding all mutations.
    pub fn reset(&self) {
        let mut map = self.inner.lock().unwrap();
        *map = self.seed.iter().map(|d| (d.id.clone(), d.clone())).collect();
    }

    /// Human-readable device summary for the agent's system prompt.
    pub fn context(&self) -> String {
        let map = self.inner.lock().unwrap();
        let mut lines = vec!["[Current Device Status]".to_string()];
        for device in map.values() {
            let props: Vec<String> = device
                .properties
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            let mut line = format!(
                "- {} {} ({}): {}",
                device.room.display_name(),
                device.kind.display_name(),
                device.id,
                device.status.to_uppercase()
            );
            if !props.is_empty() {
                line.push_str(&format!(" ({})", props.join(", ")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::with_default_home()
    }

    // ── get / list ────────────────────────────────────────────────

    #[test]
    fn get_known_device() {
        let reg = registry();
        let d = reg.get("bedroom_light").unwrap();
        assert_eq!(d.room, Room::Bedroom);
        assert_eq!(d.kind, DeviceKind::Light);
        assert_eq!(d.status, "off");
        assert_eq!(d.properties["brightness"], Value::Null);
    }

    #[test]
    fn get_unknown_device_is_not_found() {
        let reg = registry();
        assert_eq!(
            reg.get("garage_door"),
            Err(DeviceError::NotFound("garage_door".to_string()))
        );
    }

    #[test]
    fn list_returns_all_seeded_devices() {
        let reg = registry();
        let all = reg.list();
        assert_eq!(all.len(), 6);
        assert!(all.contains_key("bedroom_light"));
        assert!(all.contains_key("living_room_music"));
    }

    #[test]
    fn list_is_a_snapshot_not_a_view() {
        let reg = registry();
        let mut snapshot = reg.list();
        snapshot.get_mut("bedroom_light").unwrap().status = "on".to_string();
        // Registry state is unaffected by mutating the snapshot.
        assert_eq!(reg.get("bedroom_light").unwrap().status, "off");
    }

    // ── apply: happy paths ────────────────────────────────────────

    #[test]
    fn apply_status_leaves_properties_untouched() {
        let reg = registry();
        let d = reg.apply("bedroom_light", &DevicePatch::status("on")).unwrap();
        assert_eq!(d.status, "on");
        // brightness was null and must stay null — untouched by the patch
        assert_eq!(d.properties["brightness"], Value::Null);
    }

    #[test]
    fn apply_property_leaves_status_untouched() {
        let reg = registry();
        let patch = DevicePatch::default().property("brightness", json!(40));
        let d = reg.apply("living_room_light", &patch).unwrap();
        assert_eq!(d.status, "on");
        assert_eq!(d.properties["brightness"], json!(40));
    }

    #[test]
    fn apply_leaves_unmentioned_properties_at_prior_values() {
        let reg = registry();
        let patch = DevicePatch::default().property("temperature", json!(22));
        let d = reg.apply("living_room_ac", &patch).unwrap();
        assert_eq!(d.properties["temperature"], json!(22));
        assert_eq!(d.properties["mode"], json!("cool"));
    }

    #[test]
    fn apply_then_get_round_trips() {
        let reg = registry();
        let patch = DevicePatch::status("on").property("volume", json!(30));
        reg.apply("living_room_music", &patch).unwrap();
        let d = reg.get("living_room_music").unwrap();
        assert_eq!(d.status, "on");
        assert_eq!(d.properties["volume"], json!(30));
        assert_eq!(d.properties["track"], Value::Null);
    }

    #[test]
    fn apply_null_clears_brightness() {
        let reg = registry();
        let patch = DevicePatch::default().property("brightness", Value::Null);
        let d = reg.apply("living_room_light", &patch).unwrap();
        assert_eq!(d.properties["brightness"], Value::Null);
    }

    // ── apply: rejections ─────────────────────────────────────────

    #[test]
    fn apply_unknown_device_is_not_found() {
        let reg = registry();
        let err = reg.apply("nope", &DevicePatch::status("on")).unwrap_err();
        assert_eq!(err, DeviceError::NotFound("nope".to_string()));
    }

    #[test]
    fn apply_empty_patch_is_invalid() {
        let reg = registry();
        let err = reg.apply("bedroom_light", &DevicePatch::default()).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPatch(_)));
    }

    #[test]
    fn apply_bad_status_is_invalid() {
        let reg = registry();
        let err = reg
            .apply("bedroom_light", &DevicePatch::status("blinking"))
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPatch(_)));
    }

    #[test]
    fn apply_brightness_out_of_range_is_invalid() {
        let reg = registry();
        let patch = DevicePatch::default().property("brightness", json!(150));
        let err = reg.apply("bedroom_light", &patch).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPatch(_)));
    }

    #[test]
    fn apply_temperature_out_of_range_is_invalid() {
        let reg = registry();
        let patch = DevicePatch::default().property("temperature", json!(40));
        let err = reg.apply("bedroom_ac", &patch).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPatch(_)));
    }

    #[test]
    fn apply_unknown_mode_is_invalid() {
        let reg = registry();
        let patch = DevicePatch::default().property("mode", json!("turbo"));
        let err = reg.apply("bedroom_ac", &patch).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPatch(_)));
    }

    #[test]
    fn apply_property_of_wrong_kind_is_invalid() {
        let reg = registry();
        // brightness on an AC unit
        let patch = DevicePatch::default().property("brightness", json!(50));
        let err = reg.apply("bedroom_ac", &patch).unwrap_err();
        assert!(matches!(err, DeviceError::InvalidPatch(_)));
    }

    #[test]
    fn rejected_patch_changes_nothing() {
        let reg = registry();
        let before = reg.get("bedroom_ac").unwrap();
        // Valid status but invalid temperature: the whole patch must be rejected.
        let patch = DevicePatch::status("on").property("temperature", json!(99));
        assert!(reg.apply("bedroom_ac", &patch).is_err());
        assert_eq!(reg.get("bedroom_ac").unwrap(), before);
    }

    // ── in_room / reset / context ─────────────────────────────────

    #[test]
    fn in_room_filters_by_room() {
        let reg = registry();
        let bedroom = reg.in_room(Room::Bedroom);
        assert_eq!(bedroom.len(), 2);
        assert!(bedroom.iter().all(|d| d.room == Room::Bedroom));
    }

    #[test]
    fn reset_restores_seed_state() {
        let reg = registry();
        reg.apply("bedroom_light", &DevicePatch::status("on")).unwrap();
        reg.reset();
        assert_eq!(reg.get("bedroom_light").unwrap().status, "off");
    }

    #[test]
    fn context_lists_every_device_and_skips_null_properties() {
        let reg = registry();
        let ctx = reg.context();
        assert!(ctx.contains("[Current Device Status]"));
        assert!(ctx.contains("bedroom_light"));
        assert!(ctx.contains("temperature=24"));
        // bedroom_light brightness is null — must not appear as a property
        assert!(!ctx.contains("brightness=null"));
    }

    // ── serde shape ───────────────────────────────────────────────

    #[test]
    fn device_serializes_with_snake_case_enums() {
        let reg = registry();
        let d = reg.get("living_room_light").unwrap();
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["room"], "living_room");
        assert_eq!(v["kind"], "light");
    }

    #[test]
    fn patch_deserializes_from_partial_json() {
        let patch: DevicePatch =
            serde_json::from_value(json!({"status": "on"})).unwrap();
        assert_eq!(patch.status.as_deref(), Some("on"));
        assert!(patch.properties.is_empty());
    }
}
