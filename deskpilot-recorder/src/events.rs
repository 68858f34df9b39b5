use chrono::{DateTime, Local};
use deskpilot::Point;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Mouse buttons as recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other(u8),
}

impl From<rdev::Button> for MouseButton {
    fn from(button: rdev::Button) -> Self {
        match button {
            rdev::Button::Left => MouseButton::Left,
            rdev::Button::Right => MouseButton::Right,
            rdev::Button::Middle => MouseButton::Middle,
            rdev::Button::Unknown(code) => MouseButton::Other(code),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseButton::Left => f.write_str("left"),
            MouseButton::Right => f.write_str("right"),
            MouseButton::Middle => f.write_str("middle"),
            MouseButton::Other(code) => write!(f, "button{code}"),
        }
    }
}

/// What the operator did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Click { position: Point, button: MouseButton },
    /// Key name as understood by `deskpilot::input::parse_key`
    Key { key: String },
}

/// One captured input action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAction {
    /// Milliseconds since recording started
    pub elapsed_ms: u64,

    #[serde(flatten)]
    pub kind: ActionKind,

    /// Operator-supplied description, set during labelling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl RecordedAction {
    pub fn click(elapsed_ms: u64, position: Point, button: MouseButton) -> Self {
        Self {
            elapsed_ms,
            kind: ActionKind::Click { position, button },
            label: None,
        }
    }

    pub fn key(elapsed_ms: u64, key: impl Into<String>) -> Self {
        Self {
            elapsed_ms,
            kind: ActionKind::Key { key: key.into() },
            label: None,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_ms as f64 / 1000.0
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for RecordedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Click { position, button } => {
                write!(f, "CLICK at {position} - {button}")
            }
            ActionKind::Key { key } => write!(f, "KEY: {key}"),
        }
    }
}

/// A finished recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub started_at: DateTime<Local>,
    pub duration_ms: u64,
    pub actions: Vec<RecordedAction>,
}

impl Recording {
    pub fn new(started_at: DateTime<Local>) -> Self {
        Self {
            started_at,
            duration_ms: 0,
            actions: Vec::new(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_serializes_flat_with_type_tag() {
        let action = RecordedAction::click(1500, Point::new(10, 20), MouseButton::Left);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "click");
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["button"], "left");
        assert!(json.get("label").is_none());
    }

    #[test]
    fn test_display() {
        let click = RecordedAction::click(0, Point::new(3, 4), MouseButton::Right);
        assert_eq!(click.to_string(), "CLICK at (3, 4) - right");
        assert_eq!(RecordedAction::key(0, "enter").to_string(), "KEY: enter");
    }

    #[test]
    fn test_recording_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut recording = Recording::new(Local::now());
        recording.actions.push(RecordedAction::key(250, "down").with_label("Next file"));
        recording.duration_ms = 900;

        recording.save_to_file(&path).unwrap();
        let loaded = Recording::load_from_file(&path).unwrap();

        assert_eq!(loaded.actions, recording.actions);
        assert_eq!(loaded.duration_ms, 900);
    }
}
