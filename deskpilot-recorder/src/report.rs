//! Human-reviewable logs written at the end of a recording session

use crate::{ActionKind, RecordedAction, Recording};
use chrono::{DateTime, Local};
use deskpilot::input::parse_key;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;

/// Pauses shorter than this are operator jitter, not settle time
const MIN_SUGGESTED_PAUSE_MS: u64 = 100;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn rule() -> String {
    format!("#{}", "=".repeat(60))
}

/// Config key for a step label: lowercase, spaces and dashes to `_`,
/// apostrophes dropped
pub fn slugify_label(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .replace('\'', "")
        .replace('-', "_")
}

/// The action recorder log: header, numbered actions and a suggested step list
pub fn action_log(recording: &Recording) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Action Recording - {}",
        recording.started_at.format(TIMESTAMP_FORMAT)
    );
    let _ = writeln!(out, "# Total duration: {:.2} seconds", recording.duration_secs());
    let _ = writeln!(out, "# Total actions: {}", recording.actions.len());
    let _ = writeln!(out, "{}\n", rule());

    for (i, action) in recording.actions.iter().enumerate() {
        let _ = writeln!(out, "{}. [{:.2}s] {}", i + 1, action.elapsed_secs(), action);
    }

    let _ = writeln!(out, "\n{}", rule());
    let _ = writeln!(out, "# Suggested workflow steps:");
    let _ = writeln!(out, "{}\n", rule());
    out.push_str(&suggested_steps(&recording.actions));
    out
}

/// Rust step descriptors for the recorded actions. A pause longer than
/// [`MIN_SUGGESTED_PAUSE_MS`] before an action becomes the settle delay of
/// the step before it.
pub fn suggested_steps(actions: &[RecordedAction]) -> String {
    let mut out = String::new();
    for (i, action) in actions.iter().enumerate() {
        let label = action
            .label
            .clone()
            .unwrap_or_else(|| format!("Step {}", i + 1));
        let (step, comment) = match &action.kind {
            ActionKind::Click { position, button } => (
                format!(
                    "WorkflowStep::new({label:?}, Action::Click(Target::At(Point::new({}, {}))))",
                    position.x, position.y
                ),
                format!(" // {button}"),
            ),
            ActionKind::Key { key } => match parse_key(key) {
                Some(parsed) => (
                    format!("WorkflowStep::new({label:?}, Action::KeyPress(Key::{parsed:?}))"),
                    String::new(),
                ),
                None => {
                    let _ = writeln!(out, "// {label}: key {key:?} has no mapping, may need adjustment");
                    continue;
                }
            },
        };

        let pause = actions
            .get(i + 1)
            .map(|next| next.elapsed_ms.saturating_sub(action.elapsed_ms))
            .unwrap_or(0);
        let settle = if pause > MIN_SUGGESTED_PAUSE_MS {
            format!("\n    .settle(Settle::Fixed(Duration::from_millis({pause})))")
        } else {
            String::new()
        };
        let _ = writeln!(out, "{step}{settle},{comment}");
    }
    out
}

/// The step recorder log: labelled workflow steps plus a config snippet
pub fn step_log(labelled: &[RecordedAction], written_at: DateTime<Local>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Step Recording - {}", written_at.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out, "# {} labeled steps", labelled.len());
    let _ = writeln!(out, "{}\n", rule());

    let _ = writeln!(out, "WORKFLOW STEPS:");
    let _ = writeln!(out, "{}", "-".repeat(40));
    for (i, action) in labelled.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, action.label.as_deref().unwrap_or(""));
        match &action.kind {
            ActionKind::Click { position, .. } => {
                let _ = writeln!(out, "   -> CLICK ({}, {})\n", position.x, position.y);
            }
            ActionKind::Key { key } => {
                let _ = writeln!(out, "   -> KEY: {key}\n");
            }
        }
    }

    let _ = writeln!(out, "\n{}", rule());
    let _ = writeln!(out, "# SUGGESTED CONFIG:");
    let _ = writeln!(out, "{}\n", rule());
    let snippet = serde_json::to_string_pretty(&suggested_config(labelled))
        .unwrap_or_else(|_| "{}".to_string());
    out.push_str(&snippet);
    out.push('\n');
    out
}

/// `click_locations` keyed by slugified label, and the labelled key actions
pub fn suggested_config(labelled: &[RecordedAction]) -> Value {
    let mut click_locations = Map::new();
    let mut key_actions = Vec::new();
    for action in labelled {
        let label = action.label.as_deref().unwrap_or_default();
        match &action.kind {
            ActionKind::Click { position, .. } => {
                click_locations.insert(slugify_label(label), position.to_json());
            }
            ActionKind::Key { key } => {
                key_actions.push(json!({ "label": label, "key": key }));
            }
        }
    }
    json!({
        "click_locations": click_locations,
        "key_actions": key_actions,
    })
}
