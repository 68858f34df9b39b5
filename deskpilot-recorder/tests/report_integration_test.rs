use deskpilot_recorder::{
    action_log, label_actions, step_log, CaptureFilter, Captured, InputRecorder, RecorderConfig,
    Recording,
};
use rdev::{Button, EventType, Key};
use std::time::Duration;

/// Replays a synthetic session through the step recorder, labels it and
/// checks the written log.
#[test]
fn test_recorded_session_to_step_log() {
    let mut recorder = InputRecorder::new(RecorderConfig {
        stop_key: Key::Escape,
        filter: CaptureFilter::Steps,
    });

    let session = [
        (EventType::MouseMove { x: 400.0, y: 300.0 }, 0),
        (EventType::ButtonPress(Button::Left), 100),
        (EventType::ButtonRelease(Button::Left), 150),
        (EventType::KeyPress(Key::ShiftLeft), 900),
        (EventType::KeyPress(Key::Return), 1000),
        (EventType::KeyPress(Key::DownArrow), 4000),
        (EventType::KeyPress(Key::Escape), 5000),
        (EventType::KeyPress(Key::KeyQ), 5100),
    ];

    let mut recording = Recording::new(chrono::Local::now());
    for (event, at) in session {
        match recorder.handle(&event, Duration::from_millis(at)) {
            Some(Captured::Action(action)) => recording.actions.push(action),
            Some(Captured::Stop) => break,
            None => {}
        }
    }
    recording.duration_ms = 5000;

    assert_eq!(recording.actions.len(), 3);
    let log = action_log(&recording);
    assert!(log.contains("1. [0.10s] CLICK at (400, 300) - left"));
    assert!(log.contains("# Total actions: 3"));

    let labels = ["File list", "x", "Next file"];
    let labelled = label_actions(recording.actions, |_, position, _| {
        Ok(labels[position - 1].to_string())
    })
    .unwrap();
    assert_eq!(labelled.len(), 2);

    let log = step_log(&labelled, chrono::Local::now());
    assert!(log.contains("1. File list\n   -> CLICK (400, 300)"));
    assert!(log.contains("2. Next file\n   -> KEY: down"));

    let snippet = log.split("# SUGGESTED CONFIG:").nth(1).unwrap();
    let json_start = snippet.find('{').unwrap();
    let config: serde_json::Value = serde_json::from_str(&snippet[json_start..]).unwrap();
    assert_eq!(config["click_locations"]["file_list"], serde_json::json!([400, 300]));
    assert_eq!(config["key_actions"][0]["key"], "down");
}
