use crate::{MouseButton, RecordedAction, RecorderError, Recording, Result};
use chrono::Local;
use deskpilot::input::{is_modifier, key_name};
use deskpilot::Point;
use rdev::{Button, EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Which input the recorder keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureFilter {
    /// Every mouse button and every key press
    #[default]
    AllInput,
    /// Left clicks and non-modifier key presses, the raw material for
    /// labelled workflow steps
    Steps,
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Ends the recording; never recorded itself
    pub stop_key: Key,
    pub filter: CaptureFilter,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stop_key: Key::Escape,
            filter: CaptureFilter::AllInput,
        }
    }
}

/// Outcome of feeding one input event to the recorder
#[derive(Debug, Clone, PartialEq)]
pub enum Captured {
    Action(RecordedAction),
    Stop,
}

/// Turns raw `rdev` events into [`RecordedAction`]s.
///
/// `rdev` reports button presses without a position, so the last pointer
/// position seen in a move event is used.
#[derive(Debug)]
pub struct InputRecorder {
    config: RecorderConfig,
    last_mouse_pos: Point,
}

impl InputRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            last_mouse_pos: Point::new(0, 0),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Feed one event observed `elapsed` after the recording started
    pub fn handle(&mut self, event: &EventType, elapsed: Duration) -> Option<Captured> {
        let elapsed_ms = elapsed.as_millis() as u64;
        match event {
            EventType::MouseMove { x, y } => {
                self.last_mouse_pos = Point::new(x.round() as i32, y.round() as i32);
                None
            }
            EventType::KeyPress(key) if *key == self.config.stop_key => Some(Captured::Stop),
            EventType::KeyPress(key) => {
                if self.config.filter == CaptureFilter::Steps && is_modifier(*key) {
                    return None;
                }
                Some(Captured::Action(RecordedAction::key(elapsed_ms, key_name(*key))))
            }
            EventType::ButtonPress(button) => {
                if self.config.filter == CaptureFilter::Steps && *button != Button::Left {
                    return None;
                }
                Some(Captured::Action(RecordedAction::click(
                    elapsed_ms,
                    self.last_mouse_pos,
                    MouseButton::from(*button),
                )))
            }
            _ => None,
        }
    }

    /// Record until the stop key is pressed. Blocks the calling thread.
    ///
    /// `on_action` sees each action as it is captured, for live echo.
    pub fn record(mut self, mut on_action: impl FnMut(&RecordedAction)) -> Result<Recording> {
        let (event_tx, event_rx) = mpsc::channel::<(EventType, Instant)>();
        let stop_indicator = Arc::new(AtomicBool::new(false));
        let stop_indicator_clone = Arc::clone(&stop_indicator);
        let (error_tx, error_rx) = mpsc::channel::<String>();

        let mut recording = Recording::new(Local::now());
        let start = Instant::now();
        info!(stop_key = %key_name(self.config.stop_key), "Recording started");

        thread::spawn(move || {
            if let Err(error) = rdev::listen(move |event: rdev::Event| {
                if stop_indicator_clone.load(Ordering::SeqCst) {
                    return;
                }
                // The receiver is gone once recording has stopped
                let _ = event_tx.send((event.event_type, Instant::now()));
            }) {
                error!("Input listener failed: {:?}", error);
                let _ = error_tx.send(format!("{error:?}"));
            }
        });

        loop {
            match event_rx.recv() {
                Ok((event, at)) => {
                    match self.handle(&event, at.saturating_duration_since(start)) {
                        Some(Captured::Action(action)) => {
                            debug!(%action, "Captured");
                            on_action(&action);
                            recording.actions.push(action);
                        }
                        Some(Captured::Stop) => break,
                        None => {}
                    }
                }
                Err(_) => {
                    let reason = error_rx
                        .try_recv()
                        .unwrap_or_else(|_| "listener stopped".to_string());
                    return Err(RecorderError::ListenerError(reason));
                }
            }
        }

        stop_indicator.store(true, Ordering::SeqCst);
        recording.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            actions = recording.actions.len(),
            seconds = recording.duration_secs(),
            "Recording stopped"
        );
        Ok(recording)
    }
}

/// Ask for a label for every action; an empty answer or `x` drops the action.
///
/// `prompt` receives the action with its 1-based position and the total.
pub fn label_actions<F>(actions: Vec<RecordedAction>, mut prompt: F) -> Result<Vec<RecordedAction>>
where
    F: FnMut(&RecordedAction, usize, usize) -> Result<String>,
{
    let total = actions.len();
    let mut labelled = Vec::new();
    for (index, action) in actions.into_iter().enumerate() {
        let answer = prompt(&action, index + 1, total)?;
        let answer = answer.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("x") {
            debug!(%action, "Skipped");
            continue;
        }
        labelled.push(action.with_label(answer));
    }
    Ok(labelled)
}
