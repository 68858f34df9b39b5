//! Synthetic pointer and keyboard input

use crate::errors::AutomationError;
use crate::types::Point;
use rdev::{Button, EventType, Key};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// Some platforms drop events that arrive back to back
const EVENT_GAP: Duration = Duration::from_millis(20);

/// Issues synthetic input on behalf of the executor.
///
/// Only the worker thread calls into this; implementations need not be `Sync`.
pub trait InputDriver: Send {
    /// Move the pointer to `point` and left-click
    fn click(&mut self, point: Point) -> Result<(), AutomationError>;

    /// Press and release a single key
    fn press_key(&mut self, key: Key) -> Result<(), AutomationError>;

    /// Press `keys` in order, then release them in reverse order
    fn hotkey(&mut self, keys: &[Key]) -> Result<(), AutomationError>;
}

/// Input driver backed by `rdev::simulate`
#[derive(Debug, Default)]
pub struct RdevInput;

impl RdevInput {
    pub fn new() -> Self {
        Self
    }

    fn send(&self, event: EventType) -> Result<(), AutomationError> {
        trace!(?event, "simulate");
        rdev::simulate(&event).map_err(|e| {
            AutomationError::PlatformError(format!("Failed to simulate {event:?}: {e:?}"))
        })?;
        thread::sleep(EVENT_GAP);
        Ok(())
    }
}

impl InputDriver for RdevInput {
    fn click(&mut self, point: Point) -> Result<(), AutomationError> {
        debug!(%point, "click");
        self.send(EventType::MouseMove {
            x: f64::from(point.x),
            y: f64::from(point.y),
        })?;
        self.send(EventType::ButtonPress(Button::Left))?;
        self.send(EventType::ButtonRelease(Button::Left))
    }

    fn press_key(&mut self, key: Key) -> Result<(), AutomationError> {
        debug!(?key, "press key");
        self.send(EventType::KeyPress(key))?;
        self.send(EventType::KeyRelease(key))
    }

    fn hotkey(&mut self, keys: &[Key]) -> Result<(), AutomationError> {
        debug!(?keys, "hotkey");
        for key in keys {
            self.send(EventType::KeyPress(*key))?;
        }
        for key in keys.iter().rev() {
            self.send(EventType::KeyRelease(*key))?;
        }
        Ok(())
    }
}

/// Parse a key name as written in config files and recorder logs
/// ("esc", "enter", "down", "f12", "a", "ctrl", ...).
pub fn parse_key(name: &str) -> Option<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "esc" | "escape" => Key::Escape,
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "insert" => Key::Insert,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "page_up" => Key::PageUp,
        "pagedown" | "page_down" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "pause" => Key::Pause,
        "printscreen" | "print_screen" => Key::PrintScreen,
        "scrolllock" | "scroll_lock" => Key::ScrollLock,
        "ctrl" | "control" | "ctrl_l" => Key::ControlLeft,
        "ctrl_r" => Key::ControlRight,
        "shift" | "shift_l" => Key::ShiftLeft,
        "shift_r" => Key::ShiftRight,
        "alt" | "alt_l" => Key::Alt,
        "alt_r" | "altgr" | "alt_gr" => Key::AltGr,
        "super" | "cmd" | "win" | "meta" => Key::MetaLeft,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => return parse_char_key(other),
    };
    Some(key)
}

fn parse_char_key(name: &str) -> Option<Key> {
    let mut chars = name.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let key = match c {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        '0' => Key::Num0,
        '1' => Key::Num1,
        '2' => Key::Num2,
        '3' => Key::Num3,
        '4' => Key::Num4,
        '5' => Key::Num5,
        '6' => Key::Num6,
        '7' => Key::Num7,
        '8' => Key::Num8,
        '9' => Key::Num9,
        _ => return None,
    };
    Some(key)
}

/// Canonical lowercase name of a key, the inverse of [`parse_key`] where one exists
pub fn key_name(key: Key) -> String {
    let name = match key {
        Key::Escape => "esc",
        Key::Return => "enter",
        Key::Tab => "tab",
        Key::Space => "space",
        Key::Backspace => "backspace",
        Key::Delete => "delete",
        Key::Insert => "insert",
        Key::Home => "home",
        Key::End => "end",
        Key::PageUp => "pageup",
        Key::PageDown => "pagedown",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        Key::Pause => "pause",
        Key::PrintScreen => "printscreen",
        Key::ScrollLock => "scrolllock",
        Key::ControlLeft => "ctrl",
        Key::ControlRight => "ctrl_r",
        Key::ShiftLeft => "shift",
        Key::ShiftRight => "shift_r",
        Key::Alt => "alt",
        Key::AltGr => "alt_r",
        Key::MetaLeft | Key::MetaRight => "super",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        Key::KeyA => "a",
        Key::KeyB => "b",
        Key::KeyC => "c",
        Key::KeyD => "d",
        Key::KeyE => "e",
        Key::KeyF => "f",
        Key::KeyG => "g",
        Key::KeyH => "h",
        Key::KeyI => "i",
        Key::KeyJ => "j",
        Key::KeyK => "k",
        Key::KeyL => "l",
        Key::KeyM => "m",
        Key::KeyN => "n",
        Key::KeyO => "o",
        Key::KeyP => "p",
        Key::KeyQ => "q",
        Key::KeyR => "r",
        Key::KeyS => "s",
        Key::KeyT => "t",
        Key::KeyU => "u",
        Key::KeyV => "v",
        Key::KeyW => "w",
        Key::KeyX => "x",
        Key::KeyY => "y",
        Key::KeyZ => "z",
        Key::Num0 => "0",
        Key::Num1 => "1",
        Key::Num2 => "2",
        Key::Num3 => "3",
        Key::Num4 => "4",
        Key::Num5 => "5",
        Key::Num6 => "6",
        Key::Num7 => "7",
        Key::Num8 => "8",
        Key::Num9 => "9",
        other => return format!("{other:?}").to_lowercase(),
    };
    name.to_string()
}

/// Modifier keys, which the step recorder does not record on their own
pub fn is_modifier(key: Key) -> bool {
    matches!(
        key,
        Key::ControlLeft
            | Key::ControlRight
            | Key::ShiftLeft
            | Key::ShiftRight
            | Key::Alt
            | Key::AltGr
            | Key::MetaLeft
            | Key::MetaRight
    )
}
