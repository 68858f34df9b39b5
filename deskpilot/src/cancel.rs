//! Global cancel key

use crate::errors::AutomationError;
use crate::input::{key_name, parse_key};
use rdev::{EventType, Key};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// One-shot cancellation flag shared between the listener and the worker
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` only for the call that actually flipped it.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Clear the flag so the next run starts armed. Listeners sharing the
    /// token re-arm with it.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Watches for the cancel key on a dedicated input thread.
///
/// `rdev::listen` never returns, so the listener disarms itself instead of
/// stopping: once the token is set every later event is ignored.
#[derive(Debug, Clone)]
pub struct CancellationListener {
    key: Key,
    token: CancellationToken,
}

impl CancellationListener {
    pub fn new(key: Key, token: CancellationToken) -> Self {
        Self { key, token }
    }

    /// Build a listener from a configured key name such as "esc" or "f12"
    pub fn from_key_name(name: &str, token: CancellationToken) -> Result<Self, AutomationError> {
        let key = parse_key(name).ok_or_else(|| {
            AutomationError::InvalidArgument(format!("unknown cancel key '{name}'"))
        })?;
        Ok(Self::new(key, token))
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Feed one input event. Returns `true` when this event triggered cancellation.
    pub fn handle_event(&self, event: &EventType) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        match event {
            EventType::KeyPress(key) if *key == self.key => {
                let triggered = self.token.cancel();
                if triggered {
                    warn!(key = %key_name(self.key), "Cancel key pressed, stopping after the current step");
                }
                triggered
            }
            _ => false,
        }
    }

    /// Start listening on a background thread
    pub fn spawn(self) -> thread::JoinHandle<()> {
        info!(key = %key_name(self.key), "Cancel listener armed");
        thread::spawn(move || {
            if let Err(error) = rdev::listen(move |event: rdev::Event| {
                self.handle_event(&event.event_type);
            }) {
                error!("Cancel listener failed: {:?}", error);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_clones_share_the_flag() {
        let token = CancellationToken::new();
        let worker_view = token.clone();
        token.cancel();
        assert!(worker_view.is_cancelled());
    }

    #[test]
    fn test_only_the_reserved_key_triggers() {
        let listener = CancellationListener::new(Key::Escape, CancellationToken::new());

        assert!(!listener.handle_event(&EventType::KeyPress(Key::KeyQ)));
        assert!(!listener.handle_event(&EventType::KeyRelease(Key::Escape)));
        assert!(!listener.token().is_cancelled());

        assert!(listener.handle_event(&EventType::KeyPress(Key::Escape)));
        assert!(listener.token().is_cancelled());
    }

    #[test]
    fn test_listener_disarms_after_first_trigger() {
        let listener = CancellationListener::new(Key::F12, CancellationToken::new());
        assert!(listener.handle_event(&EventType::KeyPress(Key::F12)));
        assert!(!listener.handle_event(&EventType::KeyPress(Key::F12)));
        assert!(listener.token().is_cancelled());
    }

    #[test]
    fn test_reset_rearms_the_listener() {
        let listener = CancellationListener::new(Key::Escape, CancellationToken::new());
        assert!(listener.handle_event(&EventType::KeyPress(Key::Escape)));

        listener.token().reset();

        assert!(!listener.token().is_cancelled());
        assert!(listener.handle_event(&EventType::KeyPress(Key::Escape)));
        assert!(listener.token().is_cancelled());
    }

    #[test]
    fn test_from_key_name() {
        let token = CancellationToken::new();
        let listener = CancellationListener::from_key_name("pause", token.clone()).unwrap();
        assert_eq!(listener.key(), Key::Pause);
        assert!(CancellationListener::from_key_name("nope", token).is_err());
    }
}
