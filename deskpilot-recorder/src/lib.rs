//! Recording tools for building deskpilot workflows
//!
//! This crate records mouse clicks and key presses until a stop key is hit,
//! lets the operator label the captured actions, writes review logs with
//! suggested workflow steps and config, and captures button template images.

pub mod capture;
pub mod error;
pub mod events;
pub mod recorder;
pub mod report;

pub use capture::{ButtonCapture, CaptureConfig, CapturedButton, ClickWatcher};
pub use error::*;
pub use events::{ActionKind, MouseButton, RecordedAction, Recording};
pub use recorder::*;
pub use report::{action_log, slugify_label, step_log, suggested_config, suggested_steps};
