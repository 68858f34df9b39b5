//! Unattended batch automation of desktop applications
//!
//! This crate plays a fixed sequence of synthetic mouse and keyboard actions
//! against every item of a batch, locating on-screen buttons by template
//! matching, persisting a resumable cursor and honouring a global cancel key.

pub mod cancel;
pub mod config;
pub mod errors;
pub mod executor;
pub mod input;
pub mod locator;
pub mod matcher;
pub mod observer;
pub mod screen;
pub mod types;
pub mod workflow;

pub use cancel::{CancellationListener, CancellationToken};
pub use config::{ConfigStore, ElementLocation};
pub use errors::AutomationError;
pub use executor::{
    ExecutorState, RunOptions, RunOutcome, RunReport, StopHandle, WorkflowExecutor,
};
pub use input::{InputDriver, RdevInput};
pub use locator::{ElementLocator, LocateFailure, Located, Strategy};
pub use matcher::{MatchTier, NccMatcher, TemplateMatcher};
pub use observer::{ChannelObserver, Interaction, Observer, Resolution, UiEvent};
pub use screen::{ScreenCapture, Screenshot, XcapScreen};
pub use types::{Point, Region};
pub use workflow::{
    Action, FailurePolicy, ItemStatus, Settle, StepCondition, Target, WorkItem, WorkflowStep,
};
