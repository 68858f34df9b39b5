//! Work items and the immutable step descriptors played back against each one

use crate::types::Point;
use rdev::Key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifecycle of a single work item within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Done => "done",
            ItemStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One unit of batch input. The id is opaque to the engine (usually a file name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub status: ItemStatus,
}

impl WorkItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::Pending,
        }
    }

    /// Build a batch from opaque identifiers, every item pending
    pub fn batch<I, S>(ids: I) -> Vec<WorkItem>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ids.into_iter().map(WorkItem::new).collect()
    }
}

/// Where a plain click lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Literal screen coordinate
    At(Point),
    /// Key under `click_locations` in the config document
    Named(String),
}

/// What a step does. Closed set, interpreted exhaustively by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click(Target),
    /// Locate the template saved under `buttons.<name>` and click its centre
    ImageClick(String),
    KeyPress(Key),
    /// Keys are pressed in order and released in reverse order
    Hotkey(Vec<Key>),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Click(_) => "click",
            Action::ImageClick(_) => "image-click",
            Action::KeyPress(_) => "key-press",
            Action::Hotkey(_) => "hotkey",
        }
    }
}

/// Post-action wait
#[derive(Debug, Clone, PartialEq)]
pub enum Settle {
    Fixed(Duration),
    /// Seconds read from a top-level config key, with a default
    Config { key: &'static str, default_secs: f64 },
}

/// Which work items a step applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepCondition {
    #[default]
    Always,
    /// Skipped for the first item of the batch (index 0)
    AfterFirstItem,
}

impl StepCondition {
    pub fn applies_to(self, item_index: usize) -> bool {
        match self {
            StepCondition::Always => true,
            StepCondition::AfterFirstItem => item_index > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowStep {
    pub label: String,
    pub action: Action,
    pub settle: Settle,
    /// An unresolved target on a mandatory step asks the operator what to do,
    /// on an optional step it is skipped with a warning.
    pub mandatory: bool,
    pub condition: StepCondition,
}

impl WorkflowStep {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
            settle: Settle::Fixed(Duration::ZERO),
            mandatory: true,
            condition: StepCondition::Always,
        }
    }

    pub fn settle(mut self, settle: Settle) -> Self {
        self.settle = settle;
        self
    }

    pub fn settle_from_config(mut self, key: &'static str, default_secs: f64) -> Self {
        self.settle = Settle::Config { key, default_secs };
        self
    }

    pub fn optional(mut self) -> Self {
        self.mandatory = false;
        self
    }

    pub fn when(mut self, condition: StepCondition) -> Self {
        self.condition = condition;
        self
    }
}

/// What happens to the batch when a step fails unexpectedly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Halt the whole batch on the first failing item
    #[default]
    FailFast,
    /// Mark the item failed and move on; the persisted cursor stays on the
    /// first failed item so a later run picks it up again
    SkipItem,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "failfast" => Ok(FailurePolicy::FailFast),
            "skip_item" | "skipitem" | "skip" | "continue" => Ok(FailurePolicy::SkipItem),
            other => Err(format!("unknown failure policy '{other}'")),
        }
    }
}

/// The DWG to GEO conversion workflow.
///
/// The target application must already show its import dialog with the work
/// folder listed and the first file highlighted. Per item: move the selection
/// down (except for the first item), open it, wait for the import, click
/// "Save to Geo", then confirm with "OK".
pub fn dwg_to_geo() -> Vec<WorkflowStep> {
    vec![
        WorkflowStep::new("Select next file", Action::KeyPress(Key::DownArrow))
            .settle_from_config("select_delay", 0.3)
            .when(StepCondition::AfterFirstItem),
        WorkflowStep::new("Open file", Action::KeyPress(Key::Return))
            .settle_from_config("import_delay", 3.0),
        WorkflowStep::new("Save to Geo", Action::ImageClick("save_to_geo".to_string()))
            .settle_from_config("click_delay", 1.0),
        WorkflowStep::new("OK", Action::ImageClick("ok".to_string()))
            .settle_from_config("save_delay", 2.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("fail_fast".parse::<FailurePolicy>(), Ok(FailurePolicy::FailFast));
        assert_eq!("Skip-Item".parse::<FailurePolicy>(), Ok(FailurePolicy::SkipItem));
        assert!("retry_forever".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_step_condition_skips_first_item_only() {
        assert!(!StepCondition::AfterFirstItem.applies_to(0));
        assert!(StepCondition::AfterFirstItem.applies_to(1));
        assert!(StepCondition::Always.applies_to(0));
    }

    #[test]
    fn test_builtin_workflow_shape() {
        let steps = dwg_to_geo();
        let kinds: Vec<&str> = steps.iter().map(|s| s.action.kind()).collect();
        assert_eq!(kinds, vec!["key-press", "key-press", "image-click", "image-click"]);
        assert_eq!(steps[0].condition, StepCondition::AfterFirstItem);
        assert!(steps.iter().all(|s| s.mandatory));
    }

    #[test]
    fn test_item_status_serializes_lowercase() {
        let json = serde_json::to_string(&ItemStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(ItemStatus::Done.to_string(), "done");
    }

    #[test]
    fn test_batch_starts_pending() {
        let batch = WorkItem::batch(["a.dwg", "b.dwg"]);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|item| item.status == ItemStatus::Pending));
    }
}
