//! Sequential playback of a workflow against a batch of work items
//!
//! The executor persists a resumable cursor (the index of the next
//! unprocessed item) after every completed item, checks the cancel flag
//! before every step and reports through an [`Observer`].

use crate::cancel::CancellationToken;
use crate::config::ConfigStore;
use crate::errors::AutomationError;
use crate::input::{key_name, InputDriver};
use crate::locator::{ElementLocator, LocateFailure};
use crate::observer::{Interaction, Observer, Resolution};
use crate::types::Point;
use crate::workflow::{Action, FailurePolicy, ItemStatus, Settle, Target, WorkItem, WorkflowStep};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Running,
    Completed,
    Stopped,
    Aborted,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutorState::Idle => "idle",
            ExecutorState::Running => "running",
            ExecutorState::Completed => "completed",
            ExecutorState::Stopped => "stopped",
            ExecutorState::Aborted => "aborted",
            ExecutorState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-run switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Resolve targets and log intent, but send no synthetic input
    pub dry_run: bool,
    /// Ask the operator before every step
    pub confirm_steps: bool,
    pub policy: FailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item processed; the persisted cursor is back at 0
    Completed,
    /// Stop requested between items
    Stopped { cursor: usize },
    /// Cancel key, declined step or cancelled lookup
    Aborted { cursor: usize },
    /// An item failed; `index` is the first failing item
    Failed { index: usize, error: String },
}

impl RunOutcome {
    pub fn state(&self) -> ExecutorState {
        match self {
            RunOutcome::Completed => ExecutorState::Completed,
            RunOutcome::Stopped { .. } => ExecutorState::Stopped,
            RunOutcome::Aborted { .. } => ExecutorState::Aborted,
            RunOutcome::Failed { .. } => ExecutorState::Failed,
        }
    }
}

/// Result of one run: how it ended, the final item statuses and the cursor
/// as persisted at exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub items: Vec<WorkItem>,
    pub cursor: usize,
}

impl RunReport {
    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

/// Requests a stop at the next item boundary
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

enum ItemFlow {
    Done,
    Aborted,
}

/// Where a step's action lands, if anywhere
enum Resolved {
    Ready(Option<Point>),
    Unresolved(LocateFailure),
}

pub struct WorkflowExecutor {
    config: ConfigStore,
    locator: ElementLocator,
    input: Box<dyn InputDriver>,
    cancel: CancellationToken,
    stop: StopHandle,
    steps: Vec<WorkflowStep>,
    options: RunOptions,
    state: ExecutorState,
}

impl WorkflowExecutor {
    pub fn new(
        config: ConfigStore,
        locator: ElementLocator,
        input: Box<dyn InputDriver>,
        cancel: CancellationToken,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        let options = RunOptions {
            policy: config.failure_policy(),
            ..RunOptions::default()
        };
        Self {
            config,
            locator,
            input,
            cancel,
            stop: StopHandle::default(),
            steps,
            options,
            state: ExecutorState::Idle,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Process `ids` in order, resuming from the persisted cursor if the
    /// operator agrees. Returns to `Idle` before returning.
    #[instrument(skip_all, fields(items = ids.len(), dry_run = self.options.dry_run))]
    pub fn run(
        &mut self,
        ids: &[String],
        observer: &dyn Observer,
        interaction: &dyn Interaction,
    ) -> RunReport {
        self.transition(ExecutorState::Running);
        self.stop.clear();
        self.cancel.reset();

        let mut items = WorkItem::batch(ids.iter().cloned());
        let total = items.len();
        for index in 0..total {
            observer.update_item_status(index, ItemStatus::Pending);
        }

        let mut cursor = self.starting_cursor(total, interaction);
        for (index, item) in items.iter_mut().enumerate().take(cursor) {
            item.status = ItemStatus::Done;
            observer.update_item_status(index, ItemStatus::Done);
        }
        observer.update_progress(cursor, total);

        let mut first_failure: Option<(usize, String)> = None;
        let mut outcome = None;

        for index in cursor..total {
            if self.stop.is_stop_requested() {
                info!(cursor, "Stop requested");
                outcome = Some(RunOutcome::Stopped { cursor });
                break;
            }

            let id = items[index].id.clone();
            items[index].status = ItemStatus::Processing;
            observer.update_item_status(index, ItemStatus::Processing);
            observer.update_status(&format!("Processing {id} ({}/{total})", index + 1));
            info!(index, item = %id, "Processing item");

            let result = self
                .run_item(index, &id, observer, interaction)
                .and_then(|flow| {
                    if matches!(flow, ItemFlow::Done) && first_failure.is_none() {
                        self.config.set_last_processed_index(index + 1)?;
                        cursor = index + 1;
                    }
                    Ok(flow)
                });

            match result {
                Ok(ItemFlow::Done) => {
                    items[index].status = ItemStatus::Done;
                    observer.update_item_status(index, ItemStatus::Done);
                    observer.update_progress(index + 1, total);
                }
                Ok(ItemFlow::Aborted) => {
                    items[index].status = ItemStatus::Pending;
                    observer.update_item_status(index, ItemStatus::Pending);
                    warn!(cursor, item = %id, "Run aborted");
                    outcome = Some(RunOutcome::Aborted { cursor });
                    break;
                }
                Err(e) => {
                    error!(index, item = %id, "Item failed: {}", e);
                    items[index].status = ItemStatus::Failed;
                    observer.update_item_status(index, ItemStatus::Failed);
                    match self.options.policy {
                        FailurePolicy::FailFast => {
                            outcome = Some(RunOutcome::Failed {
                                index,
                                error: e.to_string(),
                            });
                            break;
                        }
                        FailurePolicy::SkipItem => {
                            first_failure.get_or_insert((index, e.to_string()));
                        }
                    }
                }
            }
        }

        let outcome = match (outcome, first_failure) {
            (Some(outcome), _) => outcome,
            (None, Some((index, error))) => RunOutcome::Failed { index, error },
            (None, None) => match self.config.set_last_processed_index(0) {
                Ok(()) => {
                    cursor = 0;
                    RunOutcome::Completed
                }
                Err(e) => RunOutcome::Failed {
                    index: total.saturating_sub(1),
                    error: e.to_string(),
                },
            },
        };

        observer.update_status(&summary(&outcome, total));
        self.transition(outcome.state());
        self.transition(ExecutorState::Idle);

        RunReport {
            outcome,
            items,
            cursor,
        }
    }

    fn transition(&mut self, next: ExecutorState) {
        debug!(from = %self.state, to = %next, "Executor state");
        self.state = next;
    }

    fn starting_cursor(&mut self, total: usize, interaction: &dyn Interaction) -> usize {
        let persisted = self.config.last_processed_index();
        if persisted == 0 {
            return 0;
        }
        if persisted < total {
            if interaction.confirm_resume(persisted, total) {
                info!(cursor = persisted, total, "Resuming");
                return persisted;
            }
            info!("Restarting from the first item");
        } else {
            warn!(persisted, total, "Persisted cursor beyond batch, starting over");
        }
        if let Err(e) = self.config.set_last_processed_index(0) {
            warn!("Could not reset cursor: {}", e);
        }
        0
    }

    fn run_item(
        &mut self,
        index: usize,
        id: &str,
        observer: &dyn Observer,
        interaction: &dyn Interaction,
    ) -> Result<ItemFlow, AutomationError> {
        let steps = self.steps.clone();
        for step in &steps {
            if !step.condition.applies_to(index) {
                debug!(step = %step.label, "Step does not apply to this item");
                continue;
            }
            if self.cancel.is_cancelled() {
                return Ok(ItemFlow::Aborted);
            }
            if self.options.confirm_steps && !interaction.confirm_step(id, &step.label) {
                info!(step = %step.label, "Step declined");
                return Ok(ItemFlow::Aborted);
            }

            observer.update_status(&format!("{id}: {}", step.label));
            match self.resolve(&step.action) {
                Resolved::Ready(point) => self.perform(step, point)?,
                Resolved::Unresolved(failure) if step.mandatory => {
                    warn!(step = %step.label, %failure, "Target unresolved");
                    match interaction.target_not_found(&step.label, failure) {
                        Resolution::Retry => {
                            info!(step = %step.label, "Assuming the step was completed manually")
                        }
                        Resolution::Cancel => return Ok(ItemFlow::Aborted),
                    }
                }
                Resolved::Unresolved(failure) => {
                    warn!(step = %step.label, %failure, "Optional step skipped");
                    continue;
                }
            }

            self.settle(&step.settle);
        }
        Ok(ItemFlow::Done)
    }

    fn resolve(&mut self, action: &Action) -> Resolved {
        match action {
            Action::Click(Target::At(point)) => Resolved::Ready(Some(*point)),
            Action::Click(Target::Named(name)) => match self.config.click_location(name) {
                Some(point) => Resolved::Ready(Some(point)),
                None => Resolved::Unresolved(LocateFailure::NotFound),
            },
            Action::ImageClick(name) => {
                let location = self.config.element_location(name);
                match self.locator.locate_element(&location) {
                    Ok(located) => {
                        info!(target = %name, point = %located.point, strategy = %located.strategy, "Resolved");
                        Resolved::Ready(Some(located.point))
                    }
                    Err(failure) => Resolved::Unresolved(failure),
                }
            }
            Action::KeyPress(_) | Action::Hotkey(_) => Resolved::Ready(None),
        }
    }

    fn perform(&mut self, step: &WorkflowStep, point: Option<Point>) -> Result<(), AutomationError> {
        if self.options.dry_run {
            match (&step.action, point) {
                (Action::KeyPress(key), _) => {
                    info!(step = %step.label, key = %key_name(*key), "[dry run] press key")
                }
                (Action::Hotkey(keys), _) => {
                    let combo: Vec<String> = keys.iter().map(|key| key_name(*key)).collect();
                    info!(step = %step.label, keys = %combo.join("+"), "[dry run] hotkey")
                }
                (_, Some(point)) => info!(step = %step.label, %point, "[dry run] click"),
                (_, None) => info!(step = %step.label, "[dry run] click"),
            }
            return Ok(());
        }

        match (&step.action, point) {
            (Action::Click(_) | Action::ImageClick(_), Some(point)) => self.input.click(point),
            (Action::KeyPress(key), _) => self.input.press_key(*key),
            (Action::Hotkey(keys), _) => self.input.hotkey(keys),
            (action, None) => Err(AutomationError::Internal(format!(
                "{} step '{}' has no target",
                action.kind(),
                step.label
            ))),
        }
    }

    fn settle(&self, settle: &Settle) {
        let delay = match settle {
            Settle::Fixed(delay) => *delay,
            Settle::Config { key, default_secs } => self.config.delay(key, *default_secs),
        };
        if delay > Duration::ZERO {
            thread::sleep(delay);
        }
    }
}

fn summary(outcome: &RunOutcome, total: usize) -> String {
    match outcome {
        RunOutcome::Completed => format!("Completed {total} item(s)"),
        RunOutcome::Stopped { cursor } => format!("Stopped at item {} of {total}", cursor + 1),
        RunOutcome::Aborted { cursor } => format!("Aborted at item {} of {total}", cursor + 1),
        RunOutcome::Failed { index, error } => format!("Failed on item {}: {error}", index + 1),
    }
}
