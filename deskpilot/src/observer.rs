//! Status reporting and operator decisions
//!
//! The worker never touches presentation state directly. Status changes and
//! decision requests are posted to a bounded queue that the presentation loop
//! drains; decisions come back on a one-shot reply channel the worker blocks on.

use crate::locator::LocateFailure;
use crate::workflow::ItemStatus;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Default capacity of the status queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Receives progress from the executor's completion points
pub trait Observer: Send + Sync {
    fn update_status(&self, text: &str);
    fn update_progress(&self, current: usize, total: usize);
    fn update_item_status(&self, index: usize, status: ItemStatus);
}

/// Operator's answer when a mandatory target cannot be located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The operator performed the step by hand; carry on with the next one
    Retry,
    Cancel,
}

/// Synchronous decisions the executor needs from the operator
pub trait Interaction: Send + Sync {
    /// Resume at `cursor` (true) or restart from the first item (false)
    fn confirm_resume(&self, cursor: usize, total: usize) -> bool;

    fn target_not_found(&self, label: &str, failure: LocateFailure) -> Resolution;

    /// Asked before every step when step confirmation is on. `false` aborts the run.
    fn confirm_step(&self, item: &str, step: &str) -> bool;
}

/// Everything the worker hands to the presentation loop
#[derive(Debug)]
pub enum UiEvent {
    Status(String),
    Progress {
        current: usize,
        total: usize,
    },
    ItemStatus {
        index: usize,
        status: ItemStatus,
    },
    ConfirmResume {
        cursor: usize,
        total: usize,
        reply: oneshot::Sender<bool>,
    },
    TargetNotFound {
        label: String,
        failure: LocateFailure,
        reply: oneshot::Sender<Resolution>,
    },
    ConfirmStep {
        item: String,
        step: String,
        reply: oneshot::Sender<bool>,
    },
}

/// [`Observer`] and [`Interaction`] over a bounded `tokio` channel.
///
/// Must be used from a blocking context (a `spawn_blocking` task or a plain
/// thread). When the receiving side is gone, updates are dropped and every
/// decision takes its conservative default: resume, cancel, decline.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<UiEvent>,
}

impl ChannelObserver {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<UiEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn post(&self, event: UiEvent) {
        if self.tx.blocking_send(event).is_err() {
            debug!("Presentation loop gone, dropping update");
        }
    }

    fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> UiEvent, fallback: T) -> T {
        let (reply, answer) = oneshot::channel();
        if self.tx.blocking_send(build(reply)).is_err() {
            warn!("Presentation loop gone, using default answer");
            return fallback;
        }
        answer.blocking_recv().unwrap_or_else(|_| {
            warn!("Decision dropped without an answer, using default");
            fallback
        })
    }
}

impl Observer for ChannelObserver {
    fn update_status(&self, text: &str) {
        self.post(UiEvent::Status(text.to_string()));
    }

    fn update_progress(&self, current: usize, total: usize) {
        self.post(UiEvent::Progress { current, total });
    }

    fn update_item_status(&self, index: usize, status: ItemStatus) {
        self.post(UiEvent::ItemStatus { index, status });
    }
}

impl Interaction for ChannelObserver {
    fn confirm_resume(&self, cursor: usize, total: usize) -> bool {
        self.ask(
            |reply| UiEvent::ConfirmResume {
                cursor,
                total,
                reply,
            },
            true,
        )
    }

    fn target_not_found(&self, label: &str, failure: LocateFailure) -> Resolution {
        self.ask(
            |reply| UiEvent::TargetNotFound {
                label: label.to_string(),
                failure,
                reply,
            },
            Resolution::Cancel,
        )
    }

    fn confirm_step(&self, item: &str, step: &str) -> bool {
        self.ask(
            |reply| UiEvent::ConfirmStep {
                item: item.to_string(),
                step: step.to_string(),
                reply,
            },
            false,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_updates_arrive_in_order() {
        let (observer, mut rx) = ChannelObserver::channel(8);
        let worker = thread::spawn(move || {
            observer.update_status("starting");
            observer.update_progress(1, 3);
            observer.update_item_status(0, ItemStatus::Done);
        });
        worker.join().unwrap();

        assert!(matches!(rx.blocking_recv(), Some(UiEvent::Status(s)) if s == "starting"));
        assert!(matches!(
            rx.blocking_recv(),
            Some(UiEvent::Progress { current: 1, total: 3 })
        ));
        assert!(matches!(
            rx.blocking_recv(),
            Some(UiEvent::ItemStatus {
                index: 0,
                status: ItemStatus::Done
            })
        ));
    }

    #[test]
    fn test_decision_round_trip() {
        let (observer, mut rx) = ChannelObserver::channel(8);
        let worker = thread::spawn(move || {
            observer.target_not_found("OK", LocateFailure::NotFound)
        });

        match rx.blocking_recv() {
            Some(UiEvent::TargetNotFound { label, failure, reply }) => {
                assert_eq!(label, "OK");
                assert_eq!(failure, LocateFailure::NotFound);
                reply.send(Resolution::Retry).unwrap();
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(worker.join().unwrap(), Resolution::Retry);
    }

    #[test]
    fn test_closed_queue_uses_conservative_defaults() {
        let (observer, rx) = ChannelObserver::channel(1);
        drop(rx);

        observer.update_status("nobody listening");
        assert!(observer.confirm_resume(2, 5));
        assert_eq!(
            observer.target_not_found("Save", LocateFailure::NoImageFile),
            Resolution::Cancel
        );
        assert!(!observer.confirm_step("a.dwg", "Open file"));
    }

    #[test]
    fn test_dropped_reply_uses_default() {
        let (observer, mut rx) = ChannelObserver::channel(1);
        let worker = thread::spawn(move || observer.confirm_step("a.dwg", "OK"));
        // Drop the event, and its reply sender, unanswered
        drop(rx.blocking_recv());
        assert!(!worker.join().unwrap());
    }
}
