//! Prints step progress as store snapshots arrive.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rewise::{ProcessingStep, StateSnapshot, StepStatus, StoreBroadcaster};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Spawns a task that reports every step whose status changed.
///
/// The task drains queued snapshots and ends once the broadcaster is
/// dropped, handing back the printer.
pub fn start_progress_bridge(broadcaster: &Arc<StoreBroadcaster>) -> JoinHandle<ProgressPrinter> {
    let mut rx = broadcaster.subscribe();

    tokio::spawn(async move {
        let mut printer = ProgressPrinter::default();
        loop {
            match rx.recv().await {
                Ok(snapshot) => printer.observe(&snapshot),
                Err(RecvError::Lagged(n)) => {
                    warn!("Progress bridge lagged, missed {} snapshots", n);
                }
                Err(RecvError::Closed) => {
                    info!("Store broadcaster closed, stopping progress bridge");
                    break;
                }
            }
        }
        printer
    })
}

/// Remembers the last printed status per step id.
#[derive(Default)]
pub struct ProgressPrinter {
    seen: HashMap<String, StepStatus>,
    last_revision: u64,
}

impl ProgressPrinter {
    pub fn observe(&mut self, snapshot: &StateSnapshot) {
        if snapshot.revision <= self.last_revision {
            debug!("Skipping stale snapshot {}", snapshot.revision);
            return;
        }
        self.last_revision = snapshot.revision;

        if snapshot.processing_steps.is_empty() {
            self.seen.clear();
        }

        for line in self.changed_lines(&snapshot.processing_steps) {
            println!("{}", line);
        }
    }

    fn changed_lines(&mut self, steps: &[ProcessingStep]) -> Vec<String> {
        let mut lines = Vec::new();
        for step in steps {
            if self.seen.get(&step.id) == Some(&step.status) {
                continue;
            }
            self.seen.insert(step.id.clone(), step.status);
            lines.push(format_step(step));
        }
        lines
    }
}

pub fn format_step(step: &ProcessingStep) -> String {
    let marker = match step.status {
        StepStatus::Pending => "[ ]",
        StepStatus::Running => "[~]",
        StepStatus::Completed => "[x]",
        StepStatus::Failed => "[!]",
    };

    match &step.error {
        Some(error) => format!("{} {}: {}", marker, step.title, error),
        None if step.description.is_empty() => format!("{} {}", marker, step.title),
        None => format!("{} {} - {}", marker, step.title, step.description),
    }
}
