use super::events::{ExecutionEvent, Subscriber};
use crate::model::Outcome;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryKind {
    Call,
    Return(Outcome),
}

/// One entry of the execution history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub path: String,
    pub kind: HistoryKind,
    /// Time since the history was last cleared.
    pub elapsed: Duration,
}

impl HistoryItem {
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

/// Records state entries and exits published on an event bus.
#[derive(Debug)]
pub struct ExecutionHistory {
    items: Mutex<Vec<HistoryItem>>,
    origin: Mutex<Instant>,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            origin: Mutex::new(Instant::now()),
        }
    }

    pub fn items(&self) -> Vec<HistoryItem> {
        self.items.lock().clone()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
        *self.origin.lock() = Instant::now();
    }

    /// Outcome of the last return of the state at `path`.
    pub fn last_outcome_of(&self, path: &str) -> Option<Outcome> {
        self.items
            .lock()
            .iter()
            .rev()
            .find_map(|item| match &item.kind {
                HistoryKind::Return(outcome) if item.path == path => Some(outcome.clone()),
                _ => None,
            })
    }

    fn push(&self, path: &str, kind: HistoryKind) {
        let elapsed = self.origin.lock().elapsed();
        self.items.lock().push(HistoryItem {
            path: path.to_string(),
            kind,
            elapsed,
        });
    }
}

impl Subscriber for ExecutionHistory {
    fn notify(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::StateEntered { path } => self.push(path, HistoryKind::Call),
            ExecutionEvent::StateExited { path, outcome } => {
                self.push(path, HistoryKind::Return(outcome.clone()))
            }
            ExecutionEvent::StatusChanged { .. } => {}
        }
    }
}
