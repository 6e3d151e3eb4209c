use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of an outcome. Negative ids are reserved by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeId(pub i32);

impl OutcomeId {
    pub const ABORTED: OutcomeId = OutcomeId(-1);
    pub const PREEMPTED: OutcomeId = OutcomeId(-2);

    pub fn is_reserved(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for OutcomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named terminal result of a state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Outcome {
    pub id: OutcomeId,
    pub name: String,
}

impl Outcome {
    pub fn new(id: i32, name: impl Into<String>) -> Self {
        Self {
            id: OutcomeId(id),
            name: name.into(),
        }
    }

    pub fn aborted() -> Self {
        Self::new(OutcomeId::ABORTED.0, "aborted")
    }

    pub fn preempted() -> Self {
        Self::new(OutcomeId::PREEMPTED.0, "preempted")
    }

    pub fn is_aborted(&self) -> bool {
        self.id == OutcomeId::ABORTED
    }

    pub fn is_preempted(&self) -> bool {
        self.id == OutcomeId::PREEMPTED
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Where a transition leads once it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    /// Enter another child of the same container.
    State(String),
    /// Leave the container with one of its own outcomes.
    Parent(OutcomeId),
}

/// A directed edge from a child's outcome to its successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub id: String,
    pub from_state: String,
    pub from_outcome: OutcomeId,
    pub target: TransitionTarget,
}

impl Transition {
    pub fn matches(&self, state_id: &str, outcome: OutcomeId) -> bool {
        self.from_state == state_id && self.from_outcome == outcome
    }
}
