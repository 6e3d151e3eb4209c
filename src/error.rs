use crate::model::{DataType, OutcomeId, Value};
use thiserror::Error;

/// Errors detected while validating a state machine definition.
///
/// These are raised by the builder before any execution thread exists.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("State '{container}' contains more than one child with id '{state_id}'")]
    DuplicateStateId { container: String, state_id: String },

    #[error("State '{state}' declares the port '{port}' more than once")]
    DuplicatePort { state: String, port: String },

    #[error("State '{state}' declares the outcome id {outcome} more than once")]
    DuplicateOutcome { state: String, outcome: OutcomeId },

    #[error("State '{state}' uses the reserved outcome id {outcome} for '{name}'")]
    ReservedOutcome {
        state: String,
        outcome: OutcomeId,
        name: String,
    },

    #[error("Container '{container}' declares the {element} id '{id}' more than once")]
    DuplicateElementId {
        container: String,
        element: &'static str,
        id: String,
    },

    #[error("Container '{container}' references unknown state '{state_id}' in {element} '{id}'")]
    UnknownState {
        container: String,
        element: &'static str,
        id: String,
        state_id: String,
    },

    #[error("Transition '{transition}' in '{container}' references unknown outcome {outcome} of '{state_id}'")]
    UnknownOutcome {
        container: String,
        transition: String,
        state_id: String,
        outcome: OutcomeId,
    },

    #[error("Transition '{transition}' in '{container}' is malformed: {message}")]
    InvalidTransition {
        container: String,
        transition: String,
        message: String,
    },

    #[error("Data flow '{data_flow}' in '{container}' references unknown port '{key}' of '{state_id}'")]
    UnknownPort {
        container: String,
        data_flow: String,
        state_id: String,
        key: String,
    },

    #[error("Data flow '{data_flow}' in '{container}' is malformed: {message}")]
    InvalidDataFlow {
        container: String,
        data_flow: String,
        message: String,
    },

    #[error("Data flow '{data_flow}' in '{container}' connects {from} to incompatible {to}")]
    IncompatibleDataFlow {
        container: String,
        data_flow: String,
        from: DataType,
        to: DataType,
    },

    #[error("Container '{container}' has children but no start state")]
    MissingStartState { container: String },

    #[error("Container '{container}' has no child states")]
    EmptyContainer { container: String },

    #[error("Barrier state '{container}' names '{decider}' as decider, but no such child exists")]
    UnknownDecider { container: String, decider: String },

    #[error("Execution state '{state}' uses unregistered behavior '{behavior}'")]
    UnknownBehavior { state: String, behavior: String },

    #[error("Port '{port}' of state '{state}' has a default value that is not a {expected}")]
    InvalidDefault {
        state: String,
        port: String,
        expected: DataType,
    },
}

/// Errors raised while resolving library states.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LibraryError {
    #[error("Library '{library_name}' could not be found under library path '{library_path}'")]
    MissingLibrary {
        library_path: String,
        library_name: String,
    },

    #[error("Library '{library_path}/{library_name}' includes itself")]
    LibraryCycle {
        library_path: String,
        library_name: String,
    },

    #[error("Library '{library_path}/{library_name}' could not be read: {message}")]
    Unreadable {
        library_path: String,
        library_name: String,
        message: String,
    },
}

/// Errors that can occur while turning a definition into a runnable state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// Errors raised while a state runs. They never cross a state boundary:
/// the owning state turns them into the `aborted` outcome and logs them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Port '{port}' of state '{state}' expects {expected}, but received '{found}'")]
    TypeMismatch {
        state: String,
        port: String,
        expected: DataType,
        found: Value,
    },

    #[error("No transition leaves state '{state}' for outcome {outcome}")]
    UnresolvedTransition { state: String, outcome: OutcomeId },

    #[error("Behavior of state '{state}' failed: {message}")]
    BehaviorFailed { state: String, message: String },

    #[error("Behavior of state '{state}' returned undeclared outcome {outcome}")]
    UndeclaredOutcome { state: String, outcome: OutcomeId },

    #[error("Children of '{container}' ignored preemption for {grace_ms} ms: {children:?}")]
    PreemptionTimeout {
        container: String,
        children: Vec<String>,
        grace_ms: u64,
    },

    #[error("Could not spawn a thread for state '{state}': {message}")]
    Spawn { state: String, message: String },
}

/// Errors reported by a behavior implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BehaviorError {
    #[error("{0}")]
    Failed(String),

    #[error("preempted")]
    Preempted,
}

/// Errors that can occur when persisting or loading definitions and artifacts.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Could not access '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid state machine JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary artifact encoding failed: {0}")]
    Encode(String),

    #[error("Binary artifact decoding failed: {0}")]
    Decode(String),
}

/// Errors raised by the execution engine's control surface.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Could not spawn the root execution thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("The root execution thread panicked")]
    RootPanicked,

    #[error("No state with path '{0}' exists in this state machine")]
    UnknownState(String),
}

/// Errors that can occur when converting a custom user format into a `StateMachineDefinition`.
#[derive(Error, Debug, Clone)]
pub enum ConversionError {
    #[error("Invalid custom data: {0}")]
    ValidationError(String),
}
