//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from the jotai crate.
//!
//! # Example
//!
//! ```rust,no_run
//! use jotai::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let definition = StateMachineDefinition::from_file("path/to/statemachine.json")?;
//! let machine = StateMachine::builder(definition)
//!     .with_library_resolver(FileSystemLibraryResolver::new().with_root("generic", "path/to/libraries"))
//!     .build()?;
//!
//! let engine = ExecutionEngine::with_config(machine, EngineConfig::default());
//! engine.start()?;
//! engine.join()?;
//! println!("{}", HistoryFormatter::format_history(&engine.history()));
//! # Ok(())
//! # }
//! ```

// Building and running
pub use crate::builder::{StateMachine, StateMachineBuilder};
pub use crate::config::EngineConfig;
pub use crate::execution::{ExecutionEngine, ExecutionEvent, ExecutionMode, GlobalVariables, RunContext};

// Definitions
pub use crate::definition::{
    FileSystemLibraryResolver, InMemoryLibrary, IntoStateMachine, LibraryResolver,
    StateDefinition, StateMachineArtifact, StateMachineDefinition,
};

// Runtime model
pub use crate::model::{DataType, Outcome, OutcomeId, PortValues, Value};
pub use crate::state::{Behavior, BehaviorOutput, FnBehavior, State, StateOutput};

// Error types
pub use crate::error::{BehaviorError, BuildError, EngineError, ExecutionError};

// Trace formatting
pub use crate::trace::HistoryFormatter;

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
