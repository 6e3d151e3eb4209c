//! # Jotai - Hierarchical State Machine Execution Engine
//!
//! **Jotai** executes hierarchical state machines: trees of atomic states,
//! sequential containers and concurrency containers, linked by outcome-driven
//! transitions and typed data flows. Execution can be started, paused,
//! stopped and stepped from any thread while the machine runs on its own.
//!
//! ## Core Workflow
//!
//! The engine is format-agnostic. It operates on a canonical definition
//! model, and the primary workflow is:
//!
//! 1.  **Describe**: Build a `StateMachineDefinition` in code, load it from JSON,
//!     or implement `IntoStateMachine` for your own format.
//! 2.  **Build**: `StateMachine::builder` registers behaviors and library
//!     resolvers, inlines libraries and validates the whole tree before any
//!     thread exists.
//! 3.  **Execute**: Hand the machine to an `ExecutionEngine` and drive it with
//!     `start`, `pause`, `stop`, the step commands and `join`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jotai::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let root = StateDefinition::hierarchy("root")
//!         .with_outcome(0, "done")
//!         .with_output("sum", DataType::Int)
//!         .with_state(
//!             StateDefinition::execution("add", "sum")
//!                 .with_input_default("a", DataType::Int, Value::Int(2))
//!                 .with_input_default("b", DataType::Int, Value::Int(3))
//!                 .with_output("sum", DataType::Int)
//!                 .with_outcome(0, "success"),
//!         )
//!         .with_start_state("add")
//!         .with_transition("add", 0, None, Some(0))
//!         .with_data_flow("add", "sum", "root", "sum");
//!
//!     let machine = StateMachine::builder(StateMachineDefinition::new("adder", root)).build()?;
//!     let engine = ExecutionEngine::new(machine);
//!     engine.start()?;
//!     engine.join()?;
//!
//!     if let Some(output) = engine.last_output() {
//!         println!("-> {} with {}", output.outcome, HistoryFormatter::format_values(&output.outputs));
//!     }
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod definition;
pub mod error;
pub mod execution;
pub mod model;
pub mod prelude;
pub mod state;
pub mod trace;
