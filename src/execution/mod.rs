//! Execution control: the engine facade, the shared status with its entry
//! gate, preemption tokens, events, history and global variables.

pub mod context;
pub mod engine;
pub mod events;
pub mod history;
pub mod preemption;
pub mod status;
pub mod variables;

pub use context::RunContext;
pub use engine::ExecutionEngine;
pub use events::{EventBus, ExecutionEvent, Subscriber};
pub use history::{ExecutionHistory, HistoryItem, HistoryKind};
pub use preemption::PreemptionToken;
pub use status::{CountingCondvar, ExecutionMode, ExecutionStatus, Gate};
pub use variables::GlobalVariables;
