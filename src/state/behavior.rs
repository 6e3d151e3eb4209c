use crate::error::BehaviorError;
use crate::execution::RunContext;
use crate::model::{OutcomeId, PortValues, Value};

/// The user-supplied body of an execution state.
///
/// Behaviors receive their resolved inputs and must return one of the
/// outcomes declared by their state. Long running behaviors should call
/// [`RunContext::sleep`] or [`RunContext::checkpoint`] so they can be
/// preempted.
pub trait Behavior: Send + Sync {
    /// Name under which the behavior is registered with the builder.
    fn name(&self) -> &str;

    fn execute(&self, inputs: &PortValues, ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError>;
}

/// Result of one behavior invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BehaviorOutput {
    pub outcome: OutcomeId,
    pub outputs: PortValues,
}

impl BehaviorOutput {
    pub fn new(outcome: i32) -> Self {
        Self {
            outcome: OutcomeId(outcome),
            outputs: PortValues::default(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(key.into(), value.into());
        self
    }
}

/// Adapts a closure into a [`Behavior`].
pub struct FnBehavior<F> {
    name: String,
    body: F,
}

impl<F> FnBehavior<F>
where
    F: Fn(&PortValues, &RunContext) -> Result<BehaviorOutput, BehaviorError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<F> Behavior for FnBehavior<F>
where
    F: Fn(&PortValues, &RunContext) -> Result<BehaviorOutput, BehaviorError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, inputs: &PortValues, ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
        (self.body)(inputs, ctx)
    }
}
