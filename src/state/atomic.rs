use super::behavior::Behavior;
use super::{State, StateOutput};
use crate::error::{BehaviorError, ExecutionError};
use crate::execution::RunContext;
use crate::model::{PortValues, find_port};
use std::sync::Arc;
use tracing::debug;

/// A leaf state that runs one behavior.
pub struct AtomicState {
    behavior: Arc<dyn Behavior>,
}

impl AtomicState {
    pub(crate) fn new(behavior: Arc<dyn Behavior>) -> Self {
        Self { behavior }
    }

    pub fn behavior_name(&self) -> &str {
        self.behavior.name()
    }

    pub(super) fn run(
        &self,
        state: &State,
        inputs: &PortValues,
        ctx: &RunContext,
    ) -> Result<StateOutput, ExecutionError> {
        let result = match self.behavior.execute(inputs, ctx) {
            Ok(result) => result,
            Err(BehaviorError::Preempted) => return Ok(state.preempted_output()),
            Err(BehaviorError::Failed(message)) => {
                return Err(ExecutionError::BehaviorFailed {
                    state: state.path().to_string(),
                    message,
                });
            }
        };

        // A preempted state reports `preempted` even if its behavior ignored the request.
        if ctx.is_preempted() {
            return Ok(state.preempted_output());
        }

        let outcome = state
            .outcome(result.outcome)
            .cloned()
            .ok_or_else(|| ExecutionError::UndeclaredOutcome {
                state: state.path().to_string(),
                outcome: result.outcome,
            })?;

        let mut outputs = state.default_outputs();
        for (key, value) in result.outputs {
            match find_port(state.output_ports(), &key) {
                Some(port) => {
                    state.check_type(port, &value)?;
                    if !value.is_null() {
                        outputs.insert(key, value);
                    }
                }
                None => debug!(state = %state.path(), key = %key, "dropping undeclared output"),
            }
        }

        Ok(StateOutput { outcome, outputs })
    }
}
