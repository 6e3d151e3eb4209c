use super::scope::Scope;
use super::{State, StateOutput, StateRef};
use crate::error::ExecutionError;
use crate::execution::{Gate, RunContext};
use crate::model::{DataFlow, DataPort, OutcomeId, PortValues, Transition, TransitionTarget};
use ahash::AHashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Children, transitions, data flows and scoped variables of a container.
pub struct ContainerState {
    start_state: Option<String>,
    children: Vec<StateRef>,
    index: AHashMap<String, usize>,
    transitions: Vec<Transition>,
    data_flows: Vec<DataFlow>,
    scoped_variables: Vec<DataPort>,
}

/// How a container continues after one of its children finished.
pub(crate) enum NextStep<'a> {
    Child(&'a StateRef),
    Leave(OutcomeId),
    Unresolved,
}

impl ContainerState {
    pub(crate) fn new(
        start_state: Option<String>,
        children: Vec<StateRef>,
        transitions: Vec<Transition>,
        data_flows: Vec<DataFlow>,
        scoped_variables: Vec<DataPort>,
    ) -> Self {
        let index = children
            .iter()
            .enumerate()
            .map(|(i, child)| (child.id().to_string(), i))
            .collect();
        Self {
            start_state,
            children,
            index,
            transitions,
            data_flows,
            scoped_variables,
        }
    }

    pub fn start_state(&self) -> Option<&str> {
        self.start_state.as_deref()
    }

    /// Children in declaration order.
    pub fn children(&self) -> &[StateRef] {
        &self.children
    }

    pub fn child(&self, id: &str) -> Option<&StateRef> {
        self.index.get(id).map(|&i| &self.children[i])
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn data_flows(&self) -> &[DataFlow] {
        &self.data_flows
    }

    pub fn scoped_variables(&self) -> &[DataPort] {
        &self.scoped_variables
    }

    /// First transition, in insertion order, leaving `state_id` with `outcome`.
    pub fn transition_for(&self, state_id: &str, outcome: OutcomeId) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.matches(state_id, outcome))
    }

    pub(crate) fn next_step(&self, child: &State, outcome: OutcomeId) -> NextStep<'_> {
        match self.transition_for(child.id(), outcome).map(|t| &t.target) {
            Some(TransitionTarget::Parent(outcome)) => NextStep::Leave(*outcome),
            Some(TransitionTarget::State(id)) => match self.child(id) {
                Some(next) => NextStep::Child(next),
                None => NextStep::Unresolved,
            },
            None => NextStep::Unresolved,
        }
    }

    /// Runs children one after another, following transitions from the
    /// start state until one leads to an outcome of `state`.
    pub(super) fn run_sequential(
        &self,
        state: &State,
        inputs: &PortValues,
        ctx: &RunContext,
    ) -> Result<StateOutput, ExecutionError> {
        let mut scope = Scope::open(state, self, inputs)?;
        let Some(mut current) = self.start_state.as_deref().and_then(|id| self.child(id)) else {
            warn!(container = %state.path(), "container has no start state, aborting");
            return Ok(state.aborted_output());
        };
        // Executed children and the scope they saw, for stepping backward.
        let mut history: Vec<(StateRef, Scope)> = Vec::new();
        let mut rewound = false;

        loop {
            if ctx.is_preempted() {
                return Ok(state.preempted_output());
            }

            // A rewound child re-runs right away; the step was already taken.
            let gate = if rewound {
                Gate::Proceed
            } else {
                ctx.enter_gate(current.path(), current.depth(), !history.is_empty())
            };
            rewound = false;
            match gate {
                Gate::Halt => return Ok(state.preempted_output()),
                Gate::Rewind => {
                    if let Some((previous, snapshot)) = history.pop() {
                        debug!(container = %state.path(), state = %previous.path(), "stepping back");
                        scope = snapshot;
                        current = self.child(previous.id()).unwrap_or(current);
                        rewound = true;
                    }
                    continue;
                }
                Gate::Proceed => {}
            }

            let child_inputs = scope.resolve_inputs(self, current)?;
            let snapshot = scope.clone();
            let result = current.run(child_inputs, ctx);

            if result.outcome.is_preempted() && ctx.is_preempted() {
                return Ok(state.preempted_output());
            }
            scope.record_outputs(state, self, current, &result.outputs)?;
            history.push((Arc::clone(current), snapshot));

            match self.next_step(current, result.outcome.id) {
                NextStep::Child(next) => current = next,
                NextStep::Leave(outcome_id) => {
                    let Some(outcome) = state.outcome(outcome_id).cloned() else {
                        return Ok(state.aborted_output());
                    };
                    let outputs = scope.collect_outputs(state, self)?;
                    return Ok(StateOutput { outcome, outputs });
                }
                NextStep::Unresolved => {
                    let err = ExecutionError::UnresolvedTransition {
                        state: current.path().to_string(),
                        outcome: result.outcome.id,
                    };
                    warn!(container = %state.path(), error = %err, "aborting container");
                    return Ok(state.aborted_output());
                }
            }
        }
    }
}
