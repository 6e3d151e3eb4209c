//! Runtime state tree.
//!
//! A [`State`] is built once by the builder and is immutable afterwards,
//! apart from its `active` flag. Containers own their children through
//! `Arc` so concurrency branches can run them on their own threads.

mod atomic;
pub mod behavior;
mod concurrency;
mod container;
mod scope;

pub use atomic::AtomicState;
pub use behavior::{Behavior, BehaviorOutput, FnBehavior};
pub use concurrency::BarrierState;
pub use container::ContainerState;

use crate::error::ExecutionError;
use crate::execution::{ExecutionEvent, RunContext};
use crate::model::{DataPort, Outcome, OutcomeId, PortValues};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// What a state produced: its outcome and the values of its output ports.
#[derive(Debug, Clone, PartialEq)]
pub struct StateOutput {
    pub outcome: Outcome,
    pub outputs: PortValues,
}

/// The closed set of state variants.
pub enum StateKind {
    Atomic(AtomicState),
    Hierarchy(ContainerState),
    Barrier(BarrierState),
    Preemptive(ContainerState),
}

impl StateKind {
    pub fn label(&self) -> &'static str {
        match self {
            StateKind::Atomic(_) => "execution",
            StateKind::Hierarchy(_) => "hierarchy",
            StateKind::Barrier(_) => "barrier_concurrency",
            StateKind::Preemptive(_) => "preemptive_concurrency",
        }
    }
}

/// A node of the runtime state tree.
pub struct State {
    id: String,
    name: String,
    path: String,
    depth: usize,
    input_ports: Vec<DataPort>,
    output_ports: Vec<DataPort>,
    outcomes: Vec<Outcome>,
    active: AtomicBool,
    kind: StateKind,
}

impl State {
    /// `outcomes` should not contain the reserved outcomes, they are added here.
    pub(crate) fn new(
        id: String,
        name: String,
        path: String,
        input_ports: Vec<DataPort>,
        output_ports: Vec<DataPort>,
        mut outcomes: Vec<Outcome>,
        kind: StateKind,
    ) -> Self {
        outcomes.retain(|o| !o.id.is_reserved());
        outcomes.push(Outcome::aborted());
        outcomes.push(Outcome::preempted());
        let depth = path.matches('/').count();
        Self {
            id,
            name,
            path,
            depth,
            input_ports,
            output_ports,
            outcomes,
            active: AtomicBool::new(false),
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slash separated ids from the root down to this state.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the enclosing container, `None` for the root.
    pub fn parent_path(&self) -> Option<&str> {
        self.path.rsplit_once('/').map(|(parent, _)| parent)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn input_ports(&self) -> &[DataPort] {
        &self.input_ports
    }

    pub fn output_ports(&self) -> &[DataPort] {
        &self.output_ports
    }

    /// Declared outcomes, followed by `aborted` and `preempted`.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn outcome(&self, id: OutcomeId) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn kind(&self) -> &StateKind {
        &self.kind
    }

    pub fn container(&self) -> Option<&ContainerState> {
        match &self.kind {
            StateKind::Atomic(_) => None,
            StateKind::Hierarchy(container) | StateKind::Preemptive(container) => Some(container),
            StateKind::Barrier(barrier) => Some(barrier.container()),
        }
    }

    /// Looks up a descendant (or this state) by its full path.
    pub fn find(&self, path: &str) -> Option<&State> {
        if path == self.path {
            return Some(self);
        }
        let rest = path.strip_prefix(self.path.as_str())?.strip_prefix('/')?;
        let child_id = rest.split('/').next()?;
        self.container()?.child(child_id)?.find(path)
    }

    /// Runs the state to completion and always yields an outcome.
    ///
    /// Errors and panics raised inside the state are logged and turned
    /// into `aborted`. A preemptive branch that finishes after its race was
    /// won by a sibling reports `preempted`.
    pub fn run(&self, inputs: PortValues, ctx: &RunContext) -> StateOutput {
        self.active.store(true, Ordering::SeqCst);
        ctx.events().publish(ExecutionEvent::StateEntered {
            path: self.path.clone(),
        });
        debug!(state = %self.path, kind = self.kind.label(), "entering state");

        let mut output = match panic::catch_unwind(AssertUnwindSafe(|| self.execute(inputs, ctx))) {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                error!(state = %self.path, error = %err, "state aborted");
                self.aborted_output()
            }
            Err(payload) => {
                error!(state = %self.path, panic = %panic_message(payload.as_ref()), "state panicked");
                self.aborted_output()
            }
        };
        if !ctx.claim_race(&self.id) {
            output = self.preempted_output();
        }

        debug!(state = %self.path, outcome = %output.outcome, "leaving state");
        self.active.store(false, Ordering::SeqCst);
        ctx.events().publish(ExecutionEvent::StateExited {
            path: self.path.clone(),
            outcome: output.outcome.clone(),
        });
        output
    }

    /// Runs the state and reports errors instead of converting them.
    pub fn execute(&self, inputs: PortValues, ctx: &RunContext) -> Result<StateOutput, ExecutionError> {
        let inputs = self.prepare_inputs(inputs)?;
        let ctx = ctx.for_state(&self.path);
        match &self.kind {
            StateKind::Atomic(atomic) => atomic.run(self, &inputs, &ctx),
            StateKind::Hierarchy(container) => container.run_sequential(self, &inputs, &ctx),
            StateKind::Barrier(barrier) => barrier.run(self, &inputs, &ctx),
            StateKind::Preemptive(container) => concurrency::run_preemptive(self, container, &inputs, &ctx),
        }
    }

    /// Fills missing inputs with their defaults and checks every declared type.
    fn prepare_inputs(&self, mut inputs: PortValues) -> Result<PortValues, ExecutionError> {
        for port in &self.input_ports {
            let value = inputs
                .entry(port.name.clone())
                .or_insert_with(|| port.default_value.clone());
            if value.is_null() {
                *value = port.default_value.clone();
            }
            self.check_type(port, value)?;
        }
        Ok(inputs)
    }

    pub(crate) fn check_type(&self, port: &DataPort, value: &crate::model::Value) -> Result<(), ExecutionError> {
        if port.data_type.accepts(value) {
            Ok(())
        } else {
            Err(ExecutionError::TypeMismatch {
                state: self.path.clone(),
                port: port.name.clone(),
                expected: port.data_type,
                found: value.clone(),
            })
        }
    }

    pub(crate) fn default_outputs(&self) -> PortValues {
        self.output_ports
            .iter()
            .map(|p| (p.name.clone(), p.default_value.clone()))
            .collect()
    }

    pub(crate) fn output_with(&self, outcome: Outcome) -> StateOutput {
        StateOutput {
            outcome,
            outputs: self.default_outputs(),
        }
    }

    pub fn aborted_output(&self) -> StateOutput {
        self.output_with(Outcome::aborted())
    }

    pub fn preempted_output(&self) -> StateOutput {
        self.output_with(Outcome::preempted())
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("path", &self.path)
            .field("kind", &self.kind.label())
            .field("outcomes", &self.outcomes)
            .finish()
    }
}

pub(crate) type StateRef = Arc<State>;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
