//! Barrier and preemptive concurrency: every child runs on its own thread.

use super::container::{ContainerState, NextStep};
use super::scope::Scope;
use super::{State, StateOutput, StateRef};
use crate::error::ExecutionError;
use crate::execution::context::Race;
use crate::execution::{Gate, RunContext};
use crate::model::{OutcomeId, PortValues, Value, find_port};
use ahash::AHashMap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Input port of a decider receiving each branch's outcome id.
pub const DECIDER_OUTCOMES_PORT: &str = "outcomes";
/// Input port of a decider receiving each branch's outputs.
pub const DECIDER_RESULTS_PORT: &str = "results";

type BranchResult = (String, StateOutput);

struct Branch {
    child: StateRef,
    ctx: RunContext,
    handle: JoinHandle<()>,
}

/// A container whose children all run concurrently and are joined before
/// an optional decider child picks the outcome.
pub struct BarrierState {
    container: ContainerState,
    decider: Option<String>,
}

impl BarrierState {
    pub(crate) fn new(container: ContainerState, decider: Option<String>) -> Self {
        Self { container, decider }
    }

    pub fn container(&self) -> &ContainerState {
        &self.container
    }

    pub fn decider(&self) -> Option<&str> {
        self.decider.as_deref()
    }

    /// Children that run concurrently, i.e. all but the decider.
    pub fn branches(&self) -> impl Iterator<Item = &StateRef> {
        self.container
            .children()
            .iter()
            .filter(move |child| Some(child.id()) != self.decider.as_deref())
    }

    pub(super) fn run(
        &self,
        state: &State,
        inputs: &PortValues,
        ctx: &RunContext,
    ) -> Result<StateOutput, ExecutionError> {
        let container = &self.container;
        let mut scope = Scope::open(state, container, inputs)?;
        let children: Vec<&StateRef> = self.branches().collect();

        let (sender, receiver) = unbounded();
        let branches = spawn_branches(state, container, &scope, &children, None, ctx, &sender)?;
        drop(sender);

        let mut results: AHashMap<String, StateOutput> = AHashMap::new();
        let poll = ctx.config().gate_poll_interval();
        let mut disconnected = false;
        while results.len() < branches.len() && !ctx.is_preempted() {
            match receiver.recv_timeout(poll) {
                Ok((id, output)) => {
                    debug!(container = %state.path(), state = %id, outcome = %output.outcome, "branch joined barrier");
                    results.insert(id, output);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }
        // Once preempted, branches only get the grace period.
        if !disconnected && results.len() < branches.len() {
            disconnected = drain_until(state, &receiver, &mut results, branches.len(), grace_deadline(ctx));
        }
        join_or_detach(state, branches, &mut results, disconnected, ctx.config().preemption_grace());

        // Declaration order makes overlapping writes deterministic.
        for child in &children {
            if let Some(result) = results.get(child.id()) {
                scope.record_outputs(state, container, child, &result.outputs)?;
            }
        }

        if ctx.is_preempted() {
            return Ok(state.preempted_output());
        }

        let (decider_child, decision) = match self.decider.as_deref().and_then(|id| container.child(id)) {
            Some(decider) => {
                let mut decider_inputs = scope.resolve_inputs(container, decider)?;
                inject_branch_results(decider, &children, &results, &mut decider_inputs)?;
                if ctx.enter_gate(decider.path(), decider.depth(), false) == Gate::Halt {
                    return Ok(state.preempted_output());
                }
                let decision = decider.run(decider_inputs, ctx);
                scope.record_outputs(state, container, decider, &decision.outputs)?;
                if decision.outcome.is_preempted() && ctx.is_preempted() {
                    return Ok(state.preempted_output());
                }
                (decider, decision.outcome.id)
            }
            None => {
                let all: Vec<&StateOutput> = children.iter().filter_map(|c| results.get(c.id())).collect();
                if all.len() < children.len() || all.iter().any(|r| r.outcome.is_aborted()) {
                    return Ok(state.aborted_output());
                }
                if all.iter().any(|r| r.outcome.is_preempted()) {
                    return Ok(state.preempted_output());
                }
                let Some((primary, outcome)) = children
                    .first()
                    .and_then(|c| results.get(c.id()).map(|r| (*c, r.outcome.id)))
                else {
                    return Ok(state.aborted_output());
                };
                (primary, outcome)
            }
        };

        leave(state, container, &scope, decider_child, decision)
    }
}

/// Runs every child concurrently; the first child to finish decides the
/// outcome and the others are preempted.
pub(super) fn run_preemptive(
    state: &State,
    container: &ContainerState,
    inputs: &PortValues,
    ctx: &RunContext,
) -> Result<StateOutput, ExecutionError> {
    let mut scope = Scope::open(state, container, inputs)?;
    let children: Vec<&StateRef> = container.children().iter().collect();

    let race = Arc::new(Race::default());
    let (sender, receiver) = unbounded();
    let branches = spawn_branches(state, container, &scope, &children, Some(&race), ctx, &sender)?;
    drop(sender);

    let mut results: AHashMap<String, StateOutput> = AHashMap::new();
    let Ok((first_id, first)) = receiver.recv() else {
        error!(container = %state.path(), "every branch terminated without a result");
        join_or_detach(state, branches, &mut results, true, ctx.config().preemption_grace());
        return Ok(state.aborted_output());
    };
    results.insert(first_id.clone(), first);

    // Branches claim the race before they report, so a winner exists as
    // soon as anything was received.
    let winner_id = race.winner().unwrap_or(first_id);
    debug!(container = %state.path(), winner = %winner_id, "branch won");
    for branch in branches.iter().filter(|b| b.child.id() != winner_id) {
        branch.ctx.token().preempt();
    }

    // The winner has already finished its run, only its report may be in flight.
    let mut disconnected = false;
    while !results.contains_key(&winner_id) {
        match receiver.recv() {
            Ok((id, output)) => {
                results.insert(id, output);
            }
            Err(_) => {
                disconnected = true;
                break;
            }
        }
    }

    let grace = ctx.config().preemption_grace();
    if !disconnected {
        disconnected = drain_until(state, &receiver, &mut results, branches.len(), grace_deadline(ctx));
    }
    join_or_detach(state, branches, &mut results, disconnected, grace);

    let Some(winner_child) = container.child(&winner_id) else {
        return Ok(state.aborted_output());
    };
    let Some(winner) = results.remove(&winner_id) else {
        return Ok(state.aborted_output());
    };
    scope.record_outputs(state, container, winner_child, &winner.outputs)?;

    if ctx.is_preempted() {
        return Ok(state.preempted_output());
    }

    leave(state, container, &scope, winner_child, winner.outcome.id)
}

/// End of the grace period granted to preempted branches, `None` when it
/// lies beyond what `Instant` can represent.
fn grace_deadline(ctx: &RunContext) -> Option<Instant> {
    Instant::now().checked_add(ctx.config().preemption_grace())
}

/// Collects reports until `expected` branches reported or `deadline` passed.
/// Returns true once every sender is gone.
fn drain_until(
    state: &State,
    receiver: &Receiver<BranchResult>,
    results: &mut AHashMap<String, StateOutput>,
    expected: usize,
    deadline: Option<Instant>,
) -> bool {
    while results.len() < expected {
        let received = match deadline {
            Some(at) => receiver.recv_deadline(at),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok((id, output)) => {
                debug!(container = %state.path(), state = %id, outcome = %output.outcome, "branch reported");
                results.insert(id, output);
            }
            Err(RecvTimeoutError::Timeout) => return false,
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
    false
}

/// Maps the deciding child's outcome to an outcome of the concurrency state.
fn leave(
    state: &State,
    container: &ContainerState,
    scope: &Scope,
    child: &State,
    outcome: OutcomeId,
) -> Result<StateOutput, ExecutionError> {
    match container.next_step(child, outcome) {
        NextStep::Leave(outcome_id) => {
            let Some(outcome) = state.outcome(outcome_id).cloned() else {
                return Ok(state.aborted_output());
            };
            let outputs = scope.collect_outputs(state, container)?;
            Ok(StateOutput { outcome, outputs })
        }
        NextStep::Child(_) | NextStep::Unresolved => {
            let err = ExecutionError::UnresolvedTransition {
                state: child.path().to_string(),
                outcome,
            };
            warn!(container = %state.path(), error = %err, "aborting container");
            Ok(state.aborted_output())
        }
    }
}

fn spawn_branches(
    state: &State,
    container: &ContainerState,
    scope: &Scope,
    children: &[&StateRef],
    race: Option<&Arc<Race>>,
    ctx: &RunContext,
    sender: &Sender<BranchResult>,
) -> Result<Vec<Branch>, ExecutionError> {
    // Resolve everything first so a type error never leaves threads behind.
    let mut prepared = Vec::with_capacity(children.len());
    for child in children {
        prepared.push((Arc::clone(child), scope.resolve_inputs(container, child)?));
    }

    let mut branches: Vec<Branch> = Vec::with_capacity(prepared.len());
    for (child, inputs) in prepared {
        let branch_ctx = match race {
            Some(race) => ctx.branch().with_race(Arc::clone(race)),
            None => ctx.branch(),
        };
        let thread_ctx = branch_ctx.clone();
        let thread_child = Arc::clone(&child);
        let sender = sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}:{}", ctx.config().thread_name_prefix, child.path()))
            .spawn(move || {
                let output = match thread_ctx.enter_gate(thread_child.path(), thread_child.depth(), false) {
                    Gate::Halt => {
                        thread_ctx.claim_race(thread_child.id());
                        thread_child.preempted_output()
                    }
                    Gate::Proceed | Gate::Rewind => thread_child.run(inputs, &thread_ctx),
                };
                let _ = sender.send((thread_child.id().to_string(), output));
            });
        match spawned {
            Ok(handle) => branches.push(Branch {
                child,
                ctx: branch_ctx,
                handle,
            }),
            Err(err) => {
                for branch in &branches {
                    branch.ctx.token().preempt();
                }
                let mut ignored = AHashMap::new();
                join_or_detach(state, branches, &mut ignored, false, ctx.config().preemption_grace());
                return Err(ExecutionError::Spawn {
                    state: child.path().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    Ok(branches)
}

/// Joins branches that reported (or whose thread already ended) and detaches
/// the rest, reporting them as a preemption timeout. After `disconnected`
/// every thread has let go of its sender, so all of them are joined.
/// Branches that died without reporting are recorded as aborted.
fn join_or_detach(
    state: &State,
    branches: Vec<Branch>,
    results: &mut AHashMap<String, StateOutput>,
    disconnected: bool,
    grace: Duration,
) {
    let mut stuck = Vec::new();
    for branch in branches {
        let reported = results.contains_key(branch.child.id());
        if !(reported || disconnected || branch.handle.is_finished()) {
            // Dropping the handle detaches the thread.
            stuck.push(branch.child.path().to_string());
            continue;
        }
        if branch.handle.join().is_err() {
            error!(container = %state.path(), state = %branch.child.path(), "branch thread panicked");
        }
        results
            .entry(branch.child.id().to_string())
            .or_insert_with(|| branch.child.aborted_output());
    }
    if !stuck.is_empty() {
        let err = ExecutionError::PreemptionTimeout {
            container: state.path().to_string(),
            children: stuck,
            grace_ms: u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        };
        error!(error = %err, "continuing without preempted branches");
    }
}

fn inject_branch_results(
    decider: &State,
    children: &[&StateRef],
    results: &AHashMap<String, StateOutput>,
    inputs: &mut PortValues,
) -> Result<(), ExecutionError> {
    if let Some(port) = find_port(decider.input_ports(), DECIDER_OUTCOMES_PORT) {
        let outcomes: AHashMap<String, Value> = children
            .iter()
            .filter_map(|c| results.get(c.id()).map(|r| (c.id().to_string(), Value::Int(r.outcome.id.0 as i64))))
            .collect();
        let value = Value::Map(outcomes);
        decider.check_type(port, &value)?;
        inputs.insert(port.name.clone(), value);
    }
    if let Some(port) = find_port(decider.input_ports(), DECIDER_RESULTS_PORT) {
        let outputs: AHashMap<String, Value> = children
            .iter()
            .filter_map(|c| {
                results
                    .get(c.id())
                    .map(|r| (c.id().to_string(), Value::Map(r.outputs.clone())))
            })
            .collect();
        let value = Value::Map(outputs);
        decider.check_type(port, &value)?;
        inputs.insert(port.name.clone(), value);
    }
    Ok(())
}
