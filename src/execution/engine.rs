use super::context::RunContext;
use super::events::EventBus;
use super::history::{ExecutionHistory, HistoryItem};
use super::preemption::PreemptionToken;
use super::status::{ExecutionMode, ExecutionStatus, Gate};
use super::variables::GlobalVariables;
use crate::builder::StateMachine;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::PortValues;
use crate::state::StateOutput;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Set once the root thread is done, whoever ends up joining it.
#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn is_done(&self) -> bool {
        *self.done.lock()
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.signal.wait(&mut done);
        }
    }
}

/// Marks the run complete when the root thread leaves, even by unwinding.
struct CompletionGuard(Arc<Completion>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        *self.0.done.lock() = true;
        self.0.signal.notify_all();
    }
}

struct RootRun {
    token: PreemptionToken,
    handle: Option<JoinHandle<()>>,
    completion: Arc<Completion>,
}

impl RootRun {
    fn is_alive(&self) -> bool {
        !self.completion.is_done()
    }
}

/// Runs a built state machine on a dedicated root thread and exposes the
/// control surface: start, pause, stop, stepping and join.
pub struct ExecutionEngine {
    machine: Arc<StateMachine>,
    config: EngineConfig,
    events: Arc<EventBus>,
    status: Arc<ExecutionStatus>,
    history: Arc<ExecutionHistory>,
    globals: Arc<GlobalVariables>,
    inputs: Mutex<PortValues>,
    run: Mutex<Option<RootRun>>,
    last_output: Arc<Mutex<Option<StateOutput>>>,
}

impl ExecutionEngine {
    pub fn new(machine: StateMachine) -> Self {
        Self::with_config(machine, EngineConfig::default())
    }

    pub fn with_config(machine: impl Into<Arc<StateMachine>>, config: EngineConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let status = Arc::new(ExecutionStatus::new(
            ExecutionMode::Stopped,
            events.clone(),
            config.gate_poll_interval(),
        ));
        let history = Arc::new(ExecutionHistory::new());
        events.subscribe(history.clone());
        Self {
            machine: machine.into(),
            config,
            events,
            status,
            history,
            globals: Arc::new(GlobalVariables::new()),
            inputs: Mutex::new(PortValues::default()),
            run: Mutex::new(None),
            last_output: Arc::new(Mutex::new(None)),
        }
    }

    /// Inputs handed to the root state on every subsequent run.
    pub fn with_inputs(self, inputs: PortValues) -> Self {
        *self.inputs.lock() = inputs;
        self
    }

    pub fn set_inputs(&self, inputs: PortValues) {
        *self.inputs.lock() = inputs;
    }

    pub fn machine(&self) -> &Arc<StateMachine> {
        &self.machine
    }

    pub fn status(&self) -> &Arc<ExecutionStatus> {
        &self.status
    }

    pub fn mode(&self) -> ExecutionMode {
        self.status.mode()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Variables shared by every state, kept across runs.
    pub fn global_variables(&self) -> &Arc<GlobalVariables> {
        &self.globals
    }

    /// Entries and exits recorded during the current (or last) run.
    pub fn history(&self) -> Vec<HistoryItem> {
        self.history.items()
    }

    /// Outcome and outputs of the root state after the last finished run.
    pub fn last_output(&self) -> Option<StateOutput> {
        self.last_output.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().as_ref().is_some_and(RootRun::is_alive)
    }

    /// Starts a new run, or resumes a paused or stepping one.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut run = self.run.lock();
        if self.status.mode() == ExecutionMode::Started && run.as_ref().is_some_and(RootRun::is_alive) {
            warn!(machine = %self.machine.name(), "start() ignored, execution already started");
            return Ok(());
        }
        if run.as_ref().is_some_and(RootRun::is_alive) {
            self.status.request(ExecutionMode::Started);
            return Ok(());
        }
        self.spawn_root(&mut run, ExecutionMode::Started)
    }

    /// Blocks every state at its next entry. Ignored while stopped.
    pub fn pause(&self) -> bool {
        self.status.request(ExecutionMode::Paused)
    }

    /// Preempts the whole tree and waits for the root thread to return.
    pub fn stop(&self) -> Result<(), EngineError> {
        let (token, handle, completion) = self.take_run();
        self.status.request(ExecutionMode::Stopped);
        if let Some(token) = token {
            token.preempt();
        }
        self.status.notify_all();
        wait_for_root(handle, completion)
    }

    /// Waits until the current run returns.
    pub fn join(&self) -> Result<(), EngineError> {
        let (_, handle, completion) = self.take_run();
        wait_for_root(handle, completion)
    }

    /// The handle goes to the first caller; later callers wait on the
    /// completion signal instead.
    fn take_run(&self) -> (Option<PreemptionToken>, Option<JoinHandle<()>>, Option<Arc<Completion>>) {
        let mut run = self.run.lock();
        match run.as_mut() {
            Some(root) => (
                Some(root.token.clone()),
                root.handle.take(),
                Some(root.completion.clone()),
            ),
            None => (None, None, None),
        }
    }

    pub fn step_into(&self) -> Result<(), EngineError> {
        self.step(ExecutionMode::ForwardInto)
    }

    pub fn step_over(&self) -> Result<(), EngineError> {
        self.step(ExecutionMode::ForwardOver)
    }

    pub fn step_out(&self) -> Result<(), EngineError> {
        self.step(ExecutionMode::ForwardOut)
    }

    pub fn step_backward(&self) -> Result<(), EngineError> {
        self.step(ExecutionMode::Backward)
    }

    /// Runs until the state at `path` is about to be entered, then pauses.
    pub fn run_to_selected_state(&self, path: &str) -> Result<(), EngineError> {
        if self.machine.find_state(path).is_none() {
            return Err(EngineError::UnknownState(path.to_string()));
        }
        self.status.select_state(path);
        self.step(ExecutionMode::RunToSelectedState)
    }

    fn step(&self, mode: ExecutionMode) -> Result<(), EngineError> {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(RootRun::is_alive) {
            self.status.request(mode);
            return Ok(());
        }
        self.spawn_root(&mut run, mode)
    }

    fn spawn_root(&self, run: &mut Option<RootRun>, mode: ExecutionMode) -> Result<(), EngineError> {
        if let Some(previous) = run.take().and_then(|root| root.handle) {
            previous.join().map_err(|_| EngineError::RootPanicked)?;
        }

        self.history.clear();
        self.status.reset_run();
        *self.last_output.lock() = None;
        self.status.request(mode);

        let token = PreemptionToken::new();
        let ctx = RunContext::new(
            self.status.clone(),
            self.events.clone(),
            self.globals.clone(),
            self.config.clone(),
            token.clone(),
        );
        let machine = self.machine.clone();
        let inputs = self.inputs.lock().clone();
        let last_output = self.last_output.clone();
        let status = self.status.clone();
        let completion = Arc::new(Completion::default());
        let guard = CompletionGuard(completion.clone());

        let spawned = thread::Builder::new()
            .name(format!("{}:root", self.config.thread_name_prefix))
            .spawn(move || {
                let _guard = guard;
                let root = machine.root();
                let output = match ctx.enter_gate(root.path(), root.depth(), false) {
                    Gate::Halt => root.preempted_output(),
                    Gate::Proceed | Gate::Rewind => root.run(inputs, &ctx),
                };
                info!(machine = %machine.name(), outcome = %output.outcome, "state machine returned");
                *last_output.lock() = Some(output);
                status.finish();
            });

        match spawned {
            Ok(handle) => {
                *run = Some(RootRun {
                    token,
                    handle: Some(handle),
                    completion,
                });
                Ok(())
            }
            Err(err) => {
                self.status.request(ExecutionMode::Stopped);
                Err(EngineError::Spawn(err))
            }
        }
    }
}

fn wait_for_root(handle: Option<JoinHandle<()>>, completion: Option<Arc<Completion>>) -> Result<(), EngineError> {
    match (handle, completion) {
        (Some(handle), _) => handle.join().map_err(|_| EngineError::RootPanicked),
        (None, Some(completion)) => {
            completion.wait();
            Ok(())
        }
        (None, None) => Ok(()),
    }
}

impl Drop for ExecutionEngine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
