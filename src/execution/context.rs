use super::events::EventBus;
use super::preemption::PreemptionToken;
use super::status::{ExecutionMode, ExecutionStatus, Gate};
use super::variables::GlobalVariables;
use crate::config::EngineConfig;
use crate::error::BehaviorError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Shared {
    status: Arc<ExecutionStatus>,
    events: Arc<EventBus>,
    globals: Arc<GlobalVariables>,
    config: EngineConfig,
}

/// First-come claim shared by the branches of one preemptive state.
#[derive(Debug, Default)]
pub(crate) struct Race {
    winner: Mutex<Option<String>>,
}

impl Race {
    /// Returns true if `id` is (or already was) the winner.
    pub(crate) fn claim(&self, id: &str) -> bool {
        let mut winner = self.winner.lock();
        match winner.as_deref() {
            Some(current) => current == id,
            None => {
                *winner = Some(id.to_string());
                true
            }
        }
    }

    pub(crate) fn winner(&self) -> Option<String> {
        self.winner.lock().clone()
    }
}

/// Everything a running state needs from its surroundings: the preemption
/// token of its branch, the shared execution status and the event bus.
///
/// Contexts are cheap to clone and can be moved to branch threads.
#[derive(Clone)]
pub struct RunContext {
    path: String,
    token: PreemptionToken,
    race: Option<Arc<Race>>,
    shared: Arc<Shared>,
}

impl RunContext {
    pub fn new(
        status: Arc<ExecutionStatus>,
        events: Arc<EventBus>,
        globals: Arc<GlobalVariables>,
        config: EngineConfig,
        token: PreemptionToken,
    ) -> Self {
        Self {
            path: String::new(),
            token,
            race: None,
            shared: Arc::new(Shared {
                status,
                events,
                globals,
                config,
            }),
        }
    }

    /// A context for running states outside an engine. Every gate passes.
    pub fn detached() -> Self {
        Self::detached_with_config(EngineConfig::default())
    }

    pub fn detached_with_config(config: EngineConfig) -> Self {
        let events = Arc::new(EventBus::new());
        let status = Arc::new(ExecutionStatus::new(
            ExecutionMode::Started,
            events.clone(),
            config.gate_poll_interval(),
        ));
        let globals = Arc::new(GlobalVariables::new());
        Self::new(status, events, globals, config, PreemptionToken::new())
    }

    /// Path of the state currently executing with this context.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> &PreemptionToken {
        &self.token
    }

    pub fn status(&self) -> &Arc<ExecutionStatus> {
        &self.shared.status
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.shared.events
    }

    /// Variables shared by every state outside of data flows.
    pub fn global_variables(&self) -> &Arc<GlobalVariables> {
        &self.shared.globals
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn is_preempted(&self) -> bool {
        self.token.is_preempted()
    }

    /// Sleeps for `duration` unless preempted first.
    pub fn sleep(&self, duration: Duration) -> Result<(), BehaviorError> {
        if self.token.wait_timeout(duration) {
            Err(BehaviorError::Preempted)
        } else {
            Ok(())
        }
    }

    /// Cooperation point for long running behaviors: fails when preempted
    /// and blocks while execution is paused.
    pub fn checkpoint(&self) -> Result<(), BehaviorError> {
        if self.is_preempted() {
            return Err(BehaviorError::Preempted);
        }
        self.shared.status.wait_while_paused(&self.token);
        if self.is_preempted() {
            return Err(BehaviorError::Preempted);
        }
        Ok(())
    }

    pub(crate) fn enter_gate(&self, path: &str, depth: usize, can_rewind: bool) -> Gate {
        self.shared.status.enter(path, depth, can_rewind, &self.token)
    }

    /// Context handed to the insides of the state at `path`. Races only
    /// concern the branch state itself, never its descendants.
    pub(crate) fn for_state(&self, path: &str) -> Self {
        Self {
            path: path.to_string(),
            token: self.token.clone(),
            race: None,
            shared: self.shared.clone(),
        }
    }

    /// Same context on a child token of this one.
    pub(crate) fn branch(&self) -> Self {
        Self {
            path: self.path.clone(),
            token: self.token.child(),
            race: None,
            shared: self.shared.clone(),
        }
    }

    pub(crate) fn with_race(mut self, race: Arc<Race>) -> Self {
        self.race = Some(race);
        self
    }

    /// Claims the win of the enclosing race for state `id`. Always true
    /// outside preemptive branches.
    pub(crate) fn claim_race(&self, id: &str) -> bool {
        self.race.as_ref().is_none_or(|race| race.claim(id))
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("path", &self.path)
            .field("token", &self.token)
            .finish()
    }
}
