//! Execution modes and the gate every state passes before it runs.

use super::events::{EventBus, ExecutionEvent};
use super::preemption::PreemptionToken;
use parking_lot::{Condvar, Mutex, MutexGuard, WaitTimeoutResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Global execution mode of a running state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Started,
    Paused,
    Stopped,
    Finished,
    ForwardInto,
    ForwardOver,
    ForwardOut,
    Backward,
    RunToSelectedState,
}

impl ExecutionMode {
    pub fn is_stepping(self) -> bool {
        matches!(
            self,
            Self::ForwardInto | Self::ForwardOver | Self::ForwardOut | Self::Backward
        )
    }

    /// Whether a request to move from `self` to `next` is accepted.
    ///
    /// Step modes may be re-entered to take another step; every other mode
    /// only accepts a change to a different mode.
    pub fn can_transition_to(self, next: ExecutionMode) -> bool {
        use ExecutionMode::*;
        match next {
            Stopped => self != Stopped,
            Finished => !matches!(self, Stopped | Finished),
            Paused => !matches!(self, Stopped | Finished | Paused),
            Started => self != Started,
            ForwardInto | ForwardOver | ForwardOut | Backward | RunToSelectedState => true,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "STARTED",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
            Self::Finished => "FINISHED",
            Self::ForwardInto => "FORWARD_INTO",
            Self::ForwardOver => "FORWARD_OVER",
            Self::ForwardOut => "FORWARD_OUT",
            Self::Backward => "BACKWARD",
            Self::RunToSelectedState => "RUN_TO_SELECTED_STATE",
        };
        f.write_str(name)
    }
}

/// Condition variable that knows how many threads are blocked on it.
#[derive(Default)]
pub struct CountingCondvar {
    condvar: Condvar,
    waiting: AtomicUsize,
    waiting_changed: Condvar,
}

impl CountingCondvar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_for<T>(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> WaitTimeoutResult {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        self.waiting_changed.notify_all();
        let result = self.condvar.wait_for(guard, timeout);
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        self.waiting_changed.notify_all();
        result
    }

    pub fn notify_all(&self) -> usize {
        self.condvar.notify_all()
    }

    pub fn waiting_threads(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Blocks until at least `count` threads wait or `timeout` elapses.
    /// `guard` must belong to the mutex the waiters use.
    pub fn wait_for_waiting_threads<T>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        count: usize,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        while self.waiting_threads() < count {
            if self.waiting_changed.wait_until(guard, deadline).timed_out() {
                break;
            }
        }
        self.waiting_threads() >= count
    }
}

/// What a state must do after passing the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    /// Step backward: the enclosing container restores its previous child.
    Rewind,
    /// Execution was stopped or the caller was preempted.
    Halt,
}

#[derive(Debug)]
struct StatusInner {
    mode: ExecutionMode,
    permits: u32,
    /// Entries at this depth or deeper pass without a permit.
    free_from_depth: Option<usize>,
    last_depth: usize,
    blocked_depth: Option<usize>,
    selected_state: Option<String>,
}

impl StatusInner {
    fn take_permit(&mut self) -> bool {
        if self.permits > 0 {
            self.permits -= 1;
            true
        } else {
            false
        }
    }

    fn passes_freely(&self, depth: usize) -> bool {
        self.free_from_depth.is_some_and(|free| depth >= free)
    }
}

/// Shared execution status consulted by every state entry.
pub struct ExecutionStatus {
    inner: Mutex<StatusInner>,
    condition: CountingCondvar,
    events: Arc<EventBus>,
    poll_interval: Duration,
}

impl ExecutionStatus {
    pub fn new(mode: ExecutionMode, events: Arc<EventBus>, poll_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(StatusInner {
                mode,
                permits: 0,
                free_from_depth: None,
                last_depth: 0,
                blocked_depth: None,
                selected_state: None,
            }),
            condition: CountingCondvar::new(),
            events,
            poll_interval,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.inner.lock().mode
    }

    /// Requests a mode change. Invalid requests leave the status untouched
    /// and return `false`.
    pub fn request(&self, next: ExecutionMode) -> bool {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.mode;
            if !from.can_transition_to(next) {
                debug!(from = %from, to = %next, "ignoring execution mode request");
                return false;
            }
            inner.mode = next;
            match next {
                ExecutionMode::ForwardInto | ExecutionMode::ForwardOver | ExecutionMode::Backward => {
                    inner.permits = 1;
                    inner.free_from_depth = None;
                }
                ExecutionMode::ForwardOut => {
                    inner.permits = 0;
                    inner.free_from_depth = Some(inner.blocked_depth.unwrap_or(inner.last_depth));
                }
                _ => {
                    inner.permits = 0;
                    inner.free_from_depth = None;
                }
            }
            if next != ExecutionMode::RunToSelectedState {
                inner.selected_state = None;
            }
            from
        };
        self.condition.notify_all();
        if from != next {
            debug!(from = %from, to = %next, "execution mode changed");
            self.events.publish(ExecutionEvent::StatusChanged { from, to: next });
        }
        true
    }

    /// Sets the state path `RunToSelectedState` pauses at.
    pub fn select_state(&self, path: impl Into<String>) {
        self.inner.lock().selected_state = Some(path.into());
    }

    /// Clears per-run step bookkeeping before a new run starts.
    pub(crate) fn reset_run(&self) {
        let mut inner = self.inner.lock();
        inner.last_depth = 0;
        inner.blocked_depth = None;
    }

    /// Marks the run as finished unless it was stopped.
    pub(crate) fn finish(&self) {
        if self.mode() != ExecutionMode::Stopped {
            self.request(ExecutionMode::Finished);
        }
    }

    pub fn notify_all(&self) {
        self.condition.notify_all();
    }

    pub fn waiting_threads(&self) -> usize {
        self.condition.waiting_threads()
    }

    /// Blocks until at least `count` threads are held at a state entry.
    pub fn wait_for_waiting_threads(&self, count: usize, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        self.condition.wait_for_waiting_threads(&mut inner, count, timeout)
    }

    /// The entry gate. Blocks according to the current mode and returns
    /// what the state at `path` should do.
    pub fn enter(&self, path: &str, depth: usize, can_rewind: bool, token: &PreemptionToken) -> Gate {
        let mut inner = self.inner.lock();
        loop {
            if token.is_preempted() {
                return Gate::Halt;
            }
            let decision = match inner.mode {
                ExecutionMode::Started | ExecutionMode::Finished => Some(Gate::Proceed),
                ExecutionMode::Stopped => Some(Gate::Halt),
                ExecutionMode::Paused => None,
                ExecutionMode::ForwardInto => inner.take_permit().then_some(Gate::Proceed),
                ExecutionMode::ForwardOver => {
                    if inner.passes_freely(depth) {
                        Some(Gate::Proceed)
                    } else if inner.take_permit() {
                        inner.free_from_depth = Some(depth + 1);
                        Some(Gate::Proceed)
                    } else {
                        None
                    }
                }
                ExecutionMode::ForwardOut => inner.passes_freely(depth).then_some(Gate::Proceed),
                ExecutionMode::Backward => {
                    if inner.passes_freely(depth) {
                        Some(Gate::Proceed)
                    } else if can_rewind && inner.take_permit() {
                        inner.free_from_depth = Some(depth + 1);
                        Some(Gate::Rewind)
                    } else {
                        None
                    }
                }
                ExecutionMode::RunToSelectedState => {
                    if inner.selected_state.as_deref() == Some(path) {
                        inner.mode = ExecutionMode::Paused;
                        inner.selected_state = None;
                        debug!(state = path, "reached selected state, pausing");
                        MutexGuard::unlocked(&mut inner, || {
                            self.events.publish(ExecutionEvent::StatusChanged {
                                from: ExecutionMode::RunToSelectedState,
                                to: ExecutionMode::Paused,
                            })
                        });
                        continue;
                    }
                    Some(Gate::Proceed)
                }
            };
            if let Some(gate) = decision {
                inner.blocked_depth = None;
                if gate == Gate::Proceed {
                    inner.last_depth = depth;
                }
                return gate;
            }
            inner.blocked_depth = Some(depth);
            self.condition.wait_for(&mut inner, self.poll_interval);
        }
    }

    /// Blocks while the mode is `Paused`. Returns early on preemption.
    pub fn wait_while_paused(&self, token: &PreemptionToken) {
        let mut inner = self.inner.lock();
        while inner.mode == ExecutionMode::Paused && !token.is_preempted() {
            self.condition.wait_for(&mut inner, self.poll_interval);
        }
    }
}

impl fmt::Debug for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionStatus")
            .field("mode", &self.mode())
            .field("waiting", &self.waiting_threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn status(mode: ExecutionMode) -> Arc<ExecutionStatus> {
        Arc::new(ExecutionStatus::new(
            mode,
            Arc::new(EventBus::new()),
            Duration::from_millis(5),
        ))
    }

    #[test]
    fn mode_edges() {
        use ExecutionMode::*;
        assert!(Stopped.can_transition_to(Started));
        assert!(!Stopped.can_transition_to(Paused));
        assert!(!Stopped.can_transition_to(Stopped));
        assert!(Started.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Started));
        assert!(Paused.can_transition_to(Finished));
        assert!(ForwardInto.can_transition_to(ForwardInto));
        assert!(!Finished.can_transition_to(Paused));
    }

    #[test]
    fn invalid_request_keeps_mode() {
        let status = status(ExecutionMode::Stopped);
        assert!(!status.request(ExecutionMode::Paused));
        assert_eq!(status.mode(), ExecutionMode::Stopped);
    }

    #[test]
    fn paused_gate_blocks_until_started() {
        let status = status(ExecutionMode::Paused);
        let token = PreemptionToken::new();
        let remote = status.clone();
        let handle = thread::spawn(move || remote.enter("root", 0, false, &token));

        assert!(status.wait_for_waiting_threads(1, Duration::from_secs(2)));
        status.request(ExecutionMode::Started);
        assert_eq!(handle.join().unwrap(), Gate::Proceed);
    }

    #[test]
    fn stopped_gate_halts() {
        let status = status(ExecutionMode::Stopped);
        assert_eq!(status.enter("root", 0, false, &PreemptionToken::new()), Gate::Halt);
    }

    #[test]
    fn forward_into_consumes_one_permit() {
        let status = status(ExecutionMode::Paused);
        let token = PreemptionToken::new();
        status.request(ExecutionMode::ForwardInto);
        assert_eq!(status.enter("root", 0, false, &token), Gate::Proceed);

        let remote = status.clone();
        let handle = thread::spawn(move || remote.enter("root/a", 1, false, &token));
        assert!(status.wait_for_waiting_threads(1, Duration::from_secs(2)));
        status.request(ExecutionMode::ForwardInto);
        assert_eq!(handle.join().unwrap(), Gate::Proceed);
    }

    #[test]
    fn forward_over_frees_deeper_entries() {
        let status = status(ExecutionMode::ForwardOver);
        let token = PreemptionToken::new();
        assert_eq!(status.enter("root/a", 1, false, &token), Gate::Proceed);
        assert_eq!(status.enter("root/a/x", 2, false, &token), Gate::Proceed);
        assert_eq!(status.enter("root/a/y", 2, false, &token), Gate::Proceed);
    }

    #[test]
    fn backward_needs_a_rewindable_entry() {
        let status = status(ExecutionMode::Backward);
        let token = PreemptionToken::new();
        assert_eq!(status.enter("root/b", 1, true, &token), Gate::Rewind);
    }

    #[test]
    fn preempted_waiter_halts() {
        let status = status(ExecutionMode::Paused);
        let token = PreemptionToken::new();
        let remote_token = token.clone();
        let remote = status.clone();
        let handle = thread::spawn(move || remote.enter("root", 0, false, &remote_token));
        assert!(status.wait_for_waiting_threads(1, Duration::from_secs(2)));
        token.preempt();
        assert_eq!(handle.join().unwrap(), Gate::Halt);
    }

    #[test]
    fn run_to_selected_state_pauses_there() {
        let status = status(ExecutionMode::Started);
        let token = PreemptionToken::new();
        status.select_state("root/b");
        status.request(ExecutionMode::RunToSelectedState);
        assert_eq!(status.enter("root/a", 1, false, &token), Gate::Proceed);

        let remote = status.clone();
        let handle = thread::spawn(move || remote.enter("root/b", 1, false, &token));
        assert!(status.wait_for_waiting_threads(1, Duration::from_secs(2)));
        assert_eq!(status.mode(), ExecutionMode::Paused);
        status.request(ExecutionMode::Started);
        assert_eq!(handle.join().unwrap(), Gate::Proceed);
    }
}
