//! Common test utilities for building state machine definitions and engines.
use jotai::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// A `wait` state sleeping for `seconds` that finishes with outcome 0.
#[allow(dead_code)]
pub fn wait_state(id: &str, seconds: f64) -> StateDefinition {
    StateDefinition::execution(id, "wait")
        .with_input_default("duration", DataType::Float, Value::Float(seconds))
        .with_output("waited", DataType::Float)
        .with_outcome(0, "success")
}

/// A `pass_through` state without ports that finishes with outcome 0.
#[allow(dead_code)]
pub fn pass_state(id: &str) -> StateDefinition {
    StateDefinition::execution(id, "pass_through").with_outcome(0, "success")
}

/// A hierarchy running `ids` one after another with pass-through states.
///
/// Logic: `root/a -> root/b -> ... -> root (0)`
#[allow(dead_code)]
pub fn sequence(root_id: &str, ids: &[&str]) -> StateDefinition {
    let mut root = StateDefinition::hierarchy(root_id)
        .with_outcome(0, "done")
        .with_start_state(ids[0]);
    for id in ids {
        root = root.with_state(pass_state(id));
    }
    chain(root, ids)
}

/// Connects `ids` with outcome-0 transitions, the last one leaving the container.
#[allow(dead_code)]
pub fn chain(mut container: StateDefinition, ids: &[&str]) -> StateDefinition {
    for (i, id) in ids.iter().enumerate() {
        container = match ids.get(i + 1) {
            Some(next) => container.with_transition(*id, 0, Some(*next), None),
            None => container.with_transition(*id, 0, None, Some(0)),
        };
    }
    container
}

/// A hierarchy `root` with `a -> inner(x -> y) -> z`.
#[allow(dead_code)]
pub fn nested_sequence() -> StateDefinition {
    let inner = sequence("inner", &["x", "y"]);
    StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(pass_state("a"))
        .with_state(inner)
        .with_state(pass_state("z"))
        .with_transition("a", 0, Some("inner"), None)
        .with_transition("inner", 0, Some("z"), None)
        .with_transition("z", 0, None, Some(0))
}

/// Two concurrent waits of `first` and `second` seconds. Each maps its
/// success to its own outcome of the container: `first` to 0, `second` to 1.
#[allow(dead_code)]
pub fn racing_waits(container: StateDefinition, first: f64, second: f64) -> StateDefinition {
    container
        .with_outcome(0, "first")
        .with_outcome(1, "second")
        .with_state(wait_state("first", first))
        .with_state(wait_state("second", second))
        .with_transition("first", 0, None, Some(0))
        .with_transition("second", 0, None, Some(1))
}

#[allow(dead_code)]
pub fn build(root: StateDefinition) -> StateMachine {
    StateMachine::builder(StateMachineDefinition::new("test", root))
        .build()
        .expect("Failed to build state machine")
}

#[allow(dead_code)]
pub fn engine_for(root: StateDefinition) -> ExecutionEngine {
    ExecutionEngine::new(build(root))
}

/// Records the order in which instrumented behaviors ran.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// A behavior logging `label` and finishing with `outcome`.
    pub fn behavior(
        &self,
        name: &str,
        label: &str,
        outcome: i32,
    ) -> impl Behavior + use<> {
        let entries = self.entries.clone();
        let label = label.to_string();
        FnBehavior::new(name, move |_inputs: &PortValues, _ctx: &RunContext| {
            entries.lock().push(label.clone());
            Ok(BehaviorOutput::new(outcome))
        })
    }
}

/// Counts WARN and ERROR events emitted on the current thread.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct LogCounter {
    warnings: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl LogCounter {
    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for LogCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        match *event.metadata().level() {
            Level::WARN => {
                self.warnings.fetch_add(1, Ordering::SeqCst);
            }
            Level::ERROR => {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
    }
}

/// Runs `f` with a subscriber that counts warnings and errors on this thread.
#[allow(dead_code)]
pub fn with_log_counter<T>(f: impl FnOnce() -> T) -> (T, LogCounter) {
    let counter = LogCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, counter)
}

/// Polls `condition` until it holds or `timeout` elapses.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Paths of every state entered so far, in order.
#[allow(dead_code)]
pub fn entered(engine: &ExecutionEngine) -> Vec<String> {
    engine
        .history()
        .into_iter()
        .filter(|item| item.kind == jotai::execution::HistoryKind::Call)
        .map(|item| item.path)
        .collect()
}

/// Waits until the run is blocked at a state entry with `expected` entries
/// recorded, then gives stray threads a moment to prove nothing else runs.
#[allow(dead_code)]
pub fn settle(engine: &ExecutionEngine, expected: &[&str]) -> Vec<String> {
    let reached = wait_until(Duration::from_secs(5), || {
        entered(engine).len() >= expected.len() && engine.status().waiting_threads() >= 1
    });
    assert!(reached, "execution never blocked after {:?}, saw {:?}", expected, entered(engine));
    thread::sleep(Duration::from_millis(100));
    entered(engine)
}

#[allow(dead_code)]
pub fn int_inputs(pairs: &[(&str, i64)]) -> PortValues {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::Int(*v)))
        .collect()
}
