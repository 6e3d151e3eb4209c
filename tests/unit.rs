//! Unit tests for core Jotai functionality.
mod common;
use common::*;
use jotai::error::{LibraryError, ValidationError};
use jotai::execution::{HistoryItem, HistoryKind, PreemptionToken};
use jotai::prelude::*;
use std::time::Duration;

#[test]
fn test_value_display() {
    assert_eq!(format!("{}", Value::Int(42)), "42");
    assert_eq!(format!("{}", Value::Bool(true)), "true");
    assert_eq!(format!("{}", Value::Null), "null");
    assert_eq!(format!("{}", Value::from("hole")), "\"hole\"");
}

#[test]
fn test_reserved_outcomes() {
    assert!(OutcomeId::ABORTED.is_reserved());
    assert!(OutcomeId::PREEMPTED.is_reserved());
    assert!(!OutcomeId(0).is_reserved());
    assert!(Outcome::aborted().is_aborted());
    assert!(Outcome::preempted().is_preempted());
}

#[test]
fn test_every_state_has_reserved_outcomes() {
    let machine = build(sequence("root", &["a"]));
    let a = machine.find_state("root/a").expect("root/a should exist");
    assert!(a.outcome(OutcomeId::ABORTED).is_some());
    assert!(a.outcome(OutcomeId::PREEMPTED).is_some());
    assert!(a.outcome(OutcomeId(0)).is_some());
}

#[test]
fn test_state_paths_and_depths() {
    let machine = build(nested_sequence());
    let y = machine.find_state("root/inner/y").expect("root/inner/y should exist");
    assert_eq!(y.depth(), 2);
    assert_eq!(y.parent_path(), Some("root/inner"));
    assert_eq!(machine.root().depth(), 0);
    assert!(machine.find_state("root/missing").is_none());
    assert!(machine.find_state("rootx/inner").is_none());
}

#[test]
fn test_execution_mode_edges() {
    use ExecutionMode::*;
    assert!(Started.can_transition_to(Paused));
    assert!(!Stopped.can_transition_to(Paused));
    assert!(!Stopped.can_transition_to(Finished));
    assert!(!Finished.can_transition_to(Paused));
    assert!(Finished.can_transition_to(Started));
    assert!(Paused.can_transition_to(ForwardInto));
    assert_eq!(RunToSelectedState.to_string(), "RUN_TO_SELECTED_STATE");
}

#[test]
fn test_preemption_reaches_descendants_only() {
    let parent = PreemptionToken::new();
    let child = parent.child();
    let grandchild = child.child();
    let sibling = parent.child();

    child.preempt();
    assert!(child.is_preempted());
    assert!(grandchild.is_preempted());
    assert!(!sibling.is_preempted());
    assert!(!parent.is_preempted());

    parent.preempt();
    assert!(sibling.is_preempted());
    assert!(parent.child().is_preempted(), "children of a preempted token start preempted");
}

#[test]
fn test_sleep_returns_early_when_preempted() {
    let ctx = RunContext::detached();
    ctx.token().preempt();
    let started = std::time::Instant::now();
    assert_eq!(ctx.sleep(Duration::from_secs(5)), Err(BehaviorError::Preempted));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(ctx.checkpoint(), Err(BehaviorError::Preempted));
}

#[test]
fn test_history_formatter() {
    let items = vec![
        HistoryItem {
            path: "root".to_string(),
            kind: HistoryKind::Call,
            elapsed: Duration::ZERO,
        },
        HistoryItem {
            path: "root/a".to_string(),
            kind: HistoryKind::Call,
            elapsed: Duration::ZERO,
        },
        HistoryItem {
            path: "root/a".to_string(),
            kind: HistoryKind::Return(Outcome::new(0, "success")),
            elapsed: Duration::ZERO,
        },
    ];
    let formatted = HistoryFormatter::format_history(&items);
    let lines: Vec<&str> = formatted.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "-> root");
    assert!(lines[1].starts_with("  -> root/a"));
    assert!(lines[2].starts_with("  <- root/a"));
    assert!(lines[2].contains("success"));
}

#[test]
fn test_error_display() {
    let validation = ValidationError::MissingStartState {
        container: "root".to_string(),
    };
    assert_eq!(validation.to_string(), "Container 'root' has children but no start state");

    let library = LibraryError::MissingLibrary {
        library_path: "generic".to_string(),
        library_name: "wait".to_string(),
    };
    assert!(library.to_string().contains("'wait'"));

    let build: BuildError = library.into();
    assert!(build.to_string().contains("generic"));

    let execution = ExecutionError::UnresolvedTransition {
        state: "root/a".to_string(),
        outcome: OutcomeId(3),
    };
    assert!(execution.to_string().contains("root/a"));
}
