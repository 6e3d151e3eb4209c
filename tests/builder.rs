//! Tests for building state machines: validation, behaviors and libraries.
mod common;
use common::*;
use jotai::builder::BUILTIN_BEHAVIORS;
use jotai::error::{ConversionError, LibraryError, ValidationError};
use jotai::prelude::*;
use jotai::state::StateKind;

fn build_error(root: StateDefinition) -> BuildError {
    StateMachine::builder(StateMachineDefinition::new("invalid", root))
        .build()
        .expect_err("Build should have failed")
}

fn validation_error(root: StateDefinition) -> ValidationError {
    match build_error(root) {
        BuildError::Validation(err) => err,
        other => panic!("Expected a validation error, got {:?}", other),
    }
}

#[test]
fn test_builder_builds_simple_sequence() {
    let machine = build(sequence("root", &["a", "b", "c"]));
    assert_eq!(machine.name(), "test");
    assert!(machine.warnings().is_empty());
    let root = machine.root();
    let container = root.container().expect("root should be a container");
    assert_eq!(container.start_state(), Some("a"));
    assert_eq!(container.children().len(), 3);
    assert_eq!(container.transitions().len(), 3);
}

#[test]
fn test_builtin_behaviors_are_registered() {
    for name in ["pass_through", "wait", "fail", "select_outcome", "sum", "all_succeeded"] {
        assert!(BUILTIN_BEHAVIORS.contains(&name), "missing built-in '{}'", name);
    }
}

#[test]
fn test_builder_fails_on_unregistered_behavior() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(StateDefinition::execution("a", "drill_hole").with_outcome(0, "success"))
        .with_transition("a", 0, None, Some(0));

    match validation_error(root.clone()) {
        ValidationError::UnknownBehavior { state, behavior } => {
            assert_eq!(state, "a");
            assert_eq!(behavior, "drill_hole");
        }
        other => panic!("Unexpected error: {:?}", other),
    }

    // Once registered, the same definition builds.
    let recorder = Recorder::default();
    let result = StateMachine::builder(StateMachineDefinition::new("drill", root))
        .with_behavior(recorder.behavior("drill_hole", "drilled", 0))
        .build();
    assert!(result.is_ok(), "Build failed: {:?}", result.err());
}

#[test]
fn test_builder_with_behavior_alias() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(StateDefinition::execution("a", "noop").with_outcome(0, "success"))
        .with_transition("a", 0, None, Some(0));

    let result = StateMachine::builder(StateMachineDefinition::new("alias", root))
        .with_behavior_alias("noop", "pass_through")
        .build();
    assert!(result.is_ok(), "Build failed: {:?}", result.err());
}

#[test]
fn test_reserved_outcome_rejected() {
    let root = sequence("root", &["a"]).with_outcome(-1, "my_abort");
    assert!(matches!(
        validation_error(root),
        ValidationError::ReservedOutcome { outcome: OutcomeId(-1), .. }
    ));
}

#[test]
fn test_duplicate_child_id_rejected() {
    let root = sequence("root", &["a"]).with_state(pass_state("a"));
    assert!(matches!(
        validation_error(root),
        ValidationError::DuplicateStateId { state_id, .. } if state_id == "a"
    ));
}

#[test]
fn test_missing_start_state_rejected() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_state(pass_state("a"))
        .with_transition("a", 0, None, Some(0));
    assert!(matches!(
        validation_error(root),
        ValidationError::MissingStartState { .. }
    ));
}

#[test]
fn test_empty_container_rejected() {
    let root = StateDefinition::barrier("root")
        .with_outcome(0, "done")
        .with_state(StateDefinition::execution("decide", "all_succeeded").with_outcome(0, "ok"))
        .with_decider("decide")
        .with_transition("decide", 0, None, Some(0));
    assert!(matches!(
        validation_error(root),
        ValidationError::EmptyContainer { .. }
    ));
}

#[test]
fn test_transition_to_unknown_state_rejected() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(pass_state("a"))
        .with_transition("a", 0, Some("nowhere"), None);
    match validation_error(root) {
        ValidationError::UnknownState { state_id, element, .. } => {
            assert_eq!(state_id, "nowhere");
            assert_eq!(element, "transition");
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[test]
fn test_transition_from_unknown_outcome_rejected() {
    let root = sequence("root", &["a"]).with_transition("a", 7, None, Some(0));
    assert!(matches!(
        validation_error(root),
        ValidationError::UnknownOutcome { outcome: OutcomeId(7), .. }
    ));
}

#[test]
fn test_transition_to_parent_needs_outcome() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(pass_state("a"))
        .with_transition("a", 0, None, None);
    assert!(matches!(
        validation_error(root),
        ValidationError::InvalidTransition { .. }
    ));
}

#[test]
fn test_sibling_transition_in_concurrency_rejected() {
    let root = racing_waits(StateDefinition::preemptive("root"), 0.1, 0.2)
        .with_transition("first", -1, Some("second"), None);
    assert!(matches!(
        validation_error(root),
        ValidationError::InvalidTransition { .. }
    ));
}

#[test]
fn test_sibling_data_flow_in_concurrency_rejected() {
    let root = racing_waits(StateDefinition::barrier("root"), 0.1, 0.2)
        .with_data_flow("first", "waited", "second", "duration");
    assert!(matches!(
        validation_error(root),
        ValidationError::InvalidDataFlow { .. }
    ));
}

#[test]
fn test_data_flow_into_decider_allowed() {
    let root = StateDefinition::barrier("root")
        .with_outcome(0, "done")
        .with_state(wait_state("first", 0.0))
        .with_state(
            StateDefinition::execution("decide", "select_outcome")
                .with_input("outcome", DataType::Any)
                .with_outcome(0, "ok"),
        )
        .with_decider("decide")
        .with_transition("decide", 0, None, Some(0))
        .with_data_flow("first", "waited", "decide", "outcome");
    let result = StateMachine::builder(StateMachineDefinition::new("decider", root)).build();
    assert!(result.is_ok(), "Build failed: {:?}", result.err());
}

#[test]
fn test_incompatible_data_flow_rejected() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(wait_state("a", 0.0))
        .with_state(
            StateDefinition::execution("b", "sum")
                .with_input("x", DataType::Int)
                .with_output("sum", DataType::Int)
                .with_outcome(0, "success"),
        )
        .with_transition("a", 0, Some("b"), None)
        .with_transition("b", 0, None, Some(0))
        .with_data_flow("a", "waited", "b", "x");
    match validation_error(root) {
        ValidationError::IncompatibleDataFlow { from, to, .. } => {
            assert_eq!(from, DataType::Float);
            assert_eq!(to, DataType::Int);
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[test]
fn test_int_flows_into_float() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(
            StateDefinition::execution("a", "sum")
                .with_input_default("x", DataType::Int, Value::Int(0))
                .with_output("sum", DataType::Int)
                .with_outcome(0, "success"),
        )
        .with_state(wait_state("b", 0.0))
        .with_transition("a", 0, Some("b"), None)
        .with_transition("b", 0, None, Some(0))
        .with_data_flow("a", "sum", "b", "duration");
    let result = StateMachine::builder(StateMachineDefinition::new("widening", root)).build();
    assert!(result.is_ok(), "Build failed: {:?}", result.err());
}

#[test]
fn test_invalid_default_rejected() {
    let root = sequence("root", &["a"]).with_input_default("count", DataType::Int, Value::from("three"));
    assert!(matches!(
        validation_error(root),
        ValidationError::InvalidDefault { .. }
    ));
}

#[test]
fn test_shadowed_transition_is_a_warning() {
    let root = sequence("root", &["a", "b"]).with_transition("a", 0, None, Some(0));
    let (machine, logs) = with_log_counter(|| {
        StateMachine::builder(StateMachineDefinition::new("shadowed", root)).build()
    });
    let machine = machine.expect("Shadowed transitions should only warn");
    assert_eq!(machine.warnings().len(), 1);
    assert_eq!(logs.warnings(), 1);
}

#[test]
fn test_library_is_inlined_under_referencing_id() {
    let library_root = sequence("greeter", &["hello", "bye"]).with_name("Greeter");
    let library = InMemoryLibrary::new().with_library("generic", "greeter", library_root);

    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("greet")
        .with_state(StateDefinition::library("greet", "generic", "greeter").with_outcome(0, "done"))
        .with_transition("greet", 0, None, Some(0));

    let machine = StateMachine::builder(StateMachineDefinition::new("libraries", root))
        .with_library_resolver(library)
        .build()
        .expect("Failed to build with library");

    let greet = machine.find_state("root/greet").expect("library should be inlined");
    assert!(matches!(greet.kind(), StateKind::Hierarchy(_)));
    assert_eq!(greet.name(), "Greeter");
    assert!(machine.find_state("root/greet/hello").is_some());
    let resolved = machine.resolved_definition();
    let child = &resolved.root.container().expect("root container").states[0];
    assert_eq!(child.id, "greet");
}

#[test]
fn test_missing_library_fails() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("greet")
        .with_state(StateDefinition::library("greet", "generic", "greeter").with_outcome(0, "done"))
        .with_transition("greet", 0, None, Some(0));
    match build_error(root) {
        BuildError::Library(LibraryError::MissingLibrary {
            library_path,
            library_name,
        }) => {
            assert_eq!(library_path, "generic");
            assert_eq!(library_name, "greeter");
        }
        other => panic!("Unexpected error: {:?}", other),
    }
}

#[test]
fn test_library_cycle_detected() {
    let recursive = StateDefinition::hierarchy("again")
        .with_outcome(0, "done")
        .with_start_state("inner")
        .with_state(StateDefinition::library("inner", "generic", "again").with_outcome(0, "done"))
        .with_transition("inner", 0, None, Some(0));
    let library = InMemoryLibrary::new().with_library("generic", "again", recursive);

    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("outer")
        .with_state(StateDefinition::library("outer", "generic", "again").with_outcome(0, "done"))
        .with_transition("outer", 0, None, Some(0));

    let err = StateMachine::builder(StateMachineDefinition::new("cycle", root))
        .with_library_resolver(library)
        .build()
        .expect_err("A library including itself must fail");
    assert!(matches!(err, BuildError::Library(LibraryError::LibraryCycle { .. })));
}

struct Checklist {
    steps: Vec<&'static str>,
}

impl IntoStateMachine for Checklist {
    fn into_state_machine(self) -> std::result::Result<StateMachineDefinition, ConversionError> {
        if self.steps.is_empty() {
            return Err(ConversionError::ValidationError("empty checklist".into()));
        }
        let root = sequence("checklist", &self.steps);
        Ok(StateMachineDefinition::new("checklist", root))
    }
}

#[test]
fn test_from_custom_format() {
    let machine = StateMachine::from_custom(Checklist {
        steps: vec!["unpack", "inspect"],
    })
    .expect("Conversion failed")
    .build()
    .expect("Build failed");
    assert!(machine.find_state("checklist/inspect").is_some());

    assert!(StateMachine::from_custom(Checklist { steps: vec![] }).is_err());
}
