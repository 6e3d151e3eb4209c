//! Tests running sequential state trees outside an engine.
mod common;
use common::*;
use jotai::prelude::*;

/// `root(x) -> add(x + acc) -> acc -> double(acc + acc) -> result`
fn accumulator() -> StateDefinition {
    let adder = |id: &str| {
        StateDefinition::execution(id, "sum")
            .with_input("x", DataType::Int)
            .with_input("y", DataType::Int)
            .with_output("sum", DataType::Int)
            .with_outcome(0, "success")
    };
    StateDefinition::hierarchy("root")
        .with_input_default("x", DataType::Int, Value::Int(1))
        .with_output("result", DataType::Int)
        .with_outcome(0, "done")
        .with_scoped_variable("acc", DataType::Int, Value::Int(0))
        .with_start_state("add")
        .with_state(adder("add"))
        .with_state(adder("double"))
        .with_transition("add", 0, Some("double"), None)
        .with_transition("double", 0, None, Some(0))
        .with_data_flow("root", "x", "add", "x")
        .with_data_flow("root", "acc", "add", "y")
        .with_data_flow("add", "sum", "root", "acc")
        .with_data_flow("root", "acc", "double", "x")
        .with_data_flow("root", "acc", "double", "y")
        .with_data_flow("double", "sum", "root", "result")
}

#[test]
fn test_data_flows_and_scoped_variables() {
    let machine = build(accumulator());
    let output = machine
        .root()
        .run(int_inputs(&[("x", 5)]), &RunContext::detached());
    assert_eq!(output.outcome.id, OutcomeId(0));
    assert_eq!(output.outputs["result"], Value::Int(10));
}

#[test]
fn test_repeated_runs_are_independent() {
    let machine = build(accumulator());
    let ctx = RunContext::detached();
    let first = machine.root().run(int_inputs(&[("x", 3)]), &ctx);
    let second = machine.root().run(int_inputs(&[("x", 3)]), &ctx);
    assert_eq!(first, second, "scoped variables must start from their defaults on every run");
    assert_eq!(second.outputs["result"], Value::Int(6));

    // Missing inputs fall back to their defaults.
    let defaulted = machine.root().run(PortValues::default(), &ctx);
    assert_eq!(defaulted.outputs["result"], Value::Int(2));
}

#[test]
fn test_transitions_choose_the_path() {
    let recorder = Recorder::default();
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(
            StateDefinition::execution("a", "branch")
                .with_outcome(0, "left")
                .with_outcome(1, "right"),
        )
        .with_state(StateDefinition::execution("b", "visit_b").with_outcome(0, "success"))
        .with_state(StateDefinition::execution("c", "visit_c").with_outcome(0, "success"))
        .with_transition("a", 0, Some("b"), None)
        .with_transition("a", 1, Some("c"), None)
        .with_transition("b", 0, None, Some(0))
        .with_transition("c", 0, None, Some(0));

    let machine = StateMachine::builder(StateMachineDefinition::new("paths", root))
        .with_behavior(recorder.behavior("branch", "a", 1))
        .with_behavior(recorder.behavior("visit_b", "b", 0))
        .with_behavior(recorder.behavior("visit_c", "c", 0))
        .build()
        .expect("Failed to build");

    let output = machine.root().run(PortValues::default(), &RunContext::detached());
    assert_eq!(output.outcome.name, "done");
    assert_eq!(recorder.entries(), vec!["a", "c"]);
}

#[test]
fn test_unmatched_outcome_aborts_with_one_warning() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("pick")
        .with_state(
            StateDefinition::execution("pick", "select_outcome")
                .with_input_default("outcome", DataType::Int, Value::Int(1))
                .with_outcome(0, "expected")
                .with_outcome(1, "unexpected"),
        )
        .with_transition("pick", 0, None, Some(0));
    let machine = build(root);

    let (output, logs) = with_log_counter(|| {
        machine
            .root()
            .run(PortValues::default(), &RunContext::detached())
    });
    assert!(output.outcome.is_aborted());
    assert_eq!(logs.warnings(), 1);
    assert_eq!(logs.errors(), 0);
}

#[test]
fn test_aborted_child_can_be_handled() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_outcome(1, "failed")
        .with_start_state("a")
        .with_state(
            StateDefinition::execution("a", "fail")
                .with_input_default("message", DataType::Str, Value::from("tool broke"))
                .with_outcome(0, "success"),
        )
        .with_transition("a", 0, None, Some(0))
        .with_transition("a", -1, None, Some(1));
    let machine = build(root);

    let output = machine.root().run(PortValues::default(), &RunContext::detached());
    assert_eq!(output.outcome.id, OutcomeId(1));

    let a = machine.find_state("root/a").expect("root/a should exist");
    match a.execute(PortValues::default(), &RunContext::detached()) {
        Err(ExecutionError::BehaviorFailed { state, message }) => {
            assert_eq!(state, "root/a");
            assert_eq!(message, "tool broke");
        }
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn test_input_type_mismatch_aborts() {
    let machine = build(accumulator());
    let mut inputs = PortValues::default();
    inputs.insert("x".to_string(), Value::from("five"));

    let output = machine.root().run(inputs.clone(), &RunContext::detached());
    assert!(output.outcome.is_aborted());
    assert_eq!(output.outputs["result"], Value::Null);

    match machine.root().execute(inputs, &RunContext::detached()) {
        Err(ExecutionError::TypeMismatch { port, expected, .. }) => {
            assert_eq!(port, "x");
            assert_eq!(expected, DataType::Int);
        }
        other => panic!("Unexpected result: {:?}", other),
    }
}

#[test]
fn test_behavior_output_is_type_checked() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(
            StateDefinition::execution("a", "measure")
                .with_output("diameter", DataType::Float)
                .with_output("note", DataType::Str)
                .with_outcome(0, "success"),
        )
        .with_transition("a", 0, None, Some(0));

    let bad = FnBehavior::new("measure", |_: &PortValues, _: &RunContext| {
        Ok(BehaviorOutput::new(0).with_output("diameter", "wide"))
    });
    let machine = StateMachine::builder(StateMachineDefinition::new("typed", root.clone()))
        .with_behavior(bad)
        .build()
        .expect("Failed to build");
    let a = machine.find_state("root/a").expect("root/a should exist");
    assert!(matches!(
        a.execute(PortValues::default(), &RunContext::detached()),
        Err(ExecutionError::TypeMismatch { .. })
    ));

    // Integers widen to floats, undeclared outputs are dropped.
    let good = FnBehavior::new("measure", |_: &PortValues, _: &RunContext| {
        Ok(BehaviorOutput::new(0)
            .with_output("diameter", 4i64)
            .with_output("extra", true))
    });
    let machine = StateMachine::builder(StateMachineDefinition::new("typed", root))
        .with_behavior(good)
        .build()
        .expect("Failed to build");
    let a = machine.find_state("root/a").expect("root/a should exist");
    let output = a
        .execute(PortValues::default(), &RunContext::detached())
        .expect("Execution failed");
    assert_eq!(output.outputs["diameter"], Value::Int(4));
    assert_eq!(output.outputs["note"], Value::Null);
    assert!(!output.outputs.contains_key("extra"));
}

#[test]
fn test_undeclared_outcome_is_an_error() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_start_state("a")
        .with_state(StateDefinition::execution("a", "rogue").with_outcome(0, "success"))
        .with_transition("a", 0, None, Some(0));
    let machine = StateMachine::builder(StateMachineDefinition::new("rogue", root))
        .with_behavior(FnBehavior::new("rogue", |_: &PortValues, _: &RunContext| {
            Ok(BehaviorOutput::new(5))
        }))
        .build()
        .expect("Failed to build");

    let a = machine.find_state("root/a").expect("root/a should exist");
    assert!(matches!(
        a.execute(PortValues::default(), &RunContext::detached()),
        Err(ExecutionError::UndeclaredOutcome { outcome: OutcomeId(5), .. })
    ));
    let output = machine.root().run(PortValues::default(), &RunContext::detached());
    assert!(output.outcome.is_aborted());
}

#[test]
fn test_events_follow_the_nesting() {
    let machine = build(nested_sequence());
    let ctx = RunContext::detached();
    let events = ctx.events().subscribe_channel();

    let output = machine.root().run(PortValues::default(), &ctx);
    assert_eq!(output.outcome.id, OutcomeId(0));

    let entered: Vec<String> = events
        .try_iter()
        .filter_map(|event| match event {
            ExecutionEvent::StateEntered { path } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(
        entered,
        vec!["root", "root/a", "root/inner", "root/inner/x", "root/inner/y", "root/z"]
    );
    assert!(!machine.root().is_active());
}

#[test]
fn test_panicking_behavior_aborts_only_its_state() {
    let root = StateDefinition::hierarchy("root")
        .with_outcome(0, "done")
        .with_outcome(1, "failed")
        .with_start_state("a")
        .with_state(StateDefinition::execution("a", "explode").with_outcome(0, "success"))
        .with_transition("a", 0, None, Some(0))
        .with_transition("a", -1, None, Some(1));
    let machine = StateMachine::builder(StateMachineDefinition::new("panicky", root))
        .with_behavior(FnBehavior::new(
            "explode",
            |_: &PortValues, _: &RunContext| -> std::result::Result<BehaviorOutput, BehaviorError> { panic!("spindle jammed") },
        ))
        .build()
        .expect("Failed to build");

    let (output, logs) = with_log_counter(|| machine.root().run(PortValues::default(), &RunContext::detached()));
    assert_eq!(output.outcome.name, "failed");
    assert_eq!(logs.errors(), 1);
    assert!(!machine.root().is_active());
}

#[test]
fn test_global_variables_are_shared_between_states() {
    let root = StateDefinition::hierarchy("root")
        .with_output("tool", DataType::Str)
        .with_outcome(0, "done")
        .with_start_state("store")
        .with_state(StateDefinition::execution("store", "store_tool").with_outcome(0, "success"))
        .with_state(
            StateDefinition::execution("load", "load_tool")
                .with_output("tool", DataType::Str)
                .with_outcome(0, "success"),
        )
        .with_transition("store", 0, Some("load"), None)
        .with_transition("load", 0, None, Some(0))
        .with_data_flow("load", "tool", "root", "tool");
    let machine = StateMachine::builder(StateMachineDefinition::new("globals", root))
        .with_behavior(FnBehavior::new("store_tool", |_: &PortValues, ctx: &RunContext| {
            ctx.global_variables().set("tool", "drill");
            Ok(BehaviorOutput::new(0))
        }))
        .with_behavior(FnBehavior::new("load_tool", |_: &PortValues, ctx: &RunContext| {
            let tool = ctx.global_variables().get_or("tool", Value::Null);
            Ok(BehaviorOutput::new(0).with_output("tool", tool))
        }))
        .build()
        .expect("Failed to build");

    let ctx = RunContext::detached();
    let output = machine.root().run(PortValues::default(), &ctx);
    assert_eq!(output.outputs["tool"], Value::from("drill"));
    assert_eq!(ctx.global_variables().get("tool"), Some(Value::from("drill")));
}
