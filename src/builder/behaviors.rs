use crate::error::BehaviorError;
use crate::execution::RunContext;
use crate::model::{PortValues, Value};
use crate::state::{Behavior, BehaviorOutput};
use ahash::AHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Forwards every input to the output port of the same name.
fn pass_through(inputs: &PortValues, _ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
    Ok(BehaviorOutput {
        outcome: Default::default(),
        outputs: inputs.clone(),
    })
}

/// Sleeps for `duration` seconds, then reports the time actually waited.
fn wait(inputs: &PortValues, ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
    let seconds = inputs.get("duration").and_then(Value::as_f64).unwrap_or(0.0).max(0.0);
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|err| BehaviorError::Failed(format!("cannot wait {} seconds: {}", seconds, err)))?;
    let started = Instant::now();
    ctx.sleep(duration)?;
    Ok(BehaviorOutput::new(0).with_output("waited", started.elapsed().as_secs_f64()))
}

fn fail(inputs: &PortValues, _ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
    let message = inputs
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("failure requested");
    Err(BehaviorError::Failed(message.to_string()))
}

/// Returns the outcome id given in the `outcome` input.
fn select_outcome(inputs: &PortValues, _ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
    let outcome = inputs.get("outcome").and_then(Value::as_i64).unwrap_or(0);
    let outcome = i32::try_from(outcome)
        .map_err(|_| BehaviorError::Failed(format!("outcome id {} is out of range", outcome)))?;
    Ok(BehaviorOutput::new(outcome))
}

/// Adds every numeric input. Integers stay integers unless a float is involved.
fn sum(inputs: &PortValues, _ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
    let mut total_int: i64 = 0;
    let mut total_float: f64 = 0.0;
    let mut is_float = false;
    for value in inputs.values() {
        match value {
            Value::Int(i) => total_int = total_int.saturating_add(*i),
            Value::Float(f) => {
                is_float = true;
                total_float += f;
            }
            _ => {}
        }
    }
    let total = if is_float {
        Value::Float(total_float + total_int as f64)
    } else {
        Value::Int(total_int)
    };
    Ok(BehaviorOutput::new(0).with_output("sum", total))
}

/// Decider for barrier states: outcome 0 when every branch finished with a
/// non-reserved outcome, 1 otherwise.
fn all_succeeded(inputs: &PortValues, _ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
    let succeeded = inputs
        .get("outcomes")
        .and_then(Value::as_map)
        .is_some_and(|outcomes| outcomes.values().all(|v| v.as_i64().is_some_and(|id| id >= 0)));
    Ok(BehaviorOutput::new(if succeeded { 0 } else { 1 }))
}

/// Defines the built-in behaviors, their registration, and their lookup by name.
macro_rules! define_behaviors {
    ( $( ($struct_name:ident, $name:literal, $body:path) ),* $(,)? ) => {
        $(
            struct $struct_name;
            impl Behavior for $struct_name {
                fn name(&self) -> &str { $name }
                fn execute(&self, inputs: &PortValues, ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
                    $body(inputs, ctx)
                }
            }
        )*

        pub(super) fn register_default_behaviors(registry: &mut AHashMap<String, Arc<dyn Behavior>>) {
            $( registry.insert($name.to_string(), Arc::new($struct_name)); )*
        }

        pub(super) fn create_behavior_by_name(name: &str) -> Option<Arc<dyn Behavior>> {
            match name {
                $( $name => Some(Arc::new($struct_name)), )*
                _ => None,
            }
        }

        /// Names of the behaviors every builder knows.
        pub const BUILTIN_BEHAVIORS: &[&str] = &[ $( $name ),* ];
    };
}

define_behaviors! {
    (PassThroughBehavior, "pass_through", pass_through),
    (WaitBehavior, "wait", wait),
    (FailBehavior, "fail", fail),
    (SelectOutcomeBehavior, "select_outcome", select_outcome),
    (SumBehavior, "sum", sum),
    (AllSucceededBehavior, "all_succeeded", all_succeeded),
}
