use super::definition::StateMachineDefinition;
use crate::error::ConversionError;

/// A trait for custom data models that can be converted into a `StateMachineDefinition`.
///
/// This is the extension point that keeps the engine agnostic of the
/// persistence format. Implement it on the structs your own loader produces
/// and hand the result to the `StateMachineBuilder`.
///
/// # Example
///
/// ```rust,no_run
/// use jotai::definition::{IntoStateMachine, StateDefinition, StateMachineDefinition};
/// use jotai::error::ConversionError;
///
/// struct Step { id: String }
/// struct Script { steps: Vec<Step> }
///
/// impl IntoStateMachine for Script {
///     fn into_state_machine(self) -> Result<StateMachineDefinition, ConversionError> {
///         let first = self.steps.first().ok_or_else(|| {
///             ConversionError::ValidationError("a script needs at least one step".into())
///         })?;
///         let mut root = StateDefinition::hierarchy("script")
///             .with_outcome(0, "success")
///             .with_start_state(first.id.clone());
///         for (i, step) in self.steps.iter().enumerate() {
///             root = root.with_state(
///                 StateDefinition::execution(step.id.clone(), "pass_through").with_outcome(0, "success"),
///             );
///             let next = self.steps.get(i + 1).map(|s| s.id.as_str());
///             root = match next {
///                 Some(next) => root.with_transition(step.id.clone(), 0, Some(next), None),
///                 None => root.with_transition(step.id.clone(), 0, None, Some(0)),
///             };
///         }
///         Ok(StateMachineDefinition::new("script", root))
///     }
/// }
/// ```
pub trait IntoStateMachine {
    /// Consumes the object and converts it into a state machine definition.
    fn into_state_machine(self) -> Result<StateMachineDefinition, ConversionError>;
}

impl IntoStateMachine for StateMachineDefinition {
    fn into_state_machine(self) -> Result<StateMachineDefinition, ConversionError> {
        Ok(self)
    }
}
