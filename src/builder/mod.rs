//! Turns definitions into runnable state machines.
//!
//! The builder inlines library references, validates the whole tree and
//! then constructs the immutable runtime [`State`] tree.

mod behaviors;
mod validation;

pub use behaviors::BUILTIN_BEHAVIORS;
pub use validation::ValidationWarning;

use crate::definition::{
    ContainerDefinition, IntoStateMachine, LibraryResolver, PortDefinition, StateDefinition,
    StateKindDefinition, StateMachineArtifact, StateMachineDefinition,
};
use crate::error::{BehaviorError, BuildError, ConversionError, LibraryError};
use crate::execution::RunContext;
use crate::model::{DataFlow, DataPort, Outcome, OutcomeId, PortValues, Transition, TransitionTarget};
use crate::state::{
    AtomicState, BarrierState, Behavior, BehaviorOutput, ContainerState, State, StateKind,
};
use ahash::AHashMap;
use behaviors::{create_behavior_by_name, register_default_behaviors};
use std::sync::Arc;
use tracing::{debug, warn};

/// A validated, immutable state machine ready for execution.
pub struct StateMachine {
    name: String,
    root: Arc<State>,
    definition: StateMachineDefinition,
    warnings: Vec<ValidationWarning>,
}

impl StateMachine {
    pub fn builder(definition: StateMachineDefinition) -> StateMachineBuilder {
        StateMachineBuilder::new(definition)
    }

    /// Builds from any format implementing [`IntoStateMachine`] with the default builder settings.
    pub fn from_custom(source: impl IntoStateMachine) -> Result<StateMachineBuilder, ConversionError> {
        Ok(StateMachineBuilder::new(source.into_state_machine()?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Arc<State> {
        &self.root
    }

    /// Warnings collected during validation, e.g. shadowed transitions.
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// The definition with every library reference inlined.
    pub fn resolved_definition(&self) -> &StateMachineDefinition {
        &self.definition
    }

    /// Packs the resolved definition into a portable artifact.
    pub fn artifact(&self) -> StateMachineArtifact {
        StateMachineArtifact::new(self.definition.clone())
    }

    pub fn find_state(&self, path: &str) -> Option<&State> {
        self.root.find(path)
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("root", &self.root)
            .finish()
    }
}

struct NoLibraries;

impl LibraryResolver for NoLibraries {
    fn resolve(&self, library_path: &str, library_name: &str) -> Result<StateDefinition, LibraryError> {
        Err(LibraryError::MissingLibrary {
            library_path: library_path.to_string(),
            library_name: library_name.to_string(),
        })
    }
}

pub struct StateMachineBuilder {
    definition: StateMachineDefinition,
    registry: AHashMap<String, Arc<dyn Behavior>>,
    resolver: Arc<dyn LibraryResolver>,
}

impl StateMachineBuilder {
    pub fn new(definition: StateMachineDefinition) -> Self {
        let mut registry: AHashMap<String, Arc<dyn Behavior>> = AHashMap::new();
        register_default_behaviors(&mut registry);
        Self {
            definition,
            registry,
            resolver: Arc::new(NoLibraries),
        }
    }

    /// Rebuilds a state machine from a saved artifact. Libraries are already inlined.
    pub fn from_artifact(artifact: StateMachineArtifact) -> Self {
        Self::new(artifact.definition)
    }

    /// Registers a behavior under its own name, replacing any previous one.
    pub fn with_behavior(mut self, behavior: impl Behavior + 'static) -> Self {
        self.registry
            .insert(behavior.name().to_string(), Arc::new(behavior));
        self
    }

    /// Makes a built-in behavior available under another name.
    pub fn with_behavior_alias(mut self, alias: &str, builtin_name: &str) -> Self {
        match create_behavior_by_name(builtin_name) {
            Some(behavior) => {
                self.registry.insert(alias.to_string(), behavior);
            }
            None => warn!(alias, builtin_name, "no built-in behavior to alias"),
        }
        self
    }

    pub fn with_library_resolver(mut self, resolver: impl LibraryResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn build(self) -> Result<StateMachine, BuildError> {
        let StateMachineDefinition { name, root } = self.definition;
        let mut stack = Vec::new();
        let root = inline_libraries(root, self.resolver.as_ref(), &mut stack)?;

        let warnings = validation::validate(&root, &self.registry)?;
        for warning in &warnings {
            warn!(machine = %name, "{}", warning);
        }

        let runtime_root = construct(&root, None, &self.registry);
        debug!(machine = %name, "state machine built");
        Ok(StateMachine {
            name: name.clone(),
            root: runtime_root,
            definition: StateMachineDefinition { name, root },
            warnings,
        })
    }
}

/// Replaces every library state with the root of the library it references.
fn inline_libraries(
    def: StateDefinition,
    resolver: &dyn LibraryResolver,
    stack: &mut Vec<(String, String)>,
) -> Result<StateDefinition, LibraryError> {
    let StateDefinition {
        id,
        name,
        input_ports,
        output_ports,
        outcomes,
        kind,
    } = def;

    let kind = match kind {
        StateKindDefinition::Library {
            library_path,
            library_name,
        } => {
            let key = (library_path, library_name);
            if stack.contains(&key) {
                return Err(LibraryError::LibraryCycle {
                    library_path: key.0,
                    library_name: key.1,
                });
            }
            let library_root = resolver.resolve(&key.0, &key.1)?;
            debug!(state = %id, library = %format!("{}/{}", key.0, key.1), "inlining library");
            stack.push(key);
            let mut resolved = inline_libraries(library_root, resolver, stack)?;
            stack.pop();

            rename_root(&mut resolved, &id);
            if !name.is_empty() && name != id {
                resolved.name = name;
            }
            return Ok(resolved);
        }
        StateKindDefinition::Hierarchy(container) => {
            StateKindDefinition::Hierarchy(inline_container(container, resolver, stack)?)
        }
        StateKindDefinition::BarrierConcurrency { container, decider } => {
            StateKindDefinition::BarrierConcurrency {
                container: inline_container(container, resolver, stack)?,
                decider,
            }
        }
        StateKindDefinition::PreemptiveConcurrency(container) => {
            StateKindDefinition::PreemptiveConcurrency(inline_container(container, resolver, stack)?)
        }
        execution @ StateKindDefinition::Execution { .. } => execution,
    };

    Ok(StateDefinition {
        id,
        name,
        input_ports,
        output_ports,
        outcomes,
        kind,
    })
}

fn inline_container(
    mut container: ContainerDefinition,
    resolver: &dyn LibraryResolver,
    stack: &mut Vec<(String, String)>,
) -> Result<ContainerDefinition, LibraryError> {
    container.states = container
        .states
        .into_iter()
        .map(|child| inline_libraries(child, resolver, stack))
        .collect::<Result<_, _>>()?;
    Ok(container)
}

/// Gives a library root the id of the state that referenced it, keeping
/// its internal transitions and data flows pointing at itself.
fn rename_root(def: &mut StateDefinition, new_id: &str) {
    let old_id = std::mem::replace(&mut def.id, new_id.to_string());
    if let Some(container) = def.container_mut() {
        for transition in &mut container.transitions {
            if transition.to_state.as_deref() == Some(old_id.as_str()) {
                transition.to_state = Some(new_id.to_string());
            }
        }
        for flow in &mut container.data_flows {
            if flow.from_state == old_id {
                flow.from_state = new_id.to_string();
            }
            if flow.to_state == old_id {
                flow.to_state = new_id.to_string();
            }
        }
    }
}

fn ports(defs: &[PortDefinition]) -> Vec<DataPort> {
    defs.iter()
        .map(|p| DataPort::new(p.name.clone(), p.data_type).with_default(p.default_value.clone()))
        .collect()
}

/// Builds the runtime tree. The definition must have passed validation.
fn construct(
    def: &StateDefinition,
    parent_path: Option<&str>,
    registry: &AHashMap<String, Arc<dyn Behavior>>,
) -> Arc<State> {
    let path = match parent_path {
        Some(parent) => format!("{}/{}", parent, def.id),
        None => def.id.clone(),
    };
    let kind = match &def.kind {
        StateKindDefinition::Execution { behavior } => {
            let behavior = registry
                .get(behavior)
                .cloned()
                .unwrap_or_else(|| Arc::new(MissingBehavior(behavior.clone())));
            StateKind::Atomic(AtomicState::new(behavior))
        }
        StateKindDefinition::Hierarchy(container) => {
            StateKind::Hierarchy(construct_container(def, container, &path, registry))
        }
        StateKindDefinition::BarrierConcurrency { container, decider } => StateKind::Barrier(
            BarrierState::new(construct_container(def, container, &path, registry), decider.clone()),
        ),
        StateKindDefinition::PreemptiveConcurrency(container) => {
            StateKind::Preemptive(construct_container(def, container, &path, registry))
        }
        StateKindDefinition::Library {
            library_path,
            library_name,
        } => StateKind::Atomic(AtomicState::new(Arc::new(MissingBehavior(format!(
            "library {}/{}",
            library_path, library_name
        ))))),
    };

    let name = if def.name.is_empty() {
        def.id.clone()
    } else {
        def.name.clone()
    };
    Arc::new(State::new(
        def.id.clone(),
        name,
        path,
        ports(&def.input_ports),
        ports(&def.output_ports),
        def.outcomes.iter().map(|o| Outcome::new(o.id, o.name.clone())).collect(),
        kind,
    ))
}

fn construct_container(
    def: &StateDefinition,
    container: &ContainerDefinition,
    path: &str,
    registry: &AHashMap<String, Arc<dyn Behavior>>,
) -> ContainerState {
    let children = container
        .states
        .iter()
        .map(|child| construct(child, Some(path), registry))
        .collect();
    let transitions = container
        .transitions
        .iter()
        .map(|t| {
            let target = match t.to_state.as_deref() {
                Some(target) if target != def.id => TransitionTarget::State(target.to_string()),
                _ => TransitionTarget::Parent(t.to_outcome.map(OutcomeId).unwrap_or(OutcomeId::ABORTED)),
            };
            Transition {
                id: t.id.clone(),
                from_state: t.from_state.clone(),
                from_outcome: OutcomeId(t.from_outcome),
                target,
            }
        })
        .collect();
    let data_flows = container
        .data_flows
        .iter()
        .map(|f| DataFlow {
            id: f.id.clone(),
            from_state: f.from_state.clone(),
            from_key: f.from_key.clone(),
            to_state: f.to_state.clone(),
            to_key: f.to_key.clone(),
        })
        .collect();
    ContainerState::new(
        container.start_state.clone(),
        children,
        transitions,
        data_flows,
        ports(&container.scoped_variables),
    )
}

/// Placeholder for behaviors that cannot exist after validation.
struct MissingBehavior(String);

impl Behavior for MissingBehavior {
    fn name(&self) -> &str {
        &self.0
    }

    fn execute(&self, _inputs: &PortValues, _ctx: &RunContext) -> Result<BehaviorOutput, BehaviorError> {
        Err(BehaviorError::Failed(format!(
            "behavior '{}' is not registered",
            self.0
        )))
    }
}
