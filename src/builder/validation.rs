use crate::definition::{
    ContainerDefinition, PortDefinition, StateDefinition, StateKindDefinition,
};
use crate::error::ValidationError;
use crate::model::{DataType, OutcomeId};
use crate::state::Behavior;
use ahash::{AHashMap, AHashSet};
use std::fmt;
use std::sync::Arc;

/// A suspicious but runnable construct found while validating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub container: String,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.container, self.message)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    Sequential,
    Barrier,
    Preemptive,
}

/// Checks a fully resolved definition tree.
///
/// Returns the warnings collected on success and the first error otherwise.
pub(super) fn validate(
    root: &StateDefinition,
    registry: &AHashMap<String, Arc<dyn Behavior>>,
) -> Result<Vec<ValidationWarning>, ValidationError> {
    let mut validator = Validator {
        registry,
        warnings: Vec::new(),
    };
    validator.state(root)?;
    Ok(validator.warnings)
}

struct Validator<'a> {
    registry: &'a AHashMap<String, Arc<dyn Behavior>>,
    warnings: Vec<ValidationWarning>,
}

impl Validator<'_> {
    fn state(&mut self, def: &StateDefinition) -> Result<(), ValidationError> {
        let mut outcome_ids = AHashSet::new();
        for outcome in &def.outcomes {
            let id = OutcomeId(outcome.id);
            if id.is_reserved() {
                return Err(ValidationError::ReservedOutcome {
                    state: def.id.clone(),
                    outcome: id,
                    name: outcome.name.clone(),
                });
            }
            if !outcome_ids.insert(id) {
                return Err(ValidationError::DuplicateOutcome {
                    state: def.id.clone(),
                    outcome: id,
                });
            }
        }

        unique_ports(&def.id, &def.input_ports)?;
        unique_ports(&def.id, &def.output_ports)?;
        for port in def.input_ports.iter().chain(&def.output_ports) {
            valid_default(&def.id, port)?;
        }

        match &def.kind {
            StateKindDefinition::Execution { behavior } => {
                if !self.registry.contains_key(behavior) {
                    return Err(ValidationError::UnknownBehavior {
                        state: def.id.clone(),
                        behavior: behavior.clone(),
                    });
                }
                Ok(())
            }
            StateKindDefinition::Hierarchy(container) => {
                self.container(def, container, ContainerKind::Sequential, None)
            }
            StateKindDefinition::BarrierConcurrency { container, decider } => {
                self.container(def, container, ContainerKind::Barrier, decider.as_deref())
            }
            StateKindDefinition::PreemptiveConcurrency(container) => {
                self.container(def, container, ContainerKind::Preemptive, None)
            }
            // Library references are inlined before validation runs.
            StateKindDefinition::Library { .. } => Ok(()),
        }
    }

    fn container(
        &mut self,
        def: &StateDefinition,
        container: &ContainerDefinition,
        kind: ContainerKind,
        decider: Option<&str>,
    ) -> Result<(), ValidationError> {
        let children: AHashMap<&str, &StateDefinition> =
            container.states.iter().map(|s| (s.id.as_str(), s)).collect();
        if children.len() != container.states.len() || children.contains_key(def.id.as_str()) {
            let duplicate = container
                .states
                .iter()
                .enumerate()
                .find(|(i, s)| s.id == def.id || container.states[..*i].iter().any(|o| o.id == s.id))
                .map(|(_, s)| s.id.clone())
                .unwrap_or_default();
            return Err(ValidationError::DuplicateStateId {
                container: def.id.clone(),
                state_id: duplicate,
            });
        }

        let branch_count = container
            .states
            .iter()
            .filter(|s| Some(s.id.as_str()) != decider)
            .count();
        if branch_count == 0 {
            return Err(ValidationError::EmptyContainer {
                container: def.id.clone(),
            });
        }

        unique_ports(&def.id, &container.scoped_variables)?;
        for variable in &container.scoped_variables {
            valid_default(&def.id, variable)?;
            if def.input_ports.iter().chain(&def.output_ports).any(|p| p.name == variable.name) {
                return Err(ValidationError::DuplicatePort {
                    state: def.id.clone(),
                    port: variable.name.clone(),
                });
            }
        }

        if kind == ContainerKind::Sequential {
            match container.start_state.as_deref() {
                None => {
                    return Err(ValidationError::MissingStartState {
                        container: def.id.clone(),
                    });
                }
                Some(start) if !children.contains_key(start) => {
                    return Err(ValidationError::UnknownState {
                        container: def.id.clone(),
                        element: "start state",
                        id: start.to_string(),
                        state_id: start.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(decider) = decider {
            if !children.contains_key(decider) {
                return Err(ValidationError::UnknownDecider {
                    container: def.id.clone(),
                    decider: decider.to_string(),
                });
            }
        }

        self.transitions(def, container, &children, kind)?;
        data_flows(def, container, &children, kind, decider)?;

        for child in &container.states {
            self.state(child)?;
        }
        Ok(())
    }

    fn transitions(
        &mut self,
        def: &StateDefinition,
        container: &ContainerDefinition,
        children: &AHashMap<&str, &StateDefinition>,
        kind: ContainerKind,
    ) -> Result<(), ValidationError> {
        let mut ids = AHashSet::new();
        let mut sources: AHashMap<(&str, i32), &str> = AHashMap::new();
        for transition in &container.transitions {
            if !ids.insert(transition.id.as_str()) {
                return Err(ValidationError::DuplicateElementId {
                    container: def.id.clone(),
                    element: "transition",
                    id: transition.id.clone(),
                });
            }

            let Some(from) = children.get(transition.from_state.as_str()) else {
                return Err(ValidationError::UnknownState {
                    container: def.id.clone(),
                    element: "transition",
                    id: transition.id.clone(),
                    state_id: transition.from_state.clone(),
                });
            };
            let from_outcome = OutcomeId(transition.from_outcome);
            if !has_outcome(from, from_outcome) {
                return Err(ValidationError::UnknownOutcome {
                    container: def.id.clone(),
                    transition: transition.id.clone(),
                    state_id: from.id.clone(),
                    outcome: from_outcome,
                });
            }

            let invalid = |message: &str| ValidationError::InvalidTransition {
                container: def.id.clone(),
                transition: transition.id.clone(),
                message: message.to_string(),
            };
            match transition.to_state.as_deref() {
                None => leaves_through(def, transition.id.as_str(), transition.to_outcome)?,
                Some(target) if target == def.id => {
                    leaves_through(def, transition.id.as_str(), transition.to_outcome)?
                }
                Some(target) => {
                    if kind != ContainerKind::Sequential {
                        return Err(invalid("children of a concurrency state cannot transition to siblings"));
                    }
                    if !children.contains_key(target) {
                        return Err(ValidationError::UnknownState {
                            container: def.id.clone(),
                            element: "transition",
                            id: transition.id.clone(),
                            state_id: target.to_string(),
                        });
                    }
                    if transition.to_outcome.is_some() {
                        return Err(invalid("a transition to a sibling cannot name an outcome"));
                    }
                }
            }

            let key = (transition.from_state.as_str(), transition.from_outcome);
            if let Some(first) = sources.get(&key) {
                self.warnings.push(ValidationWarning {
                    container: def.id.clone(),
                    message: format!(
                        "transition '{}' duplicates '{}' for outcome {} of '{}' and will never fire",
                        transition.id, first, from_outcome, transition.from_state
                    ),
                });
            } else {
                sources.insert(key, transition.id.as_str());
            }
        }
        Ok(())
    }
}

fn leaves_through(
    def: &StateDefinition,
    transition: &str,
    to_outcome: Option<i32>,
) -> Result<(), ValidationError> {
    let Some(outcome) = to_outcome.map(OutcomeId) else {
        return Err(ValidationError::InvalidTransition {
            container: def.id.clone(),
            transition: transition.to_string(),
            message: "a transition to the parent must name one of its outcomes".to_string(),
        });
    };
    if has_outcome(def, outcome) {
        Ok(())
    } else {
        Err(ValidationError::UnknownOutcome {
            container: def.id.clone(),
            transition: transition.to_string(),
            state_id: def.id.clone(),
            outcome,
        })
    }
}

fn has_outcome(def: &StateDefinition, outcome: OutcomeId) -> bool {
    outcome == OutcomeId::ABORTED
        || outcome == OutcomeId::PREEMPTED
        || def.outcomes.iter().any(|o| OutcomeId(o.id) == outcome)
}

fn data_flows(
    def: &StateDefinition,
    container: &ContainerDefinition,
    children: &AHashMap<&str, &StateDefinition>,
    kind: ContainerKind,
    decider: Option<&str>,
) -> Result<(), ValidationError> {
    let mut ids = AHashSet::new();
    for flow in &container.data_flows {
        if !ids.insert(flow.id.as_str()) {
            return Err(ValidationError::DuplicateElementId {
                container: def.id.clone(),
                element: "data flow",
                id: flow.id.clone(),
            });
        }
        let invalid = |message: &str| ValidationError::InvalidDataFlow {
            container: def.id.clone(),
            data_flow: flow.id.clone(),
            message: message.to_string(),
        };

        let from_self = flow.from_state == def.id;
        let to_self = flow.to_state == def.id;
        let from_type = if from_self {
            port_type(def.input_ports.iter().chain(&container.scoped_variables), &flow.from_key)
        } else {
            let child = lookup_child(def, children, flow.id.as_str(), &flow.from_state)?;
            port_type(child.output_ports.iter(), &flow.from_key)
        };
        let from_type = from_type.ok_or_else(|| ValidationError::UnknownPort {
            container: def.id.clone(),
            data_flow: flow.id.clone(),
            state_id: flow.from_state.clone(),
            key: flow.from_key.clone(),
        })?;

        let to_type = if to_self {
            port_type(def.output_ports.iter().chain(&container.scoped_variables), &flow.to_key)
        } else {
            let child = lookup_child(def, children, flow.id.as_str(), &flow.to_state)?;
            port_type(child.input_ports.iter(), &flow.to_key)
        };
        let to_type = to_type.ok_or_else(|| ValidationError::UnknownPort {
            container: def.id.clone(),
            data_flow: flow.id.clone(),
            state_id: flow.to_state.clone(),
            key: flow.to_key.clone(),
        })?;

        if from_self && to_self && container.scoped_variables.iter().any(|v| v.name == flow.from_key) {
            return Err(invalid("a scoped variable cannot feed the container it belongs to"));
        }
        if kind != ContainerKind::Sequential && !from_self && !to_self {
            let into_decider = decider == Some(flow.to_state.as_str()) && flow.from_state != flow.to_state;
            if !into_decider {
                return Err(invalid("concurrent siblings cannot exchange data"));
            }
        }
        if !from_type.is_subtype_of(to_type) {
            return Err(ValidationError::IncompatibleDataFlow {
                container: def.id.clone(),
                data_flow: flow.id.clone(),
                from: from_type,
                to: to_type,
            });
        }
    }
    Ok(())
}

fn lookup_child<'a>(
    def: &StateDefinition,
    children: &AHashMap<&str, &'a StateDefinition>,
    flow: &str,
    state_id: &str,
) -> Result<&'a StateDefinition, ValidationError> {
    children
        .get(state_id)
        .copied()
        .ok_or_else(|| ValidationError::UnknownState {
            container: def.id.clone(),
            element: "data flow",
            id: flow.to_string(),
            state_id: state_id.to_string(),
        })
}

fn port_type<'a>(mut ports: impl Iterator<Item = &'a PortDefinition>, key: &str) -> Option<DataType> {
    ports.find(|p| p.name == key).map(|p| p.data_type)
}

fn unique_ports(state: &str, ports: &[PortDefinition]) -> Result<(), ValidationError> {
    let mut names = AHashSet::new();
    for port in ports {
        if !names.insert(port.name.as_str()) {
            return Err(ValidationError::DuplicatePort {
                state: state.to_string(),
                port: port.name.clone(),
            });
        }
    }
    Ok(())
}

fn valid_default(state: &str, port: &PortDefinition) -> Result<(), ValidationError> {
    if port.data_type.accepts(&port.default_value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidDefault {
            state: state.to_string(),
            port: port.name.clone(),
            expected: port.data_type,
        })
    }
}
