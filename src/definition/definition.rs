use crate::error::StorageError;
use crate::model::{DataType, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// The complete, canonical definition of a state machine, ready to be built.
/// This is the target structure for any custom format conversion and the
/// unit the persistence layer reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineDefinition {
    pub name: String,
    pub root: StateDefinition,
}

/// Defines a single state and, for containers, its whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub input_ports: Vec<PortDefinition>,
    #[serde(default)]
    pub output_ports: Vec<PortDefinition>,
    #[serde(default)]
    pub outcomes: Vec<OutcomeDefinition>,
    pub kind: StateKindDefinition,
}

/// The state variants a definition can describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKindDefinition {
    /// An atomic state running a registered behavior.
    Execution { behavior: String },
    /// A sequential container following its transition graph.
    Hierarchy(ContainerDefinition),
    /// Runs all children in parallel and waits for every one of them.
    BarrierConcurrency {
        container: ContainerDefinition,
        #[serde(default)]
        decider: Option<String>,
    },
    /// Runs all children in parallel; the first to finish preempts the rest.
    PreemptiveConcurrency(ContainerDefinition),
    /// A reference into a shared library, replaced by the library's root at build time.
    Library {
        library_path: String,
        library_name: String,
    },
}

/// Children and linkage of a container state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerDefinition {
    #[serde(default)]
    pub start_state: Option<String>,
    #[serde(default)]
    pub states: Vec<StateDefinition>,
    #[serde(default)]
    pub transitions: Vec<TransitionDefinition>,
    #[serde(default)]
    pub data_flows: Vec<DataFlowDefinition>,
    #[serde(default)]
    pub scoped_variables: Vec<PortDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
    #[serde(default)]
    pub default_value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDefinition {
    pub id: i32,
    pub name: String,
}

/// `to_state == None` (or the container's own id) leaves the container through `to_outcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDefinition {
    pub id: String,
    pub from_state: String,
    pub from_outcome: i32,
    #[serde(default)]
    pub to_state: Option<String>,
    #[serde(default)]
    pub to_outcome: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlowDefinition {
    pub id: String,
    pub from_state: String,
    pub from_key: String,
    pub to_state: String,
    pub to_key: String,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default_value: Value::Null,
        }
    }
}

impl StateDefinition {
    fn with_kind(id: impl Into<String>, kind: StateKindDefinition) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            outcomes: Vec::new(),
            kind,
        }
    }

    pub fn execution(id: impl Into<String>, behavior: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            StateKindDefinition::Execution {
                behavior: behavior.into(),
            },
        )
    }

    pub fn hierarchy(id: impl Into<String>) -> Self {
        Self::with_kind(id, StateKindDefinition::Hierarchy(ContainerDefinition::default()))
    }

    pub fn barrier(id: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            StateKindDefinition::BarrierConcurrency {
                container: ContainerDefinition::default(),
                decider: None,
            },
        )
    }

    pub fn preemptive(id: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            StateKindDefinition::PreemptiveConcurrency(ContainerDefinition::default()),
        )
    }

    pub fn library(
        id: impl Into<String>,
        library_path: impl Into<String>,
        library_name: impl Into<String>,
    ) -> Self {
        Self::with_kind(
            id,
            StateKindDefinition::Library {
                library_path: library_path.into(),
                library_name: library_name.into(),
            },
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_outcome(mut self, id: i32, name: impl Into<String>) -> Self {
        self.outcomes.push(OutcomeDefinition {
            id,
            name: name.into(),
        });
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.input_ports.push(PortDefinition::new(name, data_type));
        self
    }

    pub fn with_input_default(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        default_value: Value,
    ) -> Self {
        self.input_ports.push(PortDefinition {
            name: name.into(),
            data_type,
            default_value,
        });
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.output_ports.push(PortDefinition::new(name, data_type));
        self
    }

    pub fn container(&self) -> Option<&ContainerDefinition> {
        match &self.kind {
            StateKindDefinition::Hierarchy(c)
            | StateKindDefinition::PreemptiveConcurrency(c)
            | StateKindDefinition::BarrierConcurrency { container: c, .. } => Some(c),
            StateKindDefinition::Execution { .. } | StateKindDefinition::Library { .. } => None,
        }
    }

    pub fn container_mut(&mut self) -> Option<&mut ContainerDefinition> {
        match &mut self.kind {
            StateKindDefinition::Hierarchy(c)
            | StateKindDefinition::PreemptiveConcurrency(c)
            | StateKindDefinition::BarrierConcurrency { container: c, .. } => Some(c),
            StateKindDefinition::Execution { .. } | StateKindDefinition::Library { .. } => None,
        }
    }

    /// Applies `edit` to the container part of this definition. Non-container
    /// states are left untouched.
    fn edit_container(mut self, what: &str, edit: impl FnOnce(&mut ContainerDefinition)) -> Self {
        match self.container_mut() {
            Some(container) => edit(container),
            None => warn!(state = %self.id, "ignoring {} on a state that is not a container", what),
        }
        self
    }

    pub fn with_state(self, state: StateDefinition) -> Self {
        self.edit_container("child state", |c| c.states.push(state))
    }

    pub fn with_start_state(self, state_id: impl Into<String>) -> Self {
        let state_id = state_id.into();
        self.edit_container("start state", |c| c.start_state = Some(state_id))
    }

    pub fn with_scoped_variable(
        self,
        name: impl Into<String>,
        data_type: DataType,
        default_value: Value,
    ) -> Self {
        let port = PortDefinition {
            name: name.into(),
            data_type,
            default_value,
        };
        self.edit_container("scoped variable", |c| c.scoped_variables.push(port))
    }

    /// Adds a transition with a generated id. `to_state == None` targets the parent.
    pub fn with_transition(
        self,
        from_state: impl Into<String>,
        from_outcome: i32,
        to_state: Option<&str>,
        to_outcome: Option<i32>,
    ) -> Self {
        let from_state = from_state.into();
        let to_state = to_state.map(str::to_string);
        self.edit_container("transition", |c| {
            let id = format!("t{}", c.transitions.len());
            c.transitions.push(TransitionDefinition {
                id,
                from_state,
                from_outcome,
                to_state,
                to_outcome,
            });
        })
    }

    /// Adds a data flow with a generated id.
    pub fn with_data_flow(
        self,
        from_state: impl Into<String>,
        from_key: impl Into<String>,
        to_state: impl Into<String>,
        to_key: impl Into<String>,
    ) -> Self {
        let flow = (from_state.into(), from_key.into(), to_state.into(), to_key.into());
        self.edit_container("data flow", |c| {
            let id = format!("df{}", c.data_flows.len());
            c.data_flows.push(DataFlowDefinition {
                id,
                from_state: flow.0,
                from_key: flow.1,
                to_state: flow.2,
                to_key: flow.3,
            });
        })
    }

    /// Sets the decider of a barrier state. Ignored for every other kind.
    pub fn with_decider(mut self, decider_id: impl Into<String>) -> Self {
        match &mut self.kind {
            StateKindDefinition::BarrierConcurrency { decider, .. } => {
                *decider = Some(decider_id.into())
            }
            _ => warn!(state = %self.id, "ignoring decider on a state that is not a barrier"),
        }
        self
    }
}

impl StateMachineDefinition {
    pub fn new(name: impl Into<String>, root: StateDefinition) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, StorageError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        fs::write(path, self.to_json_string()?).map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
