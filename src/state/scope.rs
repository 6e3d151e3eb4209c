use super::{ContainerState, State};
use crate::error::ExecutionError;
use crate::model::{PortValues, Value, find_port};
use ahash::AHashMap;

/// Values visible inside one container execution, keyed by state id and
/// port name. The container's own inputs and scoped variables live under
/// the container's id.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    owner: String,
    values: AHashMap<String, PortValues>,
}

impl Scope {
    pub(crate) fn open(
        state: &State,
        container: &ContainerState,
        inputs: &PortValues,
    ) -> Result<Self, ExecutionError> {
        let mut scope = Self {
            owner: state.id().to_string(),
            values: AHashMap::new(),
        };
        let own = scope.values.entry(scope.owner.clone()).or_default();
        for variable in container.scoped_variables() {
            own.insert(variable.name.clone(), variable.default_value.clone());
        }
        for (key, value) in inputs {
            own.insert(key.clone(), value.clone());
        }

        // Inputs feeding scoped variables directly.
        let mut initial = Vec::new();
        for flow in container.data_flows() {
            if flow.from_state == scope.owner && flow.to_state == scope.owner {
                if let (Some(variable), Some(value)) = (
                    find_port(container.scoped_variables(), &flow.to_key),
                    inputs.get(&flow.from_key),
                ) {
                    state.check_type(variable, value)?;
                    initial.push((variable.name.clone(), value.clone()));
                }
            }
        }
        for (key, value) in initial {
            scope.set(state.id(), key, value);
        }
        Ok(scope)
    }

    fn get(&self, state_id: &str, key: &str) -> Option<&Value> {
        self.values.get(state_id).and_then(|values| values.get(key))
    }

    fn set(&mut self, state_id: &str, key: String, value: Value) {
        self.values
            .entry(state_id.to_string())
            .or_default()
            .insert(key, value);
    }

    /// Resolves every input of `child`: the last data flow (in declaration
    /// order) whose source holds a value wins, otherwise the port default.
    pub(crate) fn resolve_inputs(
        &self,
        container: &ContainerState,
        child: &State,
    ) -> Result<PortValues, ExecutionError> {
        let mut inputs = PortValues::default();
        for port in child.input_ports() {
            let value = container
                .data_flows()
                .iter()
                .filter(|flow| flow.targets(child.id(), &port.name))
                .filter_map(|flow| self.get(&flow.from_state, &flow.from_key))
                .filter(|value| !value.is_null())
                .last()
                .cloned()
                .unwrap_or_else(|| port.default_value.clone());
            child.check_type(port, &value)?;
            inputs.insert(port.name.clone(), value);
        }
        Ok(inputs)
    }

    /// Stores a finished child's outputs and forwards the ones wired to
    /// scoped variables.
    pub(crate) fn record_outputs(
        &mut self,
        state: &State,
        container: &ContainerState,
        child: &State,
        outputs: &PortValues,
    ) -> Result<(), ExecutionError> {
        for (key, value) in outputs {
            self.set(child.id(), key.clone(), value.clone());
        }
        for flow in container.data_flows() {
            if flow.from_state != child.id() || flow.to_state != self.owner {
                continue;
            }
            let Some(variable) = find_port(container.scoped_variables(), &flow.to_key) else {
                continue;
            };
            if let Some(value) = outputs.get(&flow.from_key) {
                state.check_type(variable, value)?;
                let owner = self.owner.clone();
                self.set(&owner, variable.name.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Gathers the container's own outputs from the flows targeting them.
    pub(crate) fn collect_outputs(
        &self,
        state: &State,
        container: &ContainerState,
    ) -> Result<PortValues, ExecutionError> {
        let mut outputs = PortValues::default();
        for port in state.output_ports() {
            let value = container
                .data_flows()
                .iter()
                .filter(|flow| flow.targets(state.id(), &port.name))
                .filter_map(|flow| self.get(&flow.from_state, &flow.from_key))
                .filter(|value| !value.is_null())
                .last()
                .cloned()
                .unwrap_or_else(|| port.default_value.clone());
            state.check_type(port, &value)?;
            outputs.insert(port.name.clone(), value);
        }
        Ok(outputs)
    }
}
