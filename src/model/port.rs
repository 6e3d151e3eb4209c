use super::{DataType, Value};

/// A typed input port, output port or scoped variable.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPort {
    pub name: String,
    pub data_type: DataType,
    pub default_value: Value,
}

impl DataPort {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            default_value: Value::Null,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = value;
        self
    }
}

/// Finds a port by name in an ordered port list.
pub(crate) fn find_port<'a>(ports: &'a [DataPort], name: &str) -> Option<&'a DataPort> {
    ports.iter().find(|p| p.name == name)
}
