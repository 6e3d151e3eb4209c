use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Port values keyed by port name.
pub type PortValues = AHashMap<String, Value>;

/// Runtime values carried by ports, scoped variables and data flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(AHashMap<String, Value>),
}

impl Value {
    /// The most specific data type describing this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Any,
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Str(_) => DataType::Str,
            Value::List(_) => DataType::List,
            Value::Map(_) => DataType::Map,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&AHashMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            // Map iteration order is random, so keys are sorted for stable output.
            Value::Map(map) => write!(
                f,
                "{{{}}}",
                map.iter()
                    .sorted_by(|a, b| a.0.cmp(b.0))
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .join(", ")
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Converts plain JSON (as typed on a command line or in a config file) into a `Value`.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Declared type of a port or scoped variable.
///
/// Types form a shallow lattice: `Any` is the top type and `Int` is a subtype
/// of `Float`. Every other type is only compatible with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Any,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
}

impl DataType {
    /// Returns true when a value of type `self` may be stored where `other` is expected.
    pub fn is_subtype_of(self, other: DataType) -> bool {
        self == other || other == DataType::Any || (self == DataType::Int && other == DataType::Float)
    }

    /// Checks a runtime value against this type. `Null` marks an unset port and is always accepted.
    pub fn accepts(self, value: &Value) -> bool {
        value.is_null() || value.data_type().is_subtype_of(self)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Any => "any",
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Str => "str",
            DataType::List => "list",
            DataType::Map => "map",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_is_accepted_where_float_is_expected() {
        assert!(DataType::Float.accepts(&Value::Int(3)));
        assert!(!DataType::Int.accepts(&Value::Float(3.0)));
        assert!(DataType::Any.accepts(&Value::Str("x".into())));
        assert!(DataType::Bool.accepts(&Value::Null));
    }

    #[test]
    fn json_numbers_keep_integer_precision() {
        assert_eq!(Value::from(serde_json::json!(27)), Value::Int(27));
        assert_eq!(Value::from(serde_json::json!(0.5)), Value::Float(0.5));
    }

    #[test]
    fn map_display_is_sorted() {
        let mut map = AHashMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::Bool(true));
        assert_eq!(Value::Map(map).to_string(), "{a: true, b: 2}");
    }
}
