use crate::model::Value;
use ahash::AHashMap;
use parking_lot::RwLock;

/// Key/value store shared by every state of an engine, for values that do
/// not travel along data flows.
///
/// The store outlives single runs: values set by one run are visible to the
/// next one until they are removed or the store is cleared.
#[derive(Debug, Default)]
pub struct GlobalVariables {
    values: RwLock<AHashMap<String, Value>>,
}

impl GlobalVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key` and returns the previous value, if any.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.write().insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    /// Applies `update` to the current value under the write lock, so
    /// concurrent branches never lose each other's updates.
    pub fn update(&self, key: &str, update: impl FnOnce(Option<&Value>) -> Value) -> Value {
        let mut values = self.values.write();
        let next = update(values.get(key));
        values.insert(key.to_string(), next.clone());
        next
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn snapshot(&self) -> AHashMap<String, Value> {
        self.values.read().clone()
    }

    pub fn clear(&self) {
        self.values.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let globals = GlobalVariables::new();
        assert!(globals.set("speed", 2.5).is_none());
        assert_eq!(globals.get("speed"), Some(Value::Float(2.5)));
        assert_eq!(globals.set("speed", 3.0), Some(Value::Float(2.5)));
        assert_eq!(globals.get_or("missing", Value::Int(7)), Value::Int(7));
        assert_eq!(globals.remove("speed"), Some(Value::Float(3.0)));
        assert!(globals.is_empty());
    }

    #[test]
    fn test_update_is_atomic_across_threads() {
        let globals = std::sync::Arc::new(GlobalVariables::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let globals = globals.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        globals.update("count", |v| Value::Int(v.and_then(Value::as_i64).unwrap_or(0) + 1));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(globals.get("count"), Some(Value::Int(800)));
    }
}
