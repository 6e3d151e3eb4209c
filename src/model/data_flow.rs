/// A directed edge copying a value from one port (or scoped variable) to another.
///
/// Both endpoints live in the same container: either the container itself or
/// one of its direct children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlow {
    pub id: String,
    pub from_state: String,
    pub from_key: String,
    pub to_state: String,
    pub to_key: String,
}

impl DataFlow {
    pub fn targets(&self, state_id: &str, key: &str) -> bool {
        self.to_state == state_id && self.to_key == key
    }

    pub fn originates(&self, state_id: &str, key: &str) -> bool {
        self.from_state == state_id && self.from_key == key
    }
}
