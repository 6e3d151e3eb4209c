use crate::execution::{HistoryItem, HistoryKind};
use crate::model::PortValues;
use itertools::Itertools;

/// Formats execution histories into human-readable strings
pub struct HistoryFormatter;

impl HistoryFormatter {
    /// Renders one line per call and return, indented by nesting depth.
    ///
    /// ```text
    /// -> root
    ///   -> root/a
    ///   <- root/a: success (0)
    /// <- root: done (0)
    /// ```
    pub fn format_history(items: &[HistoryItem]) -> String {
        items.iter().map(Self::format_item).join("\n")
    }

    fn format_item(item: &HistoryItem) -> String {
        let indent = "  ".repeat(item.depth());
        match &item.kind {
            HistoryKind::Call => format!("{}-> {}", indent, item.path),
            HistoryKind::Return(outcome) => format!("{}<- {}: {}", indent, item.path, outcome),
        }
    }

    /// Formats port values as `key = value` pairs in key order.
    pub fn format_values(values: &PortValues) -> String {
        values
            .iter()
            .sorted_by(|a, b| a.0.cmp(b.0))
            .map(|(key, value)| format!("{} = {}", key, value))
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, Value};
    use std::time::Duration;

    fn item(path: &str, kind: HistoryKind) -> HistoryItem {
        HistoryItem {
            path: path.to_string(),
            kind,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn history_is_indented_by_depth() {
        let items = vec![
            item("root", HistoryKind::Call),
            item("root/a", HistoryKind::Call),
            item("root/a", HistoryKind::Return(Outcome::new(0, "success"))),
            item("root", HistoryKind::Return(Outcome::aborted())),
        ];
        let expected = "-> root\n  -> root/a\n  <- root/a: success (0)\n<- root: aborted (-1)";
        assert_eq!(HistoryFormatter::format_history(&items), expected);
    }

    #[test]
    fn values_are_sorted_by_key() {
        let mut values = PortValues::default();
        values.insert("b".to_string(), Value::Int(2));
        values.insert("a".to_string(), Value::Str("x".to_string()));
        assert_eq!(HistoryFormatter::format_values(&values), "a = \"x\", b = 2");
    }
}
