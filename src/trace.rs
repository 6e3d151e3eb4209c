//! Human-readable rendering of execution histories.

mod formatter;

pub use formatter::HistoryFormatter;
