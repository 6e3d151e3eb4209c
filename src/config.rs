//! Runtime configuration of the execution engine.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Tunables shared by every state of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long a preemptive state waits for preempted children before
    /// giving up on them and reporting a preemption timeout.
    #[serde(default = "default_preemption_grace_ms")]
    pub preemption_grace_ms: u64,
    /// Upper bound on how long a thread blocked at a state entry sleeps
    /// before re-checking its preemption token.
    #[serde(default = "default_gate_poll_interval_ms")]
    pub gate_poll_interval_ms: u64,
    /// Prefix of the names given to engine threads.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_preemption_grace_ms() -> u64 {
    5_000
}

fn default_gate_poll_interval_ms() -> u64 {
    50
}

fn default_thread_name_prefix() -> String {
    "jotai".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preemption_grace_ms: default_preemption_grace_ms(),
            gate_poll_interval_ms: default_gate_poll_interval_ms(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl EngineConfig {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_preemption_grace(mut self, grace: Duration) -> Self {
        self.preemption_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn preemption_grace(&self) -> Duration {
        Duration::from_millis(self.preemption_grace_ms)
    }

    pub fn gate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.gate_poll_interval_ms.max(1))
    }
}
