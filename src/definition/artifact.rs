use super::definition::StateMachineDefinition;
use crate::error::StorageError;
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

const ARTIFACT_VERSION: u32 = 1;

/// A validated state machine with every library reference inlined.
///
/// Artifacts are produced by `StateMachine::artifact` and can be rebuilt
/// without access to the original library directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineArtifact {
    pub version: u32,
    pub definition: StateMachineDefinition,
}

impl StateMachineArtifact {
    pub(crate) fn new(definition: StateMachineDefinition) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            definition,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        encode_to_vec(self, standard()).map_err(|e| StorageError::Encode(e.to_string()))
    }

    /// Saves the artifact to a file using the bincode format.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads an artifact from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| StorageError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let (artifact, _): (Self, usize) =
            decode_from_slice(bytes, standard()).map_err(|e| StorageError::Decode(e.to_string()))?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(StorageError::Decode(format!(
                "unsupported artifact version {}",
                artifact.version
            )));
        }
        Ok(artifact)
    }
}
