use super::definition::{StateDefinition, StateMachineDefinition};
use crate::error::LibraryError;
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locates reusable sub-state-machines referenced by library states.
///
/// A resolver is injected into the builder; nothing in the engine looks
/// libraries up through global state.
pub trait LibraryResolver: Send + Sync {
    /// Returns the root state of the library stored as `library_name` under `library_path`.
    fn resolve(&self, library_path: &str, library_name: &str)
    -> Result<StateDefinition, LibraryError>;
}

/// Libraries registered in memory, keyed by `(library_path, library_name)`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLibrary {
    entries: AHashMap<(String, String), StateDefinition>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(
        mut self,
        library_path: impl Into<String>,
        library_name: impl Into<String>,
        root: StateDefinition,
    ) -> Self {
        self.insert(library_path, library_name, root);
        self
    }

    pub fn insert(
        &mut self,
        library_path: impl Into<String>,
        library_name: impl Into<String>,
        root: StateDefinition,
    ) {
        self.entries
            .insert((library_path.into(), library_name.into()), root);
    }
}

impl LibraryResolver for InMemoryLibrary {
    fn resolve(
        &self,
        library_path: &str,
        library_name: &str,
    ) -> Result<StateDefinition, LibraryError> {
        self.entries
            .get(&(library_path.to_string(), library_name.to_string()))
            .cloned()
            .ok_or_else(|| LibraryError::MissingLibrary {
                library_path: library_path.to_string(),
                library_name: library_name.to_string(),
            })
    }
}

/// Resolves libraries from JSON files on disk.
///
/// Each library root name maps to an ordered list of directories. A library
/// `name` is looked up as `<dir>/<name>.json` and then as
/// `<dir>/<name>/statemachine.json` in every directory, so a relocated
/// library can be found by registering its new directory after the old one.
#[derive(Debug, Default, Clone)]
pub struct FileSystemLibraryResolver {
    roots: AHashMap<String, Vec<PathBuf>>,
}

impl FileSystemLibraryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, library_path: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        self.add_root(library_path, dir);
        self
    }

    pub fn add_root(&mut self, library_path: impl Into<String>, dir: impl Into<PathBuf>) {
        self.roots
            .entry(library_path.into())
            .or_default()
            .push(dir.into());
    }

    fn candidates(dir: &Path, library_name: &str) -> [PathBuf; 2] {
        [
            dir.join(format!("{}.json", library_name)),
            dir.join(library_name).join("statemachine.json"),
        ]
    }
}

impl LibraryResolver for FileSystemLibraryResolver {
    fn resolve(
        &self,
        library_path: &str,
        library_name: &str,
    ) -> Result<StateDefinition, LibraryError> {
        let dirs = self.roots.get(library_path).map(Vec::as_slice).unwrap_or(&[]);
        for dir in dirs {
            for candidate in Self::candidates(dir, library_name) {
                if !candidate.is_file() {
                    continue;
                }
                debug!(path = %candidate.display(), "loading library");
                return StateMachineDefinition::from_file(&candidate)
                    .map(|sm| sm.root)
                    .map_err(|e| LibraryError::Unreadable {
                        library_path: library_path.to_string(),
                        library_name: library_name.to_string(),
                        message: e.to_string(),
                    });
            }
        }
        Err(LibraryError::MissingLibrary {
            library_path: library_path.to_string(),
            library_name: library_name.to_string(),
        })
    }
}
