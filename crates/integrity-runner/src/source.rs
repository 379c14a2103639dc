//! Where task definitions come from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use integrity_core::{CoreError, DefinitionId, TaskDefinition};
use thiserror::Error;
use tracing::debug;

/// Definition load errors. Fatal to one schedule slot only.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("unknown task definition: {0}")]
    UnknownDefinition(DefinitionId),

    #[error("failed to read task definition '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse task definition '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: CoreError,
    },
}

/// Supplies the targets and tests of a definition on demand.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn load(&self, id: DefinitionId) -> Result<TaskDefinition, DefinitionError>;
}

/// Definitions read from JSON files, re-read on every load.
#[derive(Debug, Default)]
pub struct FileDefinitionSource {
    paths: HashMap<DefinitionId, PathBuf>,
}

impl FileDefinitionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the given files 1, 2, ... in order.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths = (1u32..)
            .map(DefinitionId::new)
            .zip(paths.into_iter().map(Into::into))
            .collect();
        Self { paths }
    }

    /// Builder method to add a file under `id`.
    pub fn with_file(mut self, id: DefinitionId, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(id, path.into());
        self
    }

    /// Known definition ids, ascending.
    pub fn ids(&self) -> Vec<DefinitionId> {
        let mut ids: Vec<_> = self.paths.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn path(&self, id: DefinitionId) -> Option<&Path> {
        self.paths.get(&id).map(PathBuf::as_path)
    }
}

#[async_trait]
impl DefinitionSource for FileDefinitionSource {
    async fn load(&self, id: DefinitionId) -> Result<TaskDefinition, DefinitionError> {
        let path = self
            .paths
            .get(&id)
            .ok_or(DefinitionError::UnknownDefinition(id))?;

        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DefinitionError::Read {
                path: path.clone(),
                source,
            })?;

        let definition = TaskDefinition::from_json(&json).map_err(|source| DefinitionError::Parse {
            path: path.clone(),
            source,
        })?;

        debug!(
            definition_id = %id,
            path = %path.display(),
            targets = definition.targets.len(),
            tests = definition.tests.len(),
            "Loaded task definition"
        );
        Ok(definition)
    }
}

/// Definitions held in memory.
#[derive(Debug, Default)]
pub struct StaticDefinitionSource {
    definitions: HashMap<DefinitionId, TaskDefinition>,
}

impl StaticDefinitionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a definition under `id`.
    pub fn with_definition(mut self, id: DefinitionId, definition: TaskDefinition) -> Self {
        self.definitions.insert(id, definition);
        self
    }
}

#[async_trait]
impl DefinitionSource for StaticDefinitionSource {
    async fn load(&self, id: DefinitionId) -> Result<TaskDefinition, DefinitionError> {
        self.definitions
            .get(&id)
            .cloned()
            .ok_or(DefinitionError::UnknownDefinition(id))
    }
}
