//! Task definitions and task invocations.

use serde::{Deserialize, Serialize};

use crate::{outer_product, CoreError, DefinitionId, InvocationId, OuterProduct};

/// A named diagnostic endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TestSpec {
    /// Name used to compare results across tasks and targets, even if the path changes.
    #[serde(alias = "name")]
    pub name: String,

    /// URL template with one `%s` slot that takes a target.
    #[serde(alias = "path")]
    pub path: String,
}

impl TestSpec {
    /// Create a new TestSpec.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Static configuration of one scheduled diagnostic job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskDefinition {
    /// Resources to target.
    #[serde(default, alias = "targets")]
    pub targets: Vec<String>,

    /// Tests to run against every target.
    #[serde(default, alias = "tests")]
    pub tests: Vec<TestSpec>,
}

impl TaskDefinition {
    /// Create an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a definition from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    /// Builder method to add a target.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Builder method to add a test.
    pub fn with_test(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.tests.push(TestSpec::new(name, path));
        self
    }
}

/// One invocation of a task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Fresh per firing.
    pub id: InvocationId,

    /// Schedule slot this task was fired from.
    pub definition_id: DefinitionId,

    /// Resources to target.
    pub targets: Vec<String>,

    /// Tests to run against every target.
    pub tests: Vec<TestSpec>,
}

impl Task {
    /// Create a task invocation from a definition.
    pub fn new(id: InvocationId, definition_id: DefinitionId, definition: TaskDefinition) -> Self {
        Self {
            id,
            definition_id,
            targets: definition.targets,
            tests: definition.tests,
        }
    }

    /// Number of work items this task expands into.
    pub fn expected_count(&self) -> usize {
        self.targets.len() * self.tests.len()
    }

    /// Every (target, test) pair of this task, targets outermost.
    pub fn pairs(&self) -> OuterProduct<'_, String, TestSpec> {
        outer_product(&self.targets, &self.tests)
    }
}
