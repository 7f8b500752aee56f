//! Task catalogue loaded from YAML definition files.
//!
//! Every `*.yaml` / `*.yml` file below the catalogue directory holds exactly
//! one task definition. The catalogue is built once at startup and is
//! read-only afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use super::context::TemplateContext;
use super::definition::{OversightMode, TaskDefinition, TaskKind, TaskLimits, TriggerKind};
use super::input::InputContract;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk task directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid task definition in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("duplicate task id `{0}`")]
    DuplicateId(String),

    #[error("task `{0}` has non-positive limits")]
    InvalidLimits(String),
}

/// On-disk shape of a task definition.
#[derive(Debug, Deserialize)]
struct TaskFile {
    id: String,
    name: String,
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    kind: TaskKind,
    prompt: String,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    input: InputContract,
    #[serde(default)]
    limits: TaskLimits,
    #[serde(default)]
    trigger: TriggerKind,
    #[serde(default)]
    oversight: OversightMode,
    #[serde(default)]
    context_template: Option<String>,
}

fn default_version() -> String {
    "1".to_string()
}

impl TaskFile {
    fn into_definition(self) -> Result<TaskDefinition, CatalogueError> {
        if !self.limits.is_valid() {
            return Err(CatalogueError::InvalidLimits(self.id));
        }
        let mut task = TaskDefinition::new(self.id, self.name, self.prompt)
            .with_version(self.version)
            .with_kind(self.kind)
            .with_capabilities(self.capabilities)
            .with_input(self.input)
            .with_limits(self.limits)
            .with_trigger(self.trigger)
            .with_oversight(self.oversight);
        if let Some(template) = self.context_template.filter(|t| !t.trim().is_empty()) {
            task = task.with_dynamic_context(Arc::new(TemplateContext::new(template)));
        }
        Ok(task)
    }
}

/// Read-only set of task definitions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct TaskCatalogue {
    tasks: BTreeMap<String, Arc<TaskDefinition>>,
}

impl TaskCatalogue {
    /// Load every definition file below `dir`.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogueError> {
        let mut definitions = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml");
            if !entry.file_type().is_file() || !is_yaml {
                continue;
            }
            definitions.push(Self::load_file(path)?);
        }
        let catalogue = Self::from_definitions(definitions)?;
        tracing::info!(
            "Loaded {} task definitions from {}",
            catalogue.len(),
            dir.display()
        );
        Ok(catalogue)
    }

    fn load_file(path: &Path) -> Result<TaskDefinition, CatalogueError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogueError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: TaskFile =
            serde_yaml::from_str(&contents).map_err(|source| CatalogueError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        file.into_definition()
    }

    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TaskDefinition>,
    ) -> Result<Self, CatalogueError> {
        let mut tasks = BTreeMap::new();
        for task in definitions {
            if !task.limits.is_valid() {
                return Err(CatalogueError::InvalidLimits(task.id));
            }
            if tasks.contains_key(&task.id) {
                return Err(CatalogueError::DuplicateId(task.id));
            }
            tasks.insert(task.id.clone(), Arc::new(task));
        }
        Ok(Self { tasks })
    }

    pub fn get(&self, id: &str) -> Option<Arc<TaskDefinition>> {
        self.tasks.get(id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<TaskDefinition>> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
