use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{FileWriteTask, FusionTask, ScriptTask, TaskCategory, TaskDefinition};

/// Where each category's task file lives.
#[derive(Debug, Clone)]
pub struct RegistryPaths {
    pub fusion: PathBuf,
    pub script: PathBuf,
    pub write_file: PathBuf,
}

/// Every task a caller may trigger, keyed by category then name.
/// Built once at startup and never modified afterwards.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskCategory, HashMap<String, TaskDefinition>>,
}

impl TaskRegistry {
    /// Load all three task files. Any unreadable or malformed file fails the
    /// whole load so a partial registry is never served.
    pub fn load(paths: &RegistryPaths) -> Result<Self> {
        let fusion: HashMap<String, FusionTask> = read_file(TaskCategory::Fusion, &paths.fusion)?;
        let script: HashMap<String, ScriptTask> = read_file(TaskCategory::Script, &paths.script)?;
        let write_file: HashMap<String, FileWriteTask> =
            read_file(TaskCategory::WriteFile, &paths.write_file)?;

        Ok(Self::from_entries(fusion, script, write_file))
    }

    /// Build a registry from already-parsed entries.
    pub fn from_entries(
        fusion: HashMap<String, FusionTask>,
        script: HashMap<String, ScriptTask>,
        write_file: HashMap<String, FileWriteTask>,
    ) -> Self {
        let mut tasks = HashMap::new();
        tasks.insert(
            TaskCategory::Fusion,
            wrap(fusion, TaskDefinition::Fusion),
        );
        tasks.insert(
            TaskCategory::Script,
            wrap(script, TaskDefinition::Script),
        );
        tasks.insert(
            TaskCategory::WriteFile,
            wrap(write_file, TaskDefinition::WriteFile),
        );
        Self { tasks }
    }

    /// Exact-match lookup.
    pub fn resolve(&self, category: TaskCategory, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(&category).and_then(|tasks| tasks.get(name))
    }

    /// Sorted task names for a category.
    pub fn names(&self, category: TaskCategory) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .tasks
            .get(&category)
            .map(|tasks| tasks.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn wrap<T>(
    entries: HashMap<String, T>,
    variant: fn(T) -> TaskDefinition,
) -> HashMap<String, TaskDefinition> {
    entries
        .into_iter()
        .map(|(name, entry)| (name, variant(entry)))
        .collect()
}

fn read_file<T: DeserializeOwned>(category: TaskCategory, path: &Path) -> Result<HashMap<String, T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {category} task file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("malformed {category} task file {}", path.display()))
}
