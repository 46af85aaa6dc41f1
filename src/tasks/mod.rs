pub mod executor;
pub mod registry;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use executor::{Executor, ExecutorConfig, ProcessExecutor, ProcessSettings};
pub use registry::{RegistryPaths, TaskRegistry};

/// The three kinds of work a caller may trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    /// Run a program through the fusion executable.
    Fusion,
    /// Run a registered script command.
    Script,
    /// Write the request body to a registered path.
    WriteFile,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 3] = [Self::Fusion, Self::Script, Self::WriteFile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fusion => "fusion",
            Self::Script => "script",
            Self::WriteFile => "write-file",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fusion" => Ok(Self::Fusion),
            "script" | "hhjs" => Ok(Self::Script),
            "write-file" => Ok(Self::WriteFile),
            other => anyhow::bail!("unknown task category: {other}"),
        }
    }
}

/// A fusion program, run as `<fusion exe> RUN ZBSPEC <fpgm>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FusionTask {
    pub fpgm: String,
}

/// A script invocation fully described by its registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptTask {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A destination the request body is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileWriteTask {
    pub destination: PathBuf,
}

/// A resolved registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDefinition {
    Fusion(FusionTask),
    Script(ScriptTask),
    WriteFile(FileWriteTask),
}

impl TaskDefinition {
    pub fn category(&self) -> TaskCategory {
        match self {
            Self::Fusion(_) => TaskCategory::Fusion,
            Self::Script(_) => TaskCategory::Script,
            Self::WriteFile(_) => TaskCategory::WriteFile,
        }
    }
}

/// Everything a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// -1 when the process was ended by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// How a task ended. A non-zero exit is an expected outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(ProcessOutput),
    Failed(ProcessOutput),
    /// Killed after exceeding its budget. Partial output is discarded.
    TimedOut { limit: Duration },
    Written { path: PathBuf, bytes: usize },
    WriteFailed { path: PathBuf, error: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Written { .. })
    }
}
