use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, error};

use super::{Outcome, ProcessOutput, TaskDefinition};
use crate::consts::{CHUNK_JOIN, CHUNK_SIZE, FUSION_ARGS, KILL_GRACE};

/// Runs a resolved task. `Err` means the task could not be started at all;
/// everything that happens after that is reported through [`Outcome`].
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, definition: &TaskDefinition, body: Bytes) -> Result<Outcome>;
}

/// Where and for how long processes of one category run.
#[derive(Debug, Clone)]
pub struct ProcessSettings {
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Configuration for [`ProcessExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Executable every fusion task goes through.
    pub fusion_exe: PathBuf,
    pub fusion: ProcessSettings,
    pub script: ProcessSettings,
}

/// Spawns one child per task, without a shell, and collects its output.
pub struct ProcessExecutor {
    config: ExecutorConfig,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    async fn run_process(
        &self,
        program: &Path,
        args: &[String],
        settings: &ProcessSettings,
    ) -> Result<Outcome> {
        let started = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&settings.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, so a timeout can take down everything the task started
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", program.display()))?;

        debug!(program = %program.display(), pid = ?child.id(), "process started");

        let stdout = child.stdout.take().context("child stdout was not captured")?;
        let stderr = child.stderr.take().context("child stderr was not captured")?;

        let collected = tokio::time::timeout(settings.timeout, async {
            futures::future::join3(read_chunks(stdout), read_chunks(stderr), child.wait()).await
        })
        .await;

        match collected {
            Ok((stdout, stderr, status)) => {
                let status = status.context("failed to wait for process")?;
                let output = ProcessOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: join_chunks(&stdout.context("failed to read stdout")?),
                    stderr: join_chunks(&stderr.context("failed to read stderr")?),
                };
                debug!(
                    exit_code = output.exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "process exited"
                );
                if status.success() {
                    Ok(Outcome::Completed(output))
                } else {
                    Ok(Outcome::Failed(output))
                }
            }
            Err(_elapsed) => {
                let (killed, reaped) = terminate(&mut child).await;
                error!(
                    op = "task.timeout",
                    program = %program.display(),
                    limit_secs = settings.timeout.as_secs(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    killed,
                    reaped,
                    "process exceeded its time limit"
                );
                Ok(Outcome::TimedOut {
                    limit: settings.timeout,
                })
            }
        }
    }

    async fn write_file(&self, path: &Path, body: Bytes) -> Outcome {
        match tokio::fs::write(path, &body).await {
            Ok(()) => Outcome::Written {
                path: path.to_path_buf(),
                bytes: body.len(),
            },
            Err(e) => Outcome::WriteFailed {
                path: path.to_path_buf(),
                error: e.to_string(),
            },
        }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn run(&self, definition: &TaskDefinition, body: Bytes) -> Result<Outcome> {
        match definition {
            TaskDefinition::Fusion(task) => {
                let args: Vec<String> = FUSION_ARGS
                    .iter()
                    .map(|a| a.to_string())
                    .chain(std::iter::once(task.fpgm.clone()))
                    .collect();
                self.run_process(&self.config.fusion_exe, &args, &self.config.fusion)
                    .await
            }
            TaskDefinition::Script(task) => {
                self.run_process(Path::new(&task.command), &task.args, &self.config.script)
                    .await
            }
            TaskDefinition::WriteFile(task) => Ok(self.write_file(&task.destination, body).await),
        }
    }
}

/// Kill the child and its process group, then give it [`KILL_GRACE`] to be
/// reaped. Returns whether a kill was delivered and whether the child exited.
async fn terminate(child: &mut Child) -> (bool, bool) {
    let group = kill_group(child).await;
    let direct = child.start_kill().is_ok();
    let reaped = tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok();
    (group || direct, reaped)
}

#[cfg(unix)]
async fn kill_group(child: &Child) -> bool {
    let Some(pid) = child.id() else {
        return false;
    };
    Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

#[cfg(not(unix))]
async fn kill_group(_child: &Child) -> bool {
    false
}

/// Drain a pipe, keeping each read as its own chunk.
async fn read_chunks<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(chunks);
        }
        chunks.push(buf[..n].to_vec());
    }
}

/// Join chunks with a single space, then decode lossily.
fn join_chunks(chunks: &[Vec<u8>]) -> String {
    let joined = chunks.join(&CHUNK_JOIN);
    String::from_utf8_lossy(&joined).into_owned()
}
