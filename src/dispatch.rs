//! Per-request coordinator: authenticate, resolve, execute, report.
//!
//! Every request ends in exactly one [`DispatchResult`]. Nothing a caller
//! sends can make [`Dispatcher::dispatch`] fail or panic the service.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

use crate::auth::Authenticator;
use crate::tasks::{Executor, Outcome, TaskCategory, TaskRegistry};

/// A request as it arrives at the boundary, before any validation.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub category: String,
    pub task: String,
    /// The presented one-time code; `None` when the header was absent or unreadable.
    pub authorization: Option<String>,
    pub body: Bytes,
    /// Caller address, for logs only.
    pub client: String,
}

/// Terminal state of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Unauthorized,
    UnknownTask,
    /// The task resolved but could not be started.
    DispatchFailed,
    Finished(Outcome),
}

pub struct Dispatcher {
    authenticator: Authenticator,
    registry: Arc<TaskRegistry>,
    executor: Arc<dyn Executor>,
}

impl Dispatcher {
    pub fn new(
        authenticator: Authenticator,
        registry: Arc<TaskRegistry>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            authenticator,
            registry,
            executor,
        }
    }

    pub async fn dispatch(&self, request: TaskRequest) -> DispatchResult {
        let authorized = request
            .authorization
            .as_deref()
            .is_some_and(|code| self.authenticator.validate(code));
        if !authorized {
            warn!(client = %request.client, "rejected request with invalid token");
            return DispatchResult::Unauthorized;
        }
        info!(client = %request.client, "received valid token");

        let Ok(category) = request.category.parse::<TaskCategory>() else {
            warn!(category = %request.category, task = %request.task, "unknown task category");
            return DispatchResult::UnknownTask;
        };
        let Some(definition) = self.registry.resolve(category, &request.task).cloned() else {
            warn!(%category, task = %request.task, "unknown task");
            return DispatchResult::UnknownTask;
        };

        info!(%category, task = %request.task, "executing task");
        let started = Instant::now();

        // Detached from the request future: a disconnecting client does not
        // cancel the task, only its own timeout does.
        let executor = Arc::clone(&self.executor);
        let body = request.body;
        let span = info_span!("task", %category, task = %request.task);
        let handle = tokio::spawn(
            async move { executor.run(&definition, body).await }.instrument(span),
        );

        let outcome = match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(%category, task = %request.task, error = ?e, "failed to start task");
                return DispatchResult::DispatchFailed;
            }
            Err(e) => {
                error!(%category, task = %request.task, error = %e, "task panicked");
                return DispatchResult::DispatchFailed;
            }
        };

        log_outcome(category, &request.task, &outcome, started);
        DispatchResult::Finished(outcome)
    }
}

fn log_outcome(category: TaskCategory, task: &str, outcome: &Outcome, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Outcome::Completed(output) => info!(
            %category,
            task,
            exit_code = output.exit_code,
            elapsed_ms,
            "task completed"
        ),
        Outcome::Failed(output) => error!(
            %category,
            task,
            exit_code = output.exit_code,
            stdout = %output.stdout,
            stderr = %output.stderr,
            elapsed_ms,
            "task exited with failure"
        ),
        // reported by the executor inside the task span, with the kill result
        Outcome::TimedOut { .. } => {}
        Outcome::Written { path, bytes } => info!(
            %category,
            task,
            path = %path.display(),
            bytes,
            "file written"
        ),
        Outcome::WriteFailed { path, error } => error!(
            %category,
            task,
            path = %path.display(),
            error = %error,
            "file write failed"
        ),
    }
}
