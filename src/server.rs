//! HTTP boundary: turns requests into [`TaskRequest`]s and
//! [`DispatchResult`]s into responses.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::dispatch::{DispatchResult, Dispatcher, TaskRequest};
use crate::tasks::{Outcome, TaskCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// JSON body returned for dispatched tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_written: Option<usize>,
}

impl TaskResponse {
    fn bare(status: Status) -> Self {
        Self {
            status,
            exit_code: None,
            stdout: None,
            stderr: None,
            bytes_written: None,
        }
    }
}

impl From<Outcome> for TaskResponse {
    fn from(outcome: Outcome) -> Self {
        let status = if outcome.is_success() {
            Status::Success
        } else {
            Status::Error
        };
        match outcome {
            Outcome::Completed(output) | Outcome::Failed(output) => Self {
                exit_code: Some(output.exit_code),
                stdout: Some(output.stdout),
                stderr: Some(output.stderr),
                ..Self::bare(status)
            },
            Outcome::Written { bytes, .. } => Self {
                bytes_written: Some(bytes),
                ..Self::bare(status)
            },
            // a timeout looks like any other failure to the caller
            Outcome::TimedOut { .. } | Outcome::WriteFailed { .. } => Self::bare(status),
        }
    }
}

impl IntoResponse for DispatchResult {
    fn into_response(self) -> Response {
        match self {
            // no body, no hint about what failed
            DispatchResult::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            DispatchResult::UnknownTask | DispatchResult::DispatchFailed => (
                StatusCode::BAD_GATEWAY,
                Json(TaskResponse::bare(Status::Error)),
            )
                .into_response(),
            DispatchResult::Finished(outcome) => {
                (StatusCode::OK, Json(TaskResponse::from(outcome))).into_response()
            }
        }
    }
}

/// Build the router. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so client addresses
/// reach the logs.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/run/{category}/{task}", get(run_handler).post(run_handler))
        .route("/run-zbspec/{fpgm}", get(run_zbspec_handler))
        .with_state(dispatcher)
}

/// GET /health - unauthenticated liveness probe
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET|POST /run/{category}/{task} - dispatch a registered task
async fn run_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((category, task)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> DispatchResult {
    dispatcher
        .dispatch(build_request(category, task, &headers, body, addr))
        .await
}

/// GET /run-zbspec/{fpgm} - the connector's original fusion route
async fn run_zbspec_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(fpgm): Path<String>,
    headers: HeaderMap,
) -> DispatchResult {
    let category = TaskCategory::Fusion.to_string();
    dispatcher
        .dispatch(build_request(category, fpgm, &headers, Bytes::new(), addr))
        .await
}

fn build_request(
    category: String,
    task: String,
    headers: &HeaderMap,
    body: Bytes,
    addr: SocketAddr,
) -> TaskRequest {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    TaskRequest {
        category,
        task,
        authorization,
        body,
        client: addr.ip().to_string(),
    }
}
