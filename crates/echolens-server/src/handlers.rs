use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::Sse;
use axum::response::{IntoResponse, Json, Response};
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;

use echolens_core::request::{AnalysisRequest, AnalyzeBody};
use echolens_engine::EventEmitter;

use crate::cancel::CancelOnDrop;
use crate::server::AppState;
use crate::wire;

const LAUNCH_FAILED: &str = "Failed to analyze video";
const INVALID_BODY: &str = "Invalid request body";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// POST /api/analyze
///
/// Validation and stream launch happen before the response starts, so their
/// failures are plain JSON errors. Everything after that is reported inside
/// the event stream.
pub async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected analyze body");
            return error_response(StatusCode::BAD_REQUEST, INVALID_BODY);
        }
    };

    let request = match AnalysisRequest::try_from(body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let launched = match state.pipeline.launch(&request).await {
        Ok(launched) => launched,
        Err(e) => {
            let status = if e.is_timeout() {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::BAD_GATEWAY
            };
            return error_response(status, LAUNCH_FAILED);
        }
    };

    let (emitter, rx) = EventEmitter::channel(state.pipeline.config().event_buffer);
    let cancel = state.shutdown.child_token();

    let pipeline = Arc::clone(&state.pipeline);
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        // Outcome is logged inside the pipeline span.
        let _ = pipeline.complete(launched, emitter, task_cancel).await;
    });

    let events = ReceiverStream::new(rx).map(|event| wire::to_sse_event(&event));
    let body = Sse::new(CancelOnDrop::new(events, cancel));

    ([(header::CONNECTION, "keep-alive")], body).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: String,
    pub model: String,
    pub roster: Vec<&'static str>,
    pub started_at: String,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.pipeline.provider();
    Json(HealthResponse {
        status: "healthy",
        provider: provider.name().to_string(),
        model: provider.model().to_string(),
        roster: state.pipeline.roster().names(),
        started_at: state.started_at.to_rfc3339(),
    })
}
