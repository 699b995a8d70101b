//! Outbound event wire format.
//!
//! Every progress event becomes one `{ type, payload }` envelope carried in a
//! single `data:` line. Clients split the raw body on `data: `, so a frame
//! never contains anything else.

use axum::response::sse::Event;
use serde::Serialize;

use echolens_core::events::{AnalysisResult, ProgressEvent};

#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum WireEvent<'a> {
    AgentChunk(ChunkPayload<'a>),
    FinalResult(&'a AnalysisResult),
    Error(ErrorPayload<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload<'a> {
    pub agent_name: &'a str,
    pub chunk: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload<'a> {
    pub kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<&'a str>,
    pub error: &'a str,
}

impl<'a> From<&'a ProgressEvent> for WireEvent<'a> {
    fn from(event: &'a ProgressEvent) -> Self {
        match event {
            ProgressEvent::Chunk { agent_name, text } => Self::AgentChunk(ChunkPayload {
                agent_name,
                chunk: text,
            }),
            ProgressEvent::Final { result } => Self::FinalResult(result),
            ProgressEvent::Failed {
                kind,
                upstream,
                message,
            } => Self::Error(ErrorPayload {
                kind,
                upstream: *upstream,
                error: message,
            }),
        }
    }
}

pub fn to_json(event: &ProgressEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireEvent::from(event))
}

/// Render a complete frame, `data: <json>` plus the blank line.
pub fn encode_frame(event: &ProgressEvent) -> Result<String, serde_json::Error> {
    Ok(format!("data: {}\n\n", to_json(event)?))
}

pub fn to_sse_event(event: &ProgressEvent) -> Result<Event, serde_json::Error> {
    Ok(Event::default().data(to_json(event)?))
}
