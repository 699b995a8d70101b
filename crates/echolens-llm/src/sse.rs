use serde::Deserialize;

use echolens_core::errors::GatewayError;
use echolens_core::stream::StreamEvent;

/// State machine for parsing Gemini `streamGenerateContent` SSE payloads.
#[derive(Default)]
pub struct GeminiChunkParser {
    text: String,
    finish_reason: Option<String>,
    started: bool,
}

impl GeminiChunkParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one `data:` payload and return zero or more StreamEvents.
    pub fn parse_data(&mut self, data: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.started {
            self.started = true;
            events.push(StreamEvent::Start);
        }

        let chunk: GenerateContentChunk = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, len = data.len(), "unparseable Gemini SSE chunk");
                events.push(StreamEvent::Error {
                    error: GatewayError::StreamInterrupted(format!("malformed chunk: {e}")),
                });
                return events;
            }
        };

        if let Some(err) = chunk.error {
            events.push(StreamEvent::Error {
                error: classify_error(&err),
            });
            return events;
        }

        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            events.push(StreamEvent::Error {
                error: GatewayError::Blocked(format!("prompt blocked: {reason}")),
            });
            return events;
        }

        for candidate in chunk.candidates.unwrap_or_default() {
            if let Some(content) = candidate.content {
                for part in content.parts.unwrap_or_default() {
                    // Thought parts are reasoning, not findings.
                    if part.thought == Some(true) {
                        continue;
                    }
                    if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                        self.text.push_str(&text);
                        events.push(StreamEvent::TextDelta { delta: text });
                    }
                }
            }
            if let Some(reason) = candidate.finish_reason {
                if reason == "SAFETY" || reason == "RECITATION" {
                    events.push(StreamEvent::Error {
                        error: GatewayError::Blocked(format!("generation stopped: {reason}")),
                    });
                    return events;
                }
                self.finish_reason = Some(reason);
            }
        }

        events
    }

    /// Build the end marker once the body has been fully read.
    pub fn finish(&mut self) -> StreamEvent {
        StreamEvent::Done {
            text: std::mem::take(&mut self.text),
            finish_reason: self.finish_reason.take(),
        }
    }
}

fn classify_error(err: &ChunkError) -> GatewayError {
    let message = err.message.clone().unwrap_or_default();
    match err.status.as_deref() {
        Some("RESOURCE_EXHAUSTED") => GatewayError::RateLimited,
        Some("UNAVAILABLE") => GatewayError::ProviderOverloaded,
        Some("UNAUTHENTICATED") | Some("PERMISSION_DENIED") => {
            GatewayError::AuthenticationFailed(message)
        }
        Some("INVALID_ARGUMENT") | Some("NOT_FOUND") | Some("FAILED_PRECONDITION") => {
            GatewayError::InvalidRequest(message)
        }
        _ => GatewayError::ServerError {
            status: err.code.unwrap_or(500),
            body: message,
        },
    }
}

/// Extract the `data:` payloads of every complete event in `raw`.
/// Multi-line data fields are joined with `\n`; comments and other fields
/// are ignored.
pub fn parse_sse_data(raw: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            if let Some(data) = current.take() {
                payloads.push(data);
            }
            continue;
        }
        if line.starts_with(':') {
            continue;
        }
        let value = if let Some(v) = line.strip_prefix("data:") {
            v.strip_prefix(' ').unwrap_or(v)
        } else {
            continue;
        };
        match &mut current {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => current = Some(value.to_string()),
        }
    }

    // Handle trailing event without blank line
    if let Some(data) = current {
        payloads.push(data);
    }

    payloads.retain(|d| !d.trim().is_empty() && d.trim() != "[DONE]");
    payloads
}

/// Find the end of the first complete SSE event in `buf`.
/// Returns `(event_end, separator_len)`.
pub fn find_event_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

// --- Deserialization types for Gemini stream chunks ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentChunk {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChunkError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}
