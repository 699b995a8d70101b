use futures::StreamExt;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tokio_util::sync::CancellationToken;

use echolens_core::agents::AgentRun;
use echolens_core::errors::GatewayError;
use echolens_core::provider::{GenerationRequest, LlmProvider};
use echolens_core::stream::StreamEvent;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::launcher::start_stream;

pub const SYNTHESIS_INSTRUCTION: &str = "\
You aggregate reviewer reports about a video transcript into a single verdict. \
The input is a JSON object mapping each reviewer's name to its findings. \
Respond with one JSON object and nothing else, containing exactly these fields: \
\"echoScore\" (a number from 0 to 100 estimating how strongly the content reinforces \
a single viewpoint), \"mainPoints\" (an array of strings, the central claims made), \
and \"counterpoints\" (an array of strings, the strongest missing or opposing arguments).";

/// Reviewer findings keyed by agent name, serialized in roster order.
pub struct FindingsDigest<'a> {
    runs: &'a [AgentRun],
}

impl<'a> FindingsDigest<'a> {
    pub fn new(runs: &'a [AgentRun]) -> Self {
        Self { runs }
    }
}

impl Serialize for FindingsDigest<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.runs.len()))?;
        for run in self.runs {
            map.serialize_entry(run.agent().name, run.accumulated_text())?;
        }
        map.end()
    }
}

pub fn synthesis_request(runs: &[AgentRun]) -> Result<GenerationRequest, PipelineError> {
    let input = serde_json::to_string(&FindingsDigest::new(runs))
        .map_err(|e| PipelineError::Internal(format!("failed to encode findings: {e}")))?;
    Ok(GenerationRequest::new(SYNTHESIS_INSTRUCTION, input))
}

/// Run the synthesis call and buffer its whole output.
///
/// Nothing is relayed to the caller while this runs.
pub async fn synthesize(
    provider: &dyn LlmProvider,
    runs: &[AgentRun],
    config: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    let request = synthesis_request(runs)?;

    let mut stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
        started = start_stream(provider, &request, &config.synthesis_options, config.start_timeout) => {
            started.map_err(PipelineError::Synthesis)?
        }
    };

    let mut text = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            next = tokio::time::timeout(config.idle_timeout, stream.next()) => next,
        };

        match next {
            Err(_) => {
                return Err(PipelineError::Synthesis(GatewayError::Timeout(
                    config.idle_timeout,
                )))
            }
            Ok(None) => break,
            Ok(Some(StreamEvent::Start)) => {}
            Ok(Some(StreamEvent::TextDelta { delta })) => text.push_str(&delta),
            Ok(Some(StreamEvent::Done { text: full, .. })) => {
                if text.is_empty() {
                    text = full;
                }
                break;
            }
            Ok(Some(StreamEvent::Error { error })) => return Err(PipelineError::Synthesis(error)),
        }
    }

    tracing::info!(bytes = text.len(), "synthesis complete");
    Ok(text)
}
