use std::time::Duration;

use futures::future::try_join_all;

use echolens_core::agents::{Agent, Roster};
use echolens_core::errors::GatewayError;
use echolens_core::provider::{EventStream, GenerationRequest, LlmProvider, StreamOptions};
use echolens_core::request::AnalysisRequest;

use crate::error::PipelineError;

/// An agent whose upstream stream has been accepted but not yet read.
pub struct LaunchedAgent {
    pub agent: Agent,
    pub stream: EventStream,
}

/// Start one upstream call, bounded by `timeout`.
pub(crate) async fn start_stream(
    provider: &dyn LlmProvider,
    request: &GenerationRequest,
    options: &StreamOptions,
    timeout: Duration,
) -> Result<EventStream, GatewayError> {
    match tokio::time::timeout(timeout, provider.stream(request, options)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
    }
}

/// Request one stream per roster agent, all at once.
///
/// Each agent gets its persona as the instruction and the same transcript
/// payload as input. If any start fails the whole launch fails and the
/// streams that did start are dropped.
pub async fn launch(
    provider: &dyn LlmProvider,
    roster: &Roster,
    request: &AnalysisRequest,
    options: &StreamOptions,
    start_timeout: Duration,
) -> Result<Vec<LaunchedAgent>, PipelineError> {
    let input = request.agent_input();

    let starts = roster.iter().map(|agent| {
        let generation = GenerationRequest::new(agent.persona, input.clone());
        async move {
            let stream = start_stream(provider, &generation, options, start_timeout)
                .await
                .map_err(|source| PipelineError::Launch {
                    agent: agent.name,
                    source,
                })?;
            Ok::<_, PipelineError>(LaunchedAgent {
                agent: *agent,
                stream,
            })
        }
    });

    let launched = try_join_all(starts).await?;
    tracing::info!(agents = launched.len(), model = provider.model(), "agent streams launched");
    Ok(launched)
}
