use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use echolens_core::agents::{Agent, AgentRun};
use echolens_core::errors::GatewayError;
use echolens_core::provider::EventStream;
use echolens_core::stream::StreamEvent;

use crate::emitter::{ChunkSink, EventEmitter};
use crate::error::PipelineError;
use crate::launcher::LaunchedAgent;

/// Result of one drain task, tagged with the agent's roster index.
pub type DrainOutcome = (usize, Result<AgentRun, PipelineError>);

/// Spawn one drain task per launched agent.
///
/// `launched` must be in roster order; the index each task reports is its
/// position in that vector.
pub fn spawn_drains(
    launched: Vec<LaunchedAgent>,
    emitter: &EventEmitter,
    idle_timeout: Duration,
    cancel: &CancellationToken,
) -> JoinSet<DrainOutcome> {
    let mut tasks = JoinSet::new();
    for (index, LaunchedAgent { agent, stream }) in launched.into_iter().enumerate() {
        let sink = emitter.chunk_sink(&agent);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let outcome = drain(agent, stream, sink, idle_timeout, cancel).await;
            (index, outcome)
        });
    }
    tasks
}

/// Read one agent's stream to its end, relaying every fragment as it arrives.
///
/// The returned run is the only copy of this agent's accumulated text; no
/// other task touches it.
pub async fn drain(
    agent: Agent,
    mut stream: EventStream,
    sink: ChunkSink,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> Result<AgentRun, PipelineError> {
    let mut run = AgentRun::new(agent);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            next = tokio::time::timeout(idle_timeout, stream.next()) => next,
        };

        match next {
            Err(_) => {
                return Err(PipelineError::AgentStream {
                    agent: agent.name,
                    source: GatewayError::Timeout(idle_timeout),
                })
            }
            Ok(None) | Ok(Some(StreamEvent::Done { .. })) => break,
            Ok(Some(StreamEvent::Start)) => {}
            Ok(Some(StreamEvent::TextDelta { delta })) => {
                if delta.is_empty() {
                    continue;
                }
                run.push_chunk(&delta);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                    sent = sink.send(delta) => sent?,
                }
            }
            Ok(Some(StreamEvent::Error { error })) => {
                tracing::warn!(agent = agent.name, error = %error, "agent stream failed");
                return Err(PipelineError::AgentStream {
                    agent: agent.name,
                    source: error,
                });
            }
        }
    }

    run.mark_complete();
    tracing::info!(
        agent = agent.name,
        chunks = run.chunk_count(),
        bytes = run.accumulated_text().len(),
        "agent stream complete"
    );
    Ok(run)
}
