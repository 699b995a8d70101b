use tokio::sync::mpsc;

use echolens_core::agents::Agent;
use echolens_core::errors::GatewayError;
use echolens_core::events::{AnalysisResult, ProgressEvent};

use crate::error::PipelineError;

/// Owning end of one invocation's outbound event channel.
///
/// `finish` and `fail` consume the emitter, so nothing can be emitted
/// after the terminal event. The receiver sees end-of-stream once the
/// emitter and every [`ChunkSink`] have been dropped.
pub struct EventEmitter {
    tx: mpsc::Sender<ProgressEvent>,
}

impl EventEmitter {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// A sender for one agent's chunks.
    pub fn chunk_sink(&self, agent: &Agent) -> ChunkSink {
        ChunkSink {
            agent_name: agent.name,
            tx: self.tx.clone(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn finish(self, result: AnalysisResult) -> Result<(), PipelineError> {
        self.tx
            .send(ProgressEvent::Final { result })
            .await
            .map_err(|_| PipelineError::ClientDisconnected)
    }

    /// Best effort: if the caller is already gone there is no one to tell.
    pub async fn fail(self, error: &PipelineError) {
        let event = ProgressEvent::Failed {
            kind: error.error_kind(),
            upstream: error.gateway_error().map(GatewayError::error_kind),
            message: error.to_string(),
        };
        if self.tx.send(event).await.is_err() {
            tracing::debug!(kind = error.error_kind(), "failure not delivered, receiver gone");
        }
    }
}

/// Per-agent chunk sender handed to a drain task.
#[derive(Clone)]
pub struct ChunkSink {
    agent_name: &'static str,
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChunkSink {
    pub fn agent_name(&self) -> &'static str {
        self.agent_name
    }

    pub async fn send(&self, text: String) -> Result<(), PipelineError> {
        self.tx
            .send(ProgressEvent::Chunk {
                agent_name: self.agent_name.to_string(),
                text,
            })
            .await
            .map_err(|_| PipelineError::ClientDisconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use echolens_core::agents::{ADVOCATE, SKEPTIC};
    use echolens_core::events::ArgumentMap;

    fn result() -> AnalysisResult {
        AnalysisResult {
            echo_score: 10.0,
            argument_map: ArgumentMap::default(),
            agent_reports: vec![],
        }
    }

    #[tokio::test]
    async fn chunks_then_final_then_closed() {
        let (emitter, mut rx) = EventEmitter::channel(8);
        let sink = emitter.chunk_sink(&ADVOCATE);
        sink.send("a".into()).await.unwrap();
        drop(sink);
        emitter.finish(result()).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Chunk {
                agent_name: "Advocate".into(),
                text: "a".into()
            })
        );
        assert!(matches!(rx.recv().await, Some(ProgressEvent::Final { .. })));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn fail_sends_kind_and_message() {
        let (emitter, mut rx) = EventEmitter::channel(8);
        emitter.fail(&PipelineError::Cancelled).await;
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Failed {
                kind: "cancelled",
                upstream: None,
                message: "analysis cancelled".into()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn fail_names_upstream_kind() {
        let (emitter, mut rx) = EventEmitter::channel(8);
        emitter
            .fail(&PipelineError::Synthesis(GatewayError::RateLimited))
            .await;
        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Failed {
                kind: "synthesis_failed",
                upstream: Some("rate_limited"),
                message: "synthesis failed: rate limited".into()
            })
        );
    }

    #[tokio::test]
    async fn dropped_receiver_reports_disconnect() {
        let (emitter, rx) = EventEmitter::channel(8);
        drop(rx);
        assert!(emitter.is_closed());
        let sink = emitter.chunk_sink(&SKEPTIC);
        assert!(matches!(
            sink.send("x".into()).await,
            Err(PipelineError::ClientDisconnected)
        ));
        assert!(matches!(
            emitter.finish(result()).await,
            Err(PipelineError::ClientDisconnected)
        ));
    }
}
