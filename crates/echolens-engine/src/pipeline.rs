use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use echolens_core::agents::Roster;
use echolens_core::events::AnalysisResult;
use echolens_core::ids::AnalysisId;
use echolens_core::provider::LlmProvider;
use echolens_core::request::AnalysisRequest;

use crate::config::PipelineConfig;
use crate::decoder::{assemble_result, decode_verdict};
use crate::emitter::EventEmitter;
use crate::error::PipelineError;
use crate::gate::await_all;
use crate::launcher::{launch, LaunchedAgent};
use crate::multiplexer::spawn_drains;
use crate::synthesizer::synthesize;

/// Runs analyses against one provider with a fixed roster.
///
/// Holds no per-invocation state; concurrent invocations share only the
/// provider handle and the roster.
pub struct AnalysisPipeline {
    provider: Arc<dyn LlmProvider>,
    roster: Roster,
    config: PipelineConfig,
}

/// An invocation whose agent streams have all started.
pub struct LaunchedAnalysis {
    id: AnalysisId,
    agents: Vec<LaunchedAgent>,
}

impl LaunchedAnalysis {
    pub fn id(&self) -> &AnalysisId {
        &self.id
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

impl AnalysisPipeline {
    pub fn new(provider: Arc<dyn LlmProvider>, roster: Roster, config: PipelineConfig) -> Self {
        Self {
            provider,
            roster,
            config,
        }
    }

    pub fn provider(&self) -> &dyn LlmProvider {
        self.provider.as_ref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start every agent's stream. Nothing is emitted yet, so a failure here
    /// can still be reported to the caller as a plain error.
    pub async fn launch(&self, request: &AnalysisRequest) -> Result<LaunchedAnalysis, PipelineError> {
        let id = AnalysisId::new();
        let span = tracing::info_span!("analysis", analysis_id = %id);
        async {
            tracing::info!(video_url = request.video_url(), "starting analysis");
            let agents = launch(
                self.provider.as_ref(),
                &self.roster,
                request,
                &self.config.agent_options,
                self.config.start_timeout,
            )
            .await
            .inspect_err(|e| tracing::error!(error = %e, "launch failed"))?;
            Ok::<_, PipelineError>(LaunchedAnalysis { id, agents })
        }
        .instrument(span)
        .await
    }

    /// Relay agent output, then synthesize and emit the terminal event.
    ///
    /// Exactly one of `Final` or `Failed` is emitted, always last.
    pub async fn complete(
        &self,
        launched: LaunchedAnalysis,
        emitter: EventEmitter,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let span = tracing::info_span!("analysis", analysis_id = %launched.id);
        async move {
            match self.produce(launched.agents, &emitter, &cancel).await {
                Ok(result) => {
                    emitter.finish(result.clone()).await.inspect_err(|_| {
                        tracing::warn!("client disconnected before final result");
                    })?;
                    tracing::info!(echo_score = result.echo_score, "analysis complete");
                    Ok(result)
                }
                Err(e) => {
                    match &e {
                        PipelineError::ClientDisconnected | PipelineError::Cancelled => {
                            tracing::warn!(kind = e.error_kind(), "analysis abandoned");
                        }
                        _ => tracing::error!(kind = e.error_kind(), error = %e, "analysis failed"),
                    }
                    emitter.fail(&e).await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Launch and complete in one call. A launch failure is emitted as
    /// `Failed` like any other.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        emitter: EventEmitter,
        cancel: CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let launched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            launched = self.launch(request) => launched,
        };
        match launched {
            Ok(launched) => self.complete(launched, emitter, cancel).await,
            Err(e) => {
                emitter.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn produce(
        &self,
        agents: Vec<LaunchedAgent>,
        emitter: &EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, PipelineError> {
        let tasks = spawn_drains(agents, emitter, self.config.idle_timeout, cancel);
        let runs = await_all(tasks, self.roster.len()).await?;
        let raw = synthesize(self.provider.as_ref(), &runs, &self.config, cancel).await?;
        let verdict = decode_verdict(&raw)?;
        Ok(assemble_result(verdict, runs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use echolens_core::agents::{ADVOCATE, SKEPTIC, SYNTHESIZER};
    use echolens_core::errors::GatewayError;
    use echolens_core::events::ProgressEvent;
    use echolens_llm::{MockProvider, MockResponse};
    use tokio::sync::mpsc;

    use crate::synthesizer::SYNTHESIS_INSTRUCTION;

    const VERDICT: &str = "```json\n{\"echoScore\":72,\"mainPoints\":[\"A\"],\"counterpoints\":[\"B\"]}\n```";

    fn scripted(synthesis: MockResponse) -> MockProvider {
        MockProvider::new()
            .on(
                ADVOCATE.persona,
                MockResponse::paced(Duration::from_millis(10), &["The speaker ", "argues well."]),
            )
            .on(
                SKEPTIC.persona,
                MockResponse::paced(Duration::from_millis(15), &["Evidence is ", "cherry-picked."]),
            )
            .on(
                SYNTHESIZER.persona,
                MockResponse::paced(Duration::from_millis(12), &["Mostly ", "one-sided."]),
            )
            .on(SYNTHESIS_INSTRUCTION, synthesis)
    }

    fn pipeline(mock: MockProvider) -> AnalysisPipeline {
        AnalysisPipeline::new(Arc::new(mock), Roster::default(), PipelineConfig::default())
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("https://youtu.be/abc", "Is this balanced?").unwrap()
    }

    async fn collect(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn three_agents_stream_then_final_result() {
        tokio::time::pause();
        let pipeline = pipeline(scripted(MockResponse::stream_text(VERDICT)));
        let (emitter, rx) = EventEmitter::channel(64);

        let result = pipeline
            .run(&request(), emitter, CancellationToken::new())
            .await
            .unwrap();
        let events = collect(rx).await;

        assert_eq!(events.len(), 7);
        assert!(events[..6]
            .iter()
            .all(|e| matches!(e, ProgressEvent::Chunk { .. })));
        assert_eq!(events[6], ProgressEvent::Final { result: result.clone() });

        assert_eq!(result.echo_score, 72.0);
        assert_eq!(result.argument_map.main_points, vec!["A"]);
        assert_eq!(result.argument_map.counterpoints, vec!["B"]);
        let agents: Vec<_> = result.agent_reports.iter().map(|r| r.agent.as_str()).collect();
        assert_eq!(agents, vec!["Advocate", "Skeptic", "Synthesizer"]);

        // Each report is exactly the concatenation of that agent's chunks.
        for report in &result.agent_reports {
            let relayed: String = events
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::Chunk { agent_name, text } if *agent_name == report.agent => {
                        Some(text.as_str())
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(relayed, report.findings);
        }
        assert_eq!(result.agent_reports[1].findings, "Evidence is cherry-picked.");
    }

    #[tokio::test]
    async fn synthesis_sees_roster_ordered_findings() {
        tokio::time::pause();
        let mock = Arc::new(scripted(MockResponse::stream_text(VERDICT)));
        let pipeline = AnalysisPipeline::new(mock.clone(), Roster::default(), PipelineConfig::default());
        let (emitter, _rx) = EventEmitter::channel(64);
        pipeline
            .run(&request(), emitter, CancellationToken::new())
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 4);
        let synthesis = requests.last().unwrap();
        assert_eq!(synthesis.instruction, SYNTHESIS_INSTRUCTION);
        assert_eq!(
            synthesis.input,
            r#"{"Advocate":"The speaker argues well.","Skeptic":"Evidence is cherry-picked.","Synthesizer":"Mostly one-sided."}"#
        );
    }

    #[tokio::test]
    async fn malformed_synthesis_emits_error_and_no_final() {
        tokio::time::pause();
        let pipeline = pipeline(scripted(MockResponse::stream_text("{\"echoScore\": 72, \"main")));
        let (emitter, rx) = EventEmitter::channel(64);

        let err = pipeline
            .run(&request(), emitter, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_kind(), "decode_failed");

        let events = collect(rx).await;
        assert_eq!(events.len(), 7);
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Failed { kind: "decode_failed", .. })
        ));
        assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Final { .. })));
    }

    #[tokio::test]
    async fn agent_failure_skips_synthesis() {
        tokio::time::pause();
        let mock = Arc::new(
            MockProvider::new()
                .on(ADVOCATE.persona, MockResponse::chunks(&["fine"]))
                .on(
                    SKEPTIC.persona,
                    MockResponse::partial_then_error(
                        &["half"],
                        GatewayError::StreamInterrupted("reset".into()),
                    ),
                )
                .on(SYNTHESIZER.persona, MockResponse::Hang)
                .on(SYNTHESIS_INSTRUCTION, MockResponse::stream_text(VERDICT)),
        );
        let pipeline = AnalysisPipeline::new(mock.clone(), Roster::default(), PipelineConfig::default());
        let (emitter, rx) = EventEmitter::channel(64);

        let err = pipeline
            .run(&request(), emitter, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AgentStream { agent: "Skeptic", .. }));
        assert_eq!(mock.call_count(), 3);

        let events = collect(rx).await;
        let terminal: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
        assert_eq!(terminal.len(), 1);
        assert!(events.last().is_some_and(|e| matches!(
            e,
            ProgressEvent::Failed {
                kind: "agent_stream_failed",
                upstream: Some("stream_interrupted"),
                ..
            }
        )));
    }

    #[tokio::test]
    async fn launch_failure_returns_error_before_any_event() {
        let mock = MockProvider::new()
            .on(ADVOCATE.persona, MockResponse::chunks(&["x"]))
            .on(
                SKEPTIC.persona,
                MockResponse::Error(GatewayError::AuthenticationFailed("bad key".into())),
            )
            .on(SYNTHESIZER.persona, MockResponse::chunks(&["y"]));
        let pipeline = pipeline(mock);

        let err = pipeline.launch(&request()).await.err().unwrap();
        assert_eq!(err.error_kind(), "launch_failed");
    }

    #[tokio::test]
    async fn launched_analysis_reports_agent_count() {
        tokio::time::pause();
        let pipeline = pipeline(scripted(MockResponse::stream_text(VERDICT)));
        let launched = pipeline.launch(&request()).await.unwrap();
        assert_eq!(launched.agent_count(), 3);
        assert!(launched.id().as_str().starts_with("anl_"));
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_run() {
        tokio::time::pause();
        let pipeline = pipeline(scripted(MockResponse::stream_text(VERDICT)));
        let (emitter, rx) = EventEmitter::channel(64);
        drop(rx);

        let err = pipeline
            .run(&request(), emitter, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ClientDisconnected));
    }

    #[tokio::test]
    async fn cancellation_ends_with_failed_event() {
        tokio::time::pause();
        let mock = MockProvider::new()
            .on(ADVOCATE.persona, MockResponse::Hang)
            .on(SKEPTIC.persona, MockResponse::Hang)
            .on(SYNTHESIZER.persona, MockResponse::Hang);
        let pipeline = Arc::new(pipeline(mock));
        let (emitter, rx) = EventEmitter::channel(64);
        let cancel = CancellationToken::new();

        let handle = {
            let pipeline = pipeline.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pipeline.run(&request(), emitter, cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![ProgressEvent::Failed {
                kind: "cancelled",
                upstream: None,
                message: "analysis cancelled".into()
            }]
        );
    }
}
