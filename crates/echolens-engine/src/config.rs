use std::time::Duration;

use echolens_core::provider::StreamOptions;

/// Tunables for one [`AnalysisPipeline`](crate::AnalysisPipeline).
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Upper bound on how long a single upstream call may take to start streaming.
    pub start_timeout: Duration,
    /// Upper bound on the gap between two fragments of one stream.
    pub idle_timeout: Duration,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
    pub agent_options: StreamOptions,
    pub synthesis_options: StreamOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            event_buffer: 256,
            agent_options: StreamOptions::default(),
            synthesis_options: StreamOptions {
                temperature: Some(0.2),
                max_tokens: None,
            },
        }
    }
}
