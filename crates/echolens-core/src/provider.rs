use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::GatewayError;
use crate::stream::StreamEvent;

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// One call to the upstream service: a governing instruction plus the
/// payload it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub instruction: String,
    pub input: String,
}

impl GenerationRequest {
    pub fn new(instruction: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            input: input.into(),
        }
    }
}

/// Options controlling generation behavior.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

/// Trait implemented by each upstream generation service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Start a generation stream. Returning `Ok` means the upstream accepted
    /// the request; failures after that arrive as `StreamEvent::Error`.
    async fn stream(
        &self,
        request: &GenerationRequest,
        options: &StreamOptions,
    ) -> Result<EventStream, GatewayError>;
}
