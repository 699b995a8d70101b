use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use echolens_core::errors::GatewayError;
use echolens_core::provider::{EventStream, GenerationRequest, LlmProvider, StreamOptions};
use echolens_core::stream::StreamEvent;

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    /// Yield a sequence of StreamEvents.
    Stream(Vec<StreamEvent>),
    /// Yield a sequence of StreamEvents, sleeping `interval` before each one.
    Paced(Duration, Vec<StreamEvent>),
    /// Return an error from the stream() call itself.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Start successfully, then never produce anything.
    Hang,
}

impl MockResponse {
    /// Convenience: a stream that yields each fragment as its own delta, then Done.
    pub fn chunks(fragments: &[&str]) -> Self {
        Self::Stream(text_events(fragments))
    }

    /// Convenience: like `chunks`, but with a pause before every event.
    pub fn paced(interval: Duration, fragments: &[&str]) -> Self {
        Self::Paced(interval, text_events(fragments))
    }

    /// Convenience: a single-fragment text response.
    pub fn stream_text(text: &str) -> Self {
        Self::chunks(&[text])
    }

    /// Convenience: yield some fragments, then fail mid-stream.
    pub fn partial_then_error(fragments: &[&str], error: GatewayError) -> Self {
        let mut events = vec![StreamEvent::Start];
        events.extend(fragments.iter().map(|f| StreamEvent::delta(*f)));
        events.push(StreamEvent::Error { error });
        Self::Stream(events)
    }

    /// Convenience: wrap any response with a delay.
    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

fn text_events(fragments: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::Start];
    events.extend(fragments.iter().map(|f| StreamEvent::delta(*f)));
    events.push(StreamEvent::Done {
        text: fragments.concat(),
        finish_reason: Some("STOP".into()),
    });
    events
}

/// Mock provider that answers each request by its instruction.
///
/// Responses are queued per instruction, so concurrent callers with distinct
/// personas get deterministic output regardless of call order.
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    call_count: AtomicUsize,
    dropped: Arc<AtomicUsize>,
}

/// Counts a stream as dropped when the stream that owns it goes away.
struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next call carrying `instruction`.
    pub fn on(self, instruction: &str, response: MockResponse) -> Self {
        self.responses
            .lock()
            .entry(instruction.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Streams handed out and since dropped by their consumer.
    pub fn dropped_streams(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(
        &self,
        request: &GenerationRequest,
        _options: &StreamOptions,
    ) -> Result<EventStream, GatewayError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let response = self
            .responses
            .lock()
            .get_mut(&request.instruction)
            .and_then(VecDeque::pop_front);

        match response {
            Some(response) => {
                let events = resolve_response(response).await?;
                let counter = DropCounter(Arc::clone(&self.dropped));
                Ok(Box::pin(events.map(move |event| {
                    let _owned = &counter;
                    event
                })))
            }
            None => Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for instruction {:?}",
                truncate(&request.instruction, 40)
            ))),
        }
    }
}

/// Resolve a MockResponse, handling Delay by sleeping first.
/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve_response(response: MockResponse) -> Result<EventStream, GatewayError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Stream(events) => return Ok(Box::pin(stream::iter(events))),
            MockResponse::Paced(interval, events) => {
                let paced = stream::iter(events).then(move |event| async move {
                    tokio::time::sleep(interval).await;
                    event
                });
                return Ok(Box::pin(paced));
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockResponse::Hang => {
                return Ok(Box::pin(
                    stream::iter(vec![StreamEvent::Start]).chain(stream::pending()),
                ))
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
