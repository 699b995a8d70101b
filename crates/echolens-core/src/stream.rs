use crate::errors::GatewayError;

/// Events yielded by one upstream generation stream.
///
/// Start → TextDelta* → Done
///
/// Error can appear at any point and is terminal. A stream that simply ends
/// without `Done` is treated as having reached its end marker.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,
    TextDelta { delta: String },
    Done { text: String, finish_reason: Option<String> },
    Error { error: GatewayError },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    pub fn delta(text: impl Into<String>) -> Self {
        Self::TextDelta { delta: text.into() }
    }
}
