use echolens_core::errors::GatewayError;
use echolens_core::request::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("agent {agent} failed to start: {source}")]
    Launch {
        agent: &'static str,
        source: GatewayError,
    },

    #[error("agent {agent} stream failed: {source}")]
    AgentStream {
        agent: &'static str,
        source: GatewayError,
    },

    #[error("synthesis failed: {0}")]
    Synthesis(GatewayError),

    #[error("could not decode synthesis output ({raw_len} bytes): {message}")]
    Decode { message: String, raw_len: usize },

    #[error("analysis cancelled")]
    Cancelled,

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable classification string for the wire and for logs.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Launch { .. } => "launch_failed",
            Self::AgentStream { .. } => "agent_stream_failed",
            Self::Synthesis(_) => "synthesis_failed",
            Self::Decode { .. } => "decode_failed",
            Self::Cancelled => "cancelled",
            Self::ClientDisconnected => "client_disconnected",
            Self::Internal(_) => "internal",
        }
    }

    /// The upstream error underneath, if any.
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            Self::Launch { source, .. } | Self::AgentStream { source, .. } => Some(source),
            Self::Synthesis(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.gateway_error(), Some(GatewayError::Timeout(_)))
    }
}
