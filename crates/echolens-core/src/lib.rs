pub mod agents;
pub mod errors;
pub mod events;
pub mod ids;
pub mod provider;
pub mod request;
pub mod stream;

pub use agents::{Agent, AgentRun, Roster, ROSTER};
pub use errors::GatewayError;
pub use events::{AgentReport, AnalysisResult, ArgumentMap, ProgressEvent};
pub use ids::AnalysisId;
pub use provider::{EventStream, GenerationRequest, LlmProvider, StreamOptions};
pub use request::{AnalysisRequest, AnalyzeBody, ValidationError};
pub use stream::StreamEvent;
