use serde::{Deserialize, Serialize};

/// Terminal payload of one analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Confirmation-bias risk estimate, 0–100.
    pub echo_score: f64,
    pub argument_map: ArgumentMap,
    /// One entry per roster agent, in roster order.
    pub agent_reports: Vec<AgentReport>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentMap {
    pub main_points: Vec<String>,
    pub counterpoints: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReport {
    pub agent: String,
    pub findings: String,
}

/// Progress of one invocation as seen by the caller.
///
/// Ordering contract:
///
/// Chunk* → (Final | Failed)
///
/// Chunks for one agent arrive in the order the agent produced them; chunks
/// of different agents interleave arbitrarily.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Chunk { agent_name: String, text: String },
    Final { result: AnalysisResult },
    /// `upstream` names the generation service failure underneath, if any.
    Failed {
        kind: &'static str,
        upstream: Option<&'static str>,
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Failed { .. })
    }
}
