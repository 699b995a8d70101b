use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use echolens_core::agents::AgentRun;
use echolens_core::events::{AgentReport, AnalysisResult, ArgumentMap};

use crate::error::PipelineError;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[A-Za-z0-9]*\s*").unwrap());

static TRAILING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```\s*$").unwrap());

/// Remove a markdown code fence wrapped around model output.
///
/// Either fence may be missing. Text between the fences is returned as is,
/// minus surrounding whitespace.
pub fn strip_code_fences(text: &str) -> &str {
    let start = LEADING_FENCE.find(text).map_or(0, |m| m.end());
    let rest = &text[start..];
    let end = TRAILING_FENCE.find(rest).map_or(rest.len(), |m| m.start());
    rest[..end].trim()
}

/// The structured verdict the synthesis call must produce.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisVerdict {
    pub echo_score: f64,
    pub main_points: Vec<String>,
    pub counterpoints: Vec<String>,
}

pub fn decode_verdict(raw: &str) -> Result<SynthesisVerdict, PipelineError> {
    let body = strip_code_fences(raw);
    let mut verdict: SynthesisVerdict =
        serde_json::from_str(body).map_err(|e| PipelineError::Decode {
            message: e.to_string(),
            raw_len: raw.len(),
        })?;

    if !verdict.echo_score.is_finite() {
        return Err(PipelineError::Decode {
            message: "echoScore is not a finite number".into(),
            raw_len: raw.len(),
        });
    }
    if !(0.0..=100.0).contains(&verdict.echo_score) {
        let clamped = verdict.echo_score.clamp(0.0, 100.0);
        tracing::warn!(score = verdict.echo_score, clamped, "echoScore out of range");
        verdict.echo_score = clamped;
    }

    Ok(verdict)
}

/// Combine the verdict with every agent's findings, in roster order.
pub fn assemble_result(verdict: SynthesisVerdict, runs: Vec<AgentRun>) -> AnalysisResult {
    let agent_reports = runs
        .into_iter()
        .map(|run| AgentReport {
            agent: run.agent().name.to_string(),
            findings: run.into_text(),
        })
        .collect();

    AnalysisResult {
        echo_score: verdict.echo_score,
        argument_map: ArgumentMap {
            main_points: verdict.main_points,
            counterpoints: verdict.counterpoints,
        },
        agent_reports,
    }
}
