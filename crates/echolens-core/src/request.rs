use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Missing videoUrl or userPrompt")]
pub struct ValidationError;

/// Raw inbound body. Fields are optional here so that a missing field is
/// reported the same way as an empty one.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub user_prompt: Option<String>,
}

/// A validated analysis request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRequest {
    video_url: String,
    user_prompt: String,
}

impl AnalysisRequest {
    pub fn new(video_url: &str, user_prompt: &str) -> Result<Self, ValidationError> {
        let video_url = video_url.trim();
        let user_prompt = user_prompt.trim();
        if video_url.is_empty() || user_prompt.is_empty() {
            return Err(ValidationError);
        }
        Ok(Self {
            video_url: video_url.to_string(),
            user_prompt: user_prompt.to_string(),
        })
    }

    pub fn video_url(&self) -> &str {
        &self.video_url
    }

    pub fn user_prompt(&self) -> &str {
        &self.user_prompt
    }

    /// Payload sent to every reviewer agent.
    pub fn agent_input(&self) -> String {
        format!("TRANSCRIPT_URL: {}\nPROMPT: {}", self.video_url, self.user_prompt)
    }
}

impl TryFrom<AnalyzeBody> for AnalysisRequest {
    type Error = ValidationError;

    fn try_from(body: AnalyzeBody) -> Result<Self, Self::Error> {
        match (body.video_url, body.user_prompt) {
            (Some(url), Some(prompt)) => Self::new(&url, &prompt),
            _ => Err(ValidationError),
        }
    }
}
