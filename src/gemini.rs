use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─── Request / Response Types ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// One piece of a prompt: text, or a base64 file the model reads inline.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::Inline {
            inline_data: InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            },
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: &'a [Part],
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

// ─── Generator Trait ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("unexpected model response: {0}")]
    Malformed(String),
}

impl GenerateError {
    /// Rate limits, server errors and transport failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerateError::Transport(_) => true,
            GenerateError::Status { status, .. } => *status == 429 || *status >= 500,
            GenerateError::Malformed(_) => false,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, parts: &[Part]) -> Result<String, GenerateError>;
}

// ─── Gemini Client ──────────────────────────────────────────────────────────

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

fn extract_text(resp: GenerateResponse) -> String {
    resp.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, model: &str, parts: &[Part]) -> Result<String, GenerateError> {
        let endpoint = self.endpoint(model);
        let body = GenerateRequest {
            contents: [Content { role: "user", parts }],
        };

        debug!(%endpoint, parts = parts.len(), "[gemini] sending request");
        let resp = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerateError::Malformed(e.to_string()))?;
        Ok(extract_text(parsed))
    }
}
