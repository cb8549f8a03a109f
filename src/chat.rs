use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ApiError;
use crate::gemini::Part;
use crate::persona::{self, Lang};
use crate::router::RouteError;
use crate::server::AppState;

pub const NO_REPLY: &str = "The model returned no reply.";

// ─── Request / Response Types ───────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default, alias = "content")]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileAttachment {
    pub mime: Option<String>,
    pub base64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub persona: String,
    pub lang: Option<String>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
}

// ─── Prompt Assembly ────────────────────────────────────────────────────────

/// Flattens the conversation into one prompt ending with `Assistant:`.
pub fn build_transcript(system: &str, messages: &[ChatMessage]) -> String {
    let mut out = format!("{}\n\n", system);
    for m in messages {
        let tag = if m.role == "user" { "User" } else { "Assistant" };
        out.push_str(&format!("{}: {}\n", tag, m.text));
    }
    out.push_str("Assistant:");
    out
}

/// Text part first, then every attachment that has both a type and data.
pub fn build_parts(transcript: String, files: &[FileAttachment]) -> Vec<Part> {
    let mut parts = vec![Part::text(transcript)];
    parts.extend(files.iter().filter_map(|f| {
        let mime = f.mime.as_deref().map(str::trim).filter(|m| !m.is_empty())?;
        let data = f.base64.as_deref().map(str::trim).filter(|d| !d.is_empty())?;
        Some(Part::inline(mime, data))
    }));
    parts
}

// ─── Chat Endpoint ──────────────────────────────────────────────────────────

pub async fn chat(
    state: web::Data<AppState>,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse, ApiError> {
    let Some(router) = state.router.as_ref() else {
        return Err(ApiError::Misconfigured(
            "GEMINI_API_KEY is not configured".to_string(),
        ));
    };

    let req = body.into_inner();
    if req.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let lang = Lang::parse(req.lang.as_deref());
    let system = persona::system_prompt(&state.directives, &req.persona, lang);
    let transcript = build_transcript(&system, &req.messages);
    let parts = build_parts(transcript, &req.files);

    info!(
        persona = %req.persona,
        messages = req.messages.len(),
        attachments = parts.len() - 1,
        "[chat] request received"
    );

    let reply = router.generate(&parts).await.map_err(|e| {
        error!(error = %e, "[chat] generation failed");
        match e {
            RouteError::AllFailed(_) => ApiError::Upstream("model request failed".to_string()),
            RouteError::DeadlineExceeded(_) => {
                ApiError::Upstream("model request timed out".to_string())
            }
        }
    })?;

    let text = if reply.text.trim().is_empty() {
        NO_REPLY.to_string()
    } else {
        reply.text
    };
    info!(model = %reply.model, score = reply.score, "[chat] reply sent");
    Ok(HttpResponse::Ok().json(ChatResponse {
        text,
        model: reply.model,
    }))
}
