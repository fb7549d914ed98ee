use super::{
    ChatMessage, GenerationRequest, LlmError, PRIMING_CONFIRMATION, PRIMING_INSTRUCTION,
};
use crate::db::models::{Media, Role};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

// Generation settings are fixed at build time.
const TEMPERATURE: f32 = 0.7;
const TOP_K: u32 = 40;
const TOP_P: f32 = 0.95;
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

fn text_turn(role: &str, text: &str) -> GeminiContent {
    GeminiContent {
        role: Some(role.to_string()),
        parts: vec![GeminiPart {
            text: Some(text.to_string()),
            ..GeminiPart::default()
        }],
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn history_turn(message: &ChatMessage) -> GeminiContent {
    text_turn(wire_role(message.role), &message.content)
}

fn current_turn(prompt: &str, media: Option<&Media>) -> GeminiContent {
    let mut parts = Vec::new();
    if !prompt.trim().is_empty() {
        parts.push(GeminiPart {
            text: Some(prompt.to_string()),
            ..GeminiPart::default()
        });
    }
    if let Some(media) = media {
        parts.push(GeminiPart {
            inline_data: Some(InlineData {
                mime_type: media.mime_type.clone(),
                data: media.data.clone(),
            }),
            ..GeminiPart::default()
        });
    }
    GeminiContent {
        role: Some("user".to_string()),
        parts,
    }
}

fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let mut contents = Vec::with_capacity(request.history.len() + 3);
    contents.push(text_turn("user", PRIMING_INSTRUCTION));
    contents.push(text_turn("model", PRIMING_CONFIRMATION));
    contents.extend(request.history.iter().map(history_turn));
    contents.push(current_turn(&request.prompt, request.media.as_ref()));

    GeminiRequest {
        contents,
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            top_k: TOP_K,
            top_p: TOP_P,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

/// First non-empty text part of the first candidate.
fn extract_text(response: GeminiResponse) -> Result<String, LlmError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(LlmError::NoCandidates)?;
    candidate
        .content
        .into_iter()
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .find(|text| !text.trim().is_empty())
        .ok_or(LlmError::EmptyCandidate)
}

/// Human-readable message from an error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<GeminiErrorBody>(body)
        .map(|parsed| parsed.error.message)
        .unwrap_or_else(|_| body.to_string())
}

pub async fn generate(config: &GeminiConfig, request: &GenerationRequest) -> Result<String, LlmError> {
    if config.api_key.trim().is_empty() {
        return Err(LlmError::MissingApiKey);
    }

    let client = Client::new();
    let body = build_request(request);
    debug!(
        model = %config.model,
        turns = body.contents.len(),
        media = request.media.is_some(),
        "sending generateContent request"
    );

    let resp = client
        .post(format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        ))
        .query(&[("key", config.api_key.as_str())])
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        let message = error_message(&text);
        warn!(status = status.as_u16(), %message, "generateContent failed");
        return Err(LlmError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let data: GeminiResponse =
        serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
    extract_text(data)
}
