use super::{GenerationRequest, LlmError};
use crate::db::models::Role;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Serverless function that holds the API key and forwards a single query.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
}

#[derive(Serialize)]
struct ProxyRequest {
    query: String,
}

#[derive(Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    output: String,
}

#[derive(Deserialize)]
struct ProxyErrorBody {
    error: String,
    details: Option<String>,
}

/// The proxy accepts one string, so prior turns are folded into it.
fn build_query(request: &GenerationRequest) -> String {
    let mut query = String::new();
    for message in &request.history {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Poet",
        };
        query.push_str(&format!("{}: {}\n", speaker, message.content));
    }
    if let Some(media) = &request.media {
        query.push_str(media.kind.marker());
        query.push('\n');
    }
    query.push_str(&request.prompt);
    query
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ProxyErrorBody>(body) {
        Ok(ProxyErrorBody {
            error,
            details: Some(details),
        }) => format!("{}: {}", error, details),
        Ok(ProxyErrorBody { error, .. }) => error,
        Err(_) => body.to_string(),
    }
}

pub async fn generate(config: &ProxyConfig, request: &GenerationRequest) -> Result<String, LlmError> {
    let client = Client::new();
    let body = ProxyRequest {
        query: build_query(request),
    };
    debug!(url = %config.url, "forwarding query to proxy");

    let resp = client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        let message = error_message(&text);
        warn!(status = status.as_u16(), %message, "proxy request failed");
        return Err(LlmError::Api {
            status: status.as_u16(),
            message,
        });
    }

    let data: ProxyResponse =
        serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
    if data.output.trim().is_empty() {
        return Err(LlmError::EmptyCandidate);
    }
    Ok(data.output)
}
