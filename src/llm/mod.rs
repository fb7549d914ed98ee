pub mod gemini;
pub mod proxy;

use crate::config::{AppConfig, ProviderKind};
use crate::db::models::{Media, Message, Role};
use crate::db::{Store, KEY_API_KEY};
use crate::error::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Synthetic instruction turn sent ahead of every conversation.
pub const PRIMING_INSTRUCTION: &str = "You are UrduGPT, an AI poet that composes beautiful poetry in the Urdu language using Urdu script (not transliteration). Always respond in Urdu script (اردو رسم الخط) with proper formatting and poetic structure. Use traditional Urdu poetry formats when appropriate. Never respond in English or Roman script, only use Urdu script for all responses. If you understand, respond with a short Urdu poem as confirmation.";

/// Synthetic model turn acknowledging the instruction.
pub const PRIMING_CONFIRMATION: &str = "میں سمجھ گیا ہوں۔ میں صرف اردو زبان میں جواب دوں گا۔";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        ChatMessage {
            role: message.role,
            content: message.history_text(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub history: Vec<ChatMessage>,
    pub media: Option<Media>,
}

/// Anything that can turn a prompt plus history into generated text.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError>;
}

/// Unified provider enum, dispatching to the Gemini endpoint or the proxy.
#[derive(Debug, Clone)]
pub enum Provider {
    Gemini(gemini::GeminiConfig),
    Proxy(proxy::ProxyConfig),
}

impl Provider {
    pub fn proxy(url: String) -> Self {
        Provider::Proxy(proxy::ProxyConfig { url })
    }
}

#[async_trait]
impl GenerationClient for Provider {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        match self {
            Provider::Gemini(config) => gemini::generate(config, request).await,
            Provider::Proxy(config) => proxy::generate(config, request).await,
        }
    }
}

/// Build the provider selected by configuration. The Gemini API key comes
/// from configuration first, then from the key saved through the settings.
pub fn resolve_provider(config: &AppConfig, store: &Store) -> Result<Provider, AppError> {
    match config.provider {
        ProviderKind::Proxy => {
            let url = config
                .proxy_url
                .clone()
                .filter(|url| !url.trim().is_empty())
                .ok_or_else(|| AppError::Configuration("proxy_url not configured".into()))?;
            Ok(Provider::proxy(url))
        }
        ProviderKind::Gemini => {
            let stored: Option<String> = store.load(KEY_API_KEY);
            let api_key = config
                .api_key
                .clone()
                .or(stored)
                .filter(|key| !key.trim().is_empty())
                .ok_or(LlmError::MissingApiKey)?;
            Ok(Provider::Gemini(gemini::GeminiConfig {
                api_key,
                base_url: config.base_url.clone(),
                model: config.model.clone(),
            }))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("no candidates returned")]
    NoCandidates,
    #[error("candidate contained no text")]
    EmptyCandidate,
    #[error("API key not configured")]
    MissingApiKey,
}

/// One-shot HTTP server for exercising the clients against canned replies.
#[cfg(test)]
pub(crate) mod stub_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve a single request with `status` and a JSON `body`. Returns the
    /// base URL and a handle resolving to the raw request that was received.
    pub async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|line| line.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, handle)
    }
}
