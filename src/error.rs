use crate::llm::LlmError;

/// Every failure the application can observe, classified once at the
/// boundary where it is first seen.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("generation failed: {0}")]
    GenerationFailed(LlmError),
    #[error("stored value under `{key}` is corrupted: {source}")]
    PersistenceCorruption {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("attachment is {size} bytes, the limit is {limit} bytes")]
    MediaTooLarge { size: usize, limit: usize },
    #[error("message is empty")]
    EmptyPrompt,
    #[error("a reply is still being generated")]
    Busy,
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("cached file not found: {0}")]
    FileNotFound(String),
    #[error("unsupported file: {0}")]
    UnsupportedFile(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::MissingApiKey => {
                AppError::Configuration("Gemini API key not configured".to_string())
            }
            other => AppError::GenerationFailed(other),
        }
    }
}
