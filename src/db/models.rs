use crate::error::AppError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attachments larger than this are rejected before any network call.
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_CONVERSATION_TITLE: &str = "Nayi Guftagu";

const TITLE_MAX_CHARS: usize = 30;
const PREVIEW_MAX_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Delivery-simulation stage of a user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// The status that directly follows this one on the success path.
    pub fn next(self) -> Option<MessageStatus> {
        match self {
            MessageStatus::Sending => Some(MessageStatus::Sent),
            MessageStatus::Sent => Some(MessageStatus::Delivered),
            MessageStatus::Delivered => Some(MessageStatus::Read),
            MessageStatus::Read | MessageStatus::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Failed)
    }

    /// `failed` is only reachable before a reply has been delivered.
    pub fn can_fail(self) -> bool {
        matches!(self, MessageStatus::Sending | MessageStatus::Sent)
    }

    fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 4,
        }
    }

    /// Whether `target` lies strictly ahead on the success path.
    pub fn precedes(self, target: MessageStatus) -> bool {
        target != MessageStatus::Failed && !self.is_terminal() && self.rank() < target.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn from_mime(mime_type: &str) -> Option<MediaKind> {
        if mime_type.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime_type.starts_with("audio/") {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            MediaKind::Image => "[Image attached]",
            MediaKind::Audio => "[Audio attached]",
        }
    }
}

/// Inline attachment, stored base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub mime_type: String,
    pub data: String,
}

impl Media {
    pub fn from_bytes(kind: MediaKind, mime_type: &str, bytes: &[u8]) -> Result<Self, AppError> {
        check_media_size(bytes.len())?;
        Ok(Media {
            kind,
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        })
    }

    /// Size of the decoded payload, computed from the base64 length.
    pub fn decoded_len(&self) -> usize {
        let padding = self.data.bytes().rev().take_while(|b| *b == b'=').count();
        (self.data.len() / 4 * 3).saturating_sub(padding)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        check_media_size(self.decoded_len())
    }
}

pub fn check_media_size(size: usize) -> Result<(), AppError> {
    if size > MAX_MEDIA_BYTES {
        return Err(AppError::MediaTooLarge {
            size,
            limit: MAX_MEDIA_BYTES,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

impl Message {
    pub fn user(content: &str, media: Option<Media>, timestamp: DateTime<Utc>) -> Self {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            role: Role::User,
            timestamp,
            status: Some(MessageStatus::Sending),
            media,
            fallback: false,
        }
    }

    pub fn assistant(content: &str, timestamp: DateTime<Utc>) -> Self {
        Message {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.to_string(),
            role: Role::Assistant,
            timestamp,
            status: None,
            media: None,
            fallback: false,
        }
    }

    pub fn fallback(content: &str, timestamp: DateTime<Utc>) -> Self {
        Message {
            fallback: true,
            ..Message::assistant(content, timestamp)
        }
    }

    /// Text form used when the message is replayed as history: the body
    /// followed by a bracketed marker for any attachment.
    pub fn history_text(&self) -> String {
        match &self.media {
            Some(media) if self.content.is_empty() => media.kind.marker().to_string(),
            Some(media) => format!("{} {}", self.content, media.kind.marker()),
            None => self.content.clone(),
        }
    }

    /// Failed prompts and locally-authored apologies never go upstream.
    pub fn is_replayable(&self) -> bool {
        !self.fallback && self.status != Some(MessageStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(title: &str, now: DateTime<Utc>) -> Self {
        Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
            is_pinned: false,
            messages: Vec::new(),
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_pinned: self.is_pinned,
            preview: self
                .messages
                .last()
                .map(|m| truncate_chars(&m.history_text(), PREVIEW_MAX_CHARS))
                .unwrap_or_default(),
        }
    }

    pub fn has_user_messages(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }
}

/// Entry of the persisted conversation index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Metadata handed to the file cache; id and timestamp are assigned there.
#[derive(Debug, Clone)]
pub struct NewCachedFile {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    System,
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            "system" => Ok(Theme::System),
            other => Err(format!("Unknown theme: {}", other)),
        }
    }
}

/// Conversation title derived from the first prompt.
pub fn derive_title(content: &str) -> String {
    truncate_chars(content.trim(), TITLE_MAX_CHARS)
}

/// Truncate on character boundaries, appending `...` when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
