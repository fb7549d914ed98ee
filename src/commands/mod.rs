pub mod chat;
pub mod files;
pub mod settings;

use crate::chat::{ChatEvent, ConversationManager, ReplyOutcome};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::db::models::{Conversation, ConversationSummary, Media, Theme};
use crate::db::file_cache::FileCache;
use crate::db::{Store, KEY_CURRENT_CHAT};
use crate::error::AppError;
use crate::llm::{resolve_provider, GenerationClient, GenerationRequest, LlmError};
use std::sync::Arc;
use tracing::{debug, info};

/// Audible feedback points in the chat flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    MessageSent,
    MessageReceived,
    Error,
}

/// Where feedback cues go. Only invoked while sound is enabled.
pub trait Feedback: Send + Sync {
    fn play(&self, cue: Cue);
}

/// A generation call that has been prepared but not yet issued. It owns
/// everything it needs, so it can run on another task.
pub struct PendingReply {
    pub conversation_id: String,
    pub message_id: String,
    pub request: GenerationRequest,
    client: Arc<dyn GenerationClient>,
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReply")
            .field("conversation_id", &self.conversation_id)
            .field("message_id", &self.message_id)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl PendingReply {
    pub async fn generate(self) -> SettledReply {
        let result = self.client.generate(&self.request).await;
        SettledReply {
            conversation_id: self.conversation_id,
            message_id: self.message_id,
            result,
        }
    }
}

pub struct SettledReply {
    pub conversation_id: String,
    pub message_id: String,
    pub result: Result<String, LlmError>,
}

/// Everything the view needs to draw one frame.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub conversation: Option<Conversation>,
    pub conversations: Vec<ConversationSummary>,
    pub is_loading: bool,
    pub sound_enabled: bool,
    pub theme: Theme,
    pub sidebar_open: bool,
    pub has_staged_media: bool,
    pub has_staged_context: bool,
}

/// Composition root of the chat UI: holds the store, the conversation
/// manager and the generation client, and turns user actions into calls
/// on them.
pub struct ChatApp {
    config: AppConfig,
    store: Arc<Store>,
    manager: ConversationManager,
    files: FileCache,
    feedback: Box<dyn Feedback>,
    client: Option<Arc<dyn GenerationClient>>,
    current: Option<String>,
    is_loading: bool,
    staged_media: Option<Media>,
    staged_context: Option<String>,
    notices: Vec<String>,
}

impl ChatApp {
    pub fn new(
        config: AppConfig,
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        feedback: Box<dyn Feedback>,
    ) -> Self {
        let manager = ConversationManager::load(store.clone(), clock.clone());
        let files = FileCache::new(store.clone(), clock);
        let current = store
            .load::<Option<String>>(KEY_CURRENT_CHAT)
            .filter(|id| manager.conversation(id).is_some());

        Self {
            config,
            store,
            manager,
            files,
            feedback,
            client: None,
            current,
            is_loading: false,
            staged_media: None,
            staged_context: None,
            notices: Vec::new(),
        }
    }

    /// Use `client` instead of resolving one from configuration.
    pub fn with_client(mut self, client: Arc<dyn GenerationClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn manager(&self) -> &ConversationManager {
        &self.manager
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn current_chat(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn generation_client(&mut self) -> Result<Arc<dyn GenerationClient>, AppError> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let provider: Arc<dyn GenerationClient> =
            Arc::new(resolve_provider(&self.config, &self.store)?);
        self.client = Some(provider.clone());
        Ok(provider)
    }

    fn play(&self, cue: Cue) {
        if self.sound_enabled() {
            self.feedback.play(cue);
        }
    }

    fn notify(&mut self, notice: impl Into<String>) {
        self.notices.push(notice.into());
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_events(&mut self) -> Vec<ChatEvent> {
        self.manager.take_events()
    }

    /// Apply due status transitions.
    pub fn tick(&mut self) -> usize {
        self.manager.tick()
    }

    fn set_current(&mut self, id: Option<String>) {
        match &id {
            Some(id) => self.store.save(KEY_CURRENT_CHAT, id),
            None => self.store.clear(KEY_CURRENT_CHAT),
        }
        self.current = id;
    }

    fn ensure_conversation(&mut self) -> String {
        match &self.current {
            Some(id) if self.manager.conversation(id).is_some() => id.clone(),
            _ => {
                let conversation = self.manager.create_conversation(None);
                self.set_current(Some(conversation.id.clone()));
                conversation.id
            }
        }
    }

    fn compose_prompt(&self, input: &str) -> String {
        match &self.staged_context {
            Some(context) if input.trim().is_empty() => context.clone(),
            Some(context) => format!("{}\n\n{}", context, input.trim()),
            None => input.trim().to_string(),
        }
    }

    /// Validate and record a prompt, returning the generation call to run.
    /// Nothing is created when the prompt is rejected.
    pub fn submit(&mut self, input: &str) -> Result<PendingReply, AppError> {
        if self.is_loading {
            return Err(AppError::Busy);
        }
        let prompt = self.compose_prompt(input);
        if prompt.is_empty() && self.staged_media.is_none() {
            return Err(AppError::EmptyPrompt);
        }
        if let Some(media) = &self.staged_media {
            media.validate()?;
        }
        let client = self.generation_client()?;

        let conversation_id = self.ensure_conversation();
        let message =
            self.manager
                .append_user_message(&conversation_id, &prompt, self.staged_media.clone())?;
        let request = self.manager.begin_reply(&conversation_id, &message.id)?;

        self.staged_media = None;
        self.staged_context = None;
        self.is_loading = true;
        self.play(Cue::MessageSent);
        debug!(conversation_id = %conversation_id, message_id = %message.id, "prompt submitted");

        Ok(PendingReply {
            conversation_id,
            message_id: message.id,
            request,
            client,
        })
    }

    /// Apply a settled generation call. Always re-enables input.
    pub fn finish_reply(&mut self, settled: SettledReply) -> ReplyOutcome {
        self.is_loading = false;
        let outcome = self.manager.complete_reply(
            &settled.conversation_id,
            &settled.message_id,
            settled.result,
        );
        match &outcome {
            ReplyOutcome::Delivered(_) => self.play(Cue::MessageReceived),
            ReplyOutcome::Failed { error, .. } => {
                self.play(Cue::Error);
                let notice = match error {
                    AppError::Configuration(msg) => format!("Configuration error: {}", msg),
                    _ => "Failed to generate response. Please try again.".to_string(),
                };
                self.notify(notice);
            }
            ReplyOutcome::Discarded => info!("reply arrived for a cleared conversation"),
        }
        outcome
    }

    /// Submit, generate and apply in one call.
    pub async fn send(&mut self, input: &str) -> Result<ReplyOutcome, AppError> {
        let pending = self.submit(input)?;
        let settled = pending.generate().await;
        Ok(self.finish_reply(settled))
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            conversation: self
                .current
                .as_deref()
                .and_then(|id| self.manager.conversation(id))
                .cloned(),
            conversations: self.manager.list_conversations(),
            is_loading: self.is_loading,
            sound_enabled: self.sound_enabled(),
            theme: self.theme(),
            sidebar_open: self.sidebar_open(),
            has_staged_media: self.staged_media.is_some(),
            has_staged_context: self.staged_context.is_some(),
        }
    }
}
