pub mod scheduler;

use crate::clock::Clock;
use crate::db::models::{
    derive_title, Conversation, ConversationSummary, Media, Message, MessageStatus, Role,
    DEFAULT_CONVERSATION_TITLE,
};
use crate::db::{history_key, Store, KEY_CONVERSATIONS};
use crate::error::AppError;
use crate::llm::{ChatMessage, GenerationClient, GenerationRequest, LlmError};
use chrono::{DateTime, Utc};
use scheduler::{StatusDelays, StatusScheduler};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Appended in place of a reply when generation fails.
pub const FALLBACK_REPLY: &str =
    "Sorry, I could not generate any poetry at this time. Please try again.";

/// State changes the view needs to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    ConversationCreated {
        conversation_id: String,
    },
    MessageAppended {
        conversation_id: String,
        message: Message,
    },
    StatusChanged {
        conversation_id: String,
        message_id: String,
        status: MessageStatus,
    },
    ConversationCleared {
        conversation_id: String,
    },
    ConversationDeleted {
        conversation_id: String,
    },
}

/// What became of a reply once generation settled.
#[derive(Debug)]
pub enum ReplyOutcome {
    Delivered(Message),
    Failed { fallback: Message, error: AppError },
    /// The conversation or message vanished while the call was in flight.
    Discarded,
}

/// Owns every conversation and the status lifecycle of user messages.
/// Each mutation rewrites the affected persisted keys before returning.
pub struct ConversationManager {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    delays: StatusDelays,
    conversations: Vec<Conversation>,
    scheduler: StatusScheduler,
    events: Vec<ChatEvent>,
}

impl ConversationManager {
    /// Restore conversations from the index and per-conversation history.
    pub fn load(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        let index: Vec<ConversationSummary> = store.load(KEY_CONVERSATIONS);
        let conversations: Vec<Conversation> = index
            .into_iter()
            .map(|summary| Conversation {
                messages: store.load(&history_key(&summary.id)),
                id: summary.id,
                title: summary.title,
                created_at: summary.created_at,
                updated_at: summary.updated_at,
                is_pinned: summary.is_pinned,
            })
            .collect();
        info!(count = conversations.len(), "loaded conversations");

        Self {
            store,
            clock,
            delays: StatusDelays::default(),
            conversations,
            scheduler: StatusScheduler::default(),
            events: Vec::new(),
        }
    }

    pub fn with_delays(mut self, delays: StatusDelays) -> Self {
        self.delays = delays;
        self
    }

    // ── Queries ──

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn messages(&self, id: &str) -> &[Message] {
        self.conversation(id)
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    /// Sidebar order: pinned first, then most recently updated.
    pub fn list_conversations(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> =
            self.conversations.iter().map(Conversation::summary).collect();
        summaries.sort_by(|a, b| {
            b.is_pinned
                .cmp(&a.is_pinned)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        summaries
    }

    /// Case-insensitive match on titles and message text.
    pub fn search_conversations(&self, query: &str) -> Vec<ConversationSummary> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.list_conversations();
        }
        self.list_conversations()
            .into_iter()
            .filter(|summary| {
                summary.title.to_lowercase().contains(&needle)
                    || self.messages(&summary.id).iter().any(|m| {
                        m.content.to_lowercase().contains(&needle)
                    })
            })
            .collect()
    }

    pub fn take_events(&mut self) -> Vec<ChatEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_transitions(&self) -> usize {
        self.scheduler.len()
    }

    // ── Conversations ──

    pub fn create_conversation(&mut self, seed_title: Option<&str>) -> Conversation {
        let title = seed_title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION_TITLE);
        let conversation = Conversation::new(title, self.clock.now());
        info!(id = %conversation.id, "created conversation");

        self.conversations.push(conversation.clone());
        self.persist_index();
        self.events.push(ChatEvent::ConversationCreated {
            conversation_id: conversation.id.clone(),
        });
        conversation
    }

    pub fn rename_conversation(&mut self, id: &str, title: &str) -> Result<(), AppError> {
        let conversation = self.conversation_mut(id)?;
        conversation.title = title.trim().to_string();
        self.persist_index();
        Ok(())
    }

    /// Flip the pinned flag, returning the new value.
    pub fn toggle_pin(&mut self, id: &str) -> Result<bool, AppError> {
        let conversation = self.conversation_mut(id)?;
        conversation.is_pinned = !conversation.is_pinned;
        let pinned = conversation.is_pinned;
        self.persist_index();
        Ok(pinned)
    }

    /// Empty the message list and drop the persisted history. Idempotent.
    pub fn clear_conversation(&mut self, id: &str) {
        self.scheduler.cancel_conversation(id);
        self.store.clear(&history_key(id));
        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) {
            let removed = conversation.messages.len();
            conversation.messages.clear();
            self.persist_index();
            info!(id, removed, "cleared conversation");
            self.events.push(ChatEvent::ConversationCleared {
                conversation_id: id.to_string(),
            });
        }
    }

    pub fn delete_conversation(&mut self, id: &str) -> Result<(), AppError> {
        let position = self
            .conversations
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| AppError::ConversationNotFound(id.to_string()))?;
        self.conversations.remove(position);
        self.scheduler.cancel_conversation(id);
        self.store.clear(&history_key(id));
        self.persist_index();
        info!(id, "deleted conversation");
        self.events.push(ChatEvent::ConversationDeleted {
            conversation_id: id.to_string(),
        });
        Ok(())
    }

    // ── Messages ──

    /// Append a user message in `sending`. Returns without waiting for a reply.
    pub fn append_user_message(
        &mut self,
        conversation_id: &str,
        content: &str,
        media: Option<Media>,
    ) -> Result<Message, AppError> {
        let content = content.trim();
        if content.is_empty() && media.is_none() {
            return Err(AppError::EmptyPrompt);
        }
        if let Some(media) = &media {
            media.validate()?;
        }

        let now = self.clock.now();
        let conversation = self.conversation_mut(conversation_id)?;
        let message = Message::user(content, media, next_timestamp(conversation, now));
        if !conversation.has_user_messages() && !content.is_empty() {
            conversation.title = derive_title(content);
        }
        push_message(conversation, message.clone());
        debug!(conversation_id, message_id = %message.id, "user message sending");

        self.persist(conversation_id);
        self.scheduler.schedule(
            now + self.delays.sent,
            conversation_id,
            &message.id,
            MessageStatus::Sent,
        );
        self.events.push(ChatEvent::MessageAppended {
            conversation_id: conversation_id.to_string(),
            message: message.clone(),
        });
        Ok(message)
    }

    /// Build the generation request for `message_id` from the history that
    /// precedes it.
    pub fn begin_reply(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<GenerationRequest, AppError> {
        let conversation = self
            .conversation(conversation_id)
            .ok_or_else(|| AppError::ConversationNotFound(conversation_id.to_string()))?;
        let position = conversation
            .messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| AppError::ConversationNotFound(conversation_id.to_string()))?;
        let message = &conversation.messages[position];

        let history: Vec<ChatMessage> = conversation.messages[..position]
            .iter()
            .filter(|m| m.is_replayable())
            .map(ChatMessage::from)
            .collect();

        Ok(GenerationRequest {
            prompt: message.content.clone(),
            history,
            media: message.media.clone(),
        })
    }

    /// Apply a settled generation call to the conversation.
    pub fn complete_reply(
        &mut self,
        conversation_id: &str,
        message_id: &str,
        result: Result<String, LlmError>,
    ) -> ReplyOutcome {
        let exists = self
            .conversation(conversation_id)
            .is_some_and(|c| c.messages.iter().any(|m| m.id == message_id));
        if !exists {
            debug!(conversation_id, message_id, "discarding reply for vanished message");
            return ReplyOutcome::Discarded;
        }

        match result {
            Ok(text) => {
                self.advance_status(conversation_id, message_id, MessageStatus::Delivered);
                let reply = self.append_assistant(conversation_id, &text, Message::assistant);
                self.scheduler.schedule(
                    self.clock.now() + self.delays.read,
                    conversation_id,
                    message_id,
                    MessageStatus::Read,
                );
                info!(conversation_id, message_id, "reply delivered");
                ReplyOutcome::Delivered(reply)
            }
            Err(err) => {
                let error = AppError::from(err);
                warn!(conversation_id, message_id, error = %error, "generation failed");
                self.fail(conversation_id, message_id);
                let fallback =
                    self.append_assistant(conversation_id, FALLBACK_REPLY, Message::fallback);
                ReplyOutcome::Failed { fallback, error }
            }
        }
    }

    /// Generate and apply a reply for `message` in one step.
    pub async fn request_assistant_reply(
        &mut self,
        conversation_id: &str,
        message: &Message,
        client: &dyn GenerationClient,
    ) -> Result<ReplyOutcome, AppError> {
        let request = self.begin_reply(conversation_id, &message.id)?;
        let result = client.generate(&request).await;
        Ok(self.complete_reply(conversation_id, &message.id, result))
    }

    /// Apply every status transition due by now. Returns how many fired.
    pub fn tick(&mut self) -> usize {
        let due = self.scheduler.drain_due(self.clock.now());
        let fired = due.len();
        for transition in due {
            self.advance_status(
                &transition.conversation_id,
                &transition.message_id,
                transition.target,
            );
        }
        fired
    }

    // ── Internals ──

    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation, AppError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::ConversationNotFound(id.to_string()))
    }

    fn status_of(&self, conversation_id: &str, message_id: &str) -> Option<MessageStatus> {
        self.conversation(conversation_id)?
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .and_then(|m| m.status)
    }

    fn set_status(&mut self, conversation_id: &str, message_id: &str, status: MessageStatus) {
        let Ok(conversation) = self.conversation_mut(conversation_id) else {
            return;
        };
        let Some(message) = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.role == Role::User)
        else {
            return;
        };
        message.status = Some(status);
        debug!(conversation_id, message_id, ?status, "status changed");
        self.events.push(ChatEvent::StatusChanged {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            status,
        });
    }

    /// Walk forward one step at a time until `target`, so no intermediate
    /// status is skipped. Stale or backward targets are ignored.
    fn advance_status(&mut self, conversation_id: &str, message_id: &str, target: MessageStatus) {
        let mut changed = false;
        while let Some(current) = self.status_of(conversation_id, message_id) {
            if !current.precedes(target) {
                break;
            }
            let Some(next) = current.next() else {
                break;
            };
            self.set_status(conversation_id, message_id, next);
            changed = true;
        }
        if changed {
            self.persist(conversation_id);
        }
    }

    fn fail(&mut self, conversation_id: &str, message_id: &str) {
        if let Some(current) = self.status_of(conversation_id, message_id) {
            if current.can_fail() {
                self.set_status(conversation_id, message_id, MessageStatus::Failed);
                self.persist(conversation_id);
            }
        }
    }

    fn append_assistant(
        &mut self,
        conversation_id: &str,
        text: &str,
        build: fn(&str, DateTime<Utc>) -> Message,
    ) -> Message {
        let now = self.clock.now();
        let message = match self.conversation_mut(conversation_id) {
            Ok(conversation) => {
                let message = build(text, next_timestamp(conversation, now));
                push_message(conversation, message.clone());
                message
            }
            Err(_) => build(text, now),
        };
        self.persist(conversation_id);
        self.events.push(ChatEvent::MessageAppended {
            conversation_id: conversation_id.to_string(),
            message: message.clone(),
        });
        message
    }

    fn persist(&self, conversation_id: &str) {
        if let Some(conversation) = self.conversation(conversation_id) {
            self.store
                .save(&history_key(conversation_id), &conversation.messages);
        }
        self.persist_index();
    }

    fn persist_index(&self) {
        let index: Vec<ConversationSummary> =
            self.conversations.iter().map(Conversation::summary).collect();
        self.store.save(KEY_CONVERSATIONS, &index);
    }
}

/// Timestamps never go backwards within a conversation.
fn next_timestamp(conversation: &Conversation, now: DateTime<Utc>) -> DateTime<Utc> {
    match conversation.messages.last() {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    }
}

fn push_message(conversation: &mut Conversation, message: Message) {
    conversation.updated_at = message.timestamp.max(conversation.updated_at);
    conversation.messages.push(message);
}
