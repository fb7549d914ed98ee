use super::ChatApp;
use crate::db::models::{Conversation, ConversationSummary};
use crate::error::AppError;

impl ChatApp {
    pub fn new_chat(&mut self, title: Option<&str>) -> Conversation {
        let conversation = self.manager.create_conversation(title);
        self.set_current(Some(conversation.id.clone()));
        conversation
    }

    pub fn list_chats(&self) -> Vec<ConversationSummary> {
        self.manager.list_conversations()
    }

    pub fn search_chats(&self, query: &str) -> Vec<ConversationSummary> {
        self.manager.search_conversations(query)
    }

    /// Resolve a sidebar reference: a 1-based position in the list, or a
    /// prefix of the conversation id.
    pub fn find_chat(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        let chats = self.list_chats();
        if let Ok(position) = reference.parse::<usize>() {
            if let Some(chat) = position.checked_sub(1).and_then(|i| chats.get(i)) {
                return Some(chat.id.clone());
            }
        }
        chats
            .into_iter()
            .find(|chat| chat.id.starts_with(reference))
            .map(|chat| chat.id)
    }

    pub fn select_chat(&mut self, id: &str) -> Result<&Conversation, AppError> {
        if self.manager.conversation(id).is_none() {
            return Err(AppError::ConversationNotFound(id.to_string()));
        }
        self.set_current(Some(id.to_string()));
        self.manager
            .conversation(id)
            .ok_or_else(|| AppError::ConversationNotFound(id.to_string()))
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.current
            .as_deref()
            .and_then(|id| self.manager.conversation(id))
    }

    /// Clear the active conversation's history. No-op without one.
    pub fn clear_chat(&mut self) {
        if let Some(id) = self.current.clone() {
            self.manager.clear_conversation(&id);
            self.notify("Chat cleared. Your chat history has been cleared.");
        }
    }

    pub fn delete_chat(&mut self, id: &str) -> Result<(), AppError> {
        self.manager.delete_conversation(id)?;
        if self.current.as_deref() == Some(id) {
            self.set_current(None);
        }
        Ok(())
    }

    pub fn toggle_pin(&mut self, id: &str) -> Result<bool, AppError> {
        self.manager.toggle_pin(id)
    }

    pub fn rename_chat(&mut self, id: &str, title: &str) -> Result<(), AppError> {
        if title.trim().is_empty() {
            return Err(AppError::EmptyPrompt);
        }
        self.manager.rename_conversation(id, title)
    }
}
