//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::db::{Conversation, Database, Message, NewMessage};
use crate::llm::LlmError;
use crate::state_machine::{DiagnosticHypothesis, SymptomSummary};
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for conversations and their messages
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The user's active conversation, if any
    async fn load(&self, user_id: &str) -> Result<Option<Conversation>, String>;

    /// Conversation by id, regardless of owner or completion
    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, String>;

    /// Insert or update the conversation record
    #[allow(dead_code)] // Store contract; the runtime writes through `commit_turn`
    async fn save(&self, conversation: &Conversation) -> Result<(), String>;

    /// Append a single message
    #[allow(dead_code)] // Store contract; the runtime writes through `commit_turn`
    async fn append(&self, conversation_id: &str, message: &NewMessage)
        -> Result<Message, String>;

    /// Save the conversation and append the turn's messages atomically
    async fn commit_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> Result<Vec<Message>, String>;

    /// All messages of a conversation in order
    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, String>;

    /// Reply already produced for a client message id, with its conversation
    async fn find_reply(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<(Conversation, Message)>, String>;
}

/// External reasoning service proposing diagnoses
#[async_trait]
pub trait HypothesisGenerator: Send + Sync {
    /// Candidate diagnoses for the summary, sorted by descending probability
    async fn generate(
        &self,
        summary: &SymptomSummary,
    ) -> Result<Vec<DiagnosticHypothesis>, LlmError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn load(&self, user_id: &str) -> Result<Option<Conversation>, String> {
        (**self).load(user_id).await
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, String> {
        (**self).get(conversation_id).await
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), String> {
        (**self).save(conversation).await
    }

    async fn append(
        &self,
        conversation_id: &str,
        message: &NewMessage,
    ) -> Result<Message, String> {
        (**self).append(conversation_id, message).await
    }

    async fn commit_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> Result<Vec<Message>, String> {
        (**self).commit_turn(conversation, messages).await
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, String> {
        (**self).messages(conversation_id).await
    }

    async fn find_reply(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<(Conversation, Message)>, String> {
        (**self).find_reply(user_id, message_id).await
    }
}

#[async_trait]
impl<T: HypothesisGenerator + ?Sized> HypothesisGenerator for Arc<T> {
    async fn generate(
        &self,
        summary: &SymptomSummary,
    ) -> Result<Vec<DiagnosticHypothesis>, LlmError> {
        (**self).generate(summary).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as `ConversationStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for DatabaseStore {
    async fn load(&self, user_id: &str) -> Result<Option<Conversation>, String> {
        self.db
            .active_conversation(user_id)
            .map_err(|e| e.to_string())
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, String> {
        match self.db.get_conversation(conversation_id) {
            Ok(conv) => Ok(Some(conv)),
            Err(crate::db::DbError::ConversationNotFound(_)) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), String> {
        self.db
            .save_conversation(conversation)
            .map_err(|e| e.to_string())
    }

    async fn append(
        &self,
        conversation_id: &str,
        message: &NewMessage,
    ) -> Result<Message, String> {
        self.db
            .add_message(conversation_id, message)
            .map_err(|e| e.to_string())
    }

    async fn commit_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> Result<Vec<Message>, String> {
        self.db
            .commit_turn(conversation, messages)
            .map_err(|e| e.to_string())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, String> {
        self.db
            .get_messages(conversation_id)
            .map_err(|e| e.to_string())
    }

    async fn find_reply(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<(Conversation, Message)>, String> {
        self.db
            .find_reply(user_id, message_id)
            .map_err(|e| e.to_string())
    }
}
