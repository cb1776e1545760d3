//! API request and response types

use crate::classifier::Intent;
use crate::db::{Conversation, Message, MessageMetadata, MessageRole};
use crate::runtime::{ConversationView, TurnOutcome};
use crate::state_machine::{DiagnosticHypothesis, Stage, UrgencyLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRequest {
    pub text: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Client idempotency key
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Reply to a chat message
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageResponse {
    pub response: String,
    pub conversation_id: String,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub interview_stage: Stage,
    pub urgency_level: UrgencyLevel,
    pub is_complete: bool,
    pub urgent_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    pub replayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_hypotheses: Option<Vec<DiagnosticHypothesis>>,
}

impl ResponseMetadata {
    fn from_metadata(metadata: MessageMetadata, replayed: bool) -> Self {
        Self {
            interview_stage: metadata.stage,
            urgency_level: metadata.urgency,
            is_complete: metadata.is_complete,
            urgent_flag: metadata.urgent_flag,
            intent: metadata.intent,
            replayed,
            diagnostic_hypotheses: (!metadata.hypotheses.is_empty())
                .then_some(metadata.hypotheses),
        }
    }
}

impl From<TurnOutcome> for ChatMessageResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            response: outcome.response,
            conversation_id: outcome.conversation_id,
            metadata: ResponseMetadata::from_metadata(outcome.metadata, outcome.replayed),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub interview_stage: Stage,
    pub urgency_level: UrgencyLevel,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostic_hypotheses: Vec<DiagnosticHypothesis>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
    fn from(conv: Conversation) -> Self {
        Self {
            id: conv.id,
            interview_stage: conv.state.stage,
            urgency_level: conv.state.urgency,
            is_complete: conv.state.is_complete,
            diagnostic_hypotheses: conv.state.hypotheses,
            created_at: conv.created_at,
            updated_at: conv.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub sequence_id: i64,
    pub role: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.message_id,
            sequence_id: msg.sequence_id,
            role: msg.role,
            content: msg.content,
            metadata: msg.metadata,
            created_at: msg.created_at,
        }
    }
}

/// Response with conversation and messages
#[derive(Debug, Serialize)]
pub struct ConversationWithMessagesResponse {
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageResponse>,
}

impl From<ConversationView> for ConversationWithMessagesResponse {
    fn from(view: ConversationView) -> Self {
        Self {
            conversation: view.conversation.into(),
            messages: view.messages.into_iter().map(Into::into).collect(),
        }
    }
}

/// Response for the clear action
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub cleared: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_conversation_id: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            active_conversation_id: None,
        }
    }
}
