//! Runtime for executing triage turns
//!
//! One background task per user serializes that user's turns; different
//! users proceed independently.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::UserRuntime;
pub use traits::*;

use crate::db::{Conversation, Message, MessageMetadata};
use crate::state_machine::TransitionError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

/// How long a user runtime waits for work before stopping
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Runtime with the production trait objects
pub type ProductionRuntime =
    UserRuntime<Arc<dyn ConversationStore>, Arc<dyn HypothesisGenerator>>;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("Turn cancelled")]
    Cancelled,
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Conversation is not the active one (active: {active})")]
    StaleConversation { active: String },
    #[error("Persistence failure: {0}")]
    Persistence(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("User runtime unavailable")]
    RuntimeUnavailable,
}

/// A user message to process
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub text: String,
    pub conversation_id: Option<String>,
    /// Client idempotency key
    pub message_id: Option<String>,
}

/// Result of a committed (or replayed) turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub conversation_id: String,
    pub response: String,
    pub metadata: MessageMetadata,
    pub replayed: bool,
}

impl TurnOutcome {
    fn replayed(conversation: &Conversation, reply: Message) -> Self {
        let metadata = reply.metadata.unwrap_or_else(|| MessageMetadata {
            stage: conversation.state.stage,
            urgency: conversation.state.urgency,
            is_complete: conversation.state.is_complete,
            urgent_flag: false,
            intent: None,
            hypotheses: vec![],
        });
        Self {
            conversation_id: conversation.id.clone(),
            response: reply.content,
            metadata,
            replayed: true,
        }
    }
}

/// Conversation with its full message history
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// Work sent to a user runtime
pub enum Command {
    Turn {
        request: TurnRequest,
        cancel: CancellationToken,
        reply: oneshot::Sender<Result<TurnOutcome, TriageError>>,
    },
    Clear {
        reply: oneshot::Sender<Result<Option<String>, TriageError>>,
    },
}

/// Manager for all user runtimes
pub struct RuntimeManager {
    store: Arc<dyn ConversationStore>,
    generator: Arc<dyn HypothesisGenerator>,
    hypothesis_timeout: Duration,
    idle_timeout: Duration,
    runtimes: RwLock<HashMap<String, mpsc::Sender<Command>>>,
}

impl RuntimeManager {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn HypothesisGenerator>,
        hypothesis_timeout: Duration,
    ) -> Self {
        Self {
            store,
            generator,
            hypothesis_timeout,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Get or create the runtime for a user
    async fn get_or_create(&self, user_id: &str) -> mpsc::Sender<Command> {
        // Check if already running
        {
            let runtimes = self.runtimes.read().await;
            if let Some(tx) = runtimes.get(user_id) {
                if !tx.is_closed() {
                    return tx.clone();
                }
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another caller may have started it while we waited for the lock
        if let Some(tx) = runtimes.get(user_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }

        // Forget runtimes that stopped after going idle
        runtimes.retain(|_, tx| !tx.is_closed());

        let (command_tx, command_rx) = mpsc::channel(32);
        let runtime: ProductionRuntime = UserRuntime::new(
            user_id,
            self.store.clone(),
            self.generator.clone(),
            self.hypothesis_timeout,
            self.idle_timeout,
            command_rx,
        );

        tokio::spawn(runtime.run());
        runtimes.insert(user_id.to_string(), command_tx.clone());
        command_tx
    }

    async fn send(&self, user_id: &str, mut command: Command) -> Result<(), TriageError> {
        // A runtime can stop for idleness between lookup and send; the
        // second attempt starts a fresh one
        for _ in 0..2 {
            match self.get_or_create(user_id).await.send(command).await {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(returned)) => command = returned,
            }
        }
        Err(TriageError::RuntimeUnavailable)
    }

    /// Users with a running runtime
    #[cfg(test)]
    pub async fn live_runtimes(&self) -> usize {
        self.runtimes
            .read()
            .await
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    #[cfg(test)]
    pub async fn tracked_runtimes(&self) -> usize {
        self.runtimes.read().await.len()
    }

    /// Process one user message. Queued behind any turn of the same user
    /// already in flight.
    pub async fn submit_turn(
        &self,
        user_id: &str,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TriageError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            user_id,
            Command::Turn {
                request,
                cancel,
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| TriageError::RuntimeUnavailable)?
    }

    /// Terminate the user's active conversation. Returns its id, `None` if
    /// there was nothing to clear.
    pub async fn clear(&self, user_id: &str) -> Result<Option<String>, TriageError> {
        let (reply, rx) = oneshot::channel();
        self.send(user_id, Command::Clear { reply }).await?;
        rx.await.map_err(|_| TriageError::RuntimeUnavailable)?
    }

    /// The user's active conversation with its messages
    pub async fn active_conversation(
        &self,
        user_id: &str,
    ) -> Result<Option<ConversationView>, TriageError> {
        let Some(conversation) = self
            .store
            .load(user_id)
            .await
            .map_err(TriageError::Persistence)?
        else {
            return Ok(None);
        };
        self.with_messages(conversation).await.map(Some)
    }

    /// A conversation owned by the user, active or not
    pub async fn conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<ConversationView, TriageError> {
        let conversation = self
            .store
            .get(conversation_id)
            .await
            .map_err(TriageError::Persistence)?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| TriageError::ConversationNotFound(conversation_id.to_string()))?;
        self.with_messages(conversation).await
    }

    async fn with_messages(
        &self,
        conversation: Conversation,
    ) -> Result<ConversationView, TriageError> {
        let messages = self
            .store
            .messages(&conversation.id)
            .await
            .map_err(TriageError::Persistence)?;
        Ok(ConversationView {
            conversation,
            messages,
        })
    }
}
