//! Per-user turn executor
//!
//! Turns of one user are processed strictly in arrival order. Each turn
//! reloads the conversation from the store, runs the pure transition, and
//! commits the result in a single store call.

use super::traits::{ConversationStore, HypothesisGenerator};
use super::{Command, TriageError, TurnOutcome, TurnRequest};
use crate::classifier::{classify_detailed, Intent};
use crate::db::{Conversation, MessageMetadata, NewMessage};
use crate::state_machine::prompts::FALLBACK;
use crate::state_machine::{
    transition, ConvContext, Effect, Event, SymptomSummary, TriageState,
};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runtime owning the turn queue of a single user
pub struct UserRuntime<S, G>
where
    S: ConversationStore + 'static,
    G: HypothesisGenerator + 'static,
{
    user_id: String,
    store: S,
    generator: G,
    hypothesis_timeout: Duration,
    /// Quiet period after which the runtime stops
    idle_timeout: Duration,
    command_rx: mpsc::Receiver<Command>,
}

impl<S, G> UserRuntime<S, G>
where
    S: ConversationStore + 'static,
    G: HypothesisGenerator + 'static,
{
    pub fn new(
        user_id: impl Into<String>,
        store: S,
        generator: G,
        hypothesis_timeout: Duration,
        idle_timeout: Duration,
        command_rx: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            generator,
            hypothesis_timeout,
            idle_timeout,
            command_rx,
        }
    }

    pub async fn run(mut self) {
        tracing::debug!(user_id = %self.user_id, "Starting user runtime");

        loop {
            match tokio::time::timeout(self.idle_timeout, self.command_rx.recv()).await {
                Ok(Some(command)) => self.handle(command).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new work, then finish what was queued before the close
                    self.command_rx.close();
                    while let Some(command) = self.command_rx.recv().await {
                        self.handle(command).await;
                    }
                    tracing::debug!(user_id = %self.user_id, "User runtime idle");
                    break;
                }
            }
        }

        tracing::debug!(user_id = %self.user_id, "User runtime stopped");
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::Turn {
                request,
                cancel,
                reply,
            } => {
                let result = self.handle_turn(request, &cancel).await;
                if let Err(e) = &result {
                    tracing::warn!(user_id = %self.user_id, error = %e, "Turn failed");
                }
                // The caller may have gone away; the outcome is already committed
                let _ = reply.send(result);
            }
            Command::Clear { reply } => {
                let _ = reply.send(self.handle_clear().await);
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn handle_turn(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, TriageError> {
        if cancel.is_cancelled() {
            return Err(TriageError::Cancelled);
        }

        // Idempotent retry: answer with the reply already committed
        if let Some(message_id) = &request.message_id {
            let found = self
                .store
                .find_reply(&self.user_id, message_id)
                .await
                .map_err(TriageError::Persistence)?;
            if let Some((conversation, reply)) = found {
                tracing::info!(
                    user_id = %self.user_id,
                    conv_id = %conversation.id,
                    message_id = %message_id,
                    "Replaying committed reply"
                );
                return Ok(TurnOutcome::replayed(&conversation, reply));
            }
        }

        let mut conversation = self
            .resolve_conversation(request.conversation_id.as_deref())
            .await?;

        let classification = classify_detailed(&request.text);
        if classification.is_ambiguous() {
            tracing::debug!(user_id = %self.user_id, "No known terms, treating as general question");
        }
        let intent = classification.intent;

        let context = ConvContext::new(&conversation.id, &self.user_id);
        let before = conversation.state.clone();
        let mut state = before.clone();
        let mut pending = VecDeque::from([Event::user_message(request.text, intent)]);
        let mut messages: Vec<NewMessage> = Vec::new();
        let mut replies: Vec<String> = Vec::new();
        let mut urgent_flag = false;

        // Process events in a loop - no recursion
        while let Some(event) = pending.pop_front() {
            let result = transition(&state, &context, event)?;
            state = result.new_state;

            for effect in result.effects {
                match effect {
                    Effect::RecordUserMessage { text, intent } => {
                        messages.push(
                            NewMessage::user(text, request.message_id.clone())
                                .with_metadata(snapshot(&before, false, Some(intent))),
                        );
                    }
                    Effect::PersistState => {
                        conversation.state = state.clone();
                    }
                    Effect::RequestHypotheses { summary } => {
                        pending.push_back(self.request_hypotheses(&summary, cancel).await?);
                    }
                    Effect::RaiseUrgentFlag { level } => {
                        urgent_flag = true;
                        tracing::warn!(
                            conv_id = %context.conversation_id,
                            user_id = %context.user_id,
                            urgency = %level,
                            "Urgent flag raised"
                        );
                    }
                    Effect::Reply { text } => replies.push(text),
                }
            }
        }

        let response = if replies.is_empty() {
            FALLBACK.to_string()
        } else {
            replies.join("\n\n")
        };

        let mut metadata = snapshot(&conversation.state, urgent_flag, Some(intent));
        if before.hypotheses.is_empty() {
            metadata.hypotheses = conversation.state.hypotheses.clone();
        }

        let reply_to = messages.first().map(|m| m.message_id.clone());
        messages.push(NewMessage::assistant(&response, reply_to).with_metadata(metadata.clone()));

        self.store
            .commit_turn(&conversation, &messages)
            .await
            .map_err(TriageError::Persistence)?;

        tracing::info!(
            conv_id = %conversation.id,
            user_id = %self.user_id,
            intent = %intent,
            stage = %conversation.state.stage,
            urgency = %conversation.state.urgency,
            "Turn committed"
        );

        Ok(TurnOutcome {
            conversation_id: conversation.id,
            response,
            metadata,
            replayed: false,
        })
    }

    /// The conversation this turn applies to
    async fn resolve_conversation(
        &self,
        requested: Option<&str>,
    ) -> Result<Conversation, TriageError> {
        let active = self
            .store
            .load(&self.user_id)
            .await
            .map_err(TriageError::Persistence)?;

        match (requested, active) {
            (Some(id), Some(active)) if active.id == id => Ok(active),
            (Some(_), Some(active)) => Err(TriageError::StaleConversation { active: active.id }),
            (Some(id), None) => {
                let existing = self.store.get(id).await.map_err(TriageError::Persistence)?;
                match existing {
                    // Finished conversation: the message starts a new one
                    Some(conv) if conv.user_id == self.user_id => Ok(self.new_conversation()),
                    _ => Err(TriageError::ConversationNotFound(id.to_string())),
                }
            }
            (None, Some(active)) => Ok(active),
            (None, None) => Ok(self.new_conversation()),
        }
    }

    fn new_conversation(&self) -> Conversation {
        let conversation = Conversation::new(uuid::Uuid::new_v4().to_string(), &self.user_id);
        tracing::info!(conv_id = %conversation.id, user_id = %self.user_id, "Starting conversation");
        conversation
    }

    /// Call the generator, racing it against cancellation and the timeout
    async fn request_hypotheses(
        &self,
        summary: &SymptomSummary,
        cancel: &CancellationToken,
    ) -> Result<Event, TriageError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!(user_id = %self.user_id, "Turn cancelled during hypothesis generation");
                Err(TriageError::Cancelled)
            }
            result = tokio::time::timeout(self.hypothesis_timeout, self.generator.generate(summary)) => {
                Ok(match result {
                    Ok(Ok(hypotheses)) => Event::HypothesesReady { hypotheses },
                    Ok(Err(e)) => {
                        tracing::warn!(
                            user_id = %self.user_id,
                            error = %e,
                            kind = ?e.kind,
                            "Hypothesis generation failed"
                        );
                        Event::HypothesesFailed { message: e.message }
                    }
                    Err(_) => {
                        tracing::warn!(
                            user_id = %self.user_id,
                            timeout_secs = self.hypothesis_timeout.as_secs(),
                            "Hypothesis generation timed out"
                        );
                        Event::HypothesesFailed {
                            message: "timed out".to_string(),
                        }
                    }
                })
            }
        }
    }

    /// Terminate the active conversation, if any
    async fn handle_clear(&self) -> Result<Option<String>, TriageError> {
        let Some(mut conversation) = self
            .store
            .load(&self.user_id)
            .await
            .map_err(TriageError::Persistence)?
        else {
            return Ok(None);
        };

        let context = ConvContext::new(&conversation.id, &self.user_id);
        let result = transition(&conversation.state, &context, Event::Reset)?;
        conversation.state = result.new_state;

        let messages: Vec<NewMessage> = result
            .effects
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Reply { text } => Some(
                    NewMessage::assistant(text, None)
                        .with_metadata(snapshot(&conversation.state, false, None)),
                ),
                _ => None,
            })
            .collect();

        // Termination and the closing reply land together or not at all
        self.store
            .commit_turn(&conversation, &messages)
            .await
            .map_err(TriageError::Persistence)?;

        tracing::info!(conv_id = %conversation.id, user_id = %self.user_id, "Conversation cleared");
        Ok(Some(conversation.id))
    }
}

fn snapshot(state: &TriageState, urgent_flag: bool, intent: Option<Intent>) -> MessageMetadata {
    MessageMetadata {
        stage: state.stage,
        urgency: state.urgency,
        is_complete: state.is_complete,
        urgent_flag,
        intent,
        hypotheses: vec![],
    }
}
