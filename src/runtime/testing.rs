//! Mock implementations for testing
//!
//! These mocks enable runtime tests without a real reasoning service.

use super::traits::*;
use crate::db::{Conversation, Database, Message, NewMessage};
use crate::llm::LlmError;
use crate::state_machine::{DiagnosticHypothesis, SymptomSummary};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock Hypothesis Generator
// ============================================================================

/// Generator returning queued results
pub struct MockHypothesisGenerator {
    results: Mutex<VecDeque<Result<Vec<DiagnosticHypothesis>, LlmError>>>,
    /// Record of all summaries received
    pub calls: Mutex<Vec<SymptomSummary>>,
}

impl MockHypothesisGenerator {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_hypotheses(&self, hypotheses: Vec<DiagnosticHypothesis>) {
        self.results.lock().unwrap().push_back(Ok(hypotheses));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.results.lock().unwrap().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockHypothesisGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HypothesisGenerator for MockHypothesisGenerator {
    async fn generate(
        &self,
        summary: &SymptomSummary,
    ) -> Result<Vec<DiagnosticHypothesis>, LlmError> {
        self.calls.lock().unwrap().push(summary.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::unavailable("No mock result queued")))
    }
}

// ============================================================================
// Delayed Generator (for cancellation and timeout testing)
// ============================================================================

/// Generator that sleeps before answering
pub struct DelayedHypothesisGenerator {
    inner: MockHypothesisGenerator,
    delay: Duration,
    /// Notified when generation starts (for test synchronization)
    pub started: Arc<Notify>,
}

impl DelayedHypothesisGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockHypothesisGenerator::new(),
            delay,
            started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl HypothesisGenerator for DelayedHypothesisGenerator {
    async fn generate(
        &self,
        summary: &SymptomSummary,
    ) -> Result<Vec<DiagnosticHypothesis>, LlmError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.generate(summary).await
    }
}

// ============================================================================
// Store with injectable commit failures
// ============================================================================

/// In-memory SQLite store whose turn commits can be made to fail
pub struct FlakyStore {
    inner: DatabaseStore,
    pub fail_commits: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: DatabaseStore::new(Database::open_in_memory().unwrap()),
            fail_commits: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn load(&self, user_id: &str) -> Result<Option<Conversation>, String> {
        self.inner.load(user_id).await
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, String> {
        self.inner.get(conversation_id).await
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), String> {
        self.inner.save(conversation).await
    }

    async fn append(
        &self,
        conversation_id: &str,
        message: &NewMessage,
    ) -> Result<Message, String> {
        self.inner.append(conversation_id, message).await
    }

    async fn commit_turn(
        &self,
        conversation: &Conversation,
        messages: &[NewMessage],
    ) -> Result<Vec<Message>, String> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err("disk I/O error".to_string());
        }
        self.inner.commit_turn(conversation, messages).await
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, String> {
        self.inner.messages(conversation_id).await
    }

    async fn find_reply(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<(Conversation, Message)>, String> {
        self.inner.find_reply(user_id, message_id).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Intent;
    use crate::db::MessageRole;
    use crate::runtime::{RuntimeManager, TriageError, TurnOutcome, TurnRequest};
    use crate::state_machine::prompts::{ANALYSIS_UNAVAILABLE, CLEARED, SCHEDULING};
    use crate::state_machine::{Stage, UrgencyLevel};
    use tokio_util::sync::CancellationToken;

    const USER: &str = "patient-1";

    /// Answers that walk a fresh conversation up to `analysis`
    const WALKTHROUGH: [&str; 6] = [
        "estou com dor de cabeça",
        "há 2 dias",
        "7",
        "latejante",
        "piora com luz",
        "nenhuma doença prévia",
    ];

    fn manager_with(
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn HypothesisGenerator>,
    ) -> RuntimeManager {
        RuntimeManager::new(store, generator, Duration::from_secs(5))
    }

    fn sqlite_store() -> Arc<dyn ConversationStore> {
        Arc::new(DatabaseStore::new(Database::open_in_memory().unwrap()))
    }

    fn request(text: &str) -> TurnRequest {
        TurnRequest {
            text: text.to_string(),
            conversation_id: None,
            message_id: None,
        }
    }

    async fn send(manager: &RuntimeManager, text: &str) -> TurnOutcome {
        manager
            .submit_turn(USER, request(text), CancellationToken::new())
            .await
            .unwrap()
    }

    fn hypothesis(condition: &str, probability: u8) -> DiagnosticHypothesis {
        DiagnosticHypothesis {
            condition: condition.to_string(),
            probability,
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn test_fever_report_starts_interview() {
        let generator = Arc::new(MockHypothesisGenerator::new());
        let manager = manager_with(sqlite_store(), generator.clone());

        let outcome = send(&manager, "estou com febre há 3 dias").await;

        assert_eq!(outcome.metadata.intent, Some(Intent::SymptomReport));
        assert_eq!(outcome.metadata.stage, Stage::Duration);
        assert!(outcome.metadata.urgency <= UrgencyLevel::Medium);
        assert!(outcome.metadata.hypotheses.is_empty());
        assert!(!outcome.metadata.urgent_flag);
        assert!(!outcome.replayed);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_emergency_flag_raised_once() {
        let manager = manager_with(sqlite_store(), Arc::new(MockHypothesisGenerator::new()));

        send(&manager, "estou com dor de barriga").await;
        let first = send(&manager, "agora sinto dor no peito e falta de ar").await;
        assert_eq!(first.metadata.urgency, UrgencyLevel::Emergency);
        assert!(first.metadata.urgent_flag);

        let second = send(&manager, "continua a falta de ar").await;
        assert_eq!(second.metadata.urgency, UrgencyLevel::Emergency);
        assert!(!second.metadata.urgent_flag);
    }

    #[tokio::test]
    async fn test_analysis_calls_generator_once_and_completes() {
        let generator = Arc::new(MockHypothesisGenerator::new());
        generator.queue_hypotheses(vec![hypothesis("Sinusite", 20), hypothesis("Enxaqueca", 70)]);
        let manager = manager_with(sqlite_store(), generator.clone());

        let mut last = None;
        for text in WALKTHROUGH {
            last = Some(send(&manager, text).await);
        }
        let outcome = last.unwrap();

        assert_eq!(generator.call_count(), 1);
        let summary = &generator.calls.lock().unwrap()[0];
        assert_eq!(summary.chief_complaint.as_deref(), Some("estou com dor de cabeça"));
        assert_eq!(summary.intensity.as_deref(), Some("7"));
        assert_eq!(summary.history.as_deref(), Some("nenhuma doença prévia"));

        assert_eq!(outcome.metadata.stage, Stage::Complete);
        assert!(outcome.metadata.is_complete);
        let conditions: Vec<_> = outcome
            .metadata
            .hypotheses
            .iter()
            .map(|h| h.condition.as_str())
            .collect();
        assert_eq!(conditions, vec!["Enxaqueca", "Sinusite"]);
        assert!(outcome.response.contains("1. Enxaqueca (70%)"));
    }

    #[tokio::test]
    async fn test_generator_failure_stays_in_analysis() {
        let generator = Arc::new(MockHypothesisGenerator::new());
        generator.queue_error(LlmError::from_status(529, "overloaded"));
        let manager = manager_with(sqlite_store(), generator.clone());

        let mut last = None;
        for text in WALKTHROUGH {
            last = Some(send(&manager, text).await);
        }
        let outcome = last.unwrap();

        assert_eq!(generator.call_count(), 1);
        assert_eq!(outcome.metadata.stage, Stage::Analysis);
        assert!(!outcome.metadata.is_complete);
        assert!(outcome.metadata.hypotheses.is_empty());
        assert_eq!(outcome.response, ANALYSIS_UNAVAILABLE);

        // Any further message retries the generation
        generator.queue_hypotheses(vec![hypothesis("Enxaqueca", 70)]);
        let retry = send(&manager, "tomei dipirona e não melhorou").await;
        assert_eq!(generator.call_count(), 2);
        assert_eq!(retry.metadata.stage, Stage::Complete);
        assert_eq!(
            generator.calls.lock().unwrap()[1].additions,
            vec!["tomei dipirona e não melhorou"]
        );
    }

    #[tokio::test]
    async fn test_scheduling_request_keeps_stage() {
        let manager = manager_with(sqlite_store(), Arc::new(MockHypothesisGenerator::new()));

        let outcome = send(&manager, "quero agendar uma consulta").await;

        assert_eq!(outcome.metadata.intent, Some(Intent::SchedulingRequest));
        assert_eq!(outcome.metadata.stage, Stage::Initial);
        assert_eq!(outcome.response, SCHEDULING);
    }

    #[tokio::test]
    async fn test_new_conversation_after_complete() {
        let generator = Arc::new(MockHypothesisGenerator::new());
        generator.queue_hypotheses(vec![hypothesis("Enxaqueca", 70)]);
        let store = sqlite_store();
        let manager = manager_with(store.clone(), generator);

        let mut first_id = String::new();
        for text in WALKTHROUGH {
            first_id = send(&manager, text).await.conversation_id;
        }

        let outcome = manager
            .submit_turn(
                USER,
                TurnRequest {
                    conversation_id: Some(first_id.clone()),
                    ..request("agora estou com tosse")
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_ne!(outcome.conversation_id, first_id);
        assert_eq!(outcome.metadata.stage, Stage::Duration);
        assert!(!outcome.metadata.is_complete);

        let messages = store.messages(&outcome.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].metadata.as_ref().unwrap().stage, Stage::Initial);
        assert!(store.get(&first_id).await.unwrap().unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_retry_with_same_message_id_replays() {
        let store = sqlite_store();
        let manager = manager_with(store.clone(), Arc::new(MockHypothesisGenerator::new()));

        let req = TurnRequest {
            message_id: Some("client-msg-1".to_string()),
            ..request("estou com febre")
        };
        let first = manager
            .submit_turn(USER, req.clone(), CancellationToken::new())
            .await
            .unwrap();
        let second = manager
            .submit_turn(USER, req, CancellationToken::new())
            .await
            .unwrap();

        assert!(second.replayed);
        assert_eq!(second.response, first.response);
        assert_eq!(second.metadata, first.metadata);
        assert_eq!(second.conversation_id, first.conversation_id);

        let messages = store.messages(&first.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            store.load(USER).await.unwrap().unwrap().state.stage,
            Stage::Duration
        );
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_no_trace() {
        let store = Arc::new(FlakyStore::new());
        let manager = manager_with(store.clone(), Arc::new(MockHypothesisGenerator::new()));

        let first = send(&manager, "estou com febre").await;
        store.fail_commits.store(true, Ordering::SeqCst);

        let result = manager
            .submit_turn(USER, request("há 3 dias"), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(TriageError::Persistence(_))));

        let conversation = store.load(USER).await.unwrap().unwrap();
        assert_eq!(conversation.state.stage, Stage::Duration);
        assert!(conversation.state.interview.duration.is_none());
        assert_eq!(store.messages(&first.conversation_id).await.unwrap().len(), 2);

        store.fail_commits.store(false, Ordering::SeqCst);
        let retry = send(&manager, "há 3 dias").await;
        assert_eq!(retry.metadata.stage, Stage::Intensity);
    }

    #[tokio::test]
    async fn test_cancel_during_generation_commits_nothing() {
        let generator = Arc::new(DelayedHypothesisGenerator::new(Duration::from_secs(30)));
        let store = sqlite_store();
        let manager = Arc::new(manager_with(store.clone(), generator.clone()));

        for text in &WALKTHROUGH[..5] {
            send(&manager, text).await;
        }

        let cancel = CancellationToken::new();
        let task = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                manager
                    .submit_turn(USER, request(WALKTHROUGH[5]), cancel)
                    .await
            })
        };

        generator.started.notified().await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(TriageError::Cancelled)));

        let conversation = store.load(USER).await.unwrap().unwrap();
        assert_eq!(conversation.state.stage, Stage::History);
        assert_eq!(store.messages(&conversation.id).await.unwrap().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generator_timeout_is_a_failure() {
        let generator = Arc::new(DelayedHypothesisGenerator::new(Duration::from_secs(60)));
        let manager = manager_with(sqlite_store(), generator);

        let mut last = None;
        for text in WALKTHROUGH {
            last = Some(send(&manager, text).await);
        }
        let outcome = last.unwrap();

        assert_eq!(outcome.metadata.stage, Stage::Analysis);
        assert_eq!(outcome.response, ANALYSIS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_stale_and_foreign_conversation_ids() {
        let store = sqlite_store();
        let manager = manager_with(store.clone(), Arc::new(MockHypothesisGenerator::new()));

        let mine = send(&manager, "estou com febre").await;

        let stale = manager
            .submit_turn(
                USER,
                TurnRequest {
                    conversation_id: Some("some-other-id".to_string()),
                    ..request("há 3 dias")
                },
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            stale,
            Err(TriageError::StaleConversation { active }) if active == mine.conversation_id
        ));

        let foreign = manager
            .submit_turn(
                "patient-2",
                TurnRequest {
                    conversation_id: Some(mine.conversation_id.clone()),
                    ..request("estou com tosse")
                },
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(foreign, Err(TriageError::ConversationNotFound(_))));
        assert!(manager
            .conversation("patient-2", &mine.conversation_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let store = sqlite_store();
        let manager = Arc::new(manager_with(store.clone(), Arc::new(MockHypothesisGenerator::new())));

        let handles: Vec<_> = ["estou com febre", "tenho tosse também", "sinto dor no corpo"]
            .into_iter()
            .map(|text| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .submit_turn(USER, request(text), CancellationToken::new())
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let conversation = store.load(USER).await.unwrap().unwrap();
        assert_eq!(conversation.state.stage, Stage::Quality);
        let messages = store.messages(&conversation.id).await.unwrap();
        assert_eq!(messages.len(), 6);
        let sequences: Vec<_> = messages.iter().map(|m| m.sequence_id).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_clear_terminates_active_conversation() {
        let store = sqlite_store();
        let manager = manager_with(store.clone(), Arc::new(MockHypothesisGenerator::new()));

        assert_eq!(manager.clear(USER).await.unwrap(), None);

        let outcome = send(&manager, "estou com febre").await;
        let cleared = manager.clear(USER).await.unwrap();
        assert_eq!(cleared.as_deref(), Some(outcome.conversation_id.as_str()));
        assert!(manager.active_conversation(USER).await.unwrap().is_none());

        let view = manager
            .conversation(USER, &outcome.conversation_id)
            .await
            .unwrap();
        assert!(view.conversation.is_complete());
        let last = view.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.content, CLEARED);

        let next = send(&manager, "estou com tosse").await;
        assert_ne!(next.conversation_id, outcome.conversation_id);
    }

    #[tokio::test]
    async fn test_failed_clear_leaves_conversation_active() {
        let store = Arc::new(FlakyStore::new());
        let manager = manager_with(store.clone(), Arc::new(MockHypothesisGenerator::new()));

        let outcome = send(&manager, "estou com febre").await;
        store.fail_commits.store(true, Ordering::SeqCst);

        let result = manager.clear(USER).await;
        assert!(matches!(result, Err(TriageError::Persistence(_))));

        let active = store.load(USER).await.unwrap().unwrap();
        assert_eq!(active.id, outcome.conversation_id);
        assert!(!active.is_complete());
        assert_eq!(store.messages(&active.id).await.unwrap().len(), 2);

        store.fail_commits.store(false, Ordering::SeqCst);
        let cleared = manager.clear(USER).await.unwrap();
        assert_eq!(cleared.as_deref(), Some(outcome.conversation_id.as_str()));
        assert!(store.load(USER).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_runtimes_stop_and_restart() {
        let manager = manager_with(sqlite_store(), Arc::new(MockHypothesisGenerator::new()))
            .with_idle_timeout(Duration::from_secs(60));

        let mut greetings = Vec::new();
        for user in ["patient-a", "patient-b", "patient-c"] {
            let outcome = manager
                .submit_turn(user, request("olá"), CancellationToken::new())
                .await
                .unwrap();
            greetings.push(outcome);
        }
        assert_eq!(manager.live_runtimes().await, 3);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(manager.live_runtimes().await, 0);

        // The returning user continues the stored conversation on a fresh runtime
        let outcome = manager
            .submit_turn("patient-a", request("estou com febre"), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.conversation_id, greetings[0].conversation_id);
        assert_eq!(outcome.metadata.stage, Stage::Duration);
        assert_eq!(manager.live_runtimes().await, 1);
        assert_eq!(manager.tracked_runtimes().await, 1);
    }
}
