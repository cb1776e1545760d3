//! Events that can occur in a triage conversation

use crate::classifier::Intent;
use crate::state_machine::state::DiagnosticHypothesis;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
        intent: Intent,
    },
    /// Explicit "clear chat"
    Reset,

    // Hypothesis generator events
    HypothesesReady {
        hypotheses: Vec<DiagnosticHypothesis>,
    },
    HypothesesFailed {
        message: String,
    },
}

impl Event {
    pub fn user_message(text: impl Into<String>, intent: Intent) -> Self {
        Event::UserMessage {
            text: text.into(),
            intent,
        }
    }
}
