//! Effects produced by state transitions

use crate::classifier::Intent;
use crate::state_machine::state::{SymptomSummary, UrgencyLevel};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Stage the user's message for the turn commit
    RecordUserMessage { text: String, intent: Intent },

    /// Persist the new state
    PersistState,

    /// Ask the reasoning service for diagnostic hypotheses
    RequestHypotheses { summary: SymptomSummary },

    /// First entry into emergency; surfaced once to the client
    RaiseUrgentFlag { level: UrgencyLevel },

    /// Text appended to the assistant reply for this turn
    Reply { text: String },
}

impl Effect {
    pub fn reply(text: impl Into<String>) -> Self {
        Effect::Reply { text: text.into() }
    }

    pub fn record_user_message(text: impl Into<String>, intent: Intent) -> Self {
        Effect::RecordUserMessage {
            text: text.into(),
            intent,
        }
    }
}
