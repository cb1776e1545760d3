//! Pure state transition function
//!
//! Given the same state and event it always produces the same new state,
//! reply text and effects, with no I/O.

use super::prompts::{
    hypotheses_reply, scheduling_reply, stage_prompt, ALREADY_COMPLETE, ANALYSIS_UNAVAILABLE,
    CLEARED, EMERGENCY_ADVISORY, GREETING,
};
use super::state::{rank_hypotheses, Stage, TriageState, UrgencyLevel};
use super::{ConvContext, Effect, Event};
use crate::classifier::Intent;
use crate::urgency;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TriageState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TriageState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    /// The transition left the conversation untouched
    #[cfg(test)]
    pub fn is_noop(&self, previous: &TriageState) -> bool {
        &self.new_state == previous
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Hypotheses arrived while the conversation is at stage {0}")]
    UnexpectedHypotheses(Stage),
}

/// Pure transition function
pub fn transition(
    state: &TriageState,
    _context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match event {
        // ============================================================
        // Terminated conversations accept nothing
        // ============================================================
        Event::UserMessage { text, intent } if state.is_complete => {
            Ok(TransitionResult::new(state.clone())
                .with_effect(Effect::record_user_message(text, intent))
                .with_effect(Effect::reply(ALREADY_COMPLETE)))
        }

        Event::Reset if state.is_complete => Ok(TransitionResult::new(state.clone())),

        // ============================================================
        // User Messages
        // ============================================================

        // Scheduling is orthogonal to the interview: stage untouched
        Event::UserMessage {
            text,
            intent: Intent::SchedulingRequest,
        } => Ok(TransitionResult::new(state.clone())
            .with_effect(Effect::record_user_message(text, Intent::SchedulingRequest))
            .with_effect(Effect::reply(scheduling_reply(state.stage)))),

        // Small talk before any symptom does not start the interview
        Event::UserMessage {
            text,
            intent: Intent::GeneralQuestion,
        } if state.stage == Stage::Initial => Ok(TransitionResult::new(state.clone())
            .with_effect(Effect::record_user_message(text, Intent::GeneralQuestion))
            .with_effect(Effect::reply(GREETING))),

        // Answer to the pending question (or first symptom report): record and advance
        Event::UserMessage { text, intent } if state.stage.is_collecting() => {
            Ok(record_answer(state, text, intent))
        }

        // Analysis pending: keep the details and retry generation
        Event::UserMessage { text, intent } => Ok(record_answer(state, text, intent)),

        // ============================================================
        // Hypothesis Generator
        // ============================================================
        Event::HypothesesReady { hypotheses } if state.stage == Stage::Analysis => {
            let hypotheses = rank_hypotheses(hypotheses);
            let reply = hypotheses_reply(&hypotheses, state.urgency);
            let new_state = TriageState {
                stage: Stage::Complete,
                is_complete: true,
                hypotheses,
                ..state.clone()
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PersistState)
                .with_effect(Effect::reply(reply)))
        }

        // Stay in analysis so a later turn can retry
        Event::HypothesesFailed { .. } if state.stage == Stage::Analysis => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::reply(ANALYSIS_UNAVAILABLE)))
        }

        Event::HypothesesReady { .. } | Event::HypothesesFailed { .. } => {
            Err(TransitionError::UnexpectedHypotheses(state.stage))
        }

        // ============================================================
        // Explicit clear
        // ============================================================
        Event::Reset => Ok(TransitionResult::new(TriageState {
            is_complete: true,
            ..state.clone()
        })
        .with_effect(Effect::PersistState)
        .with_effect(Effect::reply(CLEARED))),
    }
}

/// Record `text` as the datum of the current stage, advance one stage if
/// still collecting, and re-evaluate urgency.
fn record_answer(state: &TriageState, text: String, intent: Intent) -> TransitionResult {
    let mut new_state = state.clone();
    new_state.interview.record(state.stage, &text);
    if state.stage.is_collecting() {
        new_state.stage = state.stage.next().unwrap_or(state.stage);
    }
    new_state.urgency = urgency::evaluate(&new_state.interview, state.urgency);

    let mut effects = vec![
        Effect::record_user_message(text, intent),
        Effect::PersistState,
    ];

    if new_state.urgency == UrgencyLevel::Emergency && !state.urgent_flag_raised {
        new_state.urgent_flag_raised = true;
        effects.push(Effect::RaiseUrgentFlag {
            level: new_state.urgency,
        });
        effects.push(Effect::reply(EMERGENCY_ADVISORY));
    }

    if new_state.stage == Stage::Analysis {
        effects.push(Effect::RequestHypotheses {
            summary: new_state.interview.summary(new_state.urgency),
        });
    } else {
        effects.push(Effect::reply(stage_prompt(new_state.stage)));
    }

    TransitionResult::new(new_state).with_effects(effects)
}
