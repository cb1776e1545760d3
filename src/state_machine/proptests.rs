//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::{DiagnosticHypothesis, Stage, TriageState, UrgencyLevel};
use super::{transition, ConvContext, Effect, Event};
use crate::classifier::Intent;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new("test-conv", "test-user")
}

fn raised_flags(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| matches!(e, Effect::RaiseUrgentFlag { .. }))
        .count()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![
        Just(Intent::SymptomReport),
        Just(Intent::SchedulingRequest),
        Just(Intent::GeneralQuestion),
    ]
}

fn arb_stage() -> impl Strategy<Value = Stage> {
    proptest::sample::select(Stage::ALL.to_vec())
}

fn arb_urgency() -> impl Strategy<Value = UrgencyLevel> {
    prop_oneof![
        Just(UrgencyLevel::Low),
        Just(UrgencyLevel::Medium),
        Just(UrgencyLevel::High),
        Just(UrgencyLevel::Emergency),
    ]
}

/// Free text mixed with vocabulary the evaluator reacts to
fn arb_text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z ]{1,30}",
        Just("estou com dor de cabeça".to_string()),
        Just("dor no peito".to_string()),
        Just("vomitando muito forte".to_string()),
        Just("quero agendar uma consulta".to_string()),
        Just("9".to_string()),
    ]
}

fn arb_hypothesis() -> impl Strategy<Value = DiagnosticHypothesis> {
    ("[A-Za-z ]{1,20}", 0u8..=100, "[a-z ]{0,30}").prop_map(
        |(condition, probability, reasoning)| DiagnosticHypothesis {
            condition,
            probability,
            reasoning,
        },
    )
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        6 => (arb_text(), arb_intent()).prop_map(|(text, intent)| Event::user_message(text, intent)),
        1 => proptest::collection::vec(arb_hypothesis(), 0..6)
            .prop_map(|hypotheses| Event::HypothesesReady { hypotheses }),
        1 => "[a-z ]{1,20}".prop_map(|message| Event::HypothesesFailed { message }),
        1 => Just(Event::Reset),
    ]
}

fn arb_open_state() -> impl Strategy<Value = TriageState> {
    (arb_stage(), arb_urgency(), any::<bool>()).prop_map(|(stage, urgency, flag)| TriageState {
        stage: if stage == Stage::Complete {
            Stage::History
        } else {
            stage
        },
        urgency,
        is_complete: false,
        urgent_flag_raised: flag && urgency == UrgencyLevel::Emergency,
        ..Default::default()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Stage and urgency never move backwards, whatever the event sequence
    #[test]
    fn prop_stage_and_urgency_monotonic(events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut state = TriageState::default();
        let ctx = test_context();

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                prop_assert!(result.new_state.stage >= state.stage);
                prop_assert!(result.new_state.urgency >= state.urgency);
                prop_assert!(!state.is_complete || result.new_state.is_complete);
                state = result.new_state;
            }
        }
    }

    // The emergency alert is raised at most once per conversation
    #[test]
    fn prop_urgent_flag_raised_at_most_once(events in proptest::collection::vec(arb_event(), 0..30)) {
        let mut state = TriageState::default();
        let ctx = test_context();
        let mut raised = 0;

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                raised += raised_flags(&result.effects);
                state = result.new_state;
            }
        }
        prop_assert!(raised <= 1, "raised {} times", raised);
        prop_assert_eq!(raised == 1, state.urgent_flag_raised);
    }

    // Any state change is followed by a persist
    #[test]
    fn prop_state_changes_persist(state in arb_open_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            if result.new_state != state {
                prop_assert!(
                    result.effects.contains(&Effect::PersistState),
                    "state changed without persist: {:?}",
                    result.effects
                );
            }
        }
    }

    // Hypotheses are requested only on entering or re-trying analysis
    #[test]
    fn prop_hypotheses_requested_only_at_analysis(state in arb_open_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            let requested = result
                .effects
                .iter()
                .any(|e| matches!(e, Effect::RequestHypotheses { .. }));
            if requested {
                prop_assert_eq!(result.new_state.stage, Stage::Analysis);
            }
        }
    }

    // Scheduling never touches the interview
    #[test]
    fn prop_scheduling_never_advances(state in arb_open_state(), text in arb_text()) {
        let event = Event::user_message(text, Intent::SchedulingRequest);
        let result = transition(&state, &test_context(), event).unwrap();
        prop_assert_eq!(&result.new_state, &state);
        prop_assert!(!result.effects.contains(&Effect::PersistState));
    }

    // Every accepted user message gets a reply or a pending analysis
    #[test]
    fn prop_user_message_always_answered(
        state in arb_open_state(),
        text in arb_text(),
        intent in arb_intent(),
    ) {
        let result = transition(&state, &test_context(), Event::user_message(text, intent)).unwrap();
        let answered = result.effects.iter().any(|e| {
            matches!(e, Effect::Reply { .. } | Effect::RequestHypotheses { .. })
        });
        prop_assert!(answered, "no reply for {:?}", result.effects);
        prop_assert!(matches!(
            result.effects.first(),
            Some(Effect::RecordUserMessage { .. })
        ), "first effect was not RecordUserMessage: {:?}", result.effects);
    }

    // Hypotheses outside analysis are rejected
    #[test]
    fn prop_hypotheses_only_accepted_in_analysis(
        state in arb_open_state(),
        hypotheses in proptest::collection::vec(arb_hypothesis(), 0..4),
    ) {
        let result = transition(&state, &test_context(), Event::HypothesesReady { hypotheses });
        if state.stage == Stage::Analysis {
            let result = result.unwrap();
            prop_assert!(result.new_state.is_complete);
            prop_assert!(result
                .new_state
                .hypotheses
                .windows(2)
                .all(|w| w[0].probability >= w[1].probability));
        } else {
            prop_assert!(result.is_err());
        }
    }
}
