//! Property-based tests for the state machine
//!
//! Arbitrary event sequences are driven through `transition`; rejected events
//! are dropped, accepted ones are applied, and invariants are checked after
//! every step.

use super::state::*;
use super::transition::*;
use super::*;
use crate::curriculum::{CurriculumPolicy, UNIT_COUNT};
use crate::marker::{PASS_MARKER, STAY_MARKER};
use proptest::prelude::*;

const LIMIT: u32 = 30;

fn test_context(policy: CurriculumPolicy) -> SessionContext {
    SessionContext::new("prop", LIMIT, policy)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_error_kind() -> impl Strategy<Value = SessionErrorKind> {
    prop_oneof![
        Just(SessionErrorKind::BackendUnavailable),
        Just(SessionErrorKind::BackendRateLimited),
        Just(SessionErrorKind::BackendMalformedOutput),
        Just(SessionErrorKind::BackendRejected),
    ]
}

fn arb_user_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        Just("Ava".to_string()),
        Just("yes please".to_string()),
        Just("no".to_string()),
        Just("beginner".to_string()),
        "[a-zA-Z ]{1,30}",
    ]
}

fn arb_reply() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("Sure thing".to_string()),
        Just(format!("Well done\n{PASS_MARKER}")),
        Just(format!("Keep practicing\n{STAY_MARKER}")),
        Just("[not json".to_string()),
        "[a-zA-Z .!]{1,40}",
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        1 => Just(Event::Start),
        1 => Just(Event::Restart),
        4 => arb_user_text().prop_map(|text| Event::UserInput { text }),
        5 => arb_reply().prop_map(|text| Event::GenerationComplete { text }),
        2 => (arb_error_kind(), "[a-z ]{1,20}").prop_map(|(kind, message)| {
            Event::GenerationFailed {
                error: SessionError::new(kind, message),
            }
        }),
    ]
}

fn arb_policy() -> impl Strategy<Value = CurriculumPolicy> {
    prop_oneof![Just(CurriculumPolicy::Fixed), Just(CurriculumPolicy::Synthesized)]
}

fn check_invariants(state: &ConversationState) -> Result<(), TestCaseError> {
    if !state.curriculum.is_empty() {
        prop_assert!(state.current_unit_index < state.curriculum.len());
    }
    if matches!(state.stage, Stage::InUnit | Stage::Complete) {
        prop_assert_eq!(state.curriculum.len(), UNIT_COUNT);
    }
    prop_assert!(state.message_count <= LIMIT);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_invariants_hold_over_event_sequences(
        policy in arb_policy(),
        events in prop::collection::vec(arb_event(), 1..80),
    ) {
        let context = test_context(policy);
        let mut state = ConversationState::default();

        for event in events {
            let is_restart = matches!(event, Event::Restart);
            let Ok(result) = transition(&state, &context, event) else {
                continue;
            };
            let next = result.new_state;

            if !is_restart {
                prop_assert!(next.message_count >= state.message_count);
                prop_assert!(next.history.len() >= state.history.len());
                prop_assert!(next.history.len() <= state.history.len() + 2);
            }
            check_invariants(&next)?;
            state = next;
        }
    }

    #[test]
    fn prop_failures_never_change_stage_or_history(
        policy in arb_policy(),
        setup in prop::collection::vec(arb_event(), 0..40),
        kind in arb_error_kind(),
    ) {
        let context = test_context(policy);
        let mut state = ConversationState::default();
        for event in setup {
            if let Ok(result) = transition(&state, &context, event) {
                state = result.new_state;
            }
        }
        prop_assume!(state.is_busy());

        let failed = transition(
            &state,
            &context,
            Event::GenerationFailed { error: SessionError::new(kind, "boom") },
        )
        .unwrap()
        .new_state;

        prop_assert_eq!(failed.stage, state.stage);
        prop_assert_eq!(&failed.history, &state.history);
        prop_assert_eq!(&failed.user_profile, &state.user_profile);
        prop_assert_eq!(failed.current_unit_index, state.current_unit_index);
        prop_assert_eq!(failed.message_count, state.message_count);
        prop_assert!(!failed.is_busy());
        prop_assert_eq!(failed.last_error.map(|e| e.kind), Some(kind));
    }

    #[test]
    fn prop_blank_input_is_rejected_everywhere(
        setup in prop::collection::vec(arb_event(), 0..40),
        blank in "[ \\t\\n]{0,5}",
    ) {
        let context = test_context(CurriculumPolicy::Fixed);
        let mut state = ConversationState::default();
        for event in setup {
            if let Ok(result) = transition(&state, &context, event) {
                state = result.new_state;
            }
        }
        prop_assume!(!state.is_busy() && state.stage != Stage::Complete);

        let result = transition(&state, &context, Event::UserInput { text: blank });
        prop_assert_eq!(result.unwrap_err(), TransitionError::EmptyInput);
    }

    #[test]
    fn prop_restart_restores_defaults(
        setup in prop::collection::vec(arb_event(), 0..60),
    ) {
        let context = test_context(CurriculumPolicy::Fixed);
        let mut state = ConversationState::default();
        for event in setup {
            if let Ok(result) = transition(&state, &context, event) {
                state = result.new_state;
            }
        }
        prop_assume!(!state.is_busy());

        let reset = transition(&state, &context, Event::Restart).unwrap().new_state;
        prop_assert_eq!(reset, ConversationState::default());
    }
}
