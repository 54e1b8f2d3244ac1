//! Pure state transition function
//!
//! Learner input never touches the history directly: it is parked in
//! `pending` and committed together with the backend reply, so a failed
//! generation leaves stage, profile and history exactly as they were.

use super::effect::Notification;
use super::state::{
    ConversationState, GenerationPurpose, PendingGeneration, SessionContext, SessionError,
    SessionErrorKind, Stage, Unit,
};
use super::{Effect, Event};
use crate::curriculum::{self, CurriculumPolicy, TOPIC};
use crate::llm::LlmMessage;
use crate::marker::{parse_verdict, UnitVerdict};
use crate::prompts;
use thiserror::Error;

/// Case-insensitive substrings that accept the offered topic
const AFFIRMATIVE_TOKENS: [&str; 5] = ["yes", "sure", "okay", "want", "would like"];

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
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
}

/// Errors that can occur during transition. The state is untouched whenever
/// one is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Please enter a message")]
    EmptyInput,
    #[error("A reply is still being generated, please wait")]
    Busy,
    #[error("All units are complete; restart to begin again")]
    ConversationComplete,
    #[error("You've reached the free message limit")]
    QuotaExceeded,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    state: &ConversationState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state.stage, event) {
        // One generation at a time
        (_, Event::Start | Event::Restart | Event::UserInput { .. }) if state.is_busy() => {
            Err(TransitionError::Busy)
        }

        // ============================================================
        // Session lifecycle
        // ============================================================
        (Stage::Welcome, Event::Start) if state.history.is_empty() => {
            check_quota(state, context)?;
            let mut new_state = state.clone();
            new_state.last_error = None;
            Ok(begin(
                new_state,
                PendingGeneration::new(GenerationPurpose::Greeting, None),
                prompts::greeting(),
            ))
        }

        (_, Event::Start) => Err(TransitionError::InvalidTransition(
            "session has already started".to_string(),
        )),

        (from, Event::Restart) => {
            let result = TransitionResult::new(ConversationState::default());
            if from == Stage::Welcome {
                Ok(result)
            } else {
                Ok(result.with_effect(Effect::stage_changed(from, Stage::Welcome)))
            }
        }

        // ============================================================
        // Learner input
        // ============================================================
        (Stage::Complete, Event::UserInput { .. }) => Err(TransitionError::ConversationComplete),

        (_, Event::UserInput { text }) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(TransitionError::EmptyInput);
            }
            check_quota(state, context)?;

            let (pending, instruction) = plan_reply(state, context, text)?;
            let mut new_state = state.clone();
            new_state.last_error = None;
            Ok(begin(new_state, pending, instruction))
        }

        // ============================================================
        // Backend results
        // ============================================================
        (_, Event::GenerationComplete { text }) => {
            let Some(pending) = state.pending.clone() else {
                return Err(TransitionError::InvalidTransition(
                    "no generation in flight".to_string(),
                ));
            };
            let text = text.trim();
            if text.is_empty() {
                return Ok(fail(
                    state,
                    SessionError::new(
                        SessionErrorKind::BackendMalformedOutput,
                        "Backend returned an empty response",
                    ),
                ));
            }
            Ok(commit(state, context, pending, text))
        }

        (_, Event::GenerationFailed { error }) => {
            if !state.is_busy() {
                return Err(TransitionError::InvalidTransition(
                    "no generation in flight".to_string(),
                ));
            }
            Ok(fail(state, error))
        }
    }
}

/// Whether the learner accepted the offered topic
pub fn is_affirmative(text: &str) -> bool {
    let lower = text.to_lowercase();
    AFFIRMATIVE_TOKENS.iter().any(|token| lower.contains(token))
}

fn check_quota(state: &ConversationState, context: &SessionContext) -> Result<(), TransitionError> {
    if state.message_count >= context.max_free_messages {
        Err(TransitionError::QuotaExceeded)
    } else {
        Ok(())
    }
}

/// Decide which generation answers `text` in the current stage
fn plan_reply(
    state: &ConversationState,
    context: &SessionContext,
    text: &str,
) -> Result<(PendingGeneration, String), TransitionError> {
    let input = Some(text.to_string());
    let plan = match state.stage {
        Stage::Welcome => (
            PendingGeneration::new(GenerationPurpose::AskEmail, input),
            prompts::ask_email(text),
        ),
        Stage::CollectingEmail => (
            PendingGeneration::new(GenerationPurpose::AskBirthDate, input),
            prompts::ask_birth_date(),
        ),
        Stage::CollectingBirthdate => (
            PendingGeneration::new(GenerationPurpose::OfferTopic, input),
            prompts::offer_topic(TOPIC),
        ),
        Stage::ConfirmingTopic if is_affirmative(text) => (
            PendingGeneration::new(GenerationPurpose::AskLevel, input),
            prompts::ask_level(TOPIC),
        ),
        Stage::ConfirmingTopic => (
            PendingGeneration::new(GenerationPurpose::DeclineTopic, input),
            prompts::decline_topic(),
        ),
        Stage::CollectingLevel => match context.curriculum_policy {
            CurriculumPolicy::Fixed => {
                let units = curriculum::fixed_curriculum();
                let instruction = first_unit_welcome(&units)?;
                (
                    PendingGeneration::new(GenerationPurpose::WelcomeUnit, input)
                        .with_curriculum(units),
                    instruction,
                )
            }
            CurriculumPolicy::Synthesized => (
                PendingGeneration::new(GenerationPurpose::SynthesizeCurriculum, input),
                prompts::synthesize_curriculum(TOPIC, text),
            ),
        },
        Stage::InUnit => {
            let unit = state.current_unit().ok_or_else(|| {
                TransitionError::InvalidTransition(format!(
                    "no unit at index {}",
                    state.current_unit_index
                ))
            })?;
            (
                PendingGeneration::new(GenerationPurpose::Tutor, input),
                prompts::tutor(unit),
            )
        }
        Stage::Complete => return Err(TransitionError::ConversationComplete),
    };
    Ok(plan)
}

fn first_unit_welcome(units: &[Unit]) -> Result<String, TransitionError> {
    units
        .first()
        .map(prompts::welcome_unit)
        .ok_or_else(|| TransitionError::InvalidTransition("curriculum is empty".to_string()))
}

/// Park `pending` and ask for its generation
fn begin(
    mut state: ConversationState,
    pending: PendingGeneration,
    instruction: String,
) -> TransitionResult {
    let effect = Effect::request(pending.purpose, instruction, pending.user_input.clone());
    state.pending = Some(pending);
    TransitionResult::new(state).with_effect(effect)
}

fn fail(state: &ConversationState, error: SessionError) -> TransitionResult {
    let mut new_state = state.clone();
    new_state.pending = None;
    new_state.last_error = Some(error.clone());
    TransitionResult::new(new_state).with_effect(Effect::Notify(Notification::GenerationFailed {
        error,
    }))
}

/// Apply a successful generation
fn commit(
    state: &ConversationState,
    context: &SessionContext,
    pending: PendingGeneration,
    text: &str,
) -> TransitionResult {
    if !pending.purpose.is_visible() {
        return stage_synthesized(state, pending, text);
    }

    let mut new_state = state.clone();
    new_state.pending = None;
    new_state.last_error = None;
    if let Some(input) = &pending.user_input {
        new_state.history.push(LlmMessage::user(input.clone()));
    }
    new_state.history.push(LlmMessage::assistant(text));
    new_state.message_count = new_state.message_count.saturating_add(1);

    let input = pending.user_input.clone().unwrap_or_default();
    let mut effects = Vec::new();
    let mut follow_up = None;

    match pending.purpose {
        GenerationPurpose::AskEmail => {
            new_state.user_profile.name = Some(input);
            new_state.stage = Stage::CollectingEmail;
        }
        GenerationPurpose::AskBirthDate => {
            new_state.user_profile.email = Some(input);
            new_state.stage = Stage::CollectingBirthdate;
        }
        GenerationPurpose::OfferTopic => {
            new_state.user_profile.birth_date = Some(input);
            new_state.stage = Stage::ConfirmingTopic;
        }
        GenerationPurpose::AskLevel => {
            new_state.selected_topic = Some(TOPIC.to_string());
            new_state.stage = Stage::CollectingLevel;
        }
        GenerationPurpose::DeclineTopic => {
            new_state.stage = Stage::Welcome;
        }
        GenerationPurpose::WelcomeUnit => {
            new_state.skill_level = Some(input);
            new_state.curriculum = pending.staged_curriculum;
            new_state.current_unit_index = 0;
            new_state.stage = Stage::InUnit;
        }
        GenerationPurpose::Tutor => {
            follow_up = judge_unit(state, &mut new_state, text, &mut effects);
        }
        GenerationPurpose::Greeting
        | GenerationPurpose::NextUnit
        | GenerationPurpose::Encourage
        | GenerationPurpose::Completion
        | GenerationPurpose::SynthesizeCurriculum => {}
    }

    if new_state.stage != state.stage {
        effects.insert(0, Effect::stage_changed(state.stage, new_state.stage));
    }

    if let Some((purpose, instruction)) = follow_up {
        let limit = context.max_free_messages;
        if new_state.message_count >= limit {
            new_state.last_error = Some(SessionError::quota(limit));
            effects.push(Effect::Notify(Notification::QuotaReached { limit }));
        } else {
            new_state.pending = Some(PendingGeneration::new(purpose, None));
            effects.push(Effect::request(purpose, instruction, None));
        }
    }

    TransitionResult::new(new_state).with_effects(effects)
}

/// Read the progression marker and advance. Returns the follow-up
/// generation to request.
fn judge_unit(
    state: &ConversationState,
    new_state: &mut ConversationState,
    reply: &str,
    effects: &mut Vec<Effect>,
) -> Option<(GenerationPurpose, String)> {
    let index = state.current_unit_index;
    let unit = state.curriculum.get(index)?;

    match parse_verdict(reply) {
        UnitVerdict::Stay => Some((GenerationPurpose::Encourage, prompts::encourage(unit))),
        UnitVerdict::Pass => {
            effects.push(Effect::Notify(Notification::UnitCompleted {
                index,
                title: unit.title.clone(),
            }));
            if let Some(next_unit) = state.curriculum.get(index + 1) {
                new_state.current_unit_index = index + 1;
                Some((GenerationPurpose::NextUnit, prompts::congratulate_next(next_unit)))
            } else {
                new_state.stage = Stage::Complete;
                effects.push(Effect::Notify(Notification::CurriculumCompleted));
                Some((GenerationPurpose::Completion, prompts::congratulate_completion()))
            }
        }
    }
}

/// The synthesized curriculum is parsed (or replaced by the fixed one) and
/// held in `pending` until the first unit's welcome succeeds.
fn stage_synthesized(
    state: &ConversationState,
    pending: PendingGeneration,
    output: &str,
) -> TransitionResult {
    let (units, parse_error) = curriculum::resolve_synthesized(output);
    let mut effects = Vec::new();
    if let Some(e) = parse_error {
        effects.push(Effect::Notify(Notification::CurriculumFallback {
            reason: e.to_string(),
        }));
    }

    match first_unit_welcome(&units) {
        Ok(instruction) => {
            let next = PendingGeneration::new(GenerationPurpose::WelcomeUnit, pending.user_input)
                .with_curriculum(units);
            begin(state.clone(), next, instruction).with_effects(effects)
        }
        Err(e) => fail(
            state,
            SessionError::new(SessionErrorKind::BackendMalformedOutput, e.to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::fixed_curriculum;
    use crate::marker::{PASS_MARKER, STAY_MARKER};
    use crate::state_machine::state::UserProfile;

    fn ctx() -> SessionContext {
        SessionContext::new("test", 50, CurriculumPolicy::Fixed)
    }

    fn step(state: &ConversationState, event: Event) -> TransitionResult {
        transition(state, &ctx(), event).unwrap()
    }

    /// Submit `text` and complete the resulting generation with `reply`
    fn turn(state: &ConversationState, text: &str, reply: &str) -> TransitionResult {
        let requested = step(state, Event::user_input(text));
        step(
            &requested.new_state,
            Event::GenerationComplete {
                text: reply.to_string(),
            },
        )
    }

    fn in_unit(index: usize) -> ConversationState {
        ConversationState {
            stage: Stage::InUnit,
            curriculum: fixed_curriculum(),
            current_unit_index: index,
            selected_topic: Some(TOPIC.to_string()),
            ..Default::default()
        }
    }

    fn requests(effects: &[Effect]) -> Vec<GenerationPurpose> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::RequestGeneration { purpose, .. } => Some(*purpose),
                Effect::Notify(_) => None,
            })
            .collect()
    }

    fn notifications(effects: &[Effect]) -> Vec<Notification> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(n.clone()),
                Effect::RequestGeneration { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_start_requests_greeting() {
        let result = step(&ConversationState::default(), Event::Start);
        assert_eq!(requests(&result.effects), vec![GenerationPurpose::Greeting]);
        assert!(result.new_state.is_busy());

        let greeted = step(
            &result.new_state,
            Event::GenerationComplete {
                text: "Hi, what should I call you?".to_string(),
            },
        );
        assert_eq!(greeted.new_state.stage, Stage::Welcome);
        assert_eq!(
            greeted.new_state.history,
            vec![LlmMessage::assistant("Hi, what should I call you?")]
        );
        assert_eq!(greeted.new_state.message_count, 1);
    }

    #[test]
    fn test_start_twice_is_invalid() {
        let state = ConversationState {
            history: vec![LlmMessage::assistant("Hi")],
            ..Default::default()
        };
        assert!(matches!(
            transition(&state, &ctx(), Event::Start),
            Err(TransitionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_name_is_committed_with_reply() {
        let state = ConversationState {
            history: vec![LlmMessage::assistant("Hi")],
            message_count: 1,
            ..Default::default()
        };
        let requested = step(&state, Event::user_input("  Ava "));
        // Nothing committed yet
        assert_eq!(requested.new_state.history.len(), 1);
        assert_eq!(requested.new_state.user_profile.name, None);
        match &requested.effects[0] {
            Effect::RequestGeneration {
                purpose,
                instruction,
                user_input,
            } => {
                assert_eq!(*purpose, GenerationPurpose::AskEmail);
                assert!(instruction.contains("'Ava'"));
                assert_eq!(user_input.as_deref(), Some("Ava"));
            }
            other => panic!("unexpected effect {other:?}"),
        }

        let done = step(
            &requested.new_state,
            Event::GenerationComplete {
                text: "Nice to meet you Ava! Your email?".to_string(),
            },
        );
        let s = &done.new_state;
        assert_eq!(s.stage, Stage::CollectingEmail);
        assert_eq!(s.user_profile.name.as_deref(), Some("Ava"));
        assert_eq!(s.history.len(), 3);
        assert_eq!(s.history[1], LlmMessage::user("Ava"));
        assert_eq!(s.message_count, 2);
        assert_eq!(
            notifications(&done.effects),
            vec![Notification::StageChanged {
                from: Stage::Welcome,
                to: Stage::CollectingEmail
            }]
        );
    }

    #[test]
    fn test_onboarding_happy_path() {
        let mut state = ConversationState::default();
        state = turn(&state, "Ava", "Email please").new_state;
        state = turn(&state, "a@b.co", "Birth date please").new_state;
        state = turn(&state, "1990-01-01", "Want to learn prompt engineering?").new_state;
        assert_eq!(state.stage, Stage::ConfirmingTopic);
        state = turn(&state, "Sure, let's go", "What's your level?").new_state;
        assert_eq!(state.stage, Stage::CollectingLevel);
        assert_eq!(state.selected_topic.as_deref(), Some(TOPIC));
        state = turn(&state, "beginner", "Welcome to unit 1").new_state;

        assert_eq!(state.stage, Stage::InUnit);
        assert_eq!(state.current_unit_index, 0);
        assert_eq!(state.curriculum, fixed_curriculum());
        assert_eq!(state.skill_level.as_deref(), Some("beginner"));
        assert_eq!(
            state.user_profile,
            UserProfile {
                name: Some("Ava".to_string()),
                email: Some("a@b.co".to_string()),
                birth_date: Some("1990-01-01".to_string()),
            }
        );
        assert_eq!(state.history.len(), 10);
        assert_eq!(state.message_count, 5);
    }

    #[test]
    fn test_email_not_validated() {
        let state = ConversationState {
            stage: Stage::CollectingEmail,
            ..Default::default()
        };
        let done = turn(&state, "not-an-email", "Thanks! Birth date?");
        assert_eq!(done.new_state.user_profile.email.as_deref(), Some("not-an-email"));
        assert_eq!(done.new_state.stage, Stage::CollectingBirthdate);
    }

    #[test]
    fn test_decline_returns_to_welcome() {
        let state = ConversationState {
            stage: Stage::ConfirmingTopic,
            ..Default::default()
        };
        let requested = step(&state, Event::user_input("no thanks"));
        assert_eq!(requests(&requested.effects), vec![GenerationPurpose::DeclineTopic]);

        let done = turn(&state, "no thanks", "Other skills are coming soon.");
        assert_eq!(done.new_state.stage, Stage::Welcome);
        assert_eq!(done.new_state.selected_topic, None);
    }

    #[test]
    fn test_affirmative_tokens() {
        assert!(is_affirmative("YES"));
        assert!(is_affirmative("I would like that"));
        assert!(is_affirmative("okay"));
        assert!(is_affirmative("I want to"));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("maybe later"));
    }

    #[test]
    fn test_empty_input_is_noop() {
        let state = ConversationState {
            stage: Stage::CollectingEmail,
            ..Default::default()
        };
        assert_eq!(
            transition(&state, &ctx(), Event::user_input("   \n")).unwrap_err(),
            TransitionError::EmptyInput
        );
    }

    #[test]
    fn test_input_while_pending_is_busy() {
        let requested = step(&ConversationState::default(), Event::user_input("Ava"));
        assert_eq!(
            transition(&requested.new_state, &ctx(), Event::user_input("again")).unwrap_err(),
            TransitionError::Busy
        );
        assert_eq!(
            transition(&requested.new_state, &ctx(), Event::Restart).unwrap_err(),
            TransitionError::Busy
        );
    }

    #[test]
    fn test_input_when_complete_rejected() {
        let state = ConversationState {
            stage: Stage::Complete,
            ..in_unit(4)
        };
        assert_eq!(
            transition(&state, &ctx(), Event::user_input("more?")).unwrap_err(),
            TransitionError::ConversationComplete
        );
    }

    #[test]
    fn test_quota_blocks_generation() {
        let state = ConversationState {
            stage: Stage::CollectingEmail,
            message_count: 50,
            ..Default::default()
        };
        assert_eq!(
            transition(&state, &ctx(), Event::user_input("a@b.co")).unwrap_err(),
            TransitionError::QuotaExceeded
        );
    }

    #[test]
    fn test_failure_leaves_stage_and_history() {
        let state = ConversationState {
            stage: Stage::CollectingBirthdate,
            history: vec![LlmMessage::assistant("Birth date?")],
            message_count: 3,
            ..Default::default()
        };
        let requested = step(&state, Event::user_input("1990-01-01"));
        let error = SessionError::new(SessionErrorKind::BackendUnavailable, "connection refused");
        let failed = step(
            &requested.new_state,
            Event::GenerationFailed {
                error: error.clone(),
            },
        );

        let s = &failed.new_state;
        assert_eq!(s.stage, Stage::CollectingBirthdate);
        assert_eq!(s.history, state.history);
        assert_eq!(s.user_profile.birth_date, None);
        assert_eq!(s.message_count, 3);
        assert!(!s.is_busy());
        assert_eq!(s.last_error.as_ref(), Some(&error));
        assert_eq!(
            notifications(&failed.effects),
            vec![Notification::GenerationFailed { error }]
        );

        // The learner can resubmit
        let retried = turn(s, "1990-01-01", "Want to learn prompt engineering?");
        assert_eq!(retried.new_state.stage, Stage::ConfirmingTopic);
        assert_eq!(retried.new_state.last_error, None);
    }

    #[test]
    fn test_blank_reply_is_malformed() {
        let requested = step(&ConversationState::default(), Event::Start);
        let done = step(
            &requested.new_state,
            Event::GenerationComplete {
                text: "  \n".to_string(),
            },
        );
        assert!(done.new_state.history.is_empty());
        assert_eq!(
            done.new_state.last_error.map(|e| e.kind),
            Some(SessionErrorKind::BackendMalformedOutput)
        );
    }

    #[test]
    fn test_unexpected_backend_event_rejected() {
        assert!(matches!(
            transition(
                &ConversationState::default(),
                &ctx(),
                Event::GenerationComplete {
                    text: "hi".to_string()
                }
            ),
            Err(TransitionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_tutor_stay_encourages() {
        let done = turn(&in_unit(1), "What is a prompt?", &format!("A prompt is...\n{STAY_MARKER}"));
        let s = &done.new_state;
        assert_eq!(s.stage, Stage::InUnit);
        assert_eq!(s.current_unit_index, 1);
        assert_eq!(requests(&done.effects), vec![GenerationPurpose::Encourage]);
        assert_eq!(
            s.pending.as_ref().map(|p| p.purpose),
            Some(GenerationPurpose::Encourage)
        );
        assert_eq!(s.history.len(), 2);

        let encouraged = step(
            s,
            Event::GenerationComplete {
                text: "Keep going!".to_string(),
            },
        );
        assert_eq!(encouraged.new_state.history.len(), 3);
        assert_eq!(encouraged.new_state.message_count, 2);
        assert!(!encouraged.new_state.is_busy());
    }

    #[test]
    fn test_missing_marker_stays() {
        let done = turn(&in_unit(0), "hi", "No marker here");
        assert_eq!(done.new_state.current_unit_index, 0);
        assert_eq!(requests(&done.effects), vec![GenerationPurpose::Encourage]);
    }

    #[test]
    fn test_tutor_pass_advances() {
        let done = turn(&in_unit(1), "I get it", &format!("Great!\n{PASS_MARKER}"));
        let s = &done.new_state;
        assert_eq!(s.stage, Stage::InUnit);
        assert_eq!(s.current_unit_index, 2);
        assert_eq!(requests(&done.effects), vec![GenerationPurpose::NextUnit]);
        assert_eq!(
            notifications(&done.effects),
            vec![Notification::UnitCompleted {
                index: 1,
                title: "Writing Effective Prompts".to_string()
            }]
        );
        match done.effects.last() {
            Some(Effect::RequestGeneration {
                instruction,
                user_input,
                ..
            }) => {
                assert!(instruction.contains("Using Context in Prompts"));
                assert_eq!(*user_input, None);
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn test_last_unit_pass_completes() {
        let done = turn(&in_unit(4), "Done!", &format!("Excellent.\n{PASS_MARKER}"));
        let s = &done.new_state;
        assert_eq!(s.stage, Stage::Complete);
        assert_eq!(s.current_unit_index, 4);
        assert_eq!(requests(&done.effects), vec![GenerationPurpose::Completion]);
        let notes = notifications(&done.effects);
        assert_eq!(
            notes[0],
            Notification::StageChanged {
                from: Stage::InUnit,
                to: Stage::Complete
            }
        );
        assert!(notes.contains(&Notification::CurriculumCompleted));

        let congratulated = step(
            s,
            Event::GenerationComplete {
                text: "Congratulations!".to_string(),
            },
        );
        assert_eq!(congratulated.new_state.stage, Stage::Complete);
        assert!(!congratulated.new_state.is_busy());
    }

    #[test]
    fn test_follow_up_failure_keeps_tutor_reply() {
        let done = turn(&in_unit(1), "I get it", &format!("Great!\n{PASS_MARKER}"));
        let failed = step(
            &done.new_state,
            Event::GenerationFailed {
                error: SessionError::new(SessionErrorKind::BackendRateLimited, "slow down"),
            },
        );
        let s = &failed.new_state;
        assert_eq!(s.current_unit_index, 2);
        assert_eq!(s.history.len(), 2);
        assert_eq!(
            s.last_error.as_ref().map(|e| e.kind),
            Some(SessionErrorKind::BackendRateLimited)
        );
    }

    #[test]
    fn test_follow_up_skipped_at_quota() {
        let state = ConversationState {
            message_count: 49,
            ..in_unit(0)
        };
        let done = turn(&state, "question", &format!("answer\n{STAY_MARKER}"));
        let s = &done.new_state;
        assert_eq!(s.message_count, 50);
        assert!(!s.is_busy());
        assert!(requests(&done.effects).is_empty());
        assert!(notifications(&done.effects).contains(&Notification::QuotaReached { limit: 50 }));
        assert_eq!(
            s.last_error.as_ref().map(|e| e.kind),
            Some(SessionErrorKind::MessageQuotaExceeded)
        );
    }

    #[test]
    fn test_restart_resets() {
        let state = ConversationState {
            message_count: 12,
            history: vec![LlmMessage::assistant("bye")],
            stage: Stage::Complete,
            ..in_unit(4)
        };
        let result = step(&state, Event::Restart);
        assert_eq!(result.new_state, ConversationState::default());
        assert_eq!(
            result.effects,
            vec![Effect::stage_changed(Stage::Complete, Stage::Welcome)]
        );
    }

    #[test]
    fn test_synthesized_curriculum_installed() {
        let context = SessionContext::new("test", 50, CurriculumPolicy::Synthesized);
        let state = ConversationState {
            stage: Stage::CollectingLevel,
            message_count: 4,
            ..Default::default()
        };
        let requested = transition(&state, &context, Event::user_input("advanced")).unwrap();
        assert_eq!(
            requests(&requested.effects),
            vec![GenerationPurpose::SynthesizeCurriculum]
        );

        let units: Vec<String> = (1..=5)
            .map(|i| format!(r#"{{"title":"Deep {i}","objective":"O{i}","intro_text":"I{i}"}}"#))
            .collect();
        let json = format!("[{}]", units.join(","));
        let staged = transition(
            &requested.new_state,
            &context,
            Event::GenerationComplete { text: json },
        )
        .unwrap();
        // Curriculum output is never shown or counted
        assert!(staged.new_state.history.is_empty());
        assert_eq!(staged.new_state.message_count, 4);
        assert_eq!(requests(&staged.effects), vec![GenerationPurpose::WelcomeUnit]);

        let welcomed = transition(
            &staged.new_state,
            &context,
            Event::GenerationComplete {
                text: "Welcome to Deep 1".to_string(),
            },
        )
        .unwrap();
        let s = &welcomed.new_state;
        assert_eq!(s.stage, Stage::InUnit);
        assert_eq!(s.curriculum[0].title, "Deep 1");
        assert_eq!(s.history, vec![
            LlmMessage::user("advanced"),
            LlmMessage::assistant("Welcome to Deep 1"),
        ]);
        assert_eq!(s.message_count, 5);
    }

    #[test]
    fn test_synthesized_curriculum_falls_back() {
        let context = SessionContext::new("test", 50, CurriculumPolicy::Synthesized);
        let state = ConversationState {
            stage: Stage::CollectingLevel,
            ..Default::default()
        };
        let requested = transition(&state, &context, Event::user_input("beginner")).unwrap();
        let staged = transition(
            &requested.new_state,
            &context,
            Event::GenerationComplete {
                text: "Sorry, I can't produce JSON".to_string(),
            },
        )
        .unwrap();
        assert!(matches!(
            notifications(&staged.effects).first(),
            Some(Notification::CurriculumFallback { .. })
        ));
        assert_eq!(
            staged.new_state.pending.as_ref().map(|p| p.staged_curriculum.clone()),
            Some(fixed_curriculum())
        );
    }
}
