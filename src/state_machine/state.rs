//! Conversation state types

use crate::curriculum::CurriculumPolicy;
use crate::llm::{LlmError, LlmErrorKind, LlmMessage};
use serde::{Deserialize, Serialize};

/// Dialogue stage. The unit index for `InUnit` lives in
/// [`ConversationState::current_unit_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Welcome,
    CollectingEmail,
    CollectingBirthdate,
    ConfirmingTopic,
    CollectingLevel,
    InUnit,
    Complete,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Welcome => "welcome",
            Stage::CollectingEmail => "collecting_email",
            Stage::CollectingBirthdate => "collecting_birthdate",
            Stage::ConfirmingTopic => "confirming_topic",
            Stage::CollectingLevel => "collecting_level",
            Stage::InUnit => "in_unit",
            Stage::Complete => "complete",
        }
    }

    /// Hint shown in the input box
    pub fn placeholder(self) -> &'static str {
        match self {
            Stage::Welcome => "Enter your name or what you'd like me to call you...",
            Stage::CollectingEmail => "Enter your email address...",
            Stage::CollectingBirthdate => "Enter your birth date (example: 1990-01-01)...",
            Stage::ConfirmingTopic => "Do you want to learn prompt engineering? (yes/no)...",
            Stage::CollectingLevel => "Describe your current experience in this field...",
            Stage::InUnit => "Ask or answer through chat...",
            Stage::Complete => "",
        }
    }

    pub fn accepts_input(self) -> bool {
        self != Stage::Complete
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    /// Stored as entered; not validated
    pub birth_date: Option<String>,
}

/// One curriculum unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub title: String,
    pub objective: String,
    pub intro_text: String,
}

impl Unit {
    pub fn new(
        title: impl Into<String>,
        objective: impl Into<String>,
        intro_text: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            objective: objective.into(),
            intro_text: intro_text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Completed,
    Current,
    Locked,
}

/// What an in-flight generation is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPurpose {
    Greeting,
    AskEmail,
    AskBirthDate,
    OfferTopic,
    AskLevel,
    DeclineTopic,
    SynthesizeCurriculum,
    WelcomeUnit,
    Tutor,
    NextUnit,
    Encourage,
    Completion,
}

impl GenerationPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationPurpose::Greeting => "greeting",
            GenerationPurpose::AskEmail => "ask_email",
            GenerationPurpose::AskBirthDate => "ask_birth_date",
            GenerationPurpose::OfferTopic => "offer_topic",
            GenerationPurpose::AskLevel => "ask_level",
            GenerationPurpose::DeclineTopic => "decline_topic",
            GenerationPurpose::SynthesizeCurriculum => "synthesize_curriculum",
            GenerationPurpose::WelcomeUnit => "welcome_unit",
            GenerationPurpose::Tutor => "tutor",
            GenerationPurpose::NextUnit => "next_unit",
            GenerationPurpose::Encourage => "encourage",
            GenerationPurpose::Completion => "completion",
        }
    }

    /// Whether a successful generation of this kind counts toward the quota
    /// and lands in the history
    pub fn is_visible(self) -> bool {
        self != GenerationPurpose::SynthesizeCurriculum
    }
}

/// A generation in flight. Nothing it carries is committed until the
/// matching `GenerationComplete` arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGeneration {
    pub purpose: GenerationPurpose,
    /// The learner's text, committed together with the reply
    pub user_input: Option<String>,
    /// Curriculum to install when the unit welcome succeeds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub staged_curriculum: Vec<Unit>,
}

impl PendingGeneration {
    pub fn new(purpose: GenerationPurpose, user_input: Option<String>) -> Self {
        Self {
            purpose,
            user_input,
            staged_curriculum: Vec::new(),
        }
    }

    pub fn with_curriculum(mut self, curriculum: Vec<Unit>) -> Self {
        self.staged_curriculum = curriculum;
        self
    }
}

/// Failure classes visible to the learner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    BackendUnavailable,
    BackendRateLimited,
    BackendMalformedOutput,
    /// Credentials or request refused by the backend
    BackendRejected,
    MessageQuotaExceeded,
}

impl From<LlmErrorKind> for SessionErrorKind {
    fn from(kind: LlmErrorKind) -> Self {
        match kind {
            LlmErrorKind::Network | LlmErrorKind::ServerError | LlmErrorKind::Unknown => {
                SessionErrorKind::BackendUnavailable
            }
            LlmErrorKind::RateLimit => SessionErrorKind::BackendRateLimited,
            LlmErrorKind::MalformedOutput => SessionErrorKind::BackendMalformedOutput,
            LlmErrorKind::Auth | LlmErrorKind::InvalidRequest => SessionErrorKind::BackendRejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn quota(limit: u32) -> Self {
        Self::new(
            SessionErrorKind::MessageQuotaExceeded,
            format!("You've reached the free message limit ({limit} messages)."),
        )
    }
}

impl From<&LlmError> for SessionError {
    fn from(e: &LlmError) -> Self {
        Self::new(e.kind.into(), e.message.clone())
    }
}

/// Full state of one learner's session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub stage: Stage,
    pub history: Vec<LlmMessage>,
    pub user_profile: UserProfile,
    pub selected_topic: Option<String>,
    pub skill_level: Option<String>,
    pub curriculum: Vec<Unit>,
    pub current_unit_index: usize,
    /// Successful visible generations; gated by the free-message quota
    pub message_count: u32,
    pub pending: Option<PendingGeneration>,
    pub last_error: Option<SessionError>,
}

impl ConversationState {
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current_unit(&self) -> Option<&Unit> {
        if self.stage == Stage::InUnit {
            self.curriculum.get(self.current_unit_index)
        } else {
            None
        }
    }

    /// Per-unit status for the learning-path panel
    pub fn progress(&self) -> Vec<UnitStatus> {
        (0..self.curriculum.len())
            .map(|i| {
                if self.stage == Stage::Complete || i < self.current_unit_index {
                    UnitStatus::Completed
                } else if i == self.current_unit_index {
                    UnitStatus::Current
                } else {
                    UnitStatus::Locked
                }
            })
            .collect()
    }

    pub fn messages_remaining(&self, limit: u32) -> u32 {
        limit.saturating_sub(self.message_count)
    }
}

/// Per-session configuration the transition function reads
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub max_free_messages: u32,
    pub curriculum_policy: CurriculumPolicy,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        max_free_messages: u32,
        curriculum_policy: CurriculumPolicy,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            max_free_messages,
            curriculum_policy,
        }
    }
}
