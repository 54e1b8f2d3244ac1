//! Effects produced by state transitions

use super::state::{GenerationPurpose, SessionError, Stage};
use serde::Serialize;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the backend for one reply: history, then the uncommitted user
    /// text if any, then `instruction` as a system message
    RequestGeneration {
        purpose: GenerationPurpose,
        instruction: String,
        user_input: Option<String>,
    },

    /// Tell the presentation layer something happened
    Notify(Notification),
}

/// Client-facing notifications collected over one turn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    StageChanged { from: Stage, to: Stage },
    UnitCompleted { index: usize, title: String },
    CurriculumCompleted,
    /// Synthesized curriculum was unusable; the fixed one was installed
    CurriculumFallback { reason: String },
    QuotaReached { limit: u32 },
    GenerationFailed { error: SessionError },
}

impl Effect {
    pub fn request(
        purpose: GenerationPurpose,
        instruction: String,
        user_input: Option<String>,
    ) -> Self {
        Effect::RequestGeneration {
            purpose,
            instruction,
            user_input,
        }
    }

    pub fn stage_changed(from: Stage, to: Stage) -> Self {
        Effect::Notify(Notification::StageChanged { from, to })
    }
}
