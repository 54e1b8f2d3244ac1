//! API request and response types

use crate::llm::MessageRole;
use crate::marker::strip_markers;
use crate::runtime::SessionSnapshot;
use crate::state_machine::{Notification, SessionError, Stage, UnitStatus, UserProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to send a learner message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// One chat bubble
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: MessageRole,
    /// Progression markers removed
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct UnitView {
    pub index: usize,
    pub title: String,
    pub objective: String,
    pub status: UnitStatus,
}

/// Learning-path panel
#[derive(Debug, Serialize)]
pub struct ProgressView {
    /// Present once the curriculum exists
    pub current_unit_index: Option<usize>,
    pub total_units: usize,
    pub units: Vec<UnitView>,
}

#[derive(Debug, Serialize)]
pub struct UsageView {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
}

/// Everything the presentation layer renders for a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub stage: Stage,
    pub placeholder: String,
    pub accepts_input: bool,
    pub profile: UserProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<String>,
    pub messages: Vec<MessageView>,
    pub progress: ProgressView,
    pub usage: UsageView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SessionError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let state = &snapshot.state;
        let limit = snapshot.context.max_free_messages;

        let units = state
            .curriculum
            .iter()
            .zip(state.progress())
            .enumerate()
            .map(|(index, (unit, status))| UnitView {
                index,
                title: unit.title.clone(),
                objective: unit.objective.clone(),
                status,
            })
            .collect();

        let messages = state
            .history
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| MessageView {
                role: m.role,
                content: strip_markers(&m.content),
            })
            .collect();

        Self {
            id: snapshot.context.session_id.clone(),
            stage: state.stage,
            placeholder: state.stage.placeholder().to_string(),
            accepts_input: state.stage.accepts_input() && !state.is_busy(),
            profile: state.user_profile.clone(),
            selected_topic: state.selected_topic.clone(),
            skill_level: state.skill_level.clone(),
            messages,
            progress: ProgressView {
                current_unit_index: (!state.curriculum.is_empty())
                    .then_some(state.current_unit_index),
                total_units: state.curriculum.len(),
                units,
            },
            usage: UsageView {
                used: state.message_count,
                limit,
                remaining: state.messages_remaining(limit),
            },
            error: state.last_error.clone(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }
}

/// Response for a learner message or restart
#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub session: SessionView,
    pub notifications: Vec<Notification>,
}

/// Response for lifecycle actions
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
