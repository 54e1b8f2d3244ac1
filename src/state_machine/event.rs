//! Events that can occur in a session

use super::state::SessionError;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Session events
    /// First entry: request the greeting
    Start,
    /// Reset to the initial state
    Restart,

    // User events
    UserInput { text: String },

    // Backend events
    GenerationComplete { text: String },
    GenerationFailed { error: SessionError },
}

impl Event {
    pub fn user_input(text: impl Into<String>) -> Self {
        Event::UserInput { text: text.into() }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Restart => "restart",
            Event::UserInput { .. } => "user_input",
            Event::GenerationComplete { .. } => "generation_complete",
            Event::GenerationFailed { .. } => "generation_failed",
        }
    }
}
