//! Session executor
//!
//! Feeds events through the pure transition function and executes the
//! resulting effects. Backend calls run inline, one at a time; their results
//! come back as events until the chain settles. Every committed state is
//! published as a [`SessionSnapshot`] so readers never wait on a generation.

use super::traits::LlmClient;
use crate::llm::LlmMessage;
use crate::state_machine::{
    transition, ConversationState, Effect, Event, Notification, SessionContext, SessionError,
    TransitionError,
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Read-only copy of a session as of its last transition
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub context: SessionContext,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What one call into the session produced
#[derive(Debug, Default)]
pub struct TurnOutcome {
    pub notifications: Vec<Notification>,
}

impl TurnOutcome {
    /// The backend failure that ended this turn, if any
    pub fn failure(&self) -> Option<&SessionError> {
        self.notifications.iter().rev().find_map(|n| match n {
            Notification::GenerationFailed { error } => Some(error),
            _ => None,
        })
    }

    fn extend(&mut self, other: TurnOutcome) {
        self.notifications.extend(other.notifications);
    }
}

/// One learner's session: state plus the client that generates its replies
pub struct TutorSession<L: LlmClient> {
    context: SessionContext,
    state: ConversationState,
    llm_client: L,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl<L: LlmClient> TutorSession<L> {
    pub fn new(context: SessionContext, llm_client: L) -> Self {
        let now = Utc::now();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot {
            context: context.clone(),
            state: ConversationState::default(),
            created_at: now,
            updated_at: now,
        });
        Self {
            context,
            state: ConversationState::default(),
            llm_client,
            created_at: now,
            updated_at: now,
            snapshot_tx,
        }
    }

    /// Receive a fresh snapshot after every transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            context: self.context.clone(),
            state: self.state.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    #[cfg(test)]
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    #[cfg(test)]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Generate the opening greeting
    pub async fn start(&mut self) -> Result<TurnOutcome, TransitionError> {
        self.process_event(Event::Start).await
    }

    /// Handle one learner message
    pub async fn submit(&mut self, text: &str) -> Result<TurnOutcome, TransitionError> {
        self.process_event(Event::user_input(text)).await
    }

    /// Reset to defaults and greet again
    pub async fn restart(&mut self) -> Result<TurnOutcome, TransitionError> {
        let mut outcome = self.process_event(Event::Restart).await?;
        outcome.extend(self.start().await?);
        Ok(outcome)
    }

    async fn process_event(&mut self, event: Event) -> Result<TurnOutcome, TransitionError> {
        let mut outcome = TurnOutcome::default();

        // Process events in a loop to handle chained effects
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let kind = current_event.kind();
            // Pure state transition
            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(
                        session_id = %self.context.session_id,
                        event = kind,
                        error = %e,
                        "Transition rejected"
                    );
                    return Err(e);
                }
            };

            let from = self.state.stage;
            self.state = result.new_state;
            self.updated_at = Utc::now();
            self.publish();
            if from != self.state.stage {
                tracing::info!(
                    session_id = %self.context.session_id,
                    from = from.as_str(),
                    to = self.state.stage.as_str(),
                    "Stage changed"
                );
            }

            // Execute effects and collect generated events
            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect, &mut outcome).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(outcome)
    }

    async fn execute_effect(&self, effect: Effect, outcome: &mut TurnOutcome) -> Option<Event> {
        match effect {
            Effect::RequestGeneration {
                purpose,
                instruction,
                user_input,
            } => {
                let mut history = self.state.history.clone();
                if let Some(text) = user_input {
                    history.push(LlmMessage::user(text));
                }

                tracing::info!(
                    session_id = %self.context.session_id,
                    purpose = purpose.as_str(),
                    model = %self.llm_client.model_id(),
                    messages = history.len() + 1,
                    "Requesting generation"
                );

                match self.llm_client.generate(&history, &instruction).await {
                    Ok(text) => Some(Event::GenerationComplete { text }),
                    Err(e) => {
                        tracing::warn!(
                            session_id = %self.context.session_id,
                            purpose = purpose.as_str(),
                            kind = ?e.kind,
                            error = %e,
                            "Generation failed"
                        );
                        Some(Event::GenerationFailed {
                            error: SessionError::from(&e),
                        })
                    }
                }
            }

            Effect::Notify(notification) => {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    notification = ?notification,
                    "Notify"
                );
                outcome.notifications.push(notification);
                None
            }
        }
    }
}
