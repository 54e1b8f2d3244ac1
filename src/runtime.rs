//! Runtime for executing tutoring sessions
//!
//! Sessions live in memory until they sit idle past the configured timeout.
//! Each one sits behind its own mutex so a learner's inputs are handled
//! strictly in order, while different sessions never contend. Readers go
//! through the published snapshot and never take that mutex.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{SessionSnapshot, TurnOutcome, TutorSession};
pub use traits::*;

use crate::curriculum::CurriculumPolicy;
use crate::state_machine::{SessionContext, TransitionError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};

/// Idle sessions are dropped after this long (30 minutes)
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Cleanup check interval (60 seconds)
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Session type used by the server
pub type ProductionSession = TutorSession<Arc<dyn LlmClient>>;

/// Handle to one session
pub type SessionHandle = Arc<Mutex<ProductionSession>>;

/// Settings applied to every new session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_free_messages: u32,
    pub curriculum_policy: CurriculumPolicy,
    /// How long a session may go without a transition before it is dropped
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_free_messages: 50,
            curriculum_policy: CurriculumPolicy::Fixed,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

struct SessionEntry {
    handle: SessionHandle,
    snapshot: watch::Receiver<SessionSnapshot>,
}

/// Manager for all sessions
pub struct SessionManager {
    llm_client: Arc<dyn LlmClient>,
    settings: SessionSettings,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionManager {
    pub fn new(llm_client: Arc<dyn LlmClient>, settings: SessionSettings) -> Self {
        Self {
            llm_client,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start the background task that drops idle sessions. The task exits
    /// once the manager is dropped.
    pub fn start_idle_cleanup(self: &Arc<Self>) {
        let manager_weak = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVAL).await;
                let Some(manager) = manager_weak.upgrade() else {
                    tracing::debug!("SessionManager dropped, cleanup task exiting");
                    break;
                };
                manager.evict_idle().await;
            }
        });
    }

    /// Register a fresh session and generate its greeting. A session whose
    /// greeting is refused is discarded, so callers never see an id for it.
    pub async fn create_started(
        &self,
    ) -> Result<(String, SessionHandle, TurnOutcome), TransitionError> {
        let (id, handle) = self.create().await;
        let started = handle.lock().await.start().await;
        match started {
            Ok(outcome) => Ok((id, handle, outcome)),
            Err(e) => {
                self.remove(&id).await;
                Err(e)
            }
        }
    }

    /// Register a fresh session without greeting it
    pub async fn create(&self) -> (String, SessionHandle) {
        let id = uuid::Uuid::new_v4().to_string();
        let context = SessionContext::new(
            id.clone(),
            self.settings.max_free_messages,
            self.settings.curriculum_policy,
        );
        let session = TutorSession::new(context, Arc::clone(&self.llm_client));
        let snapshot = session.subscribe();
        let handle = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(
            id.clone(),
            SessionEntry {
                handle: Arc::clone(&handle),
                snapshot,
            },
        );
        tracing::info!(session_id = %id, "Created session");
        (id, handle)
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| Arc::clone(&entry.handle))
    }

    /// Latest published state; does not wait on an in-flight generation
    pub async fn snapshot(&self, id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| entry.snapshot.borrow().clone())
    }

    /// Drop a session. Returns false if it did not exist.
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, "Removed session");
        }
        removed
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle longer than the configured timeout. Sessions in
    /// the middle of a turn are kept. Returns how many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let Ok(idle_timeout) = chrono::Duration::from_std(self.settings.idle_timeout) else {
            return 0;
        };
        let cutoff = chrono::Utc::now() - idle_timeout;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let snapshot = entry.snapshot.borrow();
            let keep = snapshot.updated_at > cutoff
                || snapshot.state.is_busy()
                || entry.handle.try_lock().is_err();
            if !keep {
                tracing::info!(
                    session_id = %id,
                    updated_at = %snapshot.updated_at,
                    "Evicting idle session"
                );
            }
            keep
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "Idle session cleanup");
        }
        evicted
    }
}
