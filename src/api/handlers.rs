//! HTTP request handlers

use super::types::{ErrorResponse, MessageRequest, SessionView, SuccessResponse, TurnResponse};
use super::AppState;
use crate::runtime::{ProductionSession, SessionHandle, TurnOutcome};
use crate::state_machine::TransitionError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::sync::MutexGuard;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).delete(delete_session),
        )
        // Learner actions
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/sessions/:id/restart", post(restart_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

/// A turn that ended in a backend failure still returns the updated session,
/// but as a gateway error so clients notice.
fn turn_status(outcome: &TurnOutcome, ok: StatusCode) -> StatusCode {
    if outcome.failure().is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        ok
    }
}

fn not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Session not found: {id}"))
}

async fn find_session(state: &AppState, id: &str) -> Result<SessionHandle, AppError> {
    state.sessions.get(id).await.ok_or_else(|| not_found(id))
}

/// Take the session for a mutating request. A session that is already
/// mid-turn answers busy instead of queueing the request behind it.
fn lock_idle(handle: &SessionHandle) -> Result<MutexGuard<'_, ProductionSession>, AppError> {
    handle
        .try_lock()
        .map_err(|_| AppError::from(TransitionError::Busy))
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let (id, handle, outcome) = state.sessions.create_started().await?;
    let view = SessionView::from_snapshot(&handle.lock().await.snapshot());

    let active_sessions = state.sessions.count().await;
    tracing::info!(session_id = %id, active_sessions, "Session started");
    Ok((turn_status(&outcome, StatusCode::CREATED), Json(view)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let snapshot = state.sessions.snapshot(&id).await.ok_or_else(|| not_found(&id))?;
    Ok(Json(SessionView::from_snapshot(&snapshot)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.sessions.remove(&id).await {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(not_found(&id))
    }
}

// ============================================================
// Learner Actions
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<(StatusCode, Json<TurnResponse>), AppError> {
    let handle = find_session(&state, &id).await?;
    let mut session = lock_idle(&handle)?;
    let outcome = session.submit(&req.text).await?;

    let status = turn_status(&outcome, StatusCode::OK);
    Ok((
        status,
        Json(TurnResponse {
            session: SessionView::from_snapshot(&session.snapshot()),
            notifications: outcome.notifications,
        }),
    ))
}

async fn restart_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let handle = find_session(&state, &id).await?;
    let mut session = lock_idle(&handle)?;
    let outcome = session.restart().await?;
    tracing::info!(session_id = %id, "Session restarted");

    Ok((
        turn_status(&outcome, StatusCode::OK),
        Json(SessionView::from_snapshot(&session.snapshot())),
    ))
}

async fn get_version() -> &'static str {
    concat!("skilvyn ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    QuotaExceeded(String),
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        let message = e.to_string();
        match e {
            TransitionError::EmptyInput | TransitionError::InvalidTransition(_) => {
                AppError::BadRequest(message)
            }
            TransitionError::Busy | TransitionError::ConversationComplete => {
                AppError::Conflict(message)
            }
            TransitionError::QuotaExceeded => AppError::QuotaExceeded(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::QuotaExceeded(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
