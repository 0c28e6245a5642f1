use crate::{
    error::ApiError,
    ingest::{self, Ingest},
    render::DashboardPage,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use workstate_core::{DashboardSnapshot, SessionStore, UpsertOutcome};

/// Shared state handed to every handler.
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub page: DashboardPage,
}

impl AppState {
    pub fn new(store: Arc<SessionStore>, page: DashboardPage) -> Self {
        Self { store, page }
    }
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    ok: bool,
    session_id: String,
    removed: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard))
        .route("/api/sessions", get(sessions_json))
        .route("/api/session", post(ingest_report))
        .route("/api/session/:session_id", delete(delete_session))
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .with_state(state)
}

async fn ingest_report(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    match ingest::parse_report(&body)? {
        Ingest::Session { session_id, fields } => {
            let outcome = state.store.upsert_session(&session_id, fields).await;
            log_upsert("session_upsert", &session_id, None, outcome);
        }
        Ingest::Thread {
            session_id,
            thread_id,
            fields,
        } => {
            let outcome = state
                .store
                .upsert_thread(&session_id, &thread_id, fields)
                .await;
            log_upsert("thread_upsert", &session_id, Some(&thread_id), outcome);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

fn log_upsert(event: &str, session_id: &str, thread_id: Option<&str>, outcome: UpsertOutcome) {
    let thread_id = thread_id.unwrap_or("");
    match outcome {
        UpsertOutcome::Updated => debug!(
            event = event,
            session_id = session_id,
            thread_id = thread_id,
            outcome = outcome.as_str()
        ),
        UpsertOutcome::Created | UpsertOutcome::Finished => info!(
            event = event,
            session_id = session_id,
            thread_id = thread_id,
            outcome = outcome.as_str()
        ),
    }
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.store.snapshot().await;
    let page = state.page.render(&snapshot)?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Html(page)))
}

async fn sessions_json(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    Json(state.store.snapshot().await)
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<DeleteResponse> {
    let removed = state.store.delete_session(&session_id).await;
    info!(event = "session_deleted", session_id = %session_id, removed = removed);
    Json(DeleteResponse {
        ok: true,
        session_id,
        removed,
    })
}
