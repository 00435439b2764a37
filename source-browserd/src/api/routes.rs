use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tokio::sync::watch;
use shared::protocol::API_PREFIX;
use shared::types::{BrowserStatus, RemoteSource};
use crate::discovery::SessionStatus;
use crate::sources::SourceTable;

#[derive(Clone)]
pub struct AppState {
    pub sources: Arc<SourceTable>,
    pub hash_rx: watch::Receiver<String>,
    pub session: SessionStatus,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/sources", get(get_sources))
        .route("/sources/hash", get(get_hash))
        .route("/sources/:name", get(get_source));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

async fn get_status(State(state): State<AppState>) -> Json<BrowserStatus> {
    Json(state.session.snapshot())
}

async fn get_sources(State(state): State<AppState>) -> Json<Vec<RemoteSource>> {
    Json(state.sources.all())
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_source(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RemoteSource>, StatusCode> {
    state.sources.get(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}
