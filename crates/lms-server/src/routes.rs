use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde_json::{Value, json};

use crate::error::ServerResult;
use crate::state::{AppState, Settings};

/// All `/api` routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/lessons", get(list_lessons).post(save_lesson))
        .route("/api/self-learning", get(list_self_learning))
        .route("/api/progress/{id}", get(get_progress).post(save_progress))
        .route("/api/settings", get(get_settings).post(update_settings))
        .with_state(state)
}

async fn list_lessons(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.lessons())
}

async fn list_self_learning(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.self_learning())
}

async fn save_lesson(
    State(state): State<AppState>,
    Json(lesson): Json<Value>,
) -> ServerResult<Json<Value>> {
    let lesson = state.upsert_lesson(lesson)?;
    Ok(Json(json!({ "ok": true, "lesson": lesson })))
}

async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    state.progress(&id).map(Json)
}

async fn save_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    state.save_progress(&id, payload);
    Json(json!({ "ok": true }))
}

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings())
}

async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Json<Settings> {
    Json(state.update_settings(&body))
}
