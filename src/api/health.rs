use super::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once a portfolio snapshot has been loaded.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let status = state.session.status().await;
    match status.last_balance_update {
        Some(loaded_at) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ready", "loadedAt": loaded_at})),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "loading"})),
        ),
    }
}
