pub mod assembly;
pub mod attachments;
pub mod auth;
pub mod conversations;
pub mod error;
pub mod generate;
pub mod state;
pub mod storage;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/conversations", post(conversations::create_conversation))
        .route("/conversations/{id}", get(conversations::list_conversations))
        .route("/conversations/{id}/messages", get(conversations::list_messages))
        .route(
            "/conversations/{id}/attachments",
            post(attachments::upload_attachment).get(attachments::list_attachments),
        )
        .route("/openai/generate", post(generate::generate_reply))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert, falling back through RFC 3339.
pub(crate) fn parse_timestamp(s: &str) -> chrono::DateTime<chrono::Utc> {
    s.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            chrono::DateTime::default()
        })
}
