use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use parley_types::api::{ConversationResponse, CreateConversationRequest, MessageResponse};
use parley_types::models::Role;

use crate::error::ApiError;
use crate::parse_timestamp;
use crate::state::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct CreateConversationQuery {
    pub user_id: Uuid,
}

pub async fn create_conversation(
    State(state): State<AppState>,
    Query(query): Query<CreateConversationQuery>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let uid = query.user_id.to_string();
    let user = blocking(move || db.db.get_user_by_id(&uid)).await?;
    if user.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let conversation_id = Uuid::new_v4();
    let db = state.clone();
    let cid = conversation_id.to_string();
    let uid = query.user_id.to_string();
    let message = req.message.clone();
    // Read the row back so the response carries the stored creation time, not
    // a freshly sampled one that would disagree with later list responses.
    let row = blocking(move || {
        db.db.create_conversation(&cid, &uid)?;
        db.db
            .insert_message(&Uuid::new_v4().to_string(), &cid, Role::User.as_str(), &message)?;
        db.db.get_conversation(&cid)
    })
    .await?
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("conversation missing after insert")))?;

    Ok((
        StatusCode::CREATED,
        Json(ConversationResponse {
            id: conversation_id,
            message: req.message,
            num_attachments: row.num_attachments,
            created_at: parse_timestamp(&row.created_at),
        }),
    ))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let uid = user_id.to_string();
    let user = blocking(move || db.db.get_user_by_id(&uid)).await?;
    if user.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    let db = state.clone();
    let uid = user_id.to_string();
    let rows = blocking(move || db.db.get_conversations_by_user(&uid)).await?;

    let conversations: Vec<ConversationResponse> = rows
        .into_iter()
        .map(|row| ConversationResponse {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt conversation id '{}': {}", row.id, e);
                Uuid::default()
            }),
            message: row.message,
            num_attachments: row.num_attachments,
            created_at: parse_timestamp(&row.created_at),
        })
        .collect();

    Ok(Json(conversations))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let conversation = blocking(move || db.db.get_conversation(&cid)).await?;
    if conversation.is_none() {
        return Err(ApiError::NotFound("Conversation not found".into()));
    }

    let db = state.clone();
    let cid = conversation_id.to_string();
    let rows = blocking(move || db.db.get_messages(&cid)).await?;

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| MessageResponse {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt message id '{}': {}", row.id, e);
                Uuid::default()
            }),
            conversation_id,
            role: Role::parse(&row.role).unwrap_or_else(|| {
                warn!("Corrupt role '{}' on message '{}'", row.role, row.id);
                Role::User
            }),
            content: row.content,
            ordinal: row.ordinal,
            created_at: parse_timestamp(&row.created_at),
        })
        .collect();

    Ok(Json(messages))
}
