use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    pub message: String,
}

/// `message` is the conversation's opening user turn, kept on the wire for
/// compatibility with clients that treat a conversation as a single message.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub message: String,
    pub num_attachments: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub ordinal: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Attachments --

#[derive(Debug, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadAttachmentResponse {
    pub message: String,
    pub file_name: String,
    pub num_attachments: i64,
}

// -- Generate --

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateReplyResponse {
    pub conversation_id: Uuid,
    pub assistant_reply: String,
    /// Raw provider JSON, passed through untouched.
    pub raw: serde_json::Value,
}
