/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub num_attachments: i64,
    pub created_at: String,
}

/// Conversation plus its opening user turn, as returned by the list query.
pub struct ConversationSummaryRow {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub num_attachments: i64,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub ordinal: i64,
    pub created_at: String,
}

pub struct AttachmentRow {
    pub id: String,
    pub conversation_id: String,
    pub message_id: Option<String>,
    pub file_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub uploaded_at: String,
}
