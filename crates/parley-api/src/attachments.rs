use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::api::{AttachmentResponse, UploadAttachmentResponse};

use crate::error::ApiError;
use crate::parse_timestamp;
use crate::state::{AppState, blocking};

/// POST /conversations/{id}/attachments — multipart upload of a single
/// `file` field. The conversation is checked before any row is written.
pub async fn upload_attachment(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let cid = conversation_id.to_string();
    let conversation = blocking(move || db.db.get_conversation(&cid)).await?;
    if conversation.is_none() {
        return Err(ApiError::NotFound("Conversation not found".into()));
    }

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            warn!("Ignoring unexpected multipart field {:?}", field.name());
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_owned();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?;

        upload = Some((file_name, content_type, data));
        break;
    }

    let Some((file_name, content_type, data)) = upload else {
        return Err(ApiError::BadRequest("Missing file field".into()));
    };

    let stored_name = state
        .store
        .save(&file_name, &data)
        .await
        .map_err(ApiError::Internal)?;

    let db = state.clone();
    let cid = conversation_id.to_string();
    let attachment_id = Uuid::new_v4().to_string();
    let fname = file_name.clone();
    let sname = stored_name.clone();
    let num_attachments = blocking(move || {
        db.db
            .insert_attachment(&attachment_id, &cid, None, &fname, &sname, &content_type)?;
        db.db.increment_attachment_count(&cid)
    })
    .await?;

    info!(
        "Attachment '{}' stored as '{}' on conversation {}",
        file_name, stored_name, conversation_id
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadAttachmentResponse {
            message: "File uploaded successfully".into(),
            file_name,
            num_attachments,
        }),
    ))
}

pub async fn list_attachments(
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
    let rows = blocking(move || db.db.get_attachments(&cid)).await?;

    let attachments: Vec<AttachmentResponse> = rows
        .into_iter()
        .map(|row| AttachmentResponse {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt attachment id '{}': {}", row.id, e);
                Uuid::default()
            }),
            conversation_id,
            file_name: row.file_name,
            content_type: row.content_type,
            uploaded_at: parse_timestamp(&row.uploaded_at),
        })
        .collect();

    Ok(Json(attachments))
}
