use std::collections::HashMap;

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use parley_types::api::GenerateReplyResponse;
use parley_types::models::Role;

use crate::assembly::{HistoryTurn, assemble};
use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Per-request cap on newly uploaded files.
pub const MAX_GENERATE_FILES: usize = 4;

struct UploadedFile {
    file_name: String,
    content_type: String,
    data: Bytes,
}

#[derive(Default)]
struct GenerateForm {
    conversation_id: Option<Uuid>,
    user_id: Option<Uuid>,
    text: String,
    files: Vec<UploadedFile>,
}

async fn read_form(multipart: &mut Multipart) -> Result<GenerateForm, ApiError> {
    let bad = |e| ApiError::BadRequest(format!("Malformed multipart body: {}", e));

    let mut form = GenerateForm::default();
    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        // Field::text/bytes consume the field, so copy the name out first
        let name = field.name().map(|s| s.to_owned());
        match name.as_deref() {
            Some("conversation_id") => {
                let value = field.text().await.map_err(bad)?;
                form.conversation_id = Some(value.parse().map_err(|_| {
                    ApiError::BadRequest(format!("Invalid conversation_id: {}", value))
                })?);
            }
            Some("user_id") => {
                let value = field.text().await.map_err(bad)?;
                form.user_id = Some(
                    value
                        .parse()
                        .map_err(|_| ApiError::BadRequest(format!("Invalid user_id: {}", value)))?,
                );
            }
            Some("text") => {
                form.text = field.text().await.map_err(bad)?;
            }
            Some("files") => {
                if form.files.len() == MAX_GENERATE_FILES {
                    return Err(ApiError::BadRequest(format!(
                        "At most {} files per request",
                        MAX_GENERATE_FILES
                    )));
                }
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let data = field.bytes().await.map_err(bad)?;
                form.files.push(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => {
                warn!("Ignoring unexpected multipart field {:?}", other);
            }
        }
    }
    Ok(form)
}

/// POST /openai/generate — resolve (or create) the conversation, persist the
/// new turn and its files, assemble the full context, call the model API and
/// persist the assistant reply.
///
/// Files persisted before a failed model call are deliberately not rolled
/// back; the conversation keeps its attachments and simply has no reply yet.
pub async fn generate_reply(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = read_form(&mut multipart).await?;

    // Resolve the conversation. One created in this call is trivially known
    // to exist, so only a caller-supplied id gets an existence check.
    let (conversation_id, created_new) = match form.conversation_id {
        Some(id) => {
            let db = state.clone();
            let cid = id.to_string();
            let conversation = blocking(move || db.db.get_conversation(&cid)).await?;
            if conversation.is_none() {
                return Err(ApiError::NotFound("Conversation not found".into()));
            }
            (id, false)
        }
        None => {
            let Some(user_id) = form.user_id else {
                return Err(ApiError::BadRequest(
                    "Must provide user_id when creating a new conversation".into(),
                ));
            };

            let db = state.clone();
            let uid = user_id.to_string();
            let user = blocking(move || db.db.get_user_by_id(&uid)).await?;
            if user.is_none() {
                return Err(ApiError::NotFound("User not found".into()));
            }

            let id = Uuid::new_v4();
            let db = state.clone();
            let cid = id.to_string();
            let uid = user_id.to_string();
            blocking(move || db.db.create_conversation(&cid, &uid)).await?;
            (id, true)
        }
    };

    // Stored context, loaded before this call's rows are written so the new
    // turn is never duplicated into the history.
    let history = if created_new {
        Vec::new()
    } else {
        let db = state.clone();
        let cid = conversation_id.to_string();
        let (messages, attachments) = blocking(move || {
            let messages = db.db.get_messages(&cid)?;
            let attachments = db.db.get_attachments(&cid)?;
            Ok((messages, attachments))
        })
        .await?;
        build_history(&state, messages, attachments)
    };

    // The new user turn, if this call carries any content.
    let new_text = form.text.trim().to_owned();
    let new_message_id = if !new_text.is_empty() || !form.files.is_empty() {
        let id = Uuid::new_v4().to_string();
        let db = state.clone();
        let mid = id.clone();
        let cid = conversation_id.to_string();
        let content = new_text.clone();
        blocking(move || {
            db.db
                .insert_message(&mid, &cid, Role::User.as_str(), &content)
                .map(|_| ())
        })
        .await?;
        Some(id)
    } else {
        None
    };

    // Persist this call's files; only actual images become model-visible.
    let mut new_image_urls = Vec::new();
    for file in &form.files {
        let stored_name = state
            .store
            .save(&file.file_name, &file.data)
            .await
            .map_err(ApiError::Internal)?;

        let db = state.clone();
        let cid = conversation_id.to_string();
        let attachment_id = Uuid::new_v4().to_string();
        let mid = new_message_id.clone();
        let fname = file.file_name.clone();
        let sname = stored_name.clone();
        let ctype = file.content_type.clone();
        blocking(move || {
            db.db.insert_attachment(
                &attachment_id,
                &cid,
                mid.as_deref(),
                &fname,
                &sname,
                &ctype,
            )?;
            db.db.increment_attachment_count(&cid).map(|_| ())
        })
        .await?;

        if file.content_type.starts_with("image/") {
            new_image_urls.push(state.public_upload_url(&stored_name));
        } else {
            warn!(
                "Attachment '{}' ({}) stored but excluded from model context",
                file.file_name, file.content_type
            );
        }
    }

    let messages = assemble(&history, &new_text, &new_image_urls);

    info!(
        %conversation_id,
        turns = messages.len(),
        new_images = new_image_urls.len(),
        "Requesting chat completion"
    );

    let completion = state.llm.complete(&messages).await?;

    let db = state.clone();
    let cid = conversation_id.to_string();
    let reply = completion.text.clone();
    blocking(move || {
        db.db
            .insert_message(&Uuid::new_v4().to_string(), &cid, Role::Assistant.as_str(), &reply)
            .map(|_| ())
    })
    .await?;

    Ok(Json(GenerateReplyResponse {
        conversation_id,
        assistant_reply: completion.text,
        raw: completion.raw,
    }))
}

/// Join stored messages with the public URLs of their image attachments.
/// Attachments not tied to a message (dedicated-endpoint uploads) ride on the
/// first user turn, or form a turn of their own when the thread has none.
fn build_history(
    state: &AppState,
    messages: Vec<parley_db::models::MessageRow>,
    attachments: Vec<parley_db::models::AttachmentRow>,
) -> Vec<HistoryTurn> {
    let mut by_message: HashMap<String, Vec<String>> = HashMap::new();
    let mut conversation_level: Vec<String> = Vec::new();

    for att in attachments {
        if !att.content_type.starts_with("image/") {
            continue;
        }
        let url = state.public_upload_url(&att.stored_name);
        match att.message_id {
            Some(mid) => by_message.entry(mid).or_default().push(url),
            None => conversation_level.push(url),
        }
    }

    let mut turns: Vec<HistoryTurn> = messages
        .into_iter()
        .map(|row| {
            let role = Role::parse(&row.role).unwrap_or_else(|| {
                warn!("Corrupt role '{}' on message '{}'", row.role, row.id);
                Role::User
            });
            HistoryTurn {
                role,
                image_urls: by_message.remove(&row.id).unwrap_or_default(),
                text: row.content,
            }
        })
        .collect();

    if !conversation_level.is_empty() {
        match turns.iter_mut().find(|t| t.role == Role::User) {
            Some(first_user) => first_user.image_urls.extend(conversation_level),
            None => turns.push(HistoryTurn {
                role: Role::User,
                text: String::new(),
                image_urls: conversation_level,
            }),
        }
    }

    turns
}
