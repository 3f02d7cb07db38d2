use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use parley_api::state::AppStateInner;
use parley_api::storage::UploadStore;
use parley_db::Database;
use parley_llm::{LlmClient, LlmConfig};

const BOUNDARY: &str = "parley-test-boundary";

async fn test_app() -> Router {
    test_app_with(LlmConfig::default()).await
}

async fn test_app_with(llm_config: LlmConfig) -> Router {
    let dir: PathBuf = std::env::temp_dir().join(format!("parley-api-test-{}", Uuid::new_v4()));
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        store: UploadStore::new(dir).await.unwrap(),
        llm: LlmClient::new(llm_config).unwrap(),
        public_base_url: "http://localhost:3000".into(),
    });
    parley_api::router(state)
}

/// Local stand-in for the chat-completions endpoint. Replies with the number
/// of messages it received so tests can assert on the assembled context.
async fn stub_completions_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = Router::new().route(
        "/chat/completions",
        post(|Json(req): Json<Value>| async move {
            let count = req["messages"].as_array().map(|m| m.len()).unwrap_or(0);
            Json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": format!("stub reply ({} messages)", count)
                    }
                }]
            }))
        }),
    );
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn send_get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// A multipart form field: (name, optional filename, optional content type, data).
type Field<'a> = (&'a str, Option<&'a str>, Option<&'a str>, &'a [u8]);

fn multipart_body(fields: &[Field<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content_type, data) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(fname) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    name, fname
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", name).as_bytes(),
            ),
        }
        if let Some(ctype) = content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", ctype).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn send_multipart(app: &Router, uri: &str, fields: &[Field<'_>]) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(fields)))
        .unwrap();
    send(app, request).await
}

async fn register(app: &Router, username: &str) -> Uuid {
    let (status, body) = send_json(
        app,
        "POST",
        "/auth/register",
        json!({ "username": username, "password": "hunter22" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["user_id"].as_str().unwrap().parse().unwrap()
}

async fn create_conversation(app: &Router, user_id: Uuid, message: &str) -> Uuid {
    let (status, body) = send_json(
        app,
        "POST",
        &format!("/conversations?user_id={}", user_id),
        json!({ "message": message }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = test_app().await;
    register(&app, "alice").await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/auth/register",
        json!({ "username": "alice", "password": "other-password" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Username already exists");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = test_app().await;
    let user_id = register(&app, "bob").await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/auth/login",
        json!({ "username": "bob", "password": "hunter22" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.to_string());

    let (wrong_status, wrong_body) = send_json(
        &app,
        "POST",
        "/auth/login",
        json!({ "username": "bob", "password": "wrong" }),
    )
    .await;
    let (unknown_status, unknown_body) = send_json(
        &app,
        "POST",
        "/auth/login",
        json!({ "username": "nobody", "password": "hunter22" }),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    // Same generic detail for both, so usernames cannot be enumerated
    assert_eq!(wrong_body["detail"], unknown_body["detail"]);
}

#[tokio::test]
async fn new_conversation_starts_with_zero_attachments() {
    let app = test_app().await;
    let user_id = register(&app, "carol").await;

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/conversations?user_id={}", user_id),
        json!({ "message": "hello there" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "hello there");
    assert_eq!(body["num_attachments"], 0);

    let (status, list) = send_get(&app, &format!("/conversations/{}", user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["message"], "hello there");
    // The creation response reports the stored timestamp, so it matches the
    // list response exactly
    assert_eq!(list[0]["created_at"], body["created_at"]);
}

#[tokio::test]
async fn conversation_for_unknown_user_is_not_found() {
    let app = test_app().await;
    let (status, _) = send_json(
        &app,
        "POST",
        &format!("/conversations?user_id={}", Uuid::new_v4()),
        json!({ "message": "hi" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn opening_turn_is_recorded_as_a_message() {
    let app = test_app().await;
    let user_id = register(&app, "dave").await;
    let conv_id = create_conversation(&app, user_id, "first words").await;

    let (status, messages) = send_get(&app, &format!("/conversations/{}/messages", conv_id)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "first words");
    assert_eq!(messages[0]["ordinal"], 0);
}

#[tokio::test]
async fn uploads_increment_count_and_list_in_order() {
    let app = test_app().await;
    let user_id = register(&app, "erin").await;
    let conv_id = create_conversation(&app, user_id, "with files").await;
    let uri = format!("/conversations/{}/attachments", conv_id);

    for (i, name) in ["a.png", "b.png", "c.png"].iter().enumerate() {
        let (status, body) = send_multipart(
            &app,
            &uri,
            &[("file", Some(name), Some("image/png"), b"fake image bytes")],
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["file_name"], *name);
        assert_eq!(body["num_attachments"], (i as i64) + 1);
    }

    let (status, list) = send_get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["file_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
}

#[tokio::test]
async fn upload_to_missing_conversation_writes_nothing() {
    let app = test_app().await;
    let uri = format!("/conversations/{}/attachments", Uuid::new_v4());

    let (status, body) = send_multipart(
        &app,
        &uri,
        &[("file", Some("x.png"), Some("image/png"), b"bytes")],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Conversation not found");

    let (status, _) = send_get(&app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let app = test_app().await;
    let user_id = register(&app, "frank").await;
    let conv_id = create_conversation(&app, user_id, "hi").await;

    let (status, _) = send_multipart(
        &app,
        &format!("/conversations/{}/attachments", conv_id),
        &[("note", None, None, b"not a file")],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_without_any_id_is_a_validation_error() {
    let app = test_app().await;
    let user_id = register(&app, "grace").await;

    let (status, body) =
        send_multipart(&app, "/openai/generate", &[("text", None, None, b"hello")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"],
        "Must provide user_id when creating a new conversation"
    );

    // No conversation was created as a side effect
    let (status, list) = send_get(&app, &format!("/conversations/{}", user_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn generate_with_unknown_conversation_is_not_found() {
    let app = test_app().await;

    let (status, _) = send_multipart(
        &app,
        "/openai/generate",
        &[
            ("conversation_id", None, None, Uuid::new_v4().to_string().as_bytes()),
            ("text", None, None, b"hello"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn generate_rejects_more_than_four_files() {
    let app = test_app().await;
    let user_id = register(&app, "heidi").await;
    let conv_id = create_conversation(&app, user_id, "hi").await;

    let cid = conv_id.to_string();
    let mut fields: Vec<Field<'_>> = vec![("conversation_id", None, None, cid.as_bytes())];
    for _ in 0..5 {
        fields.push(("files", Some("img.png"), Some("image/png"), b"bytes"));
    }

    let (status, body) = send_multipart(&app, "/openai/generate", &fields).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "At most 4 files per request");
}

#[tokio::test]
async fn generate_persists_reply_and_carries_history() {
    let base_url = stub_completions_server().await;
    let app = test_app_with(LlmConfig {
        base_url,
        ..LlmConfig::default()
    })
    .await;
    let user_id = register(&app, "ivan").await;

    // First turn: new conversation with text plus an image and a plain file.
    // The model sees system + user turn (2 messages); the plain file is
    // stored but produces no image reference.
    let uid = user_id.to_string();
    let (status, body) = send_multipart(
        &app,
        "/openai/generate",
        &[
            ("user_id", None, None, uid.as_bytes()),
            ("text", None, None, b"what is in this picture?"),
            ("files", Some("photo.png"), Some("image/png"), b"png bytes"),
            ("files", Some("notes.txt"), Some("text/plain"), b"some notes"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assistant_reply"], "stub reply (2 messages)");
    let conv_id: Uuid = body["conversation_id"].as_str().unwrap().parse().unwrap();

    // The reply landed as one assistant message after the user turn
    let (status, messages) = send_get(&app, &format!("/conversations/{}/messages", conv_id)).await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "what is in this picture?");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"], "stub reply (2 messages)");

    // Both files were persisted and counted
    let (status, attachments) =
        send_get(&app, &format!("/conversations/{}/attachments", conv_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attachments.as_array().unwrap().len(), 2);
    let (_, list) = send_get(&app, &format!("/conversations/{}", user_id)).await;
    assert_eq!(list[0]["num_attachments"], 2);

    // Second turn: the model now sees system, the stored user turn with its
    // image, the stored reply and the new turn — the plain file stays out.
    let cid = conv_id.to_string();
    let (status, body) = send_multipart(
        &app,
        "/openai/generate",
        &[
            ("conversation_id", None, None, cid.as_bytes()),
            ("text", None, None, b"tell me more"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assistant_reply"], "stub reply (4 messages)");

    let (_, messages) = send_get(&app, &format!("/conversations/{}/messages", conv_id)).await;
    assert_eq!(messages.as_array().unwrap().len(), 4);
}
