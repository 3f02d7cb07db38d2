use parley_llm::{ChatMessage, ContentPart};
use parley_types::models::Role;

/// Fixed instruction prepended to every chat-completion call.
pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful assistant. You provide text and vision analysis as needed.";

/// One stored turn, already joined with the public URLs of its image
/// attachments.
#[derive(Debug)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
    pub image_urls: Vec<String>,
}

/// Build the role-tagged message sequence for the model API: the system
/// instruction, then the stored turns in order, then one new user turn for
/// the current input. The new turn is omitted entirely when both the new
/// text and the new images are empty.
pub fn assemble(
    history: &[HistoryTurn],
    new_text: &str,
    new_image_urls: &[String],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(SYSTEM_INSTRUCTION)];

    for turn in history {
        let mut parts = Vec::new();
        if !turn.text.is_empty() {
            parts.push(ContentPart::text(&turn.text));
        }
        for url in &turn.image_urls {
            parts.push(ContentPart::image(url));
        }
        // A turn can end up empty (e.g. only non-image attachments); skip it
        if parts.is_empty() {
            continue;
        }
        messages.push(ChatMessage::parts(turn.role.as_str(), parts));
    }

    let new_text = new_text.trim();
    let mut parts = Vec::new();
    if !new_text.is_empty() {
        parts.push(ContentPart::text(new_text));
    }
    for url in new_image_urls {
        parts.push(ContentPart::image(url));
    }
    if !parts.is_empty() {
        messages.push(ChatMessage::parts(Role::User.as_str(), parts));
    }

    messages
}
