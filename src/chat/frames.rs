//! Platform-portable SSE frames for `/chat`.
//!
//! One frame = one `data: <json>` line plus a blank line. Clients may
//! receive the whole body as a single buffered blob instead of true chunks,
//! so every frame must stay parseable line by line.

use axum::response::sse::Event;
use serde::Serialize;

use crate::core_types::ConversationId;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatFrame {
    ConversationId { conversation_id: ConversationId },
    Content { content: String },
    Done { done: bool },
    Error { error: String },
}

impl ChatFrame {
    pub fn conversation(id: ConversationId) -> Self {
        ChatFrame::ConversationId {
            conversation_id: id,
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        ChatFrame::Content {
            content: text.into(),
        }
    }

    pub fn done() -> Self {
        ChatFrame::Done { done: true }
    }

    pub fn error(code: impl Into<String>) -> Self {
        ChatFrame::Error { error: code.into() }
    }

    fn json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"error\":\"internal_error\"}".into())
    }

    /// Raw wire form, used where axum's writer is not in play.
    pub fn to_sse_line(&self) -> String {
        format!("data: {}\n\n", self.json())
    }

    pub fn into_event(self) -> Event {
        Event::default().data(self.json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_serialize_to_wire_shapes() {
        assert_eq!(
            ChatFrame::conversation(12).to_sse_line(),
            "data: {\"conversation_id\":12}\n\n"
        );
        assert_eq!(
            ChatFrame::content("hi").to_sse_line(),
            "data: {\"content\":\"hi\"}\n\n"
        );
        assert_eq!(ChatFrame::done().to_sse_line(), "data: {\"done\":true}\n\n");
        assert_eq!(
            ChatFrame::error("insufficient_balance").to_sse_line(),
            "data: {\"error\":\"insufficient_balance\"}\n\n"
        );
    }

    #[test]
    fn buffered_blob_of_frames_splits_line_by_line() {
        let blob = [
            ChatFrame::conversation(1).to_sse_line(),
            ChatFrame::content("a").to_sse_line(),
            ChatFrame::done().to_sse_line(),
        ]
        .concat();

        let payloads: Vec<&str> = blob
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| l.strip_prefix("data: ").unwrap())
            .collect();
        assert_eq!(payloads.len(), 3);
        assert!(payloads[0].contains("conversation_id"));
        assert!(payloads[2].contains("done"));
    }
}
