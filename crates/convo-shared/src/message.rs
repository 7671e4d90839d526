//! The persisted chat message, exactly as it is returned by the HTTP API and
//! pushed over the real-time channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{ATTACHMENT_PREVIEW, PREVIEW_MAX_CHARS};
use crate::types::UserId;

/// A chat message between two identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    /// Conversation this message is filed under.
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Text body; empty when the message carries only attachments.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Id of the message being replied to.
    pub reply_to: Option<Uuid>,
    /// Snapshot of the replied-to message taken at send time.
    pub reply_preview: Option<ReplyPreview>,
    pub edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded file referenced by a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: String,
    pub name: String,
    pub size: u64,
}

/// Denormalized view of a replied-to message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplyPreview {
    pub sender_name: String,
    pub text_snippet: String,
    pub attachment_type: String,
    pub attachment_url: String,
}

impl ReplyPreview {
    /// Decode the JSON-string form clients send inside multipart forms.
    ///
    /// Anything unparseable yields `None` rather than an error.
    pub fn from_json_lenient(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "null" {
            return None;
        }
        serde_json::from_str(raw).ok()
    }
}

impl Message {
    /// Short text used for toast and system notifications.
    pub fn preview(&self) -> String {
        if self.message.is_empty() {
            if self.attachments.is_empty() {
                return String::new();
            }
            return ATTACHMENT_PREVIEW.to_string();
        }

        let mut chars = self.message.chars();
        let truncated: String = chars.by_ref().take(PREVIEW_MAX_CHARS).collect();
        if chars.next().is_some() {
            format!("{truncated}…")
        } else {
            truncated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(text: &str, attachments: Vec<Attachment>) -> Message {
        let now = Utc::now();
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: UserId::parse("a").unwrap(),
            receiver_id: UserId::parse("b").unwrap(),
            message: text.to_string(),
            attachments,
            reply_to: None,
            reply_preview: None,
            edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_preview_short_text_untouched() {
        assert_eq!(message("hello", vec![]).preview(), "hello");
    }

    #[test]
    fn test_preview_truncates_long_text() {
        let long = "x".repeat(PREVIEW_MAX_CHARS + 20);
        let preview = message(&long, vec![]).preview();
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_preview_attachment_marker() {
        let attachment = Attachment {
            url: "/uploads/1-a.png".into(),
            media_type: "image/png".into(),
            name: "a.png".into(),
            size: 3,
        };
        assert_eq!(message("", vec![attachment]).preview(), ATTACHMENT_PREVIEW);
    }

    #[test]
    fn test_reply_preview_lenient() {
        let ok = ReplyPreview::from_json_lenient(r#"{"senderName":"Ana","textSnippet":"hi"}"#)
            .unwrap();
        assert_eq!(ok.sender_name, "Ana");
        assert_eq!(ok.attachment_url, "");

        assert!(ReplyPreview::from_json_lenient("{not json").is_none());
        assert!(ReplyPreview::from_json_lenient("").is_none());
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let value = serde_json::to_value(message("hi", vec![])).unwrap();
        assert!(value.get("senderId").is_some());
        assert!(value.get("editedAt").is_some());
        assert_eq!(value["edited"], false);
    }
}
