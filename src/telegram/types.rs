//! Serde models for the subset of the Bot API the bot actually reads.
//!
//! The Bot API is large; modelling all of it buys nothing. Every struct here
//! is `#[serde(default)]`-heavy and ignores unknown fields, so new API
//! releases never break deserialisation of the fields we care about.

use serde::{Deserialize, Serialize};

/// One element of the `getUpdates` result array.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// A file attachment as announced in a message.
///
/// `file_size` is declared by the platform before download, which is what
/// lets the size gate run without fetching a single byte.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// `getFile` result; `file_path` feeds the file-download URL.
#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
}

// ── Outbound markup ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_update_parses() {
        let json = r#"{
            "update_id": 100,
            "message": {
                "message_id": 5,
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 42, "is_bot": false, "first_name": "T", "username": "tester" },
                "document": {
                    "file_id": "AbC",
                    "file_name": "doc.pdf",
                    "file_size": 1024,
                    "mime_type": "application/pdf"
                }
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let msg = update.message.unwrap();
        let doc = msg.document.unwrap();
        assert_eq!(doc.file_name.as_deref(), Some("doc.pdf"));
        assert_eq!(doc.file_size, Some(1024));
        assert_eq!(msg.from.unwrap().username.as_deref(), Some("tester"));
    }

    #[test]
    fn callback_update_parses() {
        let json = r#"{
            "update_id": 101,
            "callback_query": {
                "id": "cq1",
                "from": { "id": 42, "is_bot": false, "first_name": "T" },
                "message": { "message_id": 6, "chat": { "id": 42, "type": "private" } },
                "data": "show_stats"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        let cq = update.callback_query.unwrap();
        assert_eq!(cq.data.as_deref(), Some("show_stats"));
        assert_eq!(cq.message.unwrap().chat.id, 42);
    }

    #[test]
    fn command_update_without_document_parses() {
        let json = r#"{
            "update_id": 102,
            "message": {
                "message_id": 7,
                "chat": { "id": 42, "type": "private" },
                "text": "/start"
            }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        assert_eq!(update.message.unwrap().text.as_deref(), Some("/start"));
    }

    #[test]
    fn keyboard_serialises_to_bot_api_shape() {
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::new("Справка", "help")]],
        };
        let json = serde_json::to_value(&markup).unwrap();
        assert_eq!(json["inline_keyboard"][0][0]["text"], "Справка");
        assert_eq!(json["inline_keyboard"][0][0]["callback_data"], "help");
    }
}
