//! Thin Bot API client over `reqwest`.
//!
//! The platform SDK is deliberately not reproduced: every Bot API method is
//! a plain `POST {base}/bot{token}/{method}` with a JSON (or multipart) body
//! and a `{ok, result, description}` envelope. This client covers the seven
//! methods the bot uses and nothing else.
//!
//! Two HTTP clients are held: the normal one with the per-call timeout, and
//! a poll client whose timeout covers the server-side long-poll hold plus
//! headroom — otherwise every idle poll would end in a client timeout.

use crate::config::BotConfig;
use crate::error::BotError;
use crate::telegram::types::{File, InlineKeyboardMarkup, Message, Update};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Unwrap the Bot API response envelope.
fn decode<T: DeserializeOwned>(method: &str, body: &str) -> Result<T, BotError> {
    let envelope: ApiEnvelope<T> =
        serde_json::from_str(body).map_err(|e| BotError::TelegramApi {
            method: method.to_string(),
            description: format!("unparseable response: {e}"),
        })?;
    if !envelope.ok {
        return Err(BotError::TelegramApi {
            method: method.to_string(),
            description: envelope
                .description
                .unwrap_or_else(|| "no description".into()),
        });
    }
    envelope.result.ok_or_else(|| BotError::TelegramApi {
        method: method.to_string(),
        description: "ok response without result".into(),
    })
}

/// Bot API client.
pub struct TelegramApi {
    client: reqwest::Client,
    poll_client: reqwest::Client,
    base: String,
    token: String,
    long_poll_timeout_secs: u64,
}

impl TelegramApi {
    pub fn new(config: &BotConfig) -> Result<Self, BotError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()?;
        let poll_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                config.long_poll_timeout_secs + config.api_timeout_secs,
            ))
            .build()?;
        Ok(Self {
            client,
            poll_client,
            base: config.telegram_api_base.clone(),
            token: config.telegram_token.clone(),
            long_poll_timeout_secs: config.long_poll_timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base, self.token)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, BotError> {
        let body = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await?
            .text()
            .await?;
        decode(method, &body)
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotError> {
        let payload = serde_json::json!({
            "offset": offset,
            "timeout": self.long_poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        let body = self
            .poll_client
            .post(self.method_url("getUpdates"))
            .json(&payload)
            .send()
            .await?
            .text()
            .await?;
        decode("getUpdates", &body)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message, BotError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| BotError::Internal(format!("serialising markup: {e}")))?;
        }
        self.call("sendMessage", payload).await
    }

    /// Edit a previously sent status message.
    ///
    /// Re-editing with identical text is answered with "message is not
    /// modified"; that is a no-op, not a failure, and is swallowed here.
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), BotError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = reply_markup {
            payload["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| BotError::Internal(format!("serialising markup: {e}")))?;
        }
        match self
            .call::<serde_json::Value>("editMessageText", payload)
            .await
        {
            Ok(_) => Ok(()),
            Err(BotError::TelegramApi { description, .. })
                if description.contains("message is not modified") =>
            {
                debug!("edit skipped: message unchanged");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Send a document from memory with an optional caption and keyboard.
    pub async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        caption: Option<&str>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), BotError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
            .map_err(|e| BotError::Internal(format!("building document part: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_string());
        }
        if let Some(markup) = reply_markup {
            let markup_json = serde_json::to_string(markup)
                .map_err(|e| BotError::Internal(format!("serialising markup: {e}")))?;
            form = form.text("reply_markup", markup_json);
        }

        let body = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .text()
            .await?;
        decode::<serde_json::Value>("sendDocument", &body).map(|_| ())
    }

    /// Acknowledge a callback query so the client stops showing a spinner.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), BotError> {
        self.call::<serde_json::Value>(
            "answerCallbackQuery",
            serde_json::json!({ "callback_query_id": callback_query_id }),
        )
        .await
        .map(|_| ())
    }

    /// Resolve a `file_id` to a downloadable path.
    pub async fn get_file(&self, file_id: &str) -> Result<File, BotError> {
        self.call("getFile", serde_json::json!({ "file_id": file_id }))
            .await
    }

    /// Download a file previously resolved with [`Self::get_file`].
    pub async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, BotError> {
        let url = format!("{}/file/bot{}/{file_path}", self.base, self.token);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(BotError::TelegramApi {
                method: "download".into(),
                description: format!("HTTP {}", response.status()),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::types::Update;

    #[test]
    fn decode_unwraps_ok_envelope() {
        let body = r#"{"ok":true,"result":[{"update_id":7}]}"#;
        let updates: Vec<Update> = decode("getUpdates", body).unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].update_id, 7);
    }

    #[test]
    fn decode_surfaces_api_rejection() {
        let body = r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#;
        let err = decode::<serde_json::Value>("sendMessage", body).unwrap_err();
        match err {
            BotError::TelegramApi {
                method,
                description,
            } => {
                assert_eq!(method, "sendMessage");
                assert!(description.contains("chat not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode::<serde_json::Value>("getMe", "<html>gateway error</html>").unwrap_err();
        assert!(matches!(err, BotError::TelegramApi { .. }));
    }

    #[test]
    fn method_url_embeds_token() {
        let config = crate::config::BotConfig::builder()
            .telegram_token("123:abc")
            .cloudconvert_api_key("k")
            .build()
            .unwrap();
        let api = TelegramApi::new(&config).unwrap();
        assert_eq!(
            api.method_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }
}
