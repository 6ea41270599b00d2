//! Update dispatch: commands, document intake, callback buttons.
//!
//! The handlers are a thin adapter: every update resolves to template
//! selection plus at most one call into [`crate::process::Processor`]. Gate
//! order for documents follows the cost of each check — rate limit (one
//! SELECT), declared size, extension, and only then the download and the
//! magic-byte sniff.

use crate::db::sqlite::SqliteStore;
use crate::db::{
    NewOperation, OperationStatus, OperationStore, RateLimitStore, TaskStore,
};
use crate::error::ConvertError;
use crate::process::Processor;
use crate::progress::{Stage, StageCallback, StageEvents};
use crate::telegram::api::TelegramApi;
use crate::telegram::keyboards::{self, callback};
use crate::telegram::messages;
use crate::telegram::types::{CallbackQuery, Document, Message, Update, User};
use crate::pipeline::validate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A heap-allocated `Send` future. Used to box nested handler/API futures so
/// the spawned update-dispatch future's `Send`-ness is resolved at a concrete
/// lifetime rather than a higher-ranked one (works around the compiler's
/// "implementation of `Send` is not general enough" limitation for `&self`
/// async methods that hold references across `.await`).
type BoxFut<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Map a per-request failure to its fixed user-visible template.
fn user_message(error: &ConvertError) -> String {
    match error {
        ConvertError::NotPdf { .. } => messages::ERROR_INVALID_FORMAT.to_string(),
        ConvertError::TooLarge { size, .. } => {
            messages::error_file_too_large(*size as f64 / (1024.0 * 1024.0))
        }
        ConvertError::BadMagic { .. } | ConvertError::Truncated => {
            messages::ERROR_CORRUPT_PDF.to_string()
        }
        ConvertError::Timeout { .. } => messages::ERROR_TIMEOUT.to_string(),
        ConvertError::JobCreate { .. }
        | ConvertError::Upload { .. }
        | ConvertError::Download { .. }
        | ConvertError::AttachmentDownload { .. }
        | ConvertError::VendorTransport(_) => messages::ERROR_API_UNAVAILABLE.to_string(),
        ConvertError::JobFailed { .. }
        | ConvertError::NoExportUrl { .. }
        | ConvertError::AllStrategiesFailed { .. }
        | ConvertError::BadWorkbook { .. } => messages::ERROR_CONVERSION_FAILED.to_string(),
    }
}

/// Edits the status message as the pipeline reports stage transitions.
///
/// Stage events arrive from inside async pipeline code but the callback
/// trait is synchronous, so each edit is fired on its own task. Edit
/// failures only ever cost the user a stale status line.
struct MessageProgress {
    api: Arc<TelegramApi>,
    chat_id: i64,
    message_id: i64,
}

impl StageCallback for MessageProgress {
    fn on_stage(&self, stage: Stage) {
        let text = match stage {
            Stage::Uploading => messages::STAGE_UPLOADING,
            Stage::Converting => messages::STAGE_CONVERTING,
            Stage::Enhancing => messages::STAGE_ENHANCING,
            Stage::Finalizing => messages::STAGE_FINALIZING,
        };
        let api = Arc::clone(&self.api);
        let (chat_id, message_id) = (self.chat_id, self.message_id);
        tokio::spawn(async move {
            if let Err(e) = api.edit_message_text(chat_id, message_id, text, None).await {
                debug!(error = %e, "progress edit failed");
            }
        });
    }
}

/// Owns everything an update needs: the Bot API client, the stores and the
/// conversion pipeline.
pub struct BotHandlers {
    api: Arc<TelegramApi>,
    store: SqliteStore,
    processor: Arc<Processor>,
}

impl BotHandlers {
    pub fn new(api: Arc<TelegramApi>, store: SqliteStore, processor: Arc<Processor>) -> Self {
        Self {
            api,
            store,
            processor,
        }
    }

    /// Entry point for one update. Never returns an error: per-request
    /// failures end in a chat message, transport failures in a log line.
    pub async fn handle_update(&self, update: Update) {
        if let Some(message) = update.message {
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> =
                Box::pin(self.handle_message(message));
            fut.await;
        } else if let Some(callback_query) = update.callback_query {
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> =
                Box::pin(self.handle_callback(callback_query));
            fut.await;
        }
    }

    async fn handle_message(&self, message: Message) {
        if let Some(document) = message.document.clone() {
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> =
                Box::pin(self.handle_document(&message, document));
            fut.await;
        } else if let Some(text) = message.text.clone() {
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> =
                Box::pin(self.handle_text(&message, &text));
            fut.await;
        }
    }

    async fn handle_text(&self, message: &Message, text: &str) {
        let chat_id = message.chat.id;
        // "/start@MyBot" in group chats is still "/start".
        let command = text
            .split_whitespace()
            .next()
            .unwrap_or("")
            .split('@')
            .next()
            .unwrap_or("");
        let result = match command {
            "/start" => {
                if let Some(user) = &message.from {
                    self.audit_command(user, "start").await;
                }
                self.api
                    .send_message(chat_id, messages::START_MESSAGE, Some(&keyboards::start_keyboard()))
                    .await
                    .map(|_| ())
            }
            "/help" => self
                .api
                .send_message(chat_id, messages::HELP_MESSAGE, Some(&keyboards::help_keyboard()))
                .await
                .map(|_| ()),
            "/convert" => self
                .api
                .send_message(chat_id, messages::CONVERT_MESSAGE, None)
                .await
                .map(|_| ()),
            "/status" => {
                let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(chat_id);
                self.send_status(chat_id, user_id, None).await
            }
            cmd if cmd.starts_with('/') => self
                .api
                .send_message(chat_id, messages::UNKNOWN_COMMAND, None)
                .await
                .map(|_| ()),
            _ => {
                // Plain chatter; the bot only reacts to commands and files.
                debug!(chat_id, "ignoring non-command text");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(chat_id, error = %e, "failed to answer command");
        }
    }

    /// Render the status screen, either as a new message or as an edit of
    /// the message carrying the pressed button.
    async fn send_status(
        &self,
        chat_id: i64,
        user_id: i64,
        edit_message_id: Option<i64>,
    ) -> Result<(), crate::error::BotError> {
        let active = self.store.get_active_task(user_id).await.unwrap_or_else(|e| {
            warn!(error = %e, "active-task lookup failed");
            None
        });

        let (text, markup) = match active {
            None => (messages::STATUS_NO_ACTIVE_TASKS.to_string(), None),
            Some(task) => (
                messages::status_active_task(
                    &task.file_name,
                    &task.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                ),
                Some(keyboards::status_keyboard()),
            ),
        };

        match edit_message_id {
            Some(message_id) => {
                self.api
                    .edit_message_text(chat_id, message_id, &text, markup.as_ref())
                    .await
            }
            None => self
                .api
                .send_message(chat_id, &text, markup.as_ref())
                .await
                .map(|_| ()),
        }
    }

    async fn handle_document(&self, message: &Message, document: Document) {
        let chat_id = message.chat.id;
        let Some(user) = message.from.clone() else {
            debug!(chat_id, "document without sender; ignoring");
            return;
        };

        let cooldown = Duration::from_secs(self.processor.config().rate_limit_cooldown_secs);
        match self.store.check_user_rate_limit(user.id, cooldown).await {
            Ok(true) => {}
            Ok(false) => {
                info!(user_id = user.id, "rate limited");
                let reply_fut: BoxFut<'_, ()> =
                    Box::pin(self.reply(chat_id, messages::ERROR_RATE_LIMIT));
                reply_fut.await;
                return;
            }
            Err(e) => {
                // A broken throttle must not take the bot down; admit.
                warn!(error = %e, "rate-limit check failed; admitting request");
            }
        }

        let file_name = document
            .file_name
            .clone()
            .unwrap_or_else(|| "document.pdf".to_string());
        let declared_size = document.file_size.unwrap_or(0);

        if let Err(e) = validate::check_attachment(
            &file_name,
            declared_size,
            self.processor.config().max_file_size,
        ) {
            let err_text = user_message(&e);
            let reply_fut: BoxFut<'_, ()> = Box::pin(self.reply(chat_id, &err_text));
            reply_fut.await;
            return;
        }

        let size_mb = declared_size as f64 / (1024.0 * 1024.0);
        let start_text = messages::processing_start(&file_name, size_mb);
        let status_fut: BoxFut<'_, Result<Message, crate::error::BotError>> =
            Box::pin(self.api.send_message(chat_id, &start_text, None));
        let status_message = match status_fut.await {
            Ok(m) => m,
            Err(e) => {
                warn!(chat_id, error = %e, "failed to send status message");
                return;
            }
        };

        let events: StageEvents = Arc::new(MessageProgress {
            api: Arc::clone(&self.api),
            chat_id,
            message_id: status_message.message_id,
        });

        let fetch: BoxFut<'_, Result<Vec<u8>, ConvertError>> =
            Box::pin(self.fetch_attachment(&document));
        let process_fut: BoxFut<'_, Result<crate::process::ConversionOutcome, ConvertError>> =
            Box::pin(self.processor.process_document(
                user.id,
                user.username.as_deref(),
                &file_name,
                declared_size,
                fetch,
                &events,
            ));
        let outcome = process_fut.await;

        match outcome {
            Ok(outcome) => {
                let caption = messages::success_caption(
                    Some(&outcome.stats),
                    self.processor.enhance_enabled(),
                );
                let keyboard = keyboards::success_keyboard();
                let send_fut: BoxFut<'_, Result<(), crate::error::BotError>> =
                    Box::pin(self.api.send_document(
                        chat_id,
                        &outcome.xlsx_name,
                        outcome.xlsx,
                        Some(&caption),
                        Some(&keyboard),
                    ));
                let sent = send_fut.await;
                if let Err(e) = sent {
                    warn!(chat_id, error = %e, "failed to deliver result");
                    let edit_fut: BoxFut<'_, ()> = Box::pin(self.edit_with_error_keyboard(
                        chat_id,
                        status_message.message_id,
                        messages::ERROR_API_UNAVAILABLE,
                    ));
                    edit_fut.await;
                }
            }
            Err(e) => {
                info!(user_id = user.id, error = %e, "conversion request failed");
                let err_text = user_message(&e);
                let edit_fut: BoxFut<'_, ()> = Box::pin(self.edit_with_error_keyboard(
                    chat_id,
                    status_message.message_id,
                    &err_text,
                ));
                edit_fut.await;
            }
        }
    }

    /// Resolve and download the attachment via the Bot API.
    async fn fetch_attachment(&self, document: &Document) -> Result<Vec<u8>, ConvertError> {
        let file = self
            .api
            .get_file(&document.file_id)
            .await
            .map_err(|e| ConvertError::AttachmentDownload {
                reason: e.to_string(),
            })?;
        let path = file.file_path.ok_or_else(|| ConvertError::AttachmentDownload {
            reason: "getFile returned no file_path".into(),
        })?;
        self.api
            .download_file(&path)
            .await
            .map_err(|e| ConvertError::AttachmentDownload {
                reason: e.to_string(),
            })
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        if let Err(e) = self.api.answer_callback_query(&query.id).await {
            debug!(error = %e, "failed to ack callback");
        }

        let Some(message) = query.message else {
            return;
        };
        let chat_id = message.chat.id;
        let message_id = message.message_id;
        let data = query.data.as_deref().unwrap_or("");

        let result = match data {
            callback::START_CONVERT | callback::RETRY_CONVERT | callback::CONVERT_ANOTHER => {
                self.api
                    .edit_message_text(chat_id, message_id, messages::CONVERT_MESSAGE, None)
                    .await
            }
            callback::HELP => {
                self.api
                    .edit_message_text(
                        chat_id,
                        message_id,
                        messages::HELP_MESSAGE,
                        Some(&keyboards::help_keyboard()),
                    )
                    .await
            }
            callback::STATUS => {
                self.send_status(chat_id, query.from.id, Some(message_id))
                    .await
            }
            callback::CANCEL_TASK => {
                if let Err(e) = self.store.remove_active_task(query.from.id).await {
                    warn!(error = %e, "failed to cancel task");
                }
                self.api
                    .edit_message_text(chat_id, message_id, messages::CANCEL_SUCCESS, None)
                    .await
            }
            callback::SHOW_STATS => match self.store.stats().await {
                Ok(stats) => {
                    self.api
                        .edit_message_text(
                            chat_id,
                            message_id,
                            &messages::stats_message(&stats),
                            None,
                        )
                        .await
                }
                Err(e) => {
                    warn!(error = %e, "stats query failed");
                    Ok(())
                }
            },
            other => {
                debug!(data = other, "unknown callback data");
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!(chat_id, error = %e, "failed to answer callback");
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.api.send_message(chat_id, text, None).await {
            warn!(chat_id, error = %e, "failed to send reply");
        }
    }

    async fn edit_with_error_keyboard(&self, chat_id: i64, message_id: i64, text: &str) {
        if let Err(e) = self
            .api
            .edit_message_text(chat_id, message_id, text, Some(&keyboards::error_keyboard()))
            .await
        {
            warn!(chat_id, error = %e, "failed to edit error message");
        }
    }

    async fn audit_command(&self, user: &User, operation: &str) {
        let result = self
            .store
            .log_operation(NewOperation {
                user_id: user.id,
                username: user.username.as_deref(),
                operation,
                status: OperationStatus::Completed,
                file_name: None,
                file_size: None,
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to audit command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_failures_map_to_their_templates() {
        assert_eq!(
            user_message(&ConvertError::NotPdf { name: "a.docx".into() }),
            messages::ERROR_INVALID_FORMAT
        );
        assert!(user_message(&ConvertError::TooLarge {
            size: 31_457_280,
            limit: 20_971_520
        })
        .contains("30.00 МБ"));
        assert_eq!(
            user_message(&ConvertError::Truncated),
            messages::ERROR_CORRUPT_PDF
        );
    }

    #[test]
    fn vendor_failures_map_to_fixed_templates() {
        assert_eq!(
            user_message(&ConvertError::Timeout {
                job_id: "j".into(),
                secs: 300
            }),
            messages::ERROR_TIMEOUT
        );
        assert_eq!(
            user_message(&ConvertError::JobCreate {
                status: 402,
                body: "credits".into()
            }),
            messages::ERROR_API_UNAVAILABLE
        );
        assert_eq!(
            user_message(&ConvertError::AllStrategiesFailed { name: "d.pdf".into() }),
            messages::ERROR_CONVERSION_FAILED
        );
    }

    #[test]
    fn vendor_error_bodies_never_reach_the_user() {
        let e = ConvertError::JobFailed {
            job_id: "j-1".into(),
            message: "internal stack trace with secrets".into(),
        };
        assert!(!user_message(&e).contains("stack trace"));
    }
}
