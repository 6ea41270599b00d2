//! Error types for the pdf2xlsx-bot library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BotError`] — **Fatal**: the process cannot run at all (bad
//!   configuration, the database cannot be opened, the update loop lost its
//!   transport). Returned from startup code and from the long-poll loop.
//!
//! * [`ConvertError`] — **Per-request**: a single user's conversion failed
//!   (invalid document, vendor rejection, deadline expired). The request is
//!   answered with a fixed message template, logged to the operations table,
//!   and the daemon keeps serving other users.
//!
//! The separation keeps the dispatch loop honest: a `ConvertError` is never
//! allowed to tear down the process, and a `BotError` is never silently
//! downgraded to a chat message.

use thiserror::Error;

/// Fatal errors that stop the daemon.
#[derive(Debug, Error)]
pub enum BotError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Required credential missing from the environment.
    #[error("Missing credential: {name} is not set.\n{hint}")]
    MissingCredential { name: &'static str, hint: String },

    /// The SQLite database could not be opened or migrated.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The Bot API long-poll transport failed irrecoverably.
    #[error("Telegram transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The Bot API answered `ok: false`.
    #[error("Telegram API rejected {method}: {description}")]
    TelegramApi { method: String, description: String },

    /// The liveness listener could not bind.
    #[error("Health server failed to bind {addr}: {source}")]
    HealthBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A failure scoped to one conversion request.
///
/// Every variant maps to one of the fixed user-facing templates in
/// [`crate::telegram::messages`]; the `Display` text is what gets written to
/// the `error_message` column of the operations log, not what the user sees.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// File name does not end in `.pdf`.
    #[error("Unsupported file type: '{name}'")]
    NotPdf { name: String },

    /// Declared size exceeds the configured maximum.
    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: i64, limit: i64 },

    /// Downloaded bytes do not start with the `%PDF` magic.
    #[error("Not a valid PDF document (magic bytes {magic:?})")]
    BadMagic { magic: [u8; 4] },

    /// Trailer markers missing; the file is truncated or corrupt.
    #[error("PDF appears truncated: no %%EOF/startxref in trailer")]
    Truncated,

    /// The file could not be fetched from the chat.
    #[error("Failed to download attachment: {reason}")]
    AttachmentDownload { reason: String },

    /// Vendor refused to create the job. `status` 402 means credits ran out.
    #[error("Conversion job creation failed: HTTP {status}: {body}")]
    JobCreate { status: u16, body: String },

    /// Upload to the vendor-supplied form URL failed.
    #[error("Upload failed: {reason}")]
    Upload { reason: String },

    /// Vendor reported the job as errored.
    #[error("Conversion job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// Job finished but exposed no downloadable result.
    #[error("Conversion job {job_id} finished without an export URL")]
    NoExportUrl { job_id: String },

    /// The overall conversion deadline expired while polling.
    #[error("Conversion timed out after {secs}s (job {job_id})")]
    Timeout { job_id: String, secs: u64 },

    /// Downloading the converted result failed.
    #[error("Result download failed: {reason}")]
    Download { reason: String },

    /// Both the primary and the fallback vendor configuration failed.
    #[error("All conversion strategies failed for '{name}'")]
    AllStrategiesFailed { name: String },

    /// The produced workbook could not be read back.
    #[error("Result is not a readable workbook: {detail}")]
    BadWorkbook { detail: String },

    /// Transport-level failure talking to the vendor.
    #[error("Vendor API error: {0}")]
    VendorTransport(#[from] reqwest::Error),
}

impl ConvertError {
    /// True when the primary strategy failure should trigger the single
    /// fallback attempt. Input validation failures are final — re-running
    /// the vendor with different OCR options cannot fix a bad upload.
    pub fn is_retryable_with_fallback(&self) -> bool {
        !matches!(
            self,
            ConvertError::NotPdf { .. }
                | ConvertError::TooLarge { .. }
                | ConvertError::BadMagic { .. }
                | ConvertError::Truncated
                | ConvertError::AttachmentDownload { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display() {
        let e = ConvertError::TooLarge {
            size: 30_000_000,
            limit: 20_971_520,
        };
        let msg = e.to_string();
        assert!(msg.contains("30000000"), "got: {msg}");
    }

    #[test]
    fn job_failed_display_includes_job_id() {
        let e = ConvertError::JobFailed {
            job_id: "j-123".into(),
            message: "ocr backend crashed".into(),
        };
        assert!(e.to_string().contains("j-123"));
        assert!(e.to_string().contains("ocr backend crashed"));
    }

    #[test]
    fn validation_errors_are_not_fallback_retryable() {
        assert!(!ConvertError::NotPdf { name: "a.docx".into() }.is_retryable_with_fallback());
        assert!(!ConvertError::Truncated.is_retryable_with_fallback());
        assert!(ConvertError::NoExportUrl { job_id: "j".into() }.is_retryable_with_fallback());
        assert!(ConvertError::Timeout {
            job_id: "j".into(),
            secs: 300
        }
        .is_retryable_with_fallback());
    }

    #[test]
    fn telegram_api_display() {
        let e = BotError::TelegramApi {
            method: "sendMessage".into(),
            description: "Bad Request: chat not found".into(),
        };
        assert!(e.to_string().contains("sendMessage"));
        assert!(e.to_string().contains("chat not found"));
    }
}
