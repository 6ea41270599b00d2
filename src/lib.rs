//! # pdf2xlsx-bot
//!
//! Telegram bot that converts PDF documents to XLSX spreadsheets through an
//! external conversion vendor and repairs OCR/translation artefacts in the
//! result.
//!
//! ## Why this crate?
//!
//! OCR conversion of scanned Russian paperwork routinely comes back with
//! Ukrainian letter forms (і, ї, є, ґ), Ukrainian vocabulary, and the usual
//! glyph confusions (0/О, l/I). Fixing that by hand in a spreadsheet is
//! tedious; this bot does it on the way through — a static substitution
//! table first, an optional LLM repair pass after.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Telegram update
//!  │
//!  ├─ 1. Gate      rate limit, declared size, extension
//!  ├─ 2. Fetch     download the attachment, sniff %PDF magic
//!  ├─ 3. Convert   vendor job: create → upload → poll → download
//!  ├─ 4. Repair    static Ukrainian→Russian tables on the XLSX text layer
//!  ├─ 5. Enhance   batched LLM corrections (optional, best-effort)
//!  └─ 6. Deliver   send the workbook back with a quality summary
//! ```
//!
//! Alongside the pipeline the daemon keeps an SQLite audit log, a per-user
//! active-task marker, a per-user rate limit, and a liveness HTTP endpoint
//! for the hosting platform.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2xlsx_bot::{BotConfig, run};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads TELEGRAM_BOT_TOKEN, CLOUDCONVERT_API_KEY, ANTHROPIC_API_KEY…
//!     let config = BotConfig::from_env()?;
//!     run(config).await?;
//!     Ok(())
//! }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod telegram;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BotConfig, BotConfigBuilder};
pub use error::{BotError, ConvertError};
pub use process::{ConversionOutcome, Processor};
pub use progress::{NoopStageCallback, Stage, StageCallback, StageEvents};

use crate::db::sqlite::SqliteStore;
use crate::telegram::api::TelegramApi;
use crate::telegram::handlers::BotHandlers;
use std::sync::Arc;
use tracing::{info, warn};

/// Wire everything together and run until SIGINT/SIGTERM.
///
/// Startup order:
/// 1. Open the SQLite database and run pending migrations.
/// 2. Start the liveness listener on a background task.
/// 3. Build the Bot API client and the conversion pipeline.
/// 4. Run the long-poll update loop with graceful shutdown.
pub async fn run(config: BotConfig) -> Result<(), BotError> {
    let store = SqliteStore::connect(&config.database_url).await?;
    info!(database_url = %config.database_url, "database ready");

    let health_state = health::HealthState::new();
    let health_addr = config.health_bind.clone();
    tokio::spawn(async move {
        if let Err(e) = health::serve(&health_addr, health_state).await {
            warn!(error = %e, "health server exited");
        }
    });

    let api = Arc::new(TelegramApi::new(&config)?);
    let processor = Arc::new(Processor::new(config, store.clone())?);
    let handlers = Arc::new(BotHandlers::new(Arc::clone(&api), store, processor));

    info!(version = env!("CARGO_PKG_VERSION"), "bot starting");
    telegram::poll::run_polling(api, handlers, shutdown_signal()).await
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
