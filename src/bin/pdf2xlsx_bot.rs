//! Daemon binary for pdf2xlsx-bot.
//!
//! A thin shim over the library crate: loads `.env`, maps CLI flags (each
//! with an environment-variable fallback) onto `BotConfig`, initialises
//! tracing, and hands off to [`pdf2xlsx_bot::run`].

use anyhow::{Context, Result};
use clap::Parser;
use pdf2xlsx_bot::BotConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pdf2xlsx-bot",
    version,
    about = "Telegram bot: PDF → XLSX with OCR artefact repair"
)]
struct Cli {
    /// sqlx database URL for the audit/limits store.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://bot.db")]
    database_url: String,

    /// Port for the liveness HTTP endpoint.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Maximum accepted attachment size in bytes.
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = 20 * 1024 * 1024)]
    max_file_size: i64,

    /// Per-user cooldown between requests, in seconds.
    #[arg(long, env = "USER_COOLDOWN_SECS", default_value_t = 60)]
    cooldown_secs: u64,

    /// Overall per-conversion deadline, in seconds.
    #[arg(long, env = "CONVERSION_TIMEOUT", default_value_t = 300)]
    conversion_timeout_secs: u64,

    /// Disable the LLM repair pass even when a provider key is present.
    #[arg(long)]
    no_enhance: bool,

    /// Log filter, e.g. "info" or "debug,sqlx=warn".
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; absence is the normal production case.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let mut config = BotConfig::from_env().context("loading configuration")?;
    config.database_url = cli.database_url;
    config.health_bind = format!("0.0.0.0:{}", cli.port);
    config.max_file_size = cli.max_file_size.max(1);
    config.rate_limit_cooldown_secs = cli.cooldown_secs;
    config.conversion_timeout_secs = cli.conversion_timeout_secs.max(1);
    if cli.no_enhance {
        config.enhance_enabled = false;
    }

    pdf2xlsx_bot::run(config).await.context("running bot")?;
    Ok(())
}
