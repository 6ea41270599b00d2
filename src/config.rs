//! Configuration for the bot daemon.
//!
//! All behaviour is controlled through [`BotConfig`], built via its
//! [`BotConfigBuilder`] or loaded from environment variables with
//! [`BotConfig::from_env`]. Keeping every knob in one struct makes it trivial
//! to share the config across spawned update handlers and to diff two
//! deployments to understand why they behave differently.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest; `from_env` is a thin layer on top that
//! maps one environment variable to one builder call.

use crate::error::BotError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Runtime configuration for the bot.
///
/// # Example
/// ```rust
/// use pdf2xlsx_bot::BotConfig;
///
/// let config = BotConfig::builder()
///     .telegram_token("123:abc")
///     .cloudconvert_api_key("cc-key")
///     .max_file_size(10 * 1024 * 1024)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BotConfig {
    /// Bot API token from @BotFather.
    pub telegram_token: String,

    /// Base URL of the Bot API (default: `https://api.telegram.org`).
    /// Overridable to point at a local Bot API server or a test double.
    pub telegram_api_base: String,

    /// Conversion vendor API key.
    pub cloudconvert_api_key: String,

    /// Conversion vendor base URL (default: `https://api.cloudconvert.com/v2`).
    pub cloudconvert_base_url: String,

    /// OCR languages requested from the vendor. Default: `["rus"]`.
    ///
    /// The source documents are Russian paperwork scanned with mixed
    /// Cyrillic content; restricting OCR to Russian avoids the vendor's
    /// engine "helpfully" recognising Ukrainian letter forms.
    pub ocr_languages: Vec<String>,

    /// Locale passed to the vendor's convert task. Default: `ru_RU`.
    pub locale: String,

    /// Maximum accepted attachment size in bytes. Default: 20 MiB.
    pub max_file_size: i64,

    /// Per-user cooldown between accepted requests in seconds. Default: 60.
    pub rate_limit_cooldown_secs: u64,

    /// Overall deadline for one vendor conversion job in seconds. Default: 300.
    pub conversion_timeout_secs: u64,

    /// Per-HTTP-call timeout in seconds (vendor and Bot API). Default: 30.
    pub api_timeout_secs: u64,

    /// Vendor job-status poll interval in seconds. Default: 5.
    pub poll_interval_secs: u64,

    /// `getUpdates` long-poll hold time in seconds. Default: 30.
    ///
    /// The HTTP client timeout for the poll call is this value plus
    /// [`Self::api_timeout_secs`] so the server-side hold never races the
    /// client-side timeout.
    pub long_poll_timeout_secs: u64,

    /// Whether the LLM enhancement pass runs at all. Default: false;
    /// `from_env` enables it when a provider key is present and
    /// `CLAUDE_MANUAL_ENABLED` is not set to `false`.
    pub enhance_enabled: bool,

    /// LLM model identifier. Default: `claude-3-5-sonnet-20241022`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic"). If `None` along with
    /// `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Cells per enhancement batch. Default: 30.
    ///
    /// Thirty single-line cells keep a batch comfortably inside the model's
    /// output budget so the numbered response never truncates mid-list.
    pub batch_size: usize,

    /// Concurrent enhancement batches in flight. Default: 4.
    pub enhance_concurrency: usize,

    /// Maximum tokens the LLM may generate per batch. Default: 8192.
    pub max_tokens: usize,

    /// Sampling temperature for the correction calls. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the source text — the
    /// task is repair, not rewriting.
    pub temperature: f32,

    /// Maximum retry attempts on a transient LLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial LLM retry delay in milliseconds (exponential backoff).
    /// Default: 500. Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// sqlx-compatible database URL. Default: `sqlite://bot.db`.
    pub database_url: String,

    /// Bind address for the liveness endpoint. Default: `0.0.0.0:8080`.
    pub health_bind: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            telegram_api_base: "https://api.telegram.org".into(),
            cloudconvert_api_key: String::new(),
            cloudconvert_base_url: "https://api.cloudconvert.com/v2".into(),
            ocr_languages: vec!["rus".into()],
            locale: "ru_RU".into(),
            max_file_size: 20 * 1024 * 1024,
            rate_limit_cooldown_secs: 60,
            conversion_timeout_secs: 300,
            api_timeout_secs: 30,
            poll_interval_secs: 5,
            long_poll_timeout_secs: 30,
            enhance_enabled: false,
            model: Some("claude-3-5-sonnet-20241022".into()),
            provider_name: Some("anthropic".into()),
            provider: None,
            batch_size: 30,
            enhance_concurrency: 4,
            max_tokens: 8192,
            temperature: 0.1,
            max_retries: 3,
            retry_backoff_ms: 500,
            database_url: "sqlite://bot.db".into(),
            health_bind: "0.0.0.0:8080".into(),
        }
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("telegram_api_base", &self.telegram_api_base)
            .field("cloudconvert_base_url", &self.cloudconvert_base_url)
            .field("ocr_languages", &self.ocr_languages)
            .field("locale", &self.locale)
            .field("max_file_size", &self.max_file_size)
            .field("rate_limit_cooldown_secs", &self.rate_limit_cooldown_secs)
            .field("conversion_timeout_secs", &self.conversion_timeout_secs)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("enhance_enabled", &self.enhance_enabled)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("batch_size", &self.batch_size)
            .field("enhance_concurrency", &self.enhance_concurrency)
            .field("database_url", &self.database_url)
            .field("health_bind", &self.health_bind)
            .finish()
    }
}

impl BotConfig {
    /// Create a new builder for `BotConfig`.
    pub fn builder() -> BotConfigBuilder {
        BotConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build [`BotConfig`] from environment variables.
    ///
    /// Required: `TELEGRAM_BOT_TOKEN`, `CLOUDCONVERT_API_KEY`.
    /// The enhancement pass is enabled when `ANTHROPIC_API_KEY` is present
    /// and `CLAUDE_MANUAL_ENABLED` is not `false`/`0`.
    pub fn from_env() -> Result<Self, BotError> {
        let token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if token.is_empty() {
            return Err(BotError::MissingCredential {
                name: "TELEGRAM_BOT_TOKEN",
                hint: "Create a bot with @BotFather and export its token.".into(),
            });
        }
        let cc_key = std::env::var("CLOUDCONVERT_API_KEY").unwrap_or_default();
        if cc_key.is_empty() {
            return Err(BotError::MissingCredential {
                name: "CLOUDCONVERT_API_KEY",
                hint: "Create an API key at cloudconvert.com and export it.".into(),
            });
        }

        let manual_enabled = std::env::var("CLAUDE_MANUAL_ENABLED")
            .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
            .unwrap_or(true);
        let has_llm_key = std::env::var("ANTHROPIC_API_KEY")
            .map(|v| !v.is_empty())
            .unwrap_or(false);

        let ocr_languages: Vec<String> = env_or("CLOUDCONVERT_OCR_LANGUAGES", "rus")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self::builder()
            .telegram_token(token)
            .cloudconvert_api_key(cc_key)
            .cloudconvert_base_url(env_or(
                "CLOUDCONVERT_BASE_URL",
                "https://api.cloudconvert.com/v2",
            ))
            .ocr_languages(ocr_languages)
            .locale(env_or("CLOUDCONVERT_LOCALE", "ru_RU"))
            .max_file_size(parse_env("MAX_FILE_SIZE", 20 * 1024 * 1024))
            .enhance_enabled(has_llm_key && manual_enabled)
            .model(env_or("CLAUDE_MODEL", "claude-3-5-sonnet-20241022"))
            .database_url(env_or("DATABASE_URL", "sqlite://bot.db"))
            .health_bind(format!("0.0.0.0:{}", env_or("PORT", "8080")))
            .build()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Builder for [`BotConfig`].
#[derive(Debug)]
pub struct BotConfigBuilder {
    config: BotConfig,
}

impl BotConfigBuilder {
    pub fn telegram_token(mut self, token: impl Into<String>) -> Self {
        self.config.telegram_token = token.into();
        self
    }

    pub fn telegram_api_base(mut self, base: impl Into<String>) -> Self {
        self.config.telegram_api_base = trim_trailing_slash(base.into());
        self
    }

    pub fn cloudconvert_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.cloudconvert_api_key = key.into();
        self
    }

    pub fn cloudconvert_base_url(mut self, base: impl Into<String>) -> Self {
        self.config.cloudconvert_base_url = trim_trailing_slash(base.into());
        self
    }

    pub fn ocr_languages(mut self, langs: Vec<String>) -> Self {
        if !langs.is_empty() {
            self.config.ocr_languages = langs;
        }
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    pub fn max_file_size(mut self, bytes: i64) -> Self {
        self.config.max_file_size = bytes.max(1);
        self
    }

    pub fn rate_limit_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_cooldown_secs = secs;
        self
    }

    pub fn conversion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.conversion_timeout_secs = secs.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs.max(1);
        self
    }

    pub fn long_poll_timeout_secs(mut self, secs: u64) -> Self {
        self.config.long_poll_timeout_secs = secs;
        self
    }

    pub fn enhance_enabled(mut self, v: bool) -> Self {
        self.config.enhance_enabled = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn enhance_concurrency(mut self, n: usize) -> Self {
        self.config.enhance_concurrency = n.max(1);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = url.into();
        self
    }

    pub fn health_bind(mut self, addr: impl Into<String>) -> Self {
        self.config.health_bind = addr.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BotConfig, BotError> {
        let c = &self.config;
        if c.telegram_token.is_empty() {
            return Err(BotError::InvalidConfig("telegram_token is empty".into()));
        }
        if c.cloudconvert_api_key.is_empty() {
            return Err(BotError::InvalidConfig(
                "cloudconvert_api_key is empty".into(),
            ));
        }
        if c.batch_size == 0 {
            return Err(BotError::InvalidConfig("batch_size must be ≥ 1".into()));
        }
        if c.conversion_timeout_secs < c.poll_interval_secs {
            return Err(BotError::InvalidConfig(format!(
                "conversion_timeout_secs ({}) must be ≥ poll_interval_secs ({})",
                c.conversion_timeout_secs, c.poll_interval_secs
            )));
        }
        Ok(self.config)
    }
}

fn trim_trailing_slash(mut s: String) -> String {
    while s.ends_with('/') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BotConfigBuilder {
        BotConfig::builder()
            .telegram_token("123:abc")
            .cloudconvert_api_key("cc-key")
    }

    #[test]
    fn defaults_are_sane() {
        let c = minimal().build().unwrap();
        assert_eq!(c.max_file_size, 20 * 1024 * 1024);
        assert_eq!(c.rate_limit_cooldown_secs, 60);
        assert_eq!(c.poll_interval_secs, 5);
        assert_eq!(c.batch_size, 30);
        assert!(!c.enhance_enabled);
    }

    #[test]
    fn missing_token_rejected() {
        let err = BotConfig::builder()
            .cloudconvert_api_key("k")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("telegram_token"));
    }

    #[test]
    fn timeout_must_cover_poll_interval() {
        let err = minimal()
            .conversion_timeout_secs(2)
            .poll_interval_secs(5)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        let c = minimal()
            .telegram_api_base("https://api.telegram.org/")
            .cloudconvert_base_url("https://api.cloudconvert.com/v2///")
            .build()
            .unwrap();
        assert_eq!(c.telegram_api_base, "https://api.telegram.org");
        assert_eq!(c.cloudconvert_base_url, "https://api.cloudconvert.com/v2");
    }

    #[test]
    fn clamps_apply() {
        let c = minimal()
            .batch_size(0)
            .enhance_concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.batch_size, 1);
        assert_eq!(c.enhance_concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }
}
