//! LLM repair pass: batch cell texts, ask the model to fix what the static
//! tables cannot, splice the answers back by position.
//!
//! The substitution tables handle the enumerable artefacts; this pass exists
//! for the long tail — inflected Ukrainian words missing from the table,
//! OCR-mangled words that need context to repair, broken spacing. It is
//! strictly best-effort: any failure (provider not configured, API error,
//! unparseable reply) leaves the affected cells as the substitution pass
//! produced them and the request still succeeds.
//!
//! ## Retry strategy
//!
//! HTTP 429 / 503 from LLM APIs are transient and frequent under concurrent
//! load. Exponential backoff (`retry_backoff_ms * 2^attempt`) avoids
//! thundering-herd: with 500 ms base and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s per batch.

use crate::config::BotConfig;
use crate::pipeline::workbook::Workbook;
use crate::progress::StageEvents;
use crate::prompts::{batch_prompt, ENHANCE_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Prefix the model is instructed to keep on every reply line.
const CELL_PREFIX: &str = "Ячейка ";

/// The configured LLM repair pass.
pub struct Enhancer {
    provider: Arc<dyn LLMProvider>,
    batch_size: usize,
    concurrency: usize,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl Enhancer {
    /// Build the enhancer from config, resolving the provider from most- to
    /// least-specific: pre-built provider, then named provider + model, then
    /// full environment auto-detection.
    ///
    /// Returns `None` (with a log line saying why) when enhancement is
    /// disabled or no provider can be constructed — the pipeline then runs
    /// with the substitution pass only.
    pub fn from_config(config: &BotConfig) -> Option<Self> {
        if !config.enhance_enabled {
            info!("LLM enhancement disabled; substitution pass only");
            return None;
        }

        let provider: Arc<dyn LLMProvider> = if let Some(ref p) = config.provider {
            Arc::clone(p)
        } else if let Some(ref name) = config.provider_name {
            let model = config.model.as_deref().unwrap_or("claude-3-5-sonnet-20241022");
            match ProviderFactory::create_llm_provider(name, model) {
                Ok(p) => p,
                Err(e) => {
                    warn!(provider = %name, error = %e, "LLM provider unavailable; enhancement off");
                    return None;
                }
            }
        } else {
            match ProviderFactory::from_env() {
                Ok((p, _embedding)) => p,
                Err(e) => {
                    warn!(error = %e, "no LLM provider auto-detected; enhancement off");
                    return None;
                }
            }
        };

        Some(Self {
            provider,
            batch_size: config.batch_size,
            concurrency: config.enhance_concurrency,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    /// Repair the workbook's text layer in place. Returns the number of
    /// cells the model changed.
    pub async fn enhance_workbook(
        &self,
        workbook: &mut Workbook,
        file_name: &str,
        events: &StageEvents,
    ) -> usize {
        let texts = workbook.texts();
        let candidates: Vec<(usize, &str)> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.as_str()))
            .collect();

        if candidates.is_empty() {
            debug!(file = file_name, "no text cells to enhance");
            return 0;
        }

        let batches: Vec<Vec<(usize, &str)>> = candidates
            .chunks(self.batch_size)
            .map(|c| c.to_vec())
            .collect();
        let total_batches = batches.len();
        info!(
            file = file_name,
            cells = candidates.len(),
            batches = total_batches,
            "enhancing workbook text"
        );

        let context = format!("таблица из файла '{file_name}'");
        let done = AtomicUsize::new(0);

        let replacements: Vec<Vec<(usize, String)>> = stream::iter(batches.into_iter().map(
            |batch| {
                let context = context.clone();
                let done = &done;
                async move {
                    let result = self.process_batch(&context, &batch).await;
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    events.on_batch_done(finished, total_batches);
                    result.unwrap_or_default()
                }
            },
        ))
        .buffer_unordered(self.concurrency)
        .collect()
        .await;

        let mut new_texts: Vec<Option<String>> = vec![None; texts.len()];
        for (idx, text) in replacements.into_iter().flatten() {
            new_texts[idx] = Some(text);
        }
        workbook.apply_texts(&new_texts)
    }

    /// Send one batch with retry/backoff; parse the reply into
    /// `(cell index, repaired text)` pairs.
    ///
    /// Returns `None` when every attempt failed — the caller treats that
    /// batch as unenhanced rather than failing the request.
    async fn process_batch(
        &self,
        context: &str,
        batch: &[(usize, &str)],
    ) -> Option<Vec<(usize, String)>> {
        let expected: Vec<usize> = batch.iter().map(|(i, _)| *i).collect();
        let messages = vec![
            ChatMessage::system(ENHANCE_SYSTEM_PROMPT),
            ChatMessage::user(batch_prompt(context, batch)),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    attempt,
                    max = self.max_retries,
                    backoff_ms = backoff,
                    "retrying enhancement batch"
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&options)).await {
                Ok(response) => {
                    debug!(
                        input_tokens = response.prompt_tokens,
                        output_tokens = response.completion_tokens,
                        "batch enhanced"
                    );
                    return Some(parse_batch_reply(&response.content, &expected));
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "enhancement batch failed");
                }
            }
        }
        None
    }
}

/// Parse the model's reply into `(cell index, text)` pairs.
///
/// Only lines carrying the `Ячейка N:` prefix with an index that was
/// actually sent in this batch are accepted; commentary lines, hallucinated
/// indices and empty repairs are dropped. Losing a line means that one cell
/// keeps its substitution-pass text — never a hard failure.
fn parse_batch_reply(reply: &str, expected: &[usize]) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    for line in reply.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix(CELL_PREFIX) else {
            continue;
        };
        let Some((idx_part, text)) = rest.split_once(':') else {
            continue;
        };
        let Ok(idx) = idx_part.trim().parse::<usize>() else {
            continue;
        };
        if !expected.contains(&idx) {
            continue;
        }
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        out.push((idx, text.to_string()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reply_parsed() {
        let reply = "Ячейка 0: Свидетельство\nЯчейка 3: на 2024 года\n";
        let parsed = parse_batch_reply(reply, &[0, 3]);
        assert_eq!(
            parsed,
            vec![
                (0, "Свидетельство".to_string()),
                (3, "на 2024 года".to_string())
            ]
        );
    }

    #[test]
    fn commentary_lines_dropped() {
        let reply = "Вот исправленный текст:\n\nЯчейка 1: ИНН 3445915248\nГотово!";
        let parsed = parse_batch_reply(reply, &[1]);
        assert_eq!(parsed, vec![(1, "ИНН 3445915248".to_string())]);
    }

    #[test]
    fn hallucinated_indices_dropped() {
        let reply = "Ячейка 5: текст\nЯчейка 99: выдумка";
        let parsed = parse_batch_reply(reply, &[5]);
        assert_eq!(parsed, vec![(5, "текст".to_string())]);
    }

    #[test]
    fn empty_repairs_dropped() {
        let reply = "Ячейка 2:\nЯчейка 4:   \nЯчейка 6: осталось";
        let parsed = parse_batch_reply(reply, &[2, 4, 6]);
        assert_eq!(parsed, vec![(6, "осталось".to_string())]);
    }

    #[test]
    fn colons_inside_text_survive() {
        let reply = "Ячейка 0: Время: 12:30";
        let parsed = parse_batch_reply(reply, &[0]);
        assert_eq!(parsed, vec![(0, "Время: 12:30".to_string())]);
    }

    #[test]
    fn disabled_config_yields_no_enhancer() {
        let config = crate::config::BotConfig::builder()
            .telegram_token("t")
            .cloudconvert_api_key("k")
            .enhance_enabled(false)
            .build()
            .unwrap();
        assert!(Enhancer::from_config(&config).is_none());
    }
}
