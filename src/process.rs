//! Per-request orchestration: audit row, active-task marker, pipeline
//! stages, outcome.
//!
//! Everything stateful about one conversion request lives here so the
//! Telegram layer stays a thin adapter. The ordering below is a contract:
//!
//! 1. Insert the `processing` audit row.
//! 2. Set the active-task marker.
//! 3. Fetch → validate → convert → post-process.
//! 4. **Always** clear the marker — success, vendor failure and internal
//!    error all pass through the same exit.
//! 5. Record the terminal audit outcome.
//!
//! Audit/marker writes are deliberately non-fatal: a failed bookkeeping
//! statement is logged and the conversion continues. The user paid for a
//! conversion, not for a log row.

use crate::config::BotConfig;
use crate::db::sqlite::SqliteStore;
use crate::db::{NewOperation, OperationStatus, OperationStore, TaskStore};
use crate::error::{BotError, ConvertError};
use crate::pipeline::convert::CloudConvertClient;
use crate::pipeline::enhance::Enhancer;
use crate::pipeline::quality::EnhancementStats;
use crate::pipeline::workbook::Workbook;
use crate::pipeline::{substitute, validate};
use crate::progress::{Stage, StageEvents};
use std::future::Future;
use tracing::{info, warn};

/// Result of one successful conversion request.
pub struct ConversionOutcome {
    /// Output file name derived from the source document.
    pub xlsx_name: String,
    /// The post-processed workbook.
    pub xlsx: Vec<u8>,
    /// Before/after quality summary of the post-processing passes.
    pub stats: EnhancementStats,
}

/// Owns the conversion pipeline and the bookkeeping around it.
pub struct Processor {
    config: BotConfig,
    converter: CloudConvertClient,
    enhancer: Option<Enhancer>,
    store: SqliteStore,
}

impl Processor {
    pub fn new(config: BotConfig, store: SqliteStore) -> Result<Self, BotError> {
        let converter = CloudConvertClient::new(&config)
            .map_err(|e| BotError::Internal(format!("building vendor client: {e}")))?;
        let enhancer = Enhancer::from_config(&config);
        Ok(Self {
            config,
            converter,
            enhancer,
            store,
        })
    }

    /// Whether the LLM pass is active (drives the success caption wording).
    pub fn enhance_enabled(&self) -> bool {
        self.enhancer.is_some()
    }

    /// Run one conversion request end to end.
    ///
    /// `fetch` downloads the attachment bytes; it runs after the audit row
    /// and marker exist so the download itself is covered by the audit
    /// trail. The active-task marker is cleared on every exit path.
    pub async fn process_document<F>(
        &self,
        user_id: i64,
        username: Option<&str>,
        file_name: &str,
        declared_size: i64,
        fetch: F,
        events: &StageEvents,
    ) -> Result<ConversionOutcome, ConvertError>
    where
        F: Future<Output = Result<Vec<u8>, ConvertError>>,
    {
        // Own the borrowed string arguments so they are not retained across the
        // `.await` points below. Holding a `&str` across an await makes the
        // spawned dispatch future fail the compiler's higher-ranked `Send`
        // check ("implementation of `Send` is not general enough").
        let username: Option<String> = username.map(str::to_owned);
        let file_name: String = file_name.to_owned();

        let operation_id = self
            .store
            .log_operation(NewOperation {
                user_id,
                username: username.as_deref(),
                operation: "conversion",
                status: OperationStatus::Processing,
                file_name: Some(&file_name),
                file_size: Some(declared_size),
            })
            .await
            .map_err(|e| warn!(error = %e, "failed to insert audit row"))
            .ok();

        if let Err(e) = self
            .store
            .save_active_task(user_id, None, &file_name)
            .await
        {
            warn!(error = %e, "failed to set active-task marker");
        }

        let result = self.run_pipeline(&file_name, fetch, events).await;

        // Cleared unconditionally: success, vendor failure and internal
        // error all exit through here.
        if let Err(e) = self.store.remove_active_task(user_id).await {
            warn!(error = %e, "failed to clear active-task marker");
        }

        if let Some(op_id) = operation_id {
            let (status, error) = match &result {
                Ok(_) => (OperationStatus::Completed, None),
                Err(e) => (OperationStatus::Error, Some(e.to_string())),
            };
            if let Err(e) = self
                .store
                .update_operation_status(op_id, status, error.as_deref())
                .await
            {
                warn!(error = %e, "failed to record operation outcome");
            }
        }

        result
    }

    async fn run_pipeline<F>(
        &self,
        file_name: &str,
        fetch: F,
        events: &StageEvents,
    ) -> Result<ConversionOutcome, ConvertError>
    where
        F: Future<Output = Result<Vec<u8>, ConvertError>>,
    {
        let pdf = fetch.await?;
        validate::check_pdf_bytes(&pdf)?;

        let converted = self
            .converter
            .convert_pdf_to_xlsx(&pdf, file_name, events)
            .await?;

        events.on_stage(Stage::Enhancing);
        let mut workbook = Workbook::from_bytes(&converted)?;
        let original_text = workbook.texts().join(" ");

        let mut cells_changed = workbook.map_texts(substitute::apply);
        if let Some(enhancer) = &self.enhancer {
            cells_changed += enhancer
                .enhance_workbook(&mut workbook, file_name, events)
                .await;
        }

        events.on_stage(Stage::Finalizing);
        let enhanced_text = workbook.texts().join(" ");
        let stats = EnhancementStats::compare(&original_text, &enhanced_text, cells_changed);
        info!(
            file = file_name,
            cells_changed,
            score_before = stats.original_score,
            score_after = stats.enhanced_score,
            "post-processing finished"
        );

        let xlsx = workbook.to_bytes()?;
        Ok(ConversionOutcome {
            xlsx_name: validate::xlsx_name(file_name),
            xlsx,
            stats,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TaskStore;
    use crate::progress::NoopStageCallback;
    use std::sync::Arc;

    async fn processor() -> (Processor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/bot.db", dir.path().display());
        let store = SqliteStore::connect(&url).await.unwrap();
        let config = BotConfig::builder()
            .telegram_token("t")
            .cloudconvert_api_key("k")
            // Loopback port 1 refuses instantly, so pipeline failures are fast.
            .cloudconvert_base_url("http://127.0.0.1:1")
            .api_timeout_secs(2)
            .build()
            .unwrap();
        (Processor::new(config, store.clone()).unwrap(), dir)
    }

    fn events() -> StageEvents {
        Arc::new(NoopStageCallback)
    }

    #[tokio::test]
    async fn marker_cleared_when_fetch_fails() {
        let (p, _dir) = processor().await;
        let result = p
            .process_document(
                1,
                Some("u"),
                "doc.pdf",
                10,
                async {
                    Err(ConvertError::AttachmentDownload {
                        reason: "gone".into(),
                    })
                },
                &events(),
            )
            .await;
        assert!(result.is_err());
        assert!(p.store.get_active_task(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn marker_cleared_when_validation_fails() {
        let (p, _dir) = processor().await;
        let result = p
            .process_document(
                2,
                None,
                "doc.pdf",
                10,
                async { Ok(b"not a pdf at all".to_vec()) },
                &events(),
            )
            .await;
        assert!(matches!(result.unwrap_err(), ConvertError::BadMagic { .. }));
        assert!(p.store.get_active_task(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn marker_cleared_when_vendor_fails() {
        let (p, _dir) = processor().await;
        let pdf = {
            let mut b = b"%PDF-1.7\ncontent\n".to_vec();
            b.extend_from_slice(b"startxref\n9\n%%EOF\n");
            b
        };
        let result = p
            .process_document(3, Some("u"), "doc.pdf", 10, async { Ok(pdf) }, &events())
            .await;
        assert!(matches!(
            result.unwrap_err(),
            ConvertError::AllStrategiesFailed { .. }
        ));
        assert!(p.store.get_active_task(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_request_recorded_as_error() {
        let (p, _dir) = processor().await;
        let _ = p
            .process_document(
                4,
                Some("u"),
                "doc.pdf",
                10,
                async {
                    Err(ConvertError::AttachmentDownload {
                        reason: "gone".into(),
                    })
                },
                &events(),
            )
            .await;
        let stats = crate::db::OperationStore::stats(&p.store).await.unwrap();
        assert_eq!(stats.total_operations, 1);
        assert_eq!(stats.error_operations, 1);
    }
}
