//! Conversion vendor client: create job → upload → poll → download.
//!
//! The vendor (CloudConvert v2 API) models a conversion as a *job* made of
//! chained *tasks*: an `import/upload` task that hands back a pre-signed
//! form, a `convert` task, and an `export/url` task that exposes the result
//! file. The client walks that sequence linearly with fixed timeouts and a
//! fixed poll interval — no backoff, no circuit breaker; a request gets at
//! most two attempts (primary OCR settings, then one fallback configuration)
//! and then fails.
//!
//! ## Strategies
//!
//! * **Primary** — vendor's best OCR accuracy, document locale pinned, UTF-8
//!   output. Slowest, best text.
//! * **Fallback** — Tesseract engine in fast mode. Worse text, but it
//!   succeeds on scans that crash the primary engine, which is the failure
//!   mode that motivated the fallback in the first place.

use crate::config::BotConfig;
use crate::error::ConvertError;
use crate::progress::{Stage, StageEvents};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// OCR configuration used for one conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Best-accuracy OCR with a pinned locale.
    Primary,
    /// Fast Tesseract OCR; used exactly once after a primary failure.
    Fallback,
}

impl Strategy {
    fn label(self) -> &'static str {
        match self {
            Strategy::Primary => "standard enhanced",
            Strategy::Fallback => "fast tesseract",
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    data: Job,
}

/// A conversion job as returned by the vendor.
#[derive(Debug, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tasks: Vec<JobTask>,
}

#[derive(Debug, Deserialize)]
pub struct JobTask {
    #[serde(default)]
    pub name: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
}

#[derive(Debug, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub form: Option<UploadForm>,
    #[serde(default)]
    pub files: Option<Vec<ExportFile>>,
}

/// Pre-signed upload form from the `import/upload` task.
#[derive(Debug, Deserialize)]
pub struct UploadForm {
    pub url: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExportFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Job {
    /// The upload form of the `import/upload` task, if the vendor has
    /// already materialised it.
    pub fn upload_form(&self) -> Option<&UploadForm> {
        self.tasks
            .iter()
            .filter(|t| t.operation == "import/upload")
            .find_map(|t| t.result.as_ref()?.form.as_ref())
    }

    /// The first result-file URL of a finished `export/url` task.
    pub fn export_url(&self) -> Option<&str> {
        self.tasks
            .iter()
            .filter(|t| t.operation == "export/url" && t.status == "finished")
            .find_map(|t| {
                t.result
                    .as_ref()?
                    .files
                    .as_ref()?
                    .first()?
                    .url
                    .as_deref()
            })
    }

    /// Human-readable summary of whichever tasks failed.
    pub fn error_summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(msg) = &self.message {
            parts.push(msg.clone());
        }
        for task in self.tasks.iter().filter(|t| t.status == "error") {
            let name = task.name.as_deref().unwrap_or("unnamed");
            let msg = task.message.as_deref().unwrap_or("unknown task error");
            parts.push(format!("{name} ({}): {msg}", task.operation));
        }
        if parts.is_empty() {
            "unknown error".into()
        } else {
            parts.join("; ")
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────────

/// HTTP client for the conversion vendor.
pub struct CloudConvertClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    ocr_languages: Vec<String>,
    locale: String,
    poll_interval: Duration,
    conversion_timeout: Duration,
}

impl CloudConvertClient {
    pub fn new(config: &BotConfig) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.cloudconvert_base_url.clone(),
            api_key: config.cloudconvert_api_key.clone(),
            ocr_languages: config.ocr_languages.clone(),
            locale: config.locale.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            conversion_timeout: Duration::from_secs(config.conversion_timeout_secs),
        })
    }

    /// Full conversion: primary strategy, then one fallback attempt.
    ///
    /// Returns the converted XLSX bytes. Input-validation failures from the
    /// primary attempt are final; everything else triggers the fallback.
    pub async fn convert_pdf_to_xlsx(
        &self,
        pdf: &[u8],
        file_name: &str,
        events: &StageEvents,
    ) -> Result<Vec<u8>, ConvertError> {
        info!(file = file_name, "starting conversion");

        match self.run_strategy(Strategy::Primary, pdf, file_name, events).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable_with_fallback() => {
                warn!(file = file_name, error = %e, "primary strategy failed; trying fallback");
            }
            Err(e) => return Err(e),
        }

        match self.run_strategy(Strategy::Fallback, pdf, file_name, events).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                error!(file = file_name, error = %e, "fallback strategy failed");
                Err(ConvertError::AllStrategiesFailed {
                    name: file_name.to_string(),
                })
            }
        }
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        pdf: &[u8],
        file_name: &str,
        events: &StageEvents,
    ) -> Result<Vec<u8>, ConvertError> {
        let job = self.create_job(strategy).await?;
        info!(job_id = %job.id, strategy = strategy.label(), "conversion job created");

        // The upload form is usually embedded in the creation response; when
        // the vendor defers it, one status re-fetch materialises it.
        let job = if job.upload_form().is_some() {
            job
        } else {
            debug!(job_id = %job.id, "upload form missing from creation response; re-fetching");
            self.job_status(&job.id).await?
        };
        let form = job.upload_form().ok_or_else(|| ConvertError::Upload {
            reason: "vendor provided no upload form".into(),
        })?;

        events.on_stage(Stage::Uploading);
        self.upload(form, pdf.to_vec(), file_name).await?;

        events.on_stage(Stage::Converting);
        let download_url = self.wait_for_export_url(&job.id).await?;
        self.download(&download_url).await
    }

    /// `POST /jobs` with the task chain for the given strategy.
    async fn create_job(&self, strategy: Strategy) -> Result<Job, ConvertError> {
        let payload = self.job_payload(strategy);
        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 201 {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 402 {
                error!("vendor credits exhausted: {body}");
            } else {
                error!(status = status.as_u16(), "job creation failed: {body}");
            }
            return Err(ConvertError::JobCreate {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: JobEnvelope = response.json().await?;
        Ok(envelope.data)
    }

    fn job_payload(&self, strategy: Strategy) -> serde_json::Value {
        let options = match strategy {
            Strategy::Primary => serde_json::json!({
                "ocr_lang": self.ocr_languages,
                "ocr_accuracy": "best",
                "locale": self.locale,
                "text_encoding": "utf-8",
            }),
            Strategy::Fallback => serde_json::json!({
                "ocr_lang": self.ocr_languages,
                "ocr_accuracy": "fast",
                "ocr_engine": "tesseract",
            }),
        };
        serde_json::json!({
            "tasks": {
                "import-pdf": { "operation": "import/upload" },
                "convert-to-xlsx": {
                    "operation": "convert",
                    "input": "import-pdf",
                    "input_format": "pdf",
                    "output_format": "xlsx",
                    "options": options,
                },
                "export-xlsx": {
                    "operation": "export/url",
                    "input": "convert-to-xlsx",
                },
            }
        })
    }

    /// Multipart POST to the vendor-supplied form URL. Every form parameter
    /// the vendor handed back must be forwarded ahead of the file part.
    async fn upload(
        &self,
        form: &UploadForm,
        file: Vec<u8>,
        file_name: &str,
    ) -> Result<(), ConvertError> {
        let mut multipart = reqwest::multipart::Form::new();
        for (key, value) in &form.parameters {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            multipart = multipart.text(key.clone(), text);
        }
        let part = reqwest::multipart::Part::bytes(file)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")
            .map_err(|e| ConvertError::Upload {
                reason: format!("building file part: {e}"),
            })?;
        multipart = multipart.part("file", part);

        let response = self.client.post(&form.url).multipart(multipart).send().await?;
        let status = response.status();
        // S3-style endpoints answer 204, others 200/201.
        if !matches!(status.as_u16(), 200 | 201 | 204) {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvertError::Upload {
                reason: format!("HTTP {status}: {body}"),
            });
        }
        info!(file = file_name, "file uploaded to vendor");
        Ok(())
    }

    /// `GET /jobs/{id}`.
    async fn job_status(&self, job_id: &str) -> Result<Job, ConvertError> {
        let response = self
            .client
            .get(format!("{}/jobs/{job_id}", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvertError::JobFailed {
                job_id: job_id.to_string(),
                message: format!("status query failed: HTTP {status}: {body}"),
            });
        }
        let envelope: JobEnvelope = response.json().await?;
        Ok(envelope.data)
    }

    /// Poll until the job reaches a terminal state or the deadline expires;
    /// return the export download URL.
    async fn wait_for_export_url(&self, job_id: &str) -> Result<String, ConvertError> {
        let started = Instant::now();

        loop {
            if started.elapsed() > self.conversion_timeout {
                return Err(ConvertError::Timeout {
                    job_id: job_id.to_string(),
                    secs: self.conversion_timeout.as_secs(),
                });
            }

            let job = self.job_status(job_id).await?;
            debug!(job_id, status = %job.status, "job polled");

            match job.status.as_str() {
                "finished" => {
                    return match job.export_url() {
                        Some(url) => Ok(url.to_string()),
                        None => {
                            error!(job_id, "job finished but no export URL found");
                            Err(ConvertError::NoExportUrl {
                                job_id: job_id.to_string(),
                            })
                        }
                    };
                }
                "error" => {
                    let message = job.error_summary();
                    error!(job_id, %message, "job failed");
                    return Err(ConvertError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }

    /// Fetch the converted result.
    async fn download(&self, url: &str) -> Result<Vec<u8>, ConvertError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConvertError::Download {
                reason: format!("HTTP {status}: {body}"),
            });
        }
        let bytes = response.bytes().await?;
        info!(len = bytes.len(), "converted file downloaded");
        Ok(bytes.to_vec())
    }
}
