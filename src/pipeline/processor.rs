//! Annotation processing orchestrator.
//!
//! Single entry point that drives one image through the whole pipeline:
//! analyze → validate (retry/fallback) → enhance → stage → summarize →
//! promote to the final store.
//!
//! Uses trait-based DI for every engine (analysis, structuring, stores) so
//! the orchestrator remains fully testable with mock implementations.

use std::path::Path;
use std::sync::Arc;

use base64::Engine as _;
use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::DatabaseError;
use crate::models::{LoadSummary, StagedRequest, ValidationStatus, DEFAULT_SUBJECT_ID};
use crate::pipeline::analysis::{
    AnalysisError, ImageAnalysisProvider, OllamaVisionAnalyzer, RemoteAnalysisClient,
};
use crate::pipeline::enhancement::Enhancer;
use crate::pipeline::storage::{bound_description, serialize_record, truncate_label};
use crate::pipeline::store::{
    FinalStore, FinalWrite, SqliteFinalStore, SqliteStagingStore, StagingStore,
};
use crate::pipeline::structuring::{
    GeminiClient, LlmClient, LlmStructurer, OllamaClient, ValidationPipeline,
};
use crate::pipeline::summary::{SummaryError, SummaryProjector};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while annotating an image.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Summary failed: {0}")]
    Summary(#[from] SummaryError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{0}: Not found")]
    ImageNotFound(String),

    #[error("Cannot read image {path}: {source}")]
    ImageRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Dataset {0} has no images")]
    EmptyDataset(String),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// What one annotation produced, as shown to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotationOutcome {
    pub request_id: Uuid,
    pub dataset: String,
    pub path_url: String,
    pub subject_id: String,
    pub label: String,
    pub description: String,
    pub status: ValidationStatus,
    pub attempt_number: u32,
    pub confidence_score: f64,
    pub enhanced: bool,
}

/// Result of a batch run over a dataset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub total: usize,
    pub processed: usize,
    pub fallbacks: usize,
    pub errors: Vec<String>,
    pub outcomes: Vec<AnnotationOutcome>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct AnnotationProcessor {
    analyzer: Box<dyn ImageAnalysisProvider + Send + Sync>,
    pipeline: ValidationPipeline,
    enhancer: Option<Enhancer>,
    summarizer: Option<SummaryProjector>,
    staging: Box<dyn StagingStore>,
    final_store: Box<dyn FinalStore>,
}

impl AnnotationProcessor {
    /// Processor over the SQLite stores, without enhancement or summary.
    pub fn new(
        analyzer: Box<dyn ImageAnalysisProvider + Send + Sync>,
        pipeline: ValidationPipeline,
    ) -> Self {
        Self {
            analyzer,
            pipeline,
            enhancer: None,
            summarizer: None,
            staging: Box::new(SqliteStagingStore::new()),
            final_store: Box::new(SqliteFinalStore::new()),
        }
    }

    pub fn with_enhancer(mut self, enhancer: Enhancer) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    pub fn with_summary(mut self, summarizer: SummaryProjector) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_stores(
        mut self,
        staging: Box<dyn StagingStore>,
        final_store: Box<dyn FinalStore>,
    ) -> Self {
        self.staging = staging;
        self.final_store = final_store;
        self
    }

    /// Build a processor with production clients.
    ///
    /// - Analysis: remote service when configured, else the Ollama vision model
    /// - Text LLM: Gemini when an API key is set, else the Ollama text model
    pub fn from_config(config: &AppConfig) -> Self {
        let analyzer: Box<dyn ImageAnalysisProvider + Send + Sync> =
            match &config.remote_analysis_url {
                Some(url) => {
                    tracing::info!(url = %url, "Image analysis via remote service");
                    Box::new(RemoteAnalysisClient::new(url, config.remote_timeout_secs))
                }
                None => {
                    tracing::info!(model = %config.vision_model, "Image analysis via Ollama");
                    let client =
                        OllamaClient::new(&config.ollama_base_url, config.ollama_timeout_secs);
                    Box::new(OllamaVisionAnalyzer::new(
                        Arc::new(client),
                        config.vision_model.clone(),
                    ))
                }
            };

        let (llm, model) = build_text_llm(config);
        tracing::info!(model = %model, max_attempts = config.max_attempts, "Structuring model");
        let structurer = LlmStructurer::new(llm, &model);
        let pipeline = ValidationPipeline::new(Arc::new(structurer), config.max_attempts);

        let mut processor = Self::new(analyzer, pipeline);
        if config.enable_enhancement {
            let (llm, model) = build_text_llm(config);
            processor = processor.with_enhancer(Enhancer::new(llm, &model));
        }
        if config.enable_summary {
            let (llm, model) = build_text_llm(config);
            processor = processor.with_summary(SummaryProjector::new(llm, &model));
        }
        processor
    }

    /// Register image paths in a dataset as pending rows.
    pub fn load_dataset(
        &self,
        conn: &Connection,
        dataset: &str,
        paths: &[String],
    ) -> Result<LoadSummary, ProcessingError> {
        let summary = self.final_store.register_pending(conn, dataset, paths)?;
        tracing::info!(
            dataset,
            loaded = summary.loaded,
            skipped = summary.skipped,
            "Dataset loaded"
        );
        Ok(summary)
    }

    /// Annotate one image and promote the result to the final store.
    ///
    /// Analysis and summary failures are errors. Structuring failures are
    /// not: the validation pipeline always yields a record. When the summary
    /// fails, the staging row is kept unprocessed and the final row is left
    /// as it was.
    pub fn annotate_image(
        &self,
        conn: &Connection,
        dataset: &str,
        path_url: &str,
        image_bytes: &[u8],
        instruction: Option<&str>,
        subject_id: Option<&str>,
    ) -> Result<AnnotationOutcome, ProcessingError> {
        let _span = tracing::info_span!(
            "annotate_image",
            dataset,
            path = path_url,
            image_size = image_bytes.len(),
        )
        .entered();

        // Step 1: Analyze
        let raw_text = self.analyzer.analyze(image_bytes, instruction)?;
        tracing::info!(raw_len = raw_text.len(), "Analysis received");
        tracing::trace!(raw = %raw_text, "Raw analysis");

        // Step 2: Validate
        let (record, provenance) = self.pipeline.run(&raw_text, subject_id, instruction);

        // Step 3: Enhance
        let record = match &self.enhancer {
            Some(enhancer) => enhancer.enhance(record),
            None => record,
        };

        // Step 4: Stage
        let staged = StagedRequest::new(
            dataset,
            path_url,
            subject_id.map(str::to_string),
            Some(content_hash(image_bytes)),
            provenance,
            record,
        );
        let request_id = self.staging.write(conn, &staged)?;
        tracing::info!(
            request_id = %request_id,
            status = %staged.provenance.status,
            attempt = staged.provenance.attempt_number,
            "Request staged"
        );

        // Step 5: Summarize
        let record = &staged.record;
        let (label, description) = match &self.summarizer {
            Some(summarizer) => {
                let summary = summarizer.project(record)?;
                (
                    truncate_label(&summary.primary_label),
                    bound_description(&summary.to_desc_string()),
                )
            }
            None => (truncate_label(record.primary_label()), serialize_record(record)),
        };

        // Step 6: Promote
        let final_subject = subject_id.unwrap_or(record.subject_id()).to_string();
        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
        self.final_store.write(
            &tx,
            &FinalWrite {
                dataset,
                path_url,
                subject_id: &final_subject,
                label: &label,
                description: &description,
                request_id: Some(&request_id),
            },
        )?;
        self.staging.mark_processed(&tx, &request_id)?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(
            request_id = %request_id,
            label = %label,
            description_len = description.chars().count(),
            "Annotation stored"
        );

        Ok(AnnotationOutcome {
            request_id,
            dataset: dataset.to_string(),
            path_url: path_url.to_string(),
            subject_id: final_subject,
            label,
            description,
            status: staged.provenance.status,
            attempt_number: staged.provenance.attempt_number,
            confidence_score: record.confidence_score(),
            enhanced: record.enhanced(),
        })
    }

    /// Read an image from disk and annotate it under its path.
    pub fn annotate_file(
        &self,
        conn: &Connection,
        dataset: &str,
        path: &Path,
        instruction: Option<&str>,
        subject_id: Option<&str>,
    ) -> Result<AnnotationOutcome, ProcessingError> {
        let path_url = path.to_string_lossy().to_string();
        let bytes = read_image(path, &path_url)?;
        self.annotate_image(conn, dataset, &path_url, &bytes, instruction, subject_id)
    }

    /// Annotate every image of a dataset, or the `only` subset, in order.
    /// Per-image failures are collected in the report.
    pub fn analyze_dataset(
        &self,
        conn: &Connection,
        dataset: &str,
        instruction: Option<&str>,
        only: Option<&[String]>,
    ) -> Result<DatasetReport, ProcessingError> {
        let rows = self.final_store.read(conn, dataset, only)?;
        if rows.is_empty() {
            return Err(ProcessingError::EmptyDataset(dataset.to_string()));
        }
        tracing::info!(dataset, images = rows.len(), "Analyzing dataset");

        let mut report = DatasetReport {
            dataset: dataset.to_string(),
            total: rows.len(),
            ..Default::default()
        };

        for row in rows {
            let subject = Some(row.subject_id.as_str()).filter(|s| *s != DEFAULT_SUBJECT_ID);
            let result = read_image(Path::new(&row.path_url), &row.path_url).and_then(|bytes| {
                self.annotate_image(conn, dataset, &row.path_url, &bytes, instruction, subject)
            });

            match result {
                Ok(outcome) => {
                    report.processed += 1;
                    if outcome.status == ValidationStatus::Fallback {
                        report.fallbacks += 1;
                    }
                    report.outcomes.push(outcome);
                }
                Err(ProcessingError::ImageNotFound(path)) => {
                    tracing::warn!(path = %path, "Image not found");
                    report.errors.push(format!("{path}: Not found"));
                }
                Err(e) => {
                    tracing::warn!(path = %row.path_url, error = %e, "Image failed");
                    report.errors.push(format!("{}: {e}", row.path_url));
                }
            }
        }

        tracing::info!(
            dataset,
            processed = report.processed,
            fallbacks = report.fallbacks,
            errors = report.errors.len(),
            "Dataset analysis complete"
        );
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Text LLM for structuring, summary, enhancement and chat: Gemini when an
/// API key is configured, else the Ollama text model.
pub fn build_text_llm(config: &AppConfig) -> (Box<dyn LlmClient + Send + Sync>, String) {
    match &config.google_api_key {
        Some(key) => (
            Box::new(GeminiClient::new(
                &config.gemini_base_url,
                key,
                config.gemini_timeout_secs,
            )),
            config.gemini_model.clone(),
        ),
        None => (
            Box::new(OllamaClient::new(
                &config.ollama_base_url,
                config.ollama_timeout_secs,
            )),
            config.structuring_model.clone(),
        ),
    }
}

fn read_image(path: &Path, path_url: &str) -> Result<Vec<u8>, ProcessingError> {
    if !path.exists() {
        return Err(ProcessingError::ImageNotFound(path_url.to_string()));
    }
    std::fs::read(path).map_err(|source| ProcessingError::ImageRead {
        path: path_url.to_string(),
        source,
    })
}

/// SHA-256 of the image bytes, base64-encoded.
fn content_hash(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
