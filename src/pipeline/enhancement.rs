//! Optional third LLM pass: a narrative report plus an urgency assessment.
//!
//! Enhancement never fails an annotation. [`Enhancer::enhance`] returns the
//! record unchanged when any step errors.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{AnnotationRecord, Enhancement, Finding};
use crate::pipeline::structuring::{parse_json_object, GenerationOptions, LlmClient, StructuringError};

const ENHANCEMENT_TEMPERATURE: f32 = 0.3;
const ENHANCEMENT_MAX_OUTPUT_TOKENS: u32 = 2048;

pub const DEFAULT_URGENCY: &str = "routine";
pub const DEFAULT_SIGNIFICANCE: &str = "medium";

const REPORT_SYSTEM_PROMPT: &str =
    "You are an expert radiologist. Write concise, professional radiology reports using standard medical terminology.";

const URGENCY_SYSTEM_PROMPT: &str =
    "You are an expert radiologist. Assess clinical urgency. Return ONLY valid JSON.";

#[derive(Error, Debug)]
pub enum EnhancementError {
    #[error("Enhancement model call failed: {0}")]
    Llm(#[from] StructuringError),

    #[error("Enhancement model returned an empty report")]
    EmptyReport,
}

/// Urgency classification of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrgencyAssessment {
    pub urgency: String,
    pub significance: String,
    pub reasoning: String,
}

impl UrgencyAssessment {
    fn routine(reasoning: String) -> Self {
        Self {
            urgency: DEFAULT_URGENCY.to_string(),
            significance: DEFAULT_SIGNIFICANCE.to_string(),
            reasoning,
        }
    }
}

#[derive(Deserialize)]
struct UrgencyWire {
    urgency: Option<String>,
    significance: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct Enhancer {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
}

impl Enhancer {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    /// Attach report and urgency to the record. On failure the record comes
    /// back without enhancement.
    pub fn enhance(&self, record: AnnotationRecord) -> AnnotationRecord {
        let _span = tracing::info_span!("enhancement", findings = record.findings().len()).entered();

        let report = match self.generate_report(&record) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "Enhancement failed, continuing with base record");
                return record;
            }
        };
        let assessment = match self.assess_urgency(&record) {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(error = %e, "Enhancement failed, continuing with base record");
                return record;
            }
        };

        tracing::info!(
            urgency = %assessment.urgency,
            significance = %assessment.significance,
            report_len = report.len(),
            "Enhancement completed"
        );
        record.with_enhancement(Enhancement {
            report: Some(report),
            urgency: Some(assessment.urgency),
            significance: Some(assessment.significance),
        })
    }

    /// Free-text radiology report for the record's findings.
    pub fn generate_report(&self, record: &AnnotationRecord) -> Result<String, EnhancementError> {
        let prompt = format!(
            "Generate a professional radiology report.\n\n\
             FINDINGS:\n{}\n\n\
             ADDITIONAL NOTES:\n{}\n\n\
             Include:\n\
             1. CLINICAL INDICATION (inferred from findings)\n\
             2. TECHNIQUE\n\
             3. FINDINGS (detailed description)\n\
             4. IMPRESSION (summary and clinical significance)",
            findings_text(record.findings()),
            record.notes().unwrap_or("None"),
        );
        let options = GenerationOptions {
            system: Some(REPORT_SYSTEM_PROMPT),
            temperature: ENHANCEMENT_TEMPERATURE,
            max_output_tokens: Some(ENHANCEMENT_MAX_OUTPUT_TOKENS),
            json: false,
        };
        let report = self.llm.generate(&self.model_name, &prompt, &options)?;
        let report = report.trim();
        if report.is_empty() {
            return Err(EnhancementError::EmptyReport);
        }
        Ok(report.to_string())
    }

    /// Urgency and significance. An answer that cannot be parsed degrades
    /// to routine/medium; transport failures are returned.
    pub fn assess_urgency(&self, record: &AnnotationRecord) -> Result<UrgencyAssessment, EnhancementError> {
        let prompt = format!(
            "Assess the clinical urgency and significance.\n\n\
             FINDINGS:\n{}\n\n\
             Classify:\n\
             1. Urgency level: critical/urgent/routine\n\
             \x20  - critical: requires immediate intervention\n\
             \x20  - urgent: needs attention within 24 hours\n\
             \x20  - routine: can be addressed in normal workflow\n\
             2. Clinical significance: high/medium/low\n\
             3. Brief reasoning (1-2 sentences)\n\n\
             Return JSON: {{\"urgency\": \"<level>\", \"significance\": \"<level>\", \"reasoning\": \"<explanation>\"}}",
            findings_text(record.findings()),
        );
        let options = GenerationOptions {
            system: Some(URGENCY_SYSTEM_PROMPT),
            temperature: ENHANCEMENT_TEMPERATURE,
            max_output_tokens: Some(ENHANCEMENT_MAX_OUTPUT_TOKENS),
            json: true,
        };

        let response = match self.llm.generate(&self.model_name, &prompt, &options) {
            Ok(response) => response,
            Err(e) if e.is_transport() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "Urgency answer unusable, defaulting to routine");
                return Ok(UrgencyAssessment::routine(format!("Error in assessment: {e}")));
            }
        };

        Ok(parse_urgency(&response))
    }
}

fn parse_urgency(response: &str) -> UrgencyAssessment {
    let wire = parse_json_object(response)
        .map_err(|e| e.to_string())
        .and_then(|value| serde_json::from_value::<UrgencyWire>(value).map_err(|e| e.to_string()));

    match wire {
        Ok(wire) => UrgencyAssessment {
            urgency: normalized_or(wire.urgency, DEFAULT_URGENCY),
            significance: normalized_or(wire.significance, DEFAULT_SIGNIFICANCE),
            reasoning: wire.reasoning.unwrap_or_default(),
        },
        Err(reason) => {
            tracing::warn!(error = %reason, "Urgency answer unparsable, defaulting to routine");
            UrgencyAssessment::routine(format!("Error in assessment: {reason}"))
        }
    }
}

fn normalized_or(value: Option<String>, default: &str) -> String {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn findings_text(findings: &[Finding]) -> String {
    findings
        .iter()
        .map(|f| format!("- {} in {} (severity: {})", f.label, f.location, f.severity))
        .collect::<Vec<_>>()
        .join("\n")
}
