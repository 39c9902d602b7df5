use std::sync::Arc;

use super::fallback::extract_fallback;
use super::prompt::variant_for_attempt;
use super::types::{StructuringProvider, StructuringRequest};
use super::validation::{apply_defaults, validate_candidate, ValidationOutcome};
use crate::models::{AnnotationRecord, PipelineProvenance, ValidationStatus};

/// Default number of structuring attempts before falling back.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Upper bound on configured attempts.
pub const MAX_ATTEMPTS_LIMIT: u32 = 5;

/// Turns one raw analysis into exactly one validated record:
/// structure → validate → retry → keyword fallback.
///
/// Malformed model output never escapes as an error. Every provider failure
/// or rejected candidate consumes one attempt; once attempts run out the
/// keyword fallback produces the record.
pub struct ValidationPipeline {
    provider: Arc<dyn StructuringProvider + Send + Sync>,
    max_attempts: u32,
}

impl ValidationPipeline {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS_LIMIT`.
    pub fn new(provider: Arc<dyn StructuringProvider + Send + Sync>, max_attempts: u32) -> Self {
        Self {
            provider,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the attempt loop for one analysis.
    pub fn run(
        &self,
        raw_text: &str,
        subject_id: Option<&str>,
        user_instruction: Option<&str>,
    ) -> (AnnotationRecord, PipelineProvenance) {
        let _span = tracing::info_span!(
            "validation_pipeline",
            max_attempts = self.max_attempts,
            subject_id = subject_id.unwrap_or("-"),
            raw_len = raw_text.len(),
        )
        .entered();

        let mut attempt_errors = Vec::new();
        let mut last_candidate = None;

        for attempt in 1..=self.max_attempts {
            let request = StructuringRequest {
                raw_text,
                subject_id,
                user_instruction,
                attempt,
                variant: variant_for_attempt(attempt),
            };

            let candidate = match self.provider.structure(&request) {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        transport = e.is_transport(),
                        error = %e,
                        "Structuring call failed"
                    );
                    attempt_errors.push(format!("attempt {attempt}: {e}"));
                    last_candidate = None;
                    continue;
                }
            };

            let mut defaulted = candidate.clone();
            apply_defaults(&mut defaulted, subject_id);
            last_candidate = Some(candidate);

            match validate_candidate(&defaulted) {
                ValidationOutcome::Valid(record) => {
                    tracing::info!(
                        attempt,
                        findings = record.findings().len(),
                        confidence = record.confidence_score(),
                        "Structured record validated"
                    );
                    let provenance = PipelineProvenance {
                        raw_analysis_text: raw_text.to_string(),
                        structured_candidate: last_candidate,
                        attempt_number: attempt,
                        status: ValidationStatus::Success,
                        attempt_errors,
                    };
                    return (record, provenance);
                }
                ValidationOutcome::Invalid(reasons) => {
                    tracing::warn!(
                        attempt,
                        reason_count = reasons.len(),
                        "Structured candidate failed validation"
                    );
                    tracing::debug!(attempt, reasons = ?reasons, "Validation failures");
                    attempt_errors.push(format!(
                        "attempt {attempt}: validation failed: {}",
                        reasons.join("; ")
                    ));
                }
            }
        }

        let record = extract_fallback(raw_text, subject_id);
        tracing::warn!(
            attempts = self.max_attempts,
            findings = record.findings().len(),
            "Structuring exhausted, using keyword fallback"
        );
        let provenance = PipelineProvenance {
            raw_analysis_text: raw_text.to_string(),
            structured_candidate: last_candidate,
            attempt_number: self.max_attempts,
            status: ValidationStatus::Fallback,
            attempt_errors,
        };
        (record, provenance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FALLBACK_CONFIDENCE, GENERATED_BY_FALLBACK, GENERATED_BY_PRIMARY};
    use crate::pipeline::structuring::mock::{Scripted, ScriptedProvider};
    use crate::pipeline::structuring::prompt::InstructionVariant;
    use serde_json::json;

    fn pipeline(provider: &Arc<ScriptedProvider>, max_attempts: u32) -> ValidationPipeline {
        ValidationPipeline::new(provider.clone(), max_attempts)
    }

    fn valid_candidate() -> serde_json::Value {
        json!({
            "patient_id": "P-5",
            "findings": [{"label": "Pneumothorax", "location": "Right apex", "severity": "Moderate"}],
            "confidence_score": 0.87
        })
    }

    #[test]
    fn first_attempt_success() {
        let provider = Arc::new(ScriptedProvider::always(Scripted::Candidate(valid_candidate())));
        let (record, provenance) = pipeline(&provider, 2).run("raw", None, None);

        assert_eq!(provider.call_count(), 1);
        assert_eq!(provenance.status, ValidationStatus::Success);
        assert_eq!(provenance.attempt_number, 1);
        assert!(provenance.attempt_errors.is_empty());
        assert_eq!(provenance.raw_analysis_text, "raw");
        assert_eq!(provenance.structured_candidate, Some(valid_candidate()));
        assert_eq!(record.primary_label(), "Pneumothorax");
        assert_eq!(record.subject_id(), "P-5");
    }

    #[test]
    fn bounded_retries_on_invalid_output() {
        for max in 1..=MAX_ATTEMPTS_LIMIT {
            let provider = Arc::new(ScriptedProvider::always(Scripted::Candidate(json!({"oops": 1}))));
            let (record, provenance) = pipeline(&provider, max).run("no keywords", None, None);

            assert_eq!(provider.call_count(), max as usize);
            assert_eq!(provenance.attempt_number, max);
            assert_eq!(provenance.status, ValidationStatus::Fallback);
            assert_eq!(provenance.attempt_errors.len(), max as usize);
            assert_eq!(record.generated_by(), GENERATED_BY_FALLBACK);
        }
    }

    #[test]
    fn bounded_retries_on_provider_errors() {
        for outcome in [Scripted::ParseFailure, Scripted::TransportFailure] {
            let provider = Arc::new(ScriptedProvider::always(outcome));
            let (record, provenance) = pipeline(&provider, 3).run("clear lungs", None, None);

            assert_eq!(provider.call_count(), 3);
            assert_eq!(provenance.attempt_number, 3);
            assert_eq!(provenance.status, ValidationStatus::Fallback);
            assert!(provenance.structured_candidate.is_none());
            assert_eq!(record.confidence_score(), FALLBACK_CONFIDENCE);
        }
    }

    #[test]
    fn early_success_stops_retrying() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::ParseFailure,
            Scripted::Candidate(valid_candidate()),
            Scripted::Candidate(valid_candidate()),
        ]));
        let (_, provenance) = pipeline(&provider, 3).run("raw", None, None);

        assert_eq!(provenance.attempt_number, 2);
        assert_eq!(provenance.status, ValidationStatus::Success);
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provenance.attempt_errors.len(), 1);
    }

    #[test]
    fn attempt_index_selects_instruction_variant() {
        let provider = Arc::new(ScriptedProvider::always(Scripted::ParseFailure));
        pipeline(&provider, 3).run("raw", None, None);

        let seen = provider.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (1, InstructionVariant::Baseline),
                (2, InstructionVariant::Strict),
                (3, InstructionVariant::Strict),
            ]
        );
    }

    #[test]
    fn out_of_range_confidence_consumes_an_attempt() {
        for bad in [1.5, -0.1] {
            let mut candidate = valid_candidate();
            candidate["confidence_score"] = json!(bad);
            let provider = Arc::new(ScriptedProvider::new(vec![
                Scripted::Candidate(candidate),
                Scripted::Candidate(valid_candidate()),
            ]));
            let (record, provenance) = pipeline(&provider, 2).run("raw", None, None);

            assert_eq!(provenance.attempt_number, 2);
            assert_eq!(provenance.status, ValidationStatus::Success);
            assert!(provenance.attempt_errors[0].contains("outside [0.0, 1.0]"));
            assert_eq!(record.confidence_score(), 0.87);
        }
    }

    #[test]
    fn out_of_range_confidence_is_never_clamped() {
        let mut candidate = valid_candidate();
        candidate["confidence_score"] = json!(1.5);
        let provider = Arc::new(ScriptedProvider::always(Scripted::Candidate(candidate)));
        let (record, provenance) = pipeline(&provider, 2).run("raw", None, None);

        assert_eq!(provenance.status, ValidationStatus::Fallback);
        assert_eq!(record.confidence_score(), FALLBACK_CONFIDENCE);
    }

    #[test]
    fn fallback_keeps_keywords_when_structuring_always_fails() {
        let provider = Arc::new(ScriptedProvider::always(Scripted::TransportFailure));
        let raw = "Findings: Right-sided PNEUMOTHORAX. Mild Cardiomegaly is also present.";
        let (record, provenance) = pipeline(&provider, 2).run(raw, Some("P-9"), None);

        let labels: Vec<&str> = record.findings().iter().map(|f| f.label.as_str()).collect();
        assert!(labels.contains(&"Pneumothorax"));
        assert!(labels.contains(&"Cardiomegaly"));
        assert!(record.findings().iter().all(|f| f.severity == "Unknown"));
        assert_eq!(record.generated_by(), "Fallback");
        assert_eq!(record.confidence_score(), 0.3);
        assert_eq!(provenance.status, ValidationStatus::Fallback);
        assert_eq!(provenance.attempt_number, 2);
        assert_eq!(record.subject_id(), "P-9");
    }

    #[test]
    fn fallback_without_subject_uses_placeholder() {
        let provider = Arc::new(ScriptedProvider::always(Scripted::TransportFailure));
        let (record, _) = pipeline(&provider, 1).run("pneumothorax", None, None);
        assert_eq!(record.subject_id(), "FALLBACK-UNKNOWN");
    }

    #[test]
    fn many_findings_with_long_fields_succeed() {
        let mut findings: Vec<serde_json::Value> = (0..21)
            .map(|i| json!({"label": format!("Fracture {i}"), "location": "Ribs", "severity": "Mild"}))
            .collect();
        findings[3]["location"] = json!("r".repeat(201));
        let provider = Arc::new(ScriptedProvider::always(Scripted::Candidate(json!({
            "findings": findings,
            "confidence_score": 0.8
        }))));
        let (record, provenance) = pipeline(&provider, 2).run("raw", Some("P-2"), None);

        assert_eq!(provenance.status, ValidationStatus::Success);
        assert_eq!(provenance.attempt_number, 1);
        assert_eq!(record.generated_by(), GENERATED_BY_PRIMARY);
        assert_eq!(record.findings().len(), 21);
    }

    #[test]
    fn empty_findings_retried_then_normal_accepted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::Candidate(json!({"findings": [], "confidence_score": 0.9})),
            Scripted::Candidate(json!({
                "findings": [{"label": "Normal", "location": "Overall", "severity": "None"}],
                "confidence_score": 0.9
            })),
        ]));
        let (record, provenance) =
            pipeline(&provider, 2).run("Normal chest X-ray, no findings", None, None);

        assert_eq!(provenance.status, ValidationStatus::Success);
        assert_eq!(provenance.attempt_number, 2);
        assert!(provenance.attempt_errors[0].contains("at least one entry"));
        assert_eq!(record.findings().len(), 1);
        assert_eq!(record.findings()[0].label, "Normal");
        assert_eq!(record.subject_id(), "UNKNOWN");
    }

    #[test]
    fn caller_subject_used_as_default() {
        let provider = Arc::new(ScriptedProvider::always(Scripted::Candidate(json!({
            "findings": [{"label": "Nodule", "location": "Left upper lobe", "severity": "Mild"}],
            "confidence_score": 0.6
        }))));
        let (record, provenance) = pipeline(&provider, 2).run("raw", Some("P-77"), None);

        assert_eq!(record.subject_id(), "P-77");
        // The stored candidate is the provider's own mapping, before defaults.
        let candidate = provenance.structured_candidate.unwrap();
        assert!(candidate.get("patient_id").is_none());
    }

    #[test]
    fn max_attempts_is_clamped() {
        let provider = Arc::new(ScriptedProvider::always(Scripted::ParseFailure));
        assert_eq!(pipeline(&provider, 0).max_attempts(), 1);
        assert_eq!(pipeline(&provider, 99).max_attempts(), MAX_ATTEMPTS_LIMIT);
    }
}
