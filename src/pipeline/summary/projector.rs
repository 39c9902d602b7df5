use serde::Deserialize;

use super::prompt::{build_summary_prompt, SUMMARY_SYSTEM_PROMPT};
use super::SummaryError;
use crate::models::{
    AnnotationRecord, ClinicalSummary, MAX_CONFIDENCE_NOTE_LEN, MAX_KEY_FINDINGS,
    MAX_KEY_FINDING_LEN, MAX_RECOMMENDATIONS_LEN, MAX_SUMMARY_LEN,
};
use crate::pipeline::structuring::{parse_json_object, GenerationOptions, LlmClient};

const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Reduces a validated record to a bounded clinical summary via an LLM.
pub struct SummaryProjector {
    llm: Box<dyn LlmClient + Send + Sync>,
    model_name: String,
}

/// Summary as the model returns it, before bounds are checked.
#[derive(Debug, Deserialize)]
struct RawSummary {
    #[serde(default)]
    primary_diagnosis: Option<String>,
    summary: Option<String>,
    key_findings: Option<Vec<String>>,
    #[serde(default)]
    recommendations: Option<String>,
    #[serde(default)]
    confidence_note: Option<String>,
}

impl SummaryProjector {
    pub fn new(llm: Box<dyn LlmClient + Send + Sync>, model_name: &str) -> Self {
        Self {
            llm,
            model_name: model_name.to_string(),
        }
    }

    /// Summarize one record. Model and validation failures are returned as
    /// errors; nothing is substituted.
    pub fn project(&self, record: &AnnotationRecord) -> Result<ClinicalSummary, SummaryError> {
        let _span = tracing::info_span!(
            "summary_projection",
            findings = record.findings().len(),
            enhanced = record.enhanced(),
        )
        .entered();

        let prompt = build_summary_prompt(record);
        let options = GenerationOptions {
            system: Some(SUMMARY_SYSTEM_PROMPT),
            temperature: SUMMARY_TEMPERATURE,
            max_output_tokens: Some(SUMMARY_MAX_OUTPUT_TOKENS),
            json: true,
        };
        let response = self.llm.generate(&self.model_name, &prompt, &options)?;
        let value = parse_json_object(&response)?;
        let raw: RawSummary = serde_json::from_value(value)
            .map_err(|e| SummaryError::Invalid(vec![e.to_string()]))?;

        let summary = validate_summary(raw, record)?;
        tracing::info!(
            primary_label = %summary.primary_label,
            key_findings = summary.key_findings.len(),
            "Clinical summary generated"
        );
        Ok(summary)
    }
}

fn validate_summary(raw: RawSummary, record: &AnnotationRecord) -> Result<ClinicalSummary, SummaryError> {
    let mut reasons = Vec::new();

    let primary_label = raw
        .primary_diagnosis
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| record.primary_label().to_string());

    let summary_text = match raw.summary.map(|s| s.trim().to_string()) {
        Some(text) if text.is_empty() => {
            reasons.push("summary must not be empty".to_string());
            String::new()
        }
        Some(text) => {
            check_len("summary", &text, MAX_SUMMARY_LEN, &mut reasons);
            text
        }
        None => {
            reasons.push("summary is missing".to_string());
            String::new()
        }
    };

    let key_findings: Vec<String> = match raw.key_findings {
        Some(items) => items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => {
            reasons.push("key_findings is missing".to_string());
            Vec::new()
        }
    };
    if key_findings.len() > MAX_KEY_FINDINGS {
        reasons.push(format!(
            "key_findings has {} items (max {MAX_KEY_FINDINGS})",
            key_findings.len()
        ));
    }
    for (i, finding) in key_findings.iter().enumerate() {
        check_len(&format!("key_findings[{i}]"), finding, MAX_KEY_FINDING_LEN, &mut reasons);
    }

    let recommendations = optional_text(raw.recommendations);
    if let Some(text) = &recommendations {
        check_len("recommendations", text, MAX_RECOMMENDATIONS_LEN, &mut reasons);
    }
    let confidence_note = optional_text(raw.confidence_note);
    if let Some(text) = &confidence_note {
        check_len("confidence_note", text, MAX_CONFIDENCE_NOTE_LEN, &mut reasons);
    }

    if !reasons.is_empty() {
        tracing::warn!(reason_count = reasons.len(), "Summary rejected");
        return Err(SummaryError::Invalid(reasons));
    }

    Ok(ClinicalSummary {
        primary_label,
        summary_text,
        key_findings,
        recommendations,
        confidence_note,
    })
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn check_len(field: &str, text: &str, max: usize, reasons: &mut Vec<String>) {
    let len = text.chars().count();
    if len > max {
        reasons.push(format!("{field} has {len} characters (max {max})"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{severity, Finding, GENERATED_BY_PRIMARY};
    use crate::pipeline::structuring::mock::{MockLlmClient, RecordingLlmClient, UnreachableLlmClient};
    use serde_json::json;

    fn record() -> AnnotationRecord {
        AnnotationRecord::new(
            "P-1",
            vec![Finding::new("Pneumothorax", "Right apex", severity::MODERATE)],
            0.9,
            GENERATED_BY_PRIMARY,
            None,
        )
        .unwrap()
    }

    fn projector(response: serde_json::Value) -> SummaryProjector {
        SummaryProjector::new(Box::new(MockLlmClient::new(&response.to_string())), "gemini")
    }

    #[test]
    fn valid_summary_projected() {
        let summary = projector(json!({
            "primary_diagnosis": "Right Pneumothorax",
            "summary": "Moderate right pneumothorax.",
            "key_findings": ["30% collapse", "No shift"],
            "recommendations": "Chest tube may be required.",
            "confidence_note": null
        }))
        .project(&record())
        .unwrap();

        assert_eq!(summary.primary_label, "Right Pneumothorax");
        assert_eq!(summary.key_findings.len(), 2);
        assert!(summary.confidence_note.is_none());
    }

    #[test]
    fn primary_label_defaults_to_first_finding() {
        let summary = projector(json!({
            "primary_diagnosis": "  ",
            "summary": "Moderate right pneumothorax.",
            "key_findings": []
        }))
        .project(&record())
        .unwrap();
        assert_eq!(summary.primary_label, "Pneumothorax");
    }

    #[test]
    fn too_many_key_findings_is_hard_failure() {
        let err = projector(json!({
            "primary_diagnosis": "X",
            "summary": "S",
            "key_findings": ["a", "b", "c", "d", "e", "f"]
        }))
        .project(&record())
        .unwrap_err();
        assert!(matches!(err, SummaryError::Invalid(_)));
    }

    #[test]
    fn overlong_summary_is_hard_failure() {
        let err = projector(json!({
            "primary_diagnosis": "X",
            "summary": "s".repeat(MAX_SUMMARY_LEN + 1),
            "key_findings": []
        }))
        .project(&record())
        .unwrap_err();
        match err {
            SummaryError::Invalid(reasons) => assert!(reasons[0].starts_with("summary has")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_required_fields_reported() {
        let err = projector(json!({"primary_diagnosis": "X"})).project(&record()).unwrap_err();
        match err {
            SummaryError::Invalid(reasons) => {
                assert!(reasons.contains(&"summary is missing".to_string()));
                assert!(reasons.contains(&"key_findings is missing".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unparsable_output_propagates() {
        let projector =
            SummaryProjector::new(Box::new(MockLlmClient::new("Sorry, no JSON today.")), "gemini");
        assert!(matches!(projector.project(&record()), Err(SummaryError::Llm(_))));
    }

    #[test]
    fn transport_failure_propagates() {
        let projector = SummaryProjector::new(Box::new(UnreachableLlmClient::new()), "gemini");
        assert!(matches!(projector.project(&record()), Err(SummaryError::Llm(_))));
    }

    #[test]
    fn requests_json_mode_at_low_temperature() {
        let llm = RecordingLlmClient::new(
            r#"{"primary_diagnosis": "X", "summary": "S", "key_findings": []}"#,
        );
        let calls = llm.prompts();
        SummaryProjector::new(Box::new(llm), "gemini").project(&record()).unwrap();

        let calls = calls.lock().unwrap();
        assert!(calls[0].json);
        assert_eq!(calls[0].temperature, SUMMARY_TEMPERATURE);
        assert_eq!(calls[0].system.as_deref(), Some(SUMMARY_SYSTEM_PROMPT));
    }
}
