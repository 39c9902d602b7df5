use crate::models::{
    AnnotationRecord, MAX_CONFIDENCE_NOTE_LEN, MAX_KEY_FINDINGS, MAX_RECOMMENDATIONS_LEN,
    MAX_SUMMARY_LEN,
};

pub const SUMMARY_SYSTEM_PROMPT: &str =
    "You are a radiologist creating a concise clinical summary for a medical image annotation.";

/// Characters of an enhancement report passed as summary context.
const REPORT_CONTEXT_LEN: usize = 1000;

/// Build the summary prompt from a validated record.
pub fn build_summary_prompt(record: &AnnotationRecord) -> String {
    let findings = record
        .findings()
        .iter()
        .map(|f| format!("- {} | {} | {}", f.label, f.location, f.severity))
        .collect::<Vec<_>>()
        .join("\n");

    let mut context = format!(
        "CONTEXT:\nFindings (label | location | severity):\n{findings}\n\
         Confidence Score: {:.2}\nAdditional Notes: {}\n",
        record.confidence_score(),
        record.notes().unwrap_or("None"),
    );

    if let Some(enhancement) = record.enhancement() {
        if let Some(urgency) = &enhancement.urgency {
            context.push_str(&format!("Urgency: {urgency}\n"));
        }
        if let Some(significance) = &enhancement.significance {
            context.push_str(&format!("Clinical Significance: {significance}\n"));
        }
        if let Some(report) = &enhancement.report {
            let excerpt: String = report.chars().take(REPORT_CONTEXT_LEN).collect();
            context.push_str(&format!("\nProfessional Report:\n{excerpt}\n"));
        }
    }

    format!(
        r#"{context}
TASK:
Write a concise clinical summary as one JSON object:
{{
  "primary_diagnosis": "single most important finding, e.g. 'Right Lower Lobe Pneumonia' or 'Normal Study'",
  "summary": "2-4 sentences, at most {MAX_SUMMARY_LEN} characters",
  "key_findings": ["at most {MAX_KEY_FINDINGS} specific observations with location and severity"],
  "recommendations": "next steps in at most {MAX_RECOMMENDATIONS_LEN} characters, or null for a normal study",
  "confidence_note": "limitations in at most {MAX_CONFIDENCE_NOTE_LEN} characters, only if confidence < 0.8, else null"
}}
Required: primary_diagnosis, summary, key_findings.

Return ONLY valid JSON. No markdown, no explanations."#
    )
}
