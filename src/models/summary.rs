use serde::{Deserialize, Serialize};

/// Maximum characters for the summary paragraph.
pub const MAX_SUMMARY_LEN: usize = 3500;

/// Maximum number of key findings.
pub const MAX_KEY_FINDINGS: usize = 5;

/// Maximum characters per key finding.
pub const MAX_KEY_FINDING_LEN: usize = 200;

/// Maximum characters for recommendations.
pub const MAX_RECOMMENDATIONS_LEN: usize = 500;

/// Maximum characters for the confidence note.
pub const MAX_CONFIDENCE_NOTE_LEN: usize = 200;

/// Short clinical summary of a validated record, as stored in the final
/// annotation table's description field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicalSummary {
    pub primary_label: String,
    pub summary_text: String,
    pub key_findings: Vec<String>,
    pub recommendations: Option<String>,
    pub confidence_note: Option<String>,
}

impl ClinicalSummary {
    /// Render as the plain-text block stored in the description column.
    pub fn to_desc_string(&self) -> String {
        let mut parts = vec![
            format!("PRIMARY DIAGNOSIS: {}", self.primary_label),
            String::new(),
            "SUMMARY:".to_string(),
            self.summary_text.clone(),
            String::new(),
        ];

        if !self.key_findings.is_empty() {
            parts.push("KEY FINDINGS:".to_string());
            parts.extend(self.key_findings.iter().map(|f| format!("- {f}")));
            parts.push(String::new());
        }

        if let Some(rec) = &self.recommendations {
            parts.push("RECOMMENDATIONS:".to_string());
            parts.push(rec.clone());
            parts.push(String::new());
        }

        if let Some(note) = &self.confidence_note {
            parts.push("CONFIDENCE NOTE:".to_string());
            parts.push(note.clone());
        }

        parts.join("\n")
    }
}
