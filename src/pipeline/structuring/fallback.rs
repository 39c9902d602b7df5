//! Keyword fallback used when structured extraction keeps failing.
//!
//! Pure and deterministic: no model calls, and the result always satisfies
//! the record invariants.

use crate::models::{severity, AnnotationRecord, Finding};

/// Maximum characters of raw analysis kept in a fallback record's notes.
pub const FALLBACK_NOTES_PREFIX_LEN: usize = 500;

const FALLBACK_NOTES_HEADER: &str = "Fallback parser used. Original analysis: ";

/// Keyword table scanned in order: `(keyword, label, location)`.
pub const FALLBACK_KEYWORDS: &[(&str, &str, &str)] = &[
    ("pneumothorax", "Pneumothorax", "Lungs"),
    ("fracture", "Fracture", "Bones"),
    ("consolidation", "Consolidation", "Lungs"),
    ("cardiomegaly", "Cardiomegaly", "Heart"),
    ("effusion", "Pleural Effusion", "Pleural space"),
    ("nodule", "Nodule", "Lungs"),
    ("opacity", "Opacity", "Lungs"),
    ("normal", "Normal", "Overall"),
    ("clear", "Clear", "Lungs"),
];

/// Sentinel finding for text with no recognisable keyword.
pub fn incomplete_finding() -> Finding {
    Finding::new("Analysis Incomplete", "Overall", severity::UNKNOWN)
}

/// Map raw analysis text to a minimal valid record.
pub fn fallback_findings(raw_text: &str) -> Vec<Finding> {
    let lower = raw_text.to_lowercase();
    let findings: Vec<Finding> = FALLBACK_KEYWORDS
        .iter()
        .filter(|(keyword, _, _)| lower.contains(keyword))
        .map(|(_, label, location)| Finding::new(*label, *location, severity::UNKNOWN))
        .collect();

    if findings.is_empty() {
        vec![incomplete_finding()]
    } else {
        findings
    }
}

/// Build the degraded record for `raw_text`, keeping the caller's subject.
pub fn extract_fallback(raw_text: &str, subject_id: Option<&str>) -> AnnotationRecord {
    let prefix: String = raw_text.chars().take(FALLBACK_NOTES_PREFIX_LEN).collect();
    let notes = format!("{FALLBACK_NOTES_HEADER}{prefix}");
    AnnotationRecord::fallback(subject_id, fallback_findings(raw_text), notes)
}
