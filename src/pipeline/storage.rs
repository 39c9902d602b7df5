//! Projection of records into fixed-width storage fields.
//!
//! Descriptions are capped at 4000 characters by the schema; we aim for 3900.
//! When a serialized record is too long, prose goes first: notes are cut to
//! 500 characters, then the enhancement report to 800, and only then is the
//! serialized text hard-truncated. The findings array is never edited.

use serde::{Deserialize, Serialize};

use crate::db::MAX_LABEL_CHARS;
use crate::models::{AnnotationRecord, Finding};

/// Target length for stored descriptions, below the 4000-character column.
pub const MAX_DESCRIPTION_LEN: usize = 3900;

/// Notes longer than this are cut when a description overflows.
pub const MAX_STORED_NOTES_LEN: usize = 500;

/// Enhancement reports longer than this are cut when a description overflows.
pub const MAX_STORED_REPORT_LEN: usize = 800;

pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// JSON layout of a record stored in the description column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDescription {
    pub findings: Vec<Finding>,
    pub confidence_score: f64,
    pub generated_by: String,
    pub additional_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<StoredEnhancement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEnhancement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<String>,
}

impl From<&AnnotationRecord> for StoredDescription {
    fn from(record: &AnnotationRecord) -> Self {
        let enhancement = record
            .enhancement()
            .map(|e| StoredEnhancement {
                report: e.report.clone(),
                urgency: e.urgency.clone(),
                significance: e.significance.clone(),
            })
            .filter(|e| *e != StoredEnhancement::default());

        Self {
            findings: record.findings().to_vec(),
            confidence_score: record.confidence_score(),
            generated_by: record.generated_by().to_string(),
            additional_notes: record.notes().map(str::to_string),
            enhancement,
        }
    }
}

/// Serialize a record for the description column, applying the truncation
/// cascade. The result is at most [`MAX_DESCRIPTION_LEN`] characters.
pub fn serialize_record(record: &AnnotationRecord) -> String {
    let mut stored = StoredDescription::from(record);
    let mut text = to_json(&stored);
    if char_len(&text) <= MAX_DESCRIPTION_LEN {
        return text;
    }
    tracing::warn!(
        length = char_len(&text),
        limit = MAX_DESCRIPTION_LEN,
        "Description too long, truncating"
    );

    if let Some(notes) = stored.additional_notes.as_mut() {
        if char_len(notes) > MAX_STORED_NOTES_LEN {
            *notes = truncate_with_marker(notes, MAX_STORED_NOTES_LEN);
            text = to_json(&stored);
            tracing::info!(length = char_len(&text), "Truncated notes");
        }
    }

    if char_len(&text) > MAX_DESCRIPTION_LEN {
        let report = stored.enhancement.as_mut().and_then(|e| e.report.as_mut());
        if let Some(report) = report {
            if char_len(report) > MAX_STORED_REPORT_LEN {
                *report = truncate_with_marker(report, MAX_STORED_REPORT_LEN);
                text = to_json(&stored);
                tracing::info!(length = char_len(&text), "Truncated enhancement report");
            }
        }
    }

    if char_len(&text) > MAX_DESCRIPTION_LEN {
        tracing::warn!(length = char_len(&text), "Hard truncation of description");
        text = hard_truncate(&text, MAX_DESCRIPTION_LEN);
    }
    text
}

/// Parse a stored description back. `None` for placeholder or summary text
/// and for hard-truncated JSON.
pub fn parse_stored_description(text: &str) -> Option<StoredDescription> {
    serde_json::from_str(text).ok()
}

/// Cut a label to the 20-character column width. No marker.
pub fn truncate_label(label: &str) -> String {
    hard_truncate(label.trim(), MAX_LABEL_CHARS)
}

/// Cut free text (summaries) to the description target length. No marker.
pub fn bound_description(text: &str) -> String {
    hard_truncate(text, MAX_DESCRIPTION_LEN)
}

fn to_json(stored: &StoredDescription) -> String {
    // Plain structs of strings and numbers always serialize.
    serde_json::to_string(stored).unwrap_or_default()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn hard_truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    format!("{}{TRUNCATION_MARKER}", hard_truncate(text, max_chars))
}
