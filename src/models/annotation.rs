use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Subject placeholder applied when neither the caller nor the model supplies one.
pub const DEFAULT_SUBJECT_ID: &str = "UNKNOWN";

/// Subject placeholder used by the fallback path.
pub const FALLBACK_SUBJECT_ID: &str = "FALLBACK-UNKNOWN";

/// Provenance tag for records produced by the structuring model.
pub const GENERATED_BY_PRIMARY: &str = "MedGemma/Gemini";

/// Provenance tag for records produced by the keyword fallback.
pub const GENERATED_BY_FALLBACK: &str = "Fallback";

/// Fixed low-trust confidence assigned to every fallback record.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Conventional severity values. Severity is open vocabulary; these are the
/// values the prompts ask for and the fallback path emits.
pub mod severity {
    pub const SEVERE: &str = "Severe";
    pub const MODERATE: &str = "Moderate";
    pub const MILD: &str = "Mild";
    pub const NONE: &str = "None";
    pub const UNKNOWN: &str = "Unknown";
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("findings must contain at least one entry")]
    EmptyFindings,

    #[error("confidence_score {0} is outside [0.0, 1.0]")]
    ConfidenceOutOfRange(f64),

    #[error("finding {index}: {field} must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("subject_id must not be empty")]
    EmptySubject,
}

/// One discrete observation on an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub label: String,
    pub location: String,
    pub severity: String,
}

impl Finding {
    pub fn new(
        label: impl Into<String>,
        location: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            location: location.into(),
            severity: severity.into(),
        }
    }

    /// The sentinel finding for a study with no abnormality.
    pub fn normal() -> Self {
        Self::new("Normal", "Overall", severity::NONE)
    }
}

/// Output of the optional enhancement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enhancement {
    pub report: Option<String>,
    pub urgency: Option<String>,
    pub significance: Option<String>,
}

/// A validated annotation for one image.
///
/// Construction goes through [`AnnotationRecord::new`] (or deserialization,
/// which routes through the same checks), so a value of this type always has
/// at least one finding, non-empty finding fields and a confidence inside
/// `[0.0, 1.0]`. Enhancement data lives in an `Option` so it can only be
/// present on enhanced records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordWire")]
pub struct AnnotationRecord {
    subject_id: String,
    findings: Vec<Finding>,
    confidence_score: f64,
    generated_by: String,
    notes: Option<String>,
    enhancement: Option<Enhancement>,
}

impl AnnotationRecord {
    pub fn new(
        subject_id: impl Into<String>,
        findings: Vec<Finding>,
        confidence_score: f64,
        generated_by: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Self, RecordError> {
        let subject_id = subject_id.into();
        if subject_id.trim().is_empty() {
            return Err(RecordError::EmptySubject);
        }
        if findings.is_empty() {
            return Err(RecordError::EmptyFindings);
        }
        for (index, finding) in findings.iter().enumerate() {
            if finding.label.trim().is_empty() {
                return Err(RecordError::EmptyField { index, field: "label" });
            }
            if finding.location.trim().is_empty() {
                return Err(RecordError::EmptyField { index, field: "location" });
            }
        }
        // NaN fails the range check too.
        if !(0.0..=1.0).contains(&confidence_score) {
            return Err(RecordError::ConfidenceOutOfRange(confidence_score));
        }

        Ok(Self {
            subject_id,
            findings,
            confidence_score,
            generated_by: generated_by.into(),
            notes,
            enhancement: None,
        })
    }

    /// Degraded record from the keyword fallback. Always valid: an empty
    /// finding list is replaced by the "Analysis Incomplete" sentinel and the
    /// confidence is the fixed fallback value. A missing or blank subject
    /// becomes [`FALLBACK_SUBJECT_ID`].
    pub fn fallback(subject_id: Option<&str>, findings: Vec<Finding>, notes: String) -> Self {
        let mut findings: Vec<Finding> = findings
            .into_iter()
            .filter(|f| !f.label.trim().is_empty() && !f.location.trim().is_empty())
            .collect();
        if findings.is_empty() {
            findings.push(Finding::new("Analysis Incomplete", "Overall", severity::UNKNOWN));
        }
        let subject_id = subject_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_SUBJECT_ID);
        Self {
            subject_id: subject_id.to_string(),
            findings,
            confidence_score: FALLBACK_CONFIDENCE,
            generated_by: GENERATED_BY_FALLBACK.to_string(),
            notes: Some(notes),
            enhancement: None,
        }
    }

    pub fn with_enhancement(mut self, enhancement: Enhancement) -> Self {
        self.enhancement = Some(enhancement);
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn generated_by(&self) -> &str {
        &self.generated_by
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn enhanced(&self) -> bool {
        self.enhancement.is_some()
    }

    pub fn enhancement(&self) -> Option<&Enhancement> {
        self.enhancement.as_ref()
    }

    /// Label of the first finding; the record's headline for storage.
    pub fn primary_label(&self) -> &str {
        self.findings
            .first()
            .map(|f| f.label.as_str())
            .unwrap_or("No findings")
    }

    pub fn is_fallback(&self) -> bool {
        self.generated_by == GENERATED_BY_FALLBACK
    }
}

#[derive(Deserialize)]
struct RecordWire {
    subject_id: String,
    findings: Vec<Finding>,
    confidence_score: f64,
    generated_by: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    enhancement: Option<Enhancement>,
}

impl TryFrom<RecordWire> for AnnotationRecord {
    type Error = RecordError;

    fn try_from(wire: RecordWire) -> Result<Self, Self::Error> {
        let record = AnnotationRecord::new(
            wire.subject_id,
            wire.findings,
            wire.confidence_score,
            wire.generated_by,
            wire.notes,
        )?;
        Ok(match wire.enhancement {
            Some(e) => record.with_enhancement(e),
            None => record,
        })
    }
}
