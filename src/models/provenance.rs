use serde::{Deserialize, Serialize};

use super::enums::ValidationStatus;

/// Traceability bundle for one validation-pipeline run.
///
/// Created fresh per annotation request and written once to the staging
/// store. Only the staging row's `processed` flag changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProvenance {
    /// Unmodified image-analysis output.
    pub raw_analysis_text: String,
    /// Mapping returned by the structuring provider on the last attempt made,
    /// before validation. `None` when that provider call itself failed.
    pub structured_candidate: Option<serde_json::Value>,
    /// 1-based number of structuring attempts made.
    pub attempt_number: u32,
    pub status: ValidationStatus,
    /// One entry per failed attempt, in order.
    #[serde(default)]
    pub attempt_errors: Vec<String>,
}

impl PipelineProvenance {
    pub fn is_fallback(&self) -> bool {
        self.status == ValidationStatus::Fallback
    }
}
