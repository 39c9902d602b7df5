use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::annotation::AnnotationRecord;
use super::provenance::PipelineProvenance;

/// Label given to images registered in a dataset but not yet annotated.
pub const PENDING_LABEL: &str = "pending";

/// Description given to images registered in a dataset but not yet annotated.
pub const PENDING_DESCRIPTION: &str = "Awaiting annotation";

/// One staging-tier row: full provenance of a single annotation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedRequest {
    pub id: Uuid,
    pub dataset: String,
    pub path_url: String,
    /// Subject the caller asked for, if any.
    pub subject_id: Option<String>,
    pub image_sha256: Option<String>,
    pub provenance: PipelineProvenance,
    pub record: AnnotationRecord,
    pub processed: bool,
    pub created_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

impl StagedRequest {
    pub fn new(
        dataset: impl Into<String>,
        path_url: impl Into<String>,
        subject_id: Option<String>,
        image_sha256: Option<String>,
        provenance: PipelineProvenance,
        record: AnnotationRecord,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dataset: dataset.into(),
            path_url: path_url.into(),
            subject_id,
            image_sha256,
            provenance,
            record,
            processed: false,
            created_at: chrono::Local::now().naive_local(),
            processed_at: None,
        }
    }
}

/// One final-tier row: the clean record for an image in a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub dataset: String,
    pub path_url: String,
    pub label: String,
    pub subject_id: String,
    pub description: String,
    pub request_id: Option<Uuid>,
    pub updated_at: NaiveDateTime,
}

impl AnnotationRow {
    pub fn is_pending(&self) -> bool {
        self.label == PENDING_LABEL && self.request_id.is_none()
    }
}

/// Outcome of registering image paths in a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}
