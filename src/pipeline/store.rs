//! Persistence boundaries for annotation results.
//!
//! The staging tier keeps full provenance for every request. The final tier
//! keeps one clean row per image. Both are traits so the processor can be
//! driven against any store; the SQLite implementations delegate to the
//! repository layer.

use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::*;
use crate::pipeline::storage::truncate_label;

/// Provenance tier.
pub trait StagingStore: Send + Sync {
    /// Persist a request and return its id.
    fn write(&self, conn: &Connection, request: &StagedRequest) -> Result<Uuid, DatabaseError>;

    fn read(&self, conn: &Connection, id: &Uuid) -> Result<StagedRequest, DatabaseError>;

    fn list_unprocessed(
        &self,
        conn: &Connection,
        dataset: &str,
    ) -> Result<Vec<StagedRequest>, DatabaseError>;

    fn mark_processed(&self, conn: &Connection, id: &Uuid) -> Result<(), DatabaseError>;
}

/// Clean, queryable tier.
pub trait FinalStore: Send + Sync {
    fn write(&self, conn: &Connection, row: &FinalWrite<'_>) -> Result<(), DatabaseError>;

    fn read(
        &self,
        conn: &Connection,
        dataset: &str,
        only: Option<&[String]>,
    ) -> Result<Vec<AnnotationRow>, DatabaseError>;

    fn update(
        &self,
        conn: &Connection,
        dataset: &str,
        path_url: &str,
        label: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), DatabaseError>;

    fn delete(&self, conn: &Connection, dataset: &str, path_url: &str)
        -> Result<bool, DatabaseError>;

    fn register_pending(
        &self,
        conn: &Connection,
        dataset: &str,
        paths: &[String],
    ) -> Result<LoadSummary, DatabaseError>;
}

/// Arguments of a final-tier write. The description must already be bounded
/// to the storage width; labels are cut to width by the store.
#[derive(Debug, Clone, Copy)]
pub struct FinalWrite<'a> {
    pub dataset: &'a str,
    pub path_url: &'a str,
    pub subject_id: &'a str,
    pub label: &'a str,
    pub description: &'a str,
    pub request_id: Option<&'a Uuid>,
}

// ──────────────────────────────────────────────
// SQLite implementations
// ──────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteStagingStore;

impl SqliteStagingStore {
    pub fn new() -> Self {
        Self
    }
}

impl StagingStore for SqliteStagingStore {
    fn write(&self, conn: &Connection, request: &StagedRequest) -> Result<Uuid, DatabaseError> {
        db::insert_staged_request(conn, request)?;
        Ok(request.id)
    }

    fn read(&self, conn: &Connection, id: &Uuid) -> Result<StagedRequest, DatabaseError> {
        db::get_staged_request(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
            entity_type: "annotation_request".into(),
            id: id.to_string(),
        })
    }

    fn list_unprocessed(
        &self,
        conn: &Connection,
        dataset: &str,
    ) -> Result<Vec<StagedRequest>, DatabaseError> {
        db::list_unprocessed_requests(conn, dataset)
    }

    fn mark_processed(&self, conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
        db::mark_request_processed(conn, id, &chrono::Local::now().naive_local())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteFinalStore;

impl SqliteFinalStore {
    pub fn new() -> Self {
        Self
    }
}

impl FinalStore for SqliteFinalStore {
    fn write(&self, conn: &Connection, row: &FinalWrite<'_>) -> Result<(), DatabaseError> {
        db::upsert_annotation(
            conn,
            row.dataset,
            row.path_url,
            row.subject_id,
            &truncate_label(row.label),
            row.description,
            row.request_id,
        )
    }

    fn read(
        &self,
        conn: &Connection,
        dataset: &str,
        only: Option<&[String]>,
    ) -> Result<Vec<AnnotationRow>, DatabaseError> {
        db::list_annotations(conn, dataset, only)
    }

    fn update(
        &self,
        conn: &Connection,
        dataset: &str,
        path_url: &str,
        label: Option<&str>,
        description: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let label = label.map(truncate_label);
        db::update_annotation(conn, dataset, path_url, label.as_deref(), description)
    }

    fn delete(
        &self,
        conn: &Connection,
        dataset: &str,
        path_url: &str,
    ) -> Result<bool, DatabaseError> {
        db::delete_annotation(conn, dataset, path_url)
    }

    fn register_pending(
        &self,
        conn: &Connection,
        dataset: &str,
        paths: &[String],
    ) -> Result<LoadSummary, DatabaseError> {
        db::register_pending_images(conn, dataset, paths)
    }
}
