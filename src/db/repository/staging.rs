use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const STAGED_COLUMNS: &str = "id, dataset, path_url, subject_id, image_sha256, raw_analysis,
    structured_candidate, attempt_number, validation_status, attempt_errors, record_json,
    processed, created_at, processed_at";

struct StagedRow {
    id: String,
    dataset: String,
    path_url: String,
    subject_id: Option<String>,
    image_sha256: Option<String>,
    raw_analysis: String,
    structured_candidate: Option<String>,
    attempt_number: u32,
    validation_status: String,
    attempt_errors: String,
    record_json: String,
    processed: bool,
    created_at: String,
    processed_at: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StagedRow> {
    Ok(StagedRow {
        id: row.get(0)?,
        dataset: row.get(1)?,
        path_url: row.get(2)?,
        subject_id: row.get(3)?,
        image_sha256: row.get(4)?,
        raw_analysis: row.get(5)?,
        structured_candidate: row.get(6)?,
        attempt_number: row.get(7)?,
        validation_status: row.get(8)?,
        attempt_errors: row.get(9)?,
        record_json: row.get(10)?,
        processed: row.get::<_, i32>(11)? != 0,
        created_at: row.get(12)?,
        processed_at: row.get(13)?,
    })
}

fn staged_from_row(row: StagedRow) -> Result<StagedRequest, DatabaseError> {
    let structured_candidate = row
        .structured_candidate
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(StagedRequest {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        dataset: row.dataset,
        path_url: row.path_url,
        subject_id: row.subject_id,
        image_sha256: row.image_sha256,
        provenance: PipelineProvenance {
            raw_analysis_text: row.raw_analysis,
            structured_candidate,
            attempt_number: row.attempt_number,
            status: ValidationStatus::from_str(&row.validation_status)?,
            attempt_errors: serde_json::from_str(&row.attempt_errors)?,
        },
        record: serde_json::from_str(&row.record_json)?,
        processed: row.processed,
        created_at: parse_timestamp(&row.created_at),
        processed_at: row.processed_at.as_deref().map(parse_timestamp),
    })
}

/// Write one provenance row. Rows are immutable after this point apart from
/// the processed flag.
pub fn insert_staged_request(
    conn: &Connection,
    request: &StagedRequest,
) -> Result<(), DatabaseError> {
    let candidate_json = request
        .provenance
        .structured_candidate
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let errors_json = serde_json::to_string(&request.provenance.attempt_errors)?;
    let record_json = serde_json::to_string(&request.record)?;

    conn.execute(
        "INSERT INTO annotation_request
         (id, dataset, path_url, subject_id, image_sha256, raw_analysis,
          structured_candidate, attempt_number, validation_status, attempt_errors,
          record_json, confidence_score, enhanced, processed, created_at, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            request.id.to_string(),
            request.dataset,
            request.path_url,
            request.subject_id,
            request.image_sha256,
            request.provenance.raw_analysis_text,
            candidate_json,
            request.provenance.attempt_number,
            request.provenance.status.as_str(),
            errors_json,
            record_json,
            request.record.confidence_score(),
            request.record.enhanced() as i32,
            request.processed as i32,
            format_timestamp(&request.created_at),
            request.processed_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

pub fn get_staged_request(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<StagedRequest>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("SELECT {STAGED_COLUMNS} FROM annotation_request WHERE id = ?1"),
            params![id.to_string()],
            read_row,
        )
        .optional()?;
    row.map(staged_from_row).transpose()
}

/// Unprocessed rows of a dataset, oldest first.
pub fn list_unprocessed_requests(
    conn: &Connection,
    dataset: &str,
) -> Result<Vec<StagedRequest>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGED_COLUMNS} FROM annotation_request
         WHERE dataset = ?1 AND processed = 0
         ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map(params![dataset], read_row)?;

    let mut requests = Vec::new();
    for row in rows {
        requests.push(staged_from_row(row?)?);
    }
    Ok(requests)
}

/// Every request made for one image, newest first.
pub fn list_requests_for_path(
    conn: &Connection,
    dataset: &str,
    path_url: &str,
) -> Result<Vec<StagedRequest>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGED_COLUMNS} FROM annotation_request
         WHERE dataset = ?1 AND path_url = ?2
         ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![dataset, path_url], read_row)?;

    let mut requests = Vec::new();
    for row in rows {
        requests.push(staged_from_row(row?)?);
    }
    Ok(requests)
}

pub fn mark_request_processed(
    conn: &Connection,
    id: &Uuid,
    at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE annotation_request SET processed = 1, processed_at = ?1
         WHERE id = ?2 AND processed = 0",
        params![format_timestamp(at), id.to_string()],
    )?;
    if changed == 0 {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM annotation_request WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DatabaseError::NotFound {
                entity_type: "annotation_request".into(),
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Counts of `(total, processed, fallback)` requests in a dataset.
pub fn staging_stats(
    conn: &Connection,
    dataset: &str,
) -> Result<(u32, u32, u32), DatabaseError> {
    let stats = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(processed), 0),
                COALESCE(SUM(validation_status = 'fallback'), 0)
         FROM annotation_request WHERE dataset = ?1",
        params![dataset],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn provenance(status: ValidationStatus) -> PipelineProvenance {
        PipelineProvenance {
            raw_analysis_text: "Small right apical pneumothorax.".into(),
            structured_candidate: Some(serde_json::json!({"findings": []})),
            attempt_number: 2,
            status,
            attempt_errors: vec!["attempt 1: findings must contain at least one entry".into()],
        }
    }

    fn record() -> AnnotationRecord {
        AnnotationRecord::new(
            "P-1",
            vec![Finding::new("Pneumothorax", "Right apex", severity::MILD)],
            0.8,
            GENERATED_BY_PRIMARY,
            None,
        )
        .unwrap()
    }

    fn staged(dataset: &str, path: &str) -> StagedRequest {
        StagedRequest::new(
            dataset,
            path,
            Some("P-1".into()),
            Some("ab12".into()),
            provenance(ValidationStatus::Success),
            record(),
        )
    }

    #[test]
    fn insert_and_read_back() {
        let conn = open_memory_database().unwrap();
        let request = staged("chest", "/img/1.png");
        insert_staged_request(&conn, &request).unwrap();

        let loaded = get_staged_request(&conn, &request.id).unwrap().unwrap();
        assert_eq!(loaded.provenance, request.provenance);
        assert_eq!(loaded.record, request.record);
        assert_eq!(loaded.image_sha256.as_deref(), Some("ab12"));
        assert!(!loaded.processed);
    }

    #[test]
    fn missing_request_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_staged_request(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn null_candidate_round_trips() {
        let conn = open_memory_database().unwrap();
        let mut request = staged("chest", "/img/1.png");
        request.provenance.structured_candidate = None;
        insert_staged_request(&conn, &request).unwrap();

        let loaded = get_staged_request(&conn, &request.id).unwrap().unwrap();
        assert!(loaded.provenance.structured_candidate.is_none());
    }

    #[test]
    fn unprocessed_listing_is_scoped_and_drops_processed() {
        let conn = open_memory_database().unwrap();
        let a = staged("chest", "/img/a.png");
        let b = staged("chest", "/img/b.png");
        let other = staged("knee", "/img/k.png");
        for r in [&a, &b, &other] {
            insert_staged_request(&conn, r).unwrap();
        }

        mark_request_processed(&conn, &a.id, &chrono::Local::now().naive_local()).unwrap();

        let pending = list_unprocessed_requests(&conn, "chest").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let processed = get_staged_request(&conn, &a.id).unwrap().unwrap();
        assert!(processed.processed);
        assert!(processed.processed_at.is_some());
    }

    #[test]
    fn mark_processed_twice_is_harmless() {
        let conn = open_memory_database().unwrap();
        let request = staged("chest", "/img/a.png");
        insert_staged_request(&conn, &request).unwrap();
        let now = chrono::Local::now().naive_local();
        mark_request_processed(&conn, &request.id, &now).unwrap();
        mark_request_processed(&conn, &request.id, &now).unwrap();
    }

    #[test]
    fn mark_processed_unknown_id_not_found() {
        let conn = open_memory_database().unwrap();
        let err = mark_request_processed(&conn, &Uuid::new_v4(), &chrono::Local::now().naive_local())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn stats_count_fallbacks() {
        let conn = open_memory_database().unwrap();
        insert_staged_request(&conn, &staged("chest", "/img/a.png")).unwrap();
        let mut fb = staged("chest", "/img/b.png");
        fb.provenance.status = ValidationStatus::Fallback;
        insert_staged_request(&conn, &fb).unwrap();

        assert_eq!(staging_stats(&conn, "chest").unwrap(), (2, 0, 1));
        assert_eq!(staging_stats(&conn, "empty").unwrap(), (0, 0, 0));
    }

    #[test]
    fn requests_for_path_newest_first() {
        let conn = open_memory_database().unwrap();
        let first = staged("chest", "/img/a.png");
        insert_staged_request(&conn, &first).unwrap();
        let second = staged("chest", "/img/a.png");
        insert_staged_request(&conn, &second).unwrap();

        let history = list_requests_for_path(&conn, "chest", "/img/a.png").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
    }
}
