use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ensure_label, ensure_subject, format_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

/// Maximum characters of a stored description.
pub const MAX_DESCRIPTION_CHARS: usize = 4000;

struct AnnotationDbRow {
    dataset: String,
    path_url: String,
    label: String,
    subject_id: String,
    description: String,
    request_id: Option<String>,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnnotationDbRow> {
    Ok(AnnotationDbRow {
        dataset: row.get(0)?,
        path_url: row.get(1)?,
        label: row.get(2)?,
        subject_id: row.get(3)?,
        description: row.get(4)?,
        request_id: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn annotation_from_row(row: AnnotationDbRow) -> Result<AnnotationRow, DatabaseError> {
    let request_id = row
        .request_id
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    Ok(AnnotationRow {
        dataset: row.dataset,
        path_url: row.path_url,
        label: row.label,
        subject_id: row.subject_id,
        description: row.description,
        request_id,
        updated_at: parse_timestamp(&row.updated_at),
    })
}

fn check_description(description: &str) -> Result<(), DatabaseError> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(DatabaseError::ConstraintViolation(format!(
            "description exceeds {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}

fn now_string() -> String {
    format_timestamp(&chrono::Local::now().naive_local())
}

/// Insert or replace the final row for `(dataset, path_url)`.
///
/// The label and subject lookup rows are created on demand. Over-width
/// labels or descriptions are rejected; callers bound them beforehand.
pub fn upsert_annotation(
    conn: &Connection,
    dataset: &str,
    path_url: &str,
    subject_id: &str,
    label: &str,
    description: &str,
    request_id: Option<&Uuid>,
) -> Result<(), DatabaseError> {
    check_description(description)?;
    ensure_label(conn, label)?;
    ensure_subject(conn, subject_id)?;

    conn.execute(
        "INSERT INTO annotation
         (dataset, path_url, label, subject_id, description, request_id, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (dataset, path_url) DO UPDATE SET
            label = excluded.label,
            subject_id = excluded.subject_id,
            description = excluded.description,
            request_id = excluded.request_id,
            updated_at = excluded.updated_at",
        params![
            dataset,
            path_url,
            label,
            subject_id,
            description,
            request_id.map(|id| id.to_string()),
            now_string(),
        ],
    )?;
    Ok(())
}

pub fn get_annotation(
    conn: &Connection,
    dataset: &str,
    path_url: &str,
) -> Result<Option<AnnotationRow>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT dataset, path_url, label, subject_id, description, request_id, updated_at
             FROM annotation WHERE dataset = ?1 AND path_url = ?2",
            params![dataset, path_url],
            read_row,
        )
        .optional()?;
    row.map(annotation_from_row).transpose()
}

/// Rows of a dataset in path order. A non-empty `only` restricts the result
/// to those paths.
pub fn list_annotations(
    conn: &Connection,
    dataset: &str,
    only: Option<&[String]>,
) -> Result<Vec<AnnotationRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT dataset, path_url, label, subject_id, description, request_id, updated_at
         FROM annotation WHERE dataset = ?1 ORDER BY path_url",
    )?;
    let rows = stmt.query_map(params![dataset], read_row)?;

    let mut annotations = Vec::new();
    for row in rows {
        let row = annotation_from_row(row?)?;
        let wanted = match only {
            Some(paths) if !paths.is_empty() => paths.iter().any(|p| *p == row.path_url),
            _ => true,
        };
        if wanted {
            annotations.push(row);
        }
    }
    Ok(annotations)
}

/// Change the label and/or description of an existing row.
pub fn update_annotation(
    conn: &Connection,
    dataset: &str,
    path_url: &str,
    label: Option<&str>,
    description: Option<&str>,
) -> Result<(), DatabaseError> {
    let existing = get_annotation(conn, dataset, path_url)?.ok_or_else(|| {
        DatabaseError::NotFound {
            entity_type: "annotation".into(),
            id: format!("{dataset}:{path_url}"),
        }
    })?;

    let label = label.unwrap_or(&existing.label);
    let description = description.unwrap_or(&existing.description);
    check_description(description)?;
    ensure_label(conn, label)?;

    conn.execute(
        "UPDATE annotation SET label = ?1, description = ?2, updated_at = ?3
         WHERE dataset = ?4 AND path_url = ?5",
        params![label, description, now_string(), dataset, path_url],
    )?;
    Ok(())
}

/// Delete one row. Returns whether a row existed.
pub fn delete_annotation(
    conn: &Connection,
    dataset: &str,
    path_url: &str,
) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM annotation WHERE dataset = ?1 AND path_url = ?2",
        params![dataset, path_url],
    )?;
    Ok(deleted > 0)
}

/// Register image paths as pending rows, skipping paths already present.
pub fn register_pending_images(
    conn: &Connection,
    dataset: &str,
    paths: &[String],
) -> Result<LoadSummary, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    ensure_label(&tx, PENDING_LABEL)?;
    ensure_subject(&tx, DEFAULT_SUBJECT_ID)?;

    let now = now_string();
    let mut summary = LoadSummary::default();
    for path in paths {
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO annotation
             (dataset, path_url, label, subject_id, description, request_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            params![dataset, path, PENDING_LABEL, DEFAULT_SUBJECT_ID, PENDING_DESCRIPTION, now],
        )?;
        if inserted > 0 {
            summary.loaded += 1;
        } else {
            summary.skipped += 1;
        }
    }
    tx.commit()?;
    Ok(summary)
}

/// Distinct dataset tags with row counts.
pub fn list_datasets(conn: &Connection) -> Result<Vec<(String, u32)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT dataset, COUNT(*) FROM annotation GROUP BY dataset ORDER BY dataset",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut datasets = Vec::new();
    for row in rows {
        datasets.push(row?);
    }
    Ok(datasets)
}
