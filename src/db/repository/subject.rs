use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Insert the subject if it is not already known. New subjects are named
/// after their id.
pub fn ensure_subject(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO subject (id, name) VALUES (?1, ?1)",
        params![id],
    )?;
    Ok(())
}
