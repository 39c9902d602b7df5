use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Maximum characters of a stored label.
pub const MAX_LABEL_CHARS: usize = 20;

/// Insert the label if it is not already known.
pub fn ensure_label(conn: &Connection, name: &str) -> Result<(), DatabaseError> {
    if name.chars().count() > MAX_LABEL_CHARS {
        return Err(DatabaseError::ConstraintViolation(format!(
            "label '{name}' exceeds {MAX_LABEL_CHARS} characters"
        )));
    }
    conn.execute("INSERT OR IGNORE INTO label (name) VALUES (?1)", params![name])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn ensure_label_is_idempotent() {
        let conn = open_memory_database().unwrap();
        ensure_label(&conn, "Pneumothorax").unwrap();
        ensure_label(&conn, "Pneumothorax").unwrap();
        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM label WHERE name = 'Pneumothorax'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn overlong_label_rejected() {
        let conn = open_memory_database().unwrap();
        let err = ensure_label(&conn, "Right Lower Lobe Pneumonia").unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }
}
