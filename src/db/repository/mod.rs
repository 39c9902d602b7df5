//! Repository layer: table-scoped database operations.
//!
//! `staging` owns the provenance tier (`annotation_request`), `annotation`
//! owns the final tier. `label` and `subject` hold the lookup rows the final
//! tier references.

mod annotation;
mod label;
mod staging;
mod subject;

pub use annotation::*;
pub use label::*;
pub use staging::*;
pub use subject::*;

/// Timestamp format used for every TEXT datetime column.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn format_timestamp(ts: &chrono::NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_timestamp(raw: &str) -> chrono::NaiveDateTime {
    chrono::NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).unwrap_or_default()
}
