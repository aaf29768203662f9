pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

/// Storage format for every timestamp column. Lexicographic order matches time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(field: &str, value: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        DatabaseError::InvalidValue {
            field: field.into(),
            value: value.into(),
        }
    })
}

pub fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.into(),
        value: value.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn timestamp_round_trip_drops_subseconds() {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_milli_opt(9, 5, 7, 450)
            .unwrap();
        let stored = format_timestamp(&ts);
        assert_eq!(stored, "2025-03-04 09:05:07");
        let parsed = parse_timestamp("scheduled_time", &stored).unwrap();
        assert_eq!(parsed, ts.with_nanosecond(0).unwrap());
    }

    #[test]
    fn bad_uuid_names_the_field() {
        let err = parse_uuid("rule_id", "not-a-uuid").unwrap_err();
        assert!(err.to_string().contains("rule_id"));
    }

}
