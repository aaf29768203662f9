//! API endpoint handlers.
//!
//! Handlers authorize, open a connection, and delegate to the `schedule`
//! and `coverage` services.

pub mod coverage;
pub mod health;
pub mod schedule;

use chrono::{DateTime, NaiveDateTime};
use uuid::Uuid;

use crate::api::error::ApiError;

pub(crate) fn parse_id(kind: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("Invalid {kind} ID: {e}")))
}

const CLIENT_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parses an ISO 8601 time from a client. Offsets are converted to local time;
/// times without an offset are taken as local already.
pub(crate) fn parse_client_time(field: &str, raw: &str) -> Result<NaiveDateTime, ApiError> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&chrono::Local).naive_local());
    }
    let without_fraction = raw.split('.').next().unwrap_or(raw);
    CLIENT_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_fraction, fmt).ok())
        .ok_or_else(|| ApiError::validation(field, format!("'{raw}' is not an ISO 8601 date-time")))
}
