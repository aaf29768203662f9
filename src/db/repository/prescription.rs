use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::*;
use crate::schedule::SchedulePattern;

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let pattern = rx
        .schedule_pattern
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let discontinuation = rx.discontinuation.as_ref();

    conn.execute(
        "INSERT INTO prescriptions (id, admission_id, drug_name, frequency, duration,
         dose_quantity, schedule_pattern, discontinued_at, discontinued_by,
         discontinuation_reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            rx.id.to_string(),
            rx.admission_id.to_string(),
            rx.drug_name,
            rx.frequency,
            rx.duration,
            rx.dose_quantity,
            pattern,
            discontinuation.map(|d| format_timestamp(&d.discontinued_at)),
            discontinuation.map(|d| d.discontinued_by.clone()),
            discontinuation.map(|d| d.reason.clone()),
            format_timestamp(&rx.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, rx_id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, admission_id, drug_name, frequency, duration, dose_quantity,
         schedule_pattern, discontinued_at, discontinued_by, discontinuation_reason, created_at
         FROM prescriptions WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map(params![rx_id.to_string()], |row| Ok(prescription_row_from_rusqlite(row)))?;
    match rows.next() {
        Some(row) => Ok(Some(prescription_from_row(row??)?)),
        None => Ok(None),
    }
}

pub fn update_schedule_pattern(
    conn: &Connection,
    rx_id: &Uuid,
    pattern: &SchedulePattern,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE prescriptions SET schedule_pattern = ?2 WHERE id = ?1",
        params![rx_id.to_string(), serde_json::to_string(pattern)?],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Prescription".into(),
            id: rx_id.to_string(),
        });
    }
    Ok(())
}

/// Stamps the discontinuation fields. Fails if the prescription is already discontinued.
pub fn mark_discontinued(
    conn: &Connection,
    rx_id: &Uuid,
    discontinuation: &Discontinuation,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE prescriptions SET discontinued_at = ?2, discontinued_by = ?3,
         discontinuation_reason = ?4
         WHERE id = ?1 AND discontinued_at IS NULL",
        params![
            rx_id.to_string(),
            format_timestamp(&discontinuation.discontinued_at),
            discontinuation.discontinued_by,
            discontinuation.reason,
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "prescription {rx_id} is missing or already discontinued"
        )));
    }
    Ok(())
}

struct PrescriptionRow {
    id: String,
    admission_id: String,
    drug_name: String,
    frequency: String,
    duration: String,
    dose_quantity: String,
    schedule_pattern: Option<String>,
    discontinued_at: Option<String>,
    discontinued_by: Option<String>,
    discontinuation_reason: Option<String>,
    created_at: String,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        admission_id: row.get(1)?,
        drug_name: row.get(2)?,
        frequency: row.get(3)?,
        duration: row.get(4)?,
        dose_quantity: row.get(5)?,
        schedule_pattern: row.get(6)?,
        discontinued_at: row.get(7)?,
        discontinued_by: row.get(8)?,
        discontinuation_reason: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    let discontinuation = match row.discontinued_at {
        Some(at) => Some(Discontinuation {
            discontinued_at: parse_timestamp("prescriptions.discontinued_at", &at)?,
            discontinued_by: row.discontinued_by.unwrap_or_default(),
            reason: row.discontinuation_reason.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Prescription {
        id: parse_uuid("prescriptions.id", &row.id)?,
        admission_id: parse_uuid("prescriptions.admission_id", &row.admission_id)?,
        drug_name: row.drug_name,
        frequency: row.frequency,
        duration: row.duration,
        dose_quantity: row.dose_quantity,
        schedule_pattern: row
            .schedule_pattern
            .map(|p| serde_json::from_str(&p))
            .transpose()?,
        discontinuation,
        created_at: parse_timestamp("prescriptions.created_at", &row.created_at)?,
    })
}
