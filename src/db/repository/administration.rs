use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::AdministrationStatus;
use crate::models::*;

const ADMINISTRATION_COLUMNS: &str = "id, prescription_id, admission_id, scheduled_time, status,
    administered_at, administered_by, dosage_given, notes, is_adjusted";

pub fn insert_administration(
    conn: &Connection,
    admin: &MedicationAdministration,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_administrations (id, prescription_id, admission_id,
         scheduled_time, status, administered_at, administered_by, dosage_given, notes, is_adjusted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            admin.id.to_string(),
            admin.prescription_id.to_string(),
            admin.admission_id.to_string(),
            format_timestamp(&admin.scheduled_time),
            admin.status.as_str(),
            admin.administered_at.as_ref().map(format_timestamp),
            admin.administered_by,
            admin.dosage_given,
            admin.notes,
            admin.is_adjusted as i32,
        ],
    )?;
    Ok(())
}

pub fn get_administration(
    conn: &Connection,
    admin_id: &Uuid,
) -> Result<Option<MedicationAdministration>, DatabaseError> {
    let sql = format!("SELECT {ADMINISTRATION_COLUMNS} FROM medication_administrations WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![admin_id.to_string()], |row| {
        Ok(administration_row_from_rusqlite(row))
    })?;
    match rows.next() {
        Some(row) => Ok(Some(administration_from_row(row??)?)),
        None => Ok(None),
    }
}

/// All administrations of a prescription in schedule order.
pub fn get_administrations_for_prescription(
    conn: &Connection,
    rx_id: &Uuid,
) -> Result<Vec<MedicationAdministration>, DatabaseError> {
    let sql = format!(
        "SELECT {ADMINISTRATION_COLUMNS} FROM medication_administrations
         WHERE prescription_id = ?1 ORDER BY scheduled_time ASC, rowid ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![rx_id.to_string()], |row| {
        Ok(administration_row_from_rusqlite(row))
    })?;

    let mut admins = Vec::new();
    for row in rows {
        admins.push(administration_from_row(row??)?);
    }
    Ok(admins)
}

/// Cancels every still-scheduled dose strictly after `now`. Returns the number cancelled.
pub fn cancel_future_scheduled(
    conn: &Connection,
    rx_id: &Uuid,
    now: &NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let cancelled = conn.execute(
        "UPDATE medication_administrations SET status = ?3
         WHERE prescription_id = ?1 AND status = ?4 AND scheduled_time > ?2",
        params![
            rx_id.to_string(),
            format_timestamp(now),
            AdministrationStatus::Cancelled.as_str(),
            AdministrationStatus::Scheduled.as_str(),
        ],
    )?;
    Ok(cancelled)
}

/// The earliest still-scheduled dose after `now`.
pub fn first_future_scheduled(
    conn: &Connection,
    rx_id: &Uuid,
    now: &NaiveDateTime,
) -> Result<Option<MedicationAdministration>, DatabaseError> {
    let sql = format!(
        "SELECT {ADMINISTRATION_COLUMNS} FROM medication_administrations
         WHERE prescription_id = ?1 AND status = ?2 AND scheduled_time > ?3
         ORDER BY scheduled_time ASC LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(
        params![
            rx_id.to_string(),
            AdministrationStatus::Scheduled.as_str(),
            format_timestamp(now),
        ],
        |row| Ok(administration_row_from_rusqlite(row)),
    )?;
    match rows.next() {
        Some(row) => Ok(Some(administration_from_row(row??)?)),
        None => Ok(None),
    }
}

/// Moves a scheduled dose and flags it adjusted. Returns false if the row was not scheduled.
pub fn reschedule_administration(
    conn: &Connection,
    admin_id: &Uuid,
    new_time: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE medication_administrations SET scheduled_time = ?2, is_adjusted = 1
         WHERE id = ?1 AND status = ?3",
        params![
            admin_id.to_string(),
            format_timestamp(new_time),
            AdministrationStatus::Scheduled.as_str(),
        ],
    )?;
    Ok(updated == 1)
}

/// Moves a scheduled dose to a terminal status. Returns false if the row was not scheduled.
pub fn record_administration_outcome(
    conn: &Connection,
    admin_id: &Uuid,
    status: AdministrationStatus,
    administered_at: &NaiveDateTime,
    administered_by: &str,
    dosage_given: Option<&str>,
    notes: Option<&str>,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE medication_administrations
         SET status = ?2, administered_at = ?3, administered_by = ?4,
             dosage_given = COALESCE(?5, dosage_given), notes = ?6
         WHERE id = ?1 AND status = ?7",
        params![
            admin_id.to_string(),
            status.as_str(),
            format_timestamp(administered_at),
            administered_by,
            dosage_given,
            notes,
            AdministrationStatus::Scheduled.as_str(),
        ],
    )?;
    Ok(updated == 1)
}

pub fn insert_adjustment(conn: &Connection, adj: &ScheduleAdjustment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO schedule_adjustments (id, administration_id, original_time, adjusted_time,
         reason, adjusted_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            adj.id.to_string(),
            adj.administration_id.to_string(),
            format_timestamp(&adj.original_time),
            format_timestamp(&adj.adjusted_time),
            adj.reason,
            adj.adjusted_by,
            format_timestamp(&adj.created_at),
        ],
    )?;
    Ok(())
}

/// Adjustment history of one dose, newest first.
pub fn get_adjustments(
    conn: &Connection,
    admin_id: &Uuid,
) -> Result<Vec<ScheduleAdjustment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, administration_id, original_time, adjusted_time, reason, adjusted_by, created_at
         FROM schedule_adjustments WHERE administration_id = ?1
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![admin_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, String>(6)?,
        ))
    })?;

    let mut adjustments = Vec::new();
    for row in rows {
        let (id, admin_id, original, adjusted, reason, adjusted_by, created_at) = row?;
        adjustments.push(ScheduleAdjustment {
            id: parse_uuid("schedule_adjustments.id", &id)?,
            administration_id: parse_uuid("schedule_adjustments.administration_id", &admin_id)?,
            original_time: parse_timestamp("schedule_adjustments.original_time", &original)?,
            adjusted_time: parse_timestamp("schedule_adjustments.adjusted_time", &adjusted)?,
            reason,
            adjusted_by,
            created_at: parse_timestamp("schedule_adjustments.created_at", &created_at)?,
        });
    }
    Ok(adjustments)
}

struct AdministrationRow {
    id: String,
    prescription_id: String,
    admission_id: String,
    scheduled_time: String,
    status: String,
    administered_at: Option<String>,
    administered_by: Option<String>,
    dosage_given: Option<String>,
    notes: Option<String>,
    is_adjusted: i32,
}

fn administration_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<AdministrationRow, rusqlite::Error> {
    Ok(AdministrationRow {
        id: row.get(0)?,
        prescription_id: row.get(1)?,
        admission_id: row.get(2)?,
        scheduled_time: row.get(3)?,
        status: row.get(4)?,
        administered_at: row.get(5)?,
        administered_by: row.get(6)?,
        dosage_given: row.get(7)?,
        notes: row.get(8)?,
        is_adjusted: row.get(9)?,
    })
}

fn administration_from_row(row: AdministrationRow) -> Result<MedicationAdministration, DatabaseError> {
    Ok(MedicationAdministration {
        id: parse_uuid("medication_administrations.id", &row.id)?,
        prescription_id: parse_uuid("medication_administrations.prescription_id", &row.prescription_id)?,
        admission_id: parse_uuid("medication_administrations.admission_id", &row.admission_id)?,
        scheduled_time: parse_timestamp("medication_administrations.scheduled_time", &row.scheduled_time)?,
        status: AdministrationStatus::from_str(&row.status)?,
        administered_at: row
            .administered_at
            .map(|t| parse_timestamp("medication_administrations.administered_at", &t))
            .transpose()?,
        administered_by: row.administered_by,
        dosage_given: row.dosage_given,
        notes: row.notes,
        is_adjusted: row.is_adjusted != 0,
    })
}
