//! Persisted schedule workflow: generation, reconfiguration, adjustment,
//! discontinuation and outcome recording.
//!
//! Every mutating operation runs in one transaction; a validation failure
//! leaves the database untouched.

use chrono::NaiveDateTime;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{parse_duration_days, pattern_slots, plan_slots, smart_defaults, Frequency, SchedulePattern, ScheduleError};
use crate::db::repository;
use crate::models::enums::AdministrationStatus;
use crate::models::*;

pub const REASON_MIN_CHARS: usize = 10;
pub const REASON_MAX_CHARS: usize = 500;
const RECONFIGURE_REASON: &str = "Schedule reconfigured with new pattern";

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    pub prescription_id: Uuid,
    pub frequency: Frequency,
    pub reconfigured: bool,
    pub cancelled: usize,
    /// Rows created by this call, in schedule order.
    pub administrations: Vec<MedicationAdministration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscontinueOutcome {
    pub prescription_id: Uuid,
    pub discontinued_at: NaiveDateTime,
    pub cancelled: usize,
}

/// Outcome a nurse records against a scheduled dose.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeRecord {
    pub status: AdministrationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub dosage_given: Option<String>,
}

fn load_prescription(conn: &Connection, rx_id: &Uuid) -> Result<Prescription, ScheduleError> {
    repository::get_prescription(conn, rx_id)?.ok_or(ScheduleError::PrescriptionNotFound(*rx_id))
}

fn load_administration(conn: &Connection, admin_id: &Uuid) -> Result<MedicationAdministration, ScheduleError> {
    repository::get_administration(conn, admin_id)?.ok_or(ScheduleError::AdministrationNotFound(*admin_id))
}

fn require_active(rx: &Prescription) -> Result<(), ScheduleError> {
    if rx.is_discontinued() {
        return Err(ScheduleError::Discontinued(rx.id));
    }
    Ok(())
}

fn check_reason_length(field: &str, text: &str, required: bool) -> Result<(), ScheduleError> {
    let len = text.trim().chars().count();
    if required && len < REASON_MIN_CHARS {
        return Err(ScheduleError::validation(
            field,
            format!("must be at least {REASON_MIN_CHARS} characters"),
        ));
    }
    if len > REASON_MAX_CHARS {
        return Err(ScheduleError::validation(
            field,
            format!("may not exceed {REASON_MAX_CHARS} characters"),
        ));
    }
    Ok(())
}

/// A pre-filled pattern for the configure form.
#[derive(Debug, Clone, Serialize)]
pub struct PatternSuggestion {
    pub frequency: Frequency,
    pub schedule_pattern: SchedulePattern,
}

/// Suggested day pattern for a prescription, based on its frequency and the time of day.
pub fn suggest_pattern(
    conn: &Connection,
    rx_id: &Uuid,
    now: NaiveDateTime,
) -> Result<PatternSuggestion, ScheduleError> {
    let rx = load_prescription(conn, rx_id)?;
    let frequency = Frequency::parse(&rx.frequency)?;
    Ok(PatternSuggestion {
        frequency,
        schedule_pattern: smart_defaults(frequency, now.time()),
    })
}

/// Generates the administration schedule for a prescription.
///
/// Day 1 is the date of `reference` (the prescribing event, possibly
/// backdated). A prescription that already has a pattern is reconfigured
/// instead. STAT prescriptions get one dose at `now` and take no pattern.
pub fn configure_schedule(
    conn: &Connection,
    rx_id: &Uuid,
    pattern: Option<SchedulePattern>,
    actor_id: &str,
    reference: NaiveDateTime,
    now: NaiveDateTime,
) -> Result<ScheduleOutcome, ScheduleError> {
    let rx = load_prescription(conn, rx_id)?;
    require_active(&rx)?;
    let frequency = Frequency::parse(&rx.frequency)?;

    match frequency {
        Frequency::AsNeeded => return Err(ScheduleError::AsNeeded(rx.id)),
        Frequency::Stat => return schedule_stat(conn, &rx, now),
        _ => {}
    }

    let pattern = pattern.ok_or_else(|| ScheduleError::validation("schedule_pattern", "is required"))?;
    if rx.has_schedule() {
        return regenerate(conn, &rx, frequency, pattern, actor_id, now);
    }
    if reference > now {
        return Err(ScheduleError::validation("reference_time", "must not be in the future"));
    }
    let days = parse_duration_days(&rx.duration)?;

    let slots = plan_slots(frequency, Some(&pattern), reference.date(), days, now)?;
    let tx = conn.unchecked_transaction()?;
    repository::update_schedule_pattern(&tx, &rx.id, &pattern)?;
    let created = insert_slots(&tx, &rx, &slots)?;
    tx.commit()?;

    tracing::info!(
        prescription_id = %rx.id,
        frequency = %frequency,
        days,
        doses = created.len(),
        "Medication schedule generated"
    );

    Ok(ScheduleOutcome {
        prescription_id: rx.id,
        frequency,
        reconfigured: false,
        cancelled: 0,
        administrations: created,
    })
}

/// Replaces the pattern of a scheduled prescription.
///
/// Future scheduled doses are cancelled, past and recorded doses are kept,
/// and doses are regenerated from today strictly after `now`. A dose due
/// exactly at `now` is kept, not duplicated.
pub fn reconfigure_schedule(
    conn: &Connection,
    rx_id: &Uuid,
    pattern: SchedulePattern,
    actor_id: &str,
    now: NaiveDateTime,
) -> Result<ScheduleOutcome, ScheduleError> {
    let rx = load_prescription(conn, rx_id)?;
    require_active(&rx)?;
    let frequency = Frequency::parse(&rx.frequency)?;
    match frequency {
        Frequency::AsNeeded => Err(ScheduleError::AsNeeded(rx.id)),
        Frequency::Stat => Err(ScheduleError::validation(
            "schedule_pattern",
            "STAT prescriptions take no pattern",
        )),
        _ => regenerate(conn, &rx, frequency, pattern, actor_id, now),
    }
}

fn regenerate(
    conn: &Connection,
    rx: &Prescription,
    frequency: Frequency,
    pattern: SchedulePattern,
    actor_id: &str,
    now: NaiveDateTime,
) -> Result<ScheduleOutcome, ScheduleError> {
    let days = parse_duration_days(&rx.duration)?;
    let slots: Vec<NaiveDateTime> = pattern_slots(&pattern, now.date(), days)
        .into_iter()
        .filter(|slot| *slot > now)
        .collect();

    let tx = conn.unchecked_transaction()?;
    let cancelled = repository::cancel_future_scheduled(&tx, &rx.id, &now)?;
    repository::update_schedule_pattern(&tx, &rx.id, &pattern)?;
    let created = insert_slots(&tx, rx, &slots)?;

    if let Some(first) = repository::first_future_scheduled(&tx, &rx.id, &now)? {
        repository::insert_adjustment(&tx, &ScheduleAdjustment {
            id: Uuid::new_v4(),
            administration_id: first.id,
            original_time: now,
            adjusted_time: first.scheduled_time,
            reason: Some(RECONFIGURE_REASON.to_string()),
            adjusted_by: actor_id.to_string(),
            created_at: now,
        })?;
    }
    tx.commit()?;

    tracing::info!(
        prescription_id = %rx.id,
        cancelled,
        doses = created.len(),
        "Medication schedule reconfigured"
    );

    Ok(ScheduleOutcome {
        prescription_id: rx.id,
        frequency,
        reconfigured: true,
        cancelled,
        administrations: created,
    })
}

fn schedule_stat(
    conn: &Connection,
    rx: &Prescription,
    now: NaiveDateTime,
) -> Result<ScheduleOutcome, ScheduleError> {
    let existing = repository::get_administrations_for_prescription(conn, &rx.id)?;
    if existing.iter().any(|a| a.status != AdministrationStatus::Cancelled) {
        return Err(ScheduleError::AlreadyScheduled(rx.id));
    }

    let tx = conn.unchecked_transaction()?;
    let created = insert_slots(&tx, rx, &[now])?;
    tx.commit()?;

    tracing::info!(prescription_id = %rx.id, "STAT dose scheduled");

    Ok(ScheduleOutcome {
        prescription_id: rx.id,
        frequency: Frequency::Stat,
        reconfigured: false,
        cancelled: 0,
        administrations: created,
    })
}

fn insert_slots(
    conn: &Connection,
    rx: &Prescription,
    slots: &[NaiveDateTime],
) -> Result<Vec<MedicationAdministration>, ScheduleError> {
    let mut created = Vec::with_capacity(slots.len());
    for slot in slots {
        let admin = MedicationAdministration::scheduled(rx.id, rx.admission_id, *slot, &rx.dose_quantity);
        repository::insert_administration(conn, &admin)?;
        created.push(admin);
    }
    Ok(created)
}

/// Stops a prescription and cancels its future scheduled doses.
pub fn discontinue_prescription(
    conn: &Connection,
    rx_id: &Uuid,
    actor_id: &str,
    reason: &str,
    now: NaiveDateTime,
) -> Result<DiscontinueOutcome, ScheduleError> {
    check_reason_length("reason", reason, true)?;
    let rx = load_prescription(conn, rx_id)?;
    require_active(&rx)?;

    let discontinuation = Discontinuation {
        discontinued_at: now,
        discontinued_by: actor_id.to_string(),
        reason: reason.trim().to_string(),
    };

    let tx = conn.unchecked_transaction()?;
    repository::mark_discontinued(&tx, &rx.id, &discontinuation)?;
    let cancelled = repository::cancel_future_scheduled(&tx, &rx.id, &now)?;
    tx.commit()?;

    tracing::info!(prescription_id = %rx.id, cancelled, "Prescription discontinued");

    Ok(DiscontinueOutcome {
        prescription_id: rx.id,
        discontinued_at: now,
        cancelled,
    })
}

/// Moves one scheduled dose to a new time and records the change.
pub fn adjust_administration(
    conn: &Connection,
    admin_id: &Uuid,
    new_time: NaiveDateTime,
    actor_id: &str,
    reason: Option<&str>,
    now: NaiveDateTime,
) -> Result<MedicationAdministration, ScheduleError> {
    if let Some(reason) = reason {
        check_reason_length("reason", reason, false)?;
    }
    let admin = load_administration(conn, admin_id)?;
    if !admin.can_be_adjusted() {
        return Err(ScheduleError::NotScheduled { id: admin.id, status: admin.status });
    }
    let rx = load_prescription(conn, &admin.prescription_id)?;
    require_active(&rx)?;
    if new_time < now {
        return Err(ScheduleError::validation("scheduled_time", "must not be in the past"));
    }

    let tx = conn.unchecked_transaction()?;
    if !repository::reschedule_administration(&tx, &admin.id, &new_time)? {
        return Err(ScheduleError::NotScheduled { id: admin.id, status: admin.status });
    }
    repository::insert_adjustment(&tx, &ScheduleAdjustment {
        id: Uuid::new_v4(),
        administration_id: admin.id,
        original_time: admin.scheduled_time,
        adjusted_time: new_time,
        reason: reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        adjusted_by: actor_id.to_string(),
        created_at: now,
    })?;
    tx.commit()?;

    tracing::info!(
        administration_id = %admin.id,
        from = %admin.scheduled_time,
        to = %new_time,
        "Dose rescheduled"
    );

    load_administration(conn, admin_id)
}

/// Moves a scheduled dose to given, held, refused or omitted.
pub fn record_administration(
    conn: &Connection,
    admin_id: &Uuid,
    record: &OutcomeRecord,
    actor_id: &str,
    now: NaiveDateTime,
) -> Result<MedicationAdministration, ScheduleError> {
    let notes = record.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    match record.status {
        AdministrationStatus::Held | AdministrationStatus::Omitted => {
            check_reason_length("notes", notes.unwrap_or_default(), true)?;
        }
        AdministrationStatus::Given | AdministrationStatus::Refused => {
            check_reason_length("notes", notes.unwrap_or_default(), false)?;
        }
        AdministrationStatus::Scheduled | AdministrationStatus::Cancelled => {
            return Err(ScheduleError::validation(
                "status",
                "must be one of given, held, refused, omitted",
            ));
        }
    }

    let admin = load_administration(conn, admin_id)?;
    if admin.status.is_terminal() {
        return Err(ScheduleError::NotScheduled { id: admin.id, status: admin.status });
    }

    let recorded = repository::record_administration_outcome(
        conn,
        &admin.id,
        record.status,
        &now,
        actor_id,
        record.dosage_given.as_deref(),
        notes,
    )?;
    if !recorded {
        return Err(ScheduleError::NotScheduled { id: admin.id, status: admin.status });
    }

    tracing::info!(administration_id = %admin.id, status = %record.status, "Dose outcome recorded");
    load_administration(conn, admin_id)
}

/// Administrations of a prescription in schedule order.
pub fn list_administrations(
    conn: &Connection,
    rx_id: &Uuid,
) -> Result<Vec<MedicationAdministration>, ScheduleError> {
    load_prescription(conn, rx_id)?;
    Ok(repository::get_administrations_for_prescription(conn, rx_id)?)
}

/// Adjustment history of one dose, newest first.
pub fn list_adjustments(
    conn: &Connection,
    admin_id: &Uuid,
) -> Result<Vec<ScheduleAdjustment>, ScheduleError> {
    load_administration(conn, admin_id)?;
    Ok(repository::get_adjustments(conn, admin_id)?)
}
