use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::*;
use crate::models::*;

const RULE_COLUMNS: &str = "id, plan_id, category, item_code, item_description, coverage_type,
    coverage_value, patient_copay_percentage, patient_copay_amount, tariff_amount, is_covered,
    is_active, requires_preauthorization, max_quantity_per_visit, max_amount_per_visit,
    effective_from, effective_to, notes, created_at, updated_at, deleted_at";

pub fn insert_coverage_rule(conn: &Connection, rule: &CoverageRule) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO coverage_rules (id, plan_id, category, item_code, item_description,
         coverage_type, coverage_value, patient_copay_percentage, patient_copay_amount,
         tariff_amount, is_covered, is_active, requires_preauthorization, max_quantity_per_visit,
         max_amount_per_visit, effective_from, effective_to, notes, created_at, updated_at, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        params![
            rule.id.to_string(),
            rule.plan_id.to_string(),
            rule.category.as_str(),
            rule.item_code,
            rule.item_description,
            rule.coverage_type.as_str(),
            rule.coverage_value,
            rule.patient_copay_percentage,
            rule.patient_copay_amount,
            rule.tariff_amount,
            rule.is_covered as i32,
            rule.is_active as i32,
            rule.requires_preauthorization as i32,
            rule.max_quantity_per_visit,
            rule.max_amount_per_visit,
            rule.effective_from.map(|d| d.to_string()),
            rule.effective_to.map(|d| d.to_string()),
            rule.notes,
            format_timestamp(&rule.created_at),
            format_timestamp(&rule.updated_at),
            rule.deleted_at.as_ref().map(format_timestamp),
        ],
    )?;
    Ok(())
}

/// Overwrites every mutable column of an existing rule.
pub fn update_coverage_rule(conn: &Connection, rule: &CoverageRule) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE coverage_rules SET item_description = ?2, coverage_type = ?3, coverage_value = ?4,
         patient_copay_percentage = ?5, patient_copay_amount = ?6, tariff_amount = ?7,
         is_covered = ?8, is_active = ?9, requires_preauthorization = ?10,
         max_quantity_per_visit = ?11, max_amount_per_visit = ?12, effective_from = ?13,
         effective_to = ?14, notes = ?15, updated_at = ?16
         WHERE id = ?1 AND deleted_at IS NULL",
        params![
            rule.id.to_string(),
            rule.item_description,
            rule.coverage_type.as_str(),
            rule.coverage_value,
            rule.patient_copay_percentage,
            rule.patient_copay_amount,
            rule.tariff_amount,
            rule.is_covered as i32,
            rule.is_active as i32,
            rule.requires_preauthorization as i32,
            rule.max_quantity_per_visit,
            rule.max_amount_per_visit,
            rule.effective_from.map(|d| d.to_string()),
            rule.effective_to.map(|d| d.to_string()),
            rule.notes,
            format_timestamp(&rule.updated_at),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "CoverageRule".into(),
            id: rule.id.to_string(),
        });
    }
    Ok(())
}

pub fn soft_delete_coverage_rule(
    conn: &Connection,
    rule_id: &Uuid,
    at: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE coverage_rules SET deleted_at = ?2, is_active = 0, updated_at = ?2
         WHERE id = ?1 AND deleted_at IS NULL",
        params![rule_id.to_string(), format_timestamp(at)],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "CoverageRule".into(),
            id: rule_id.to_string(),
        });
    }
    Ok(())
}

/// A live (not soft-deleted) rule by id.
pub fn get_coverage_rule(conn: &Connection, rule_id: &Uuid) -> Result<Option<CoverageRule>, DatabaseError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM coverage_rules WHERE id = ?1 AND deleted_at IS NULL");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![rule_id.to_string()], |row| Ok(rule_row_from_rusqlite(row)))?;
    match rows.next() {
        Some(row) => Ok(Some(rule_from_row(row??)?)),
        None => Ok(None),
    }
}

/// The live rule occupying a (plan, category, item_code) slot, if any.
/// `item_code = None` addresses the general rule of the category.
pub fn find_live_rule(
    conn: &Connection,
    plan_id: &Uuid,
    category: CoverageCategory,
    item_code: Option<&str>,
) -> Result<Option<CoverageRule>, DatabaseError> {
    let sql = format!(
        "SELECT {RULE_COLUMNS} FROM coverage_rules
         WHERE plan_id = ?1 AND category = ?2 AND item_code IS ?3 AND deleted_at IS NULL
         LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(
        params![plan_id.to_string(), category.as_str(), item_code],
        |row| Ok(rule_row_from_rusqlite(row)),
    )?;
    match rows.next() {
        Some(row) => Ok(Some(rule_from_row(row??)?)),
        None => Ok(None),
    }
}

/// Active rules for a slot, newest effective_from first (undated rules last).
pub fn get_active_rules(
    conn: &Connection,
    plan_id: &Uuid,
    category: CoverageCategory,
    item_code: Option<&str>,
) -> Result<Vec<CoverageRule>, DatabaseError> {
    let sql = format!(
        "SELECT {RULE_COLUMNS} FROM coverage_rules
         WHERE plan_id = ?1 AND category = ?2 AND item_code IS ?3
           AND is_active = 1 AND deleted_at IS NULL
         ORDER BY effective_from IS NULL, effective_from DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![plan_id.to_string(), category.as_str(), item_code],
        |row| Ok(rule_row_from_rusqlite(row)),
    )?;

    let mut rules = Vec::new();
    for row in rows {
        rules.push(rule_from_row(row??)?);
    }
    Ok(rules)
}

/// All live rules of a plan, optionally narrowed to one category.
pub fn get_plan_rules(
    conn: &Connection,
    plan_id: &Uuid,
    category: Option<CoverageCategory>,
) -> Result<Vec<CoverageRule>, DatabaseError> {
    let sql = format!(
        "SELECT {RULE_COLUMNS} FROM coverage_rules
         WHERE plan_id = ?1 AND (?2 IS NULL OR category = ?2) AND deleted_at IS NULL
         ORDER BY category, item_code IS NOT NULL, item_code"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![plan_id.to_string(), category.map(|c| c.as_str())],
        |row| Ok(rule_row_from_rusqlite(row)),
    )?;

    let mut rules = Vec::new();
    for row in rows {
        rules.push(rule_from_row(row??)?);
    }
    Ok(rules)
}

struct RuleRow {
    id: String,
    plan_id: String,
    category: String,
    item_code: Option<String>,
    item_description: Option<String>,
    coverage_type: String,
    coverage_value: f64,
    patient_copay_percentage: f64,
    patient_copay_amount: f64,
    tariff_amount: Option<f64>,
    is_covered: i32,
    is_active: i32,
    requires_preauthorization: i32,
    max_quantity_per_visit: Option<u32>,
    max_amount_per_visit: Option<f64>,
    effective_from: Option<String>,
    effective_to: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

fn rule_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<RuleRow, rusqlite::Error> {
    Ok(RuleRow {
        id: row.get(0)?,
        plan_id: row.get(1)?,
        category: row.get(2)?,
        item_code: row.get(3)?,
        item_description: row.get(4)?,
        coverage_type: row.get(5)?,
        coverage_value: row.get(6)?,
        patient_copay_percentage: row.get(7)?,
        patient_copay_amount: row.get(8)?,
        tariff_amount: row.get(9)?,
        is_covered: row.get(10)?,
        is_active: row.get(11)?,
        requires_preauthorization: row.get(12)?,
        max_quantity_per_visit: row.get(13)?,
        max_amount_per_visit: row.get(14)?,
        effective_from: row.get(15)?,
        effective_to: row.get(16)?,
        notes: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        deleted_at: row.get(20)?,
    })
}

fn rule_from_row(row: RuleRow) -> Result<CoverageRule, DatabaseError> {
    Ok(CoverageRule {
        id: parse_uuid("coverage_rules.id", &row.id)?,
        plan_id: parse_uuid("coverage_rules.plan_id", &row.plan_id)?,
        category: CoverageCategory::from_str(&row.category)?,
        item_code: row.item_code,
        item_description: row.item_description,
        coverage_type: CoverageType::from_str(&row.coverage_type)?,
        coverage_value: row.coverage_value,
        patient_copay_percentage: row.patient_copay_percentage,
        patient_copay_amount: row.patient_copay_amount,
        tariff_amount: row.tariff_amount,
        is_covered: row.is_covered != 0,
        is_active: row.is_active != 0,
        requires_preauthorization: row.requires_preauthorization != 0,
        max_quantity_per_visit: row.max_quantity_per_visit,
        max_amount_per_visit: row.max_amount_per_visit,
        effective_from: row.effective_from.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        effective_to: row.effective_to.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        notes: row.notes,
        created_at: parse_timestamp("coverage_rules.created_at", &row.created_at)?,
        updated_at: parse_timestamp("coverage_rules.updated_at", &row.updated_at)?,
        deleted_at: row
            .deleted_at
            .map(|d| parse_timestamp("coverage_rules.deleted_at", &d))
            .transpose()?,
    })
}
