use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{format_timestamp, parse_timestamp, parse_uuid, DatabaseError};
use crate::models::enums::HistoryAction;
use crate::models::*;

/// Appends one entry to the rule history. History rows are never updated.
pub fn insert_history_entry(conn: &Connection, entry: &CoverageRuleHistory) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO coverage_rule_history (id, rule_id, action, actor_id, old_values,
         new_values, batch_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id.to_string(),
            entry.rule_id.to_string(),
            entry.action.as_str(),
            entry.actor_id,
            entry.old_values.as_ref().map(|v| v.to_string()),
            entry.new_values.as_ref().map(|v| v.to_string()),
            entry.batch_id.to_string(),
            format_timestamp(&entry.created_at),
        ],
    )?;
    Ok(())
}

/// History of one rule, newest first.
pub fn get_rule_history(conn: &Connection, rule_id: &Uuid) -> Result<Vec<CoverageRuleHistory>, DatabaseError> {
    query_history(
        conn,
        "SELECT id, rule_id, action, actor_id, old_values, new_values, batch_id, created_at
         FROM coverage_rule_history WHERE rule_id = ?1
         ORDER BY created_at DESC, rowid DESC",
        &rule_id.to_string(),
    )
}

/// Every entry written under one batch id, in write order.
pub fn get_batch_history(conn: &Connection, batch_id: &Uuid) -> Result<Vec<CoverageRuleHistory>, DatabaseError> {
    query_history(
        conn,
        "SELECT id, rule_id, action, actor_id, old_values, new_values, batch_id, created_at
         FROM coverage_rule_history WHERE batch_id = ?1
         ORDER BY rowid ASC",
        &batch_id.to_string(),
    )
}

fn query_history(
    conn: &Connection,
    sql: &str,
    key: &str,
) -> Result<Vec<CoverageRuleHistory>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, rule_id, action, actor_id, old_values, new_values, batch_id, created_at) = row?;
        entries.push(CoverageRuleHistory {
            id: parse_uuid("coverage_rule_history.id", &id)?,
            rule_id: parse_uuid("coverage_rule_history.rule_id", &rule_id)?,
            action: HistoryAction::from_str(&action)?,
            actor_id,
            old_values: old_values.map(|v| serde_json::from_str(&v)).transpose()?,
            new_values: new_values.map(|v| serde_json::from_str(&v)).transpose()?,
            batch_id: parse_uuid("coverage_rule_history.batch_id", &batch_id)?,
            created_at: parse_timestamp("coverage_rule_history.created_at", &created_at)?,
        });
    }
    Ok(entries)
}
