//! Coverage rule administration with an append-only change history.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use super::{derived_copay_percentage, CoverageError, WriteContext};
use crate::db::repository;
use crate::models::enums::{CoverageCategory, CoverageType, HistoryAction};
use crate::models::*;

/// New rule as submitted by an administrator.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub category: CoverageCategory,
    #[serde(default)]
    pub item_code: Option<String>,
    #[serde(default)]
    pub item_description: Option<String>,
    pub coverage_type: CoverageType,
    #[serde(default)]
    pub coverage_value: f64,
    #[serde(default)]
    pub patient_copay_amount: f64,
    #[serde(default)]
    pub tariff_amount: Option<f64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub requires_preauthorization: bool,
    #[serde(default)]
    pub max_quantity_per_visit: Option<u32>,
    #[serde(default)]
    pub max_amount_per_visit: Option<f64>,
    #[serde(default)]
    pub effective_from: Option<NaiveDate>,
    #[serde(default)]
    pub effective_to: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Partial update. Category and item code identify the rule's slot and cannot change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulePatch {
    pub item_description: Option<String>,
    pub coverage_type: Option<CoverageType>,
    pub coverage_value: Option<f64>,
    pub patient_copay_amount: Option<f64>,
    pub tariff_amount: Option<f64>,
    pub is_active: Option<bool>,
    pub requires_preauthorization: Option<bool>,
    pub max_quantity_per_visit: Option<u32>,
    pub max_amount_per_visit: Option<f64>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Canonical value and coverage flag for a type: full is always 100, excluded always 0.
pub fn normalise_value(coverage_type: CoverageType, value: f64) -> (f64, bool) {
    match coverage_type {
        CoverageType::Full => (100.0, true),
        CoverageType::Excluded => (0.0, false),
        CoverageType::Percentage | CoverageType::Fixed => (value, true),
    }
}

/// Range check for a coverage value under its type.
pub fn validate_value(coverage_type: CoverageType, value: f64) -> Result<(), CoverageError> {
    if !value.is_finite() {
        return Err(CoverageError::validation("coverage_value", "must be a number"));
    }
    match coverage_type {
        CoverageType::Percentage if !(0.0..=100.0).contains(&value) => Err(CoverageError::validation(
            "coverage_value",
            "must be between 0 and 100 for percentage coverage",
        )),
        CoverageType::Fixed if value < 0.0 => Err(CoverageError::validation(
            "coverage_value",
            "must not be negative for fixed coverage",
        )),
        _ => Ok(()),
    }
}

fn validate_rule(rule: &CoverageRule) -> Result<(), CoverageError> {
    validate_value(rule.coverage_type, rule.coverage_value)?;
    if let Some(code) = &rule.item_code {
        if code.trim().is_empty() {
            return Err(CoverageError::validation("item_code", "must not be blank"));
        }
    }
    if !rule.patient_copay_amount.is_finite() || rule.patient_copay_amount < 0.0 {
        return Err(CoverageError::validation("patient_copay_amount", "must not be negative"));
    }
    if rule.tariff_amount.is_some_and(|t| !t.is_finite() || t < 0.0) {
        return Err(CoverageError::validation("tariff_amount", "must not be negative"));
    }
    if rule.max_amount_per_visit.is_some_and(|m| !m.is_finite() || m < 0.0) {
        return Err(CoverageError::validation("max_amount_per_visit", "must not be negative"));
    }
    if let (Some(from), Some(to)) = (rule.effective_from, rule.effective_to) {
        if to < from {
            return Err(CoverageError::validation("effective_to", "must not be before effective_from"));
        }
    }
    Ok(())
}

/// Recomputes the derived columns after the type or value changed.
fn apply_type_rules(rule: &mut CoverageRule) {
    let (value, covered) = normalise_value(rule.coverage_type, rule.coverage_value);
    rule.coverage_value = value;
    rule.is_covered = covered;
    rule.patient_copay_percentage = derived_copay_percentage(rule.coverage_type, value);
}

pub(crate) fn record_history(
    conn: &Connection,
    rule_id: Uuid,
    action: HistoryAction,
    old: Option<&CoverageRule>,
    new: Option<&CoverageRule>,
    ctx: &WriteContext,
) -> Result<(), CoverageError> {
    repository::insert_history_entry(conn, &CoverageRuleHistory {
        id: Uuid::new_v4(),
        rule_id,
        action,
        actor_id: ctx.actor_id.clone(),
        old_values: old.map(serde_json::to_value).transpose()?,
        new_values: new.map(serde_json::to_value).transpose()?,
        batch_id: ctx.batch_id,
        created_at: ctx.at,
    })?;
    Ok(())
}

fn load_rule(conn: &Connection, rule_id: &Uuid) -> Result<CoverageRule, CoverageError> {
    repository::get_coverage_rule(conn, rule_id)?.ok_or(CoverageError::RuleNotFound(*rule_id))
}

pub(crate) fn require_plan(conn: &Connection, plan_id: &Uuid) -> Result<InsurancePlan, CoverageError> {
    repository::get_plan(conn, plan_id)?.ok_or(CoverageError::PlanNotFound(*plan_id))
}

/// Creates a rule. Fails if a live rule already occupies the same
/// (plan, category, item_code) slot.
pub fn create_rule(
    conn: &Connection,
    plan_id: &Uuid,
    input: RuleInput,
    ctx: &WriteContext,
) -> Result<CoverageRule, CoverageError> {
    require_plan(conn, plan_id)?;

    let item_code = input.item_code.map(|c| c.trim().to_string());
    let mut rule = CoverageRule {
        id: Uuid::new_v4(),
        plan_id: *plan_id,
        category: input.category,
        item_code,
        item_description: input.item_description,
        coverage_type: input.coverage_type,
        coverage_value: input.coverage_value,
        patient_copay_percentage: 0.0,
        patient_copay_amount: input.patient_copay_amount,
        tariff_amount: input.tariff_amount,
        is_covered: true,
        is_active: input.is_active,
        requires_preauthorization: input.requires_preauthorization,
        max_quantity_per_visit: input.max_quantity_per_visit,
        max_amount_per_visit: input.max_amount_per_visit,
        effective_from: input.effective_from,
        effective_to: input.effective_to,
        notes: input.notes,
        created_at: ctx.at,
        updated_at: ctx.at,
        deleted_at: None,
    };
    validate_rule(&rule)?;
    apply_type_rules(&mut rule);

    let tx = conn.unchecked_transaction()?;
    if repository::find_live_rule(&tx, plan_id, rule.category, rule.item_code.as_deref())?.is_some() {
        return Err(CoverageError::DuplicateRule {
            category: rule.category,
            item_code: rule.item_code,
        });
    }
    repository::insert_coverage_rule(&tx, &rule)?;
    record_history(&tx, rule.id, HistoryAction::Created, None, Some(&rule), ctx)?;
    tx.commit()?;

    tracing::info!(
        rule_id = %rule.id,
        plan_id = %plan_id,
        category = %rule.category,
        item_code = rule.item_code.as_deref().unwrap_or("(general)"),
        "Coverage rule created"
    );
    Ok(rule)
}

/// Applies a partial update and re-derives the copay percentage.
pub fn update_rule(
    conn: &Connection,
    rule_id: &Uuid,
    patch: RulePatch,
    ctx: &WriteContext,
) -> Result<CoverageRule, CoverageError> {
    let tx = conn.unchecked_transaction()?;
    let updated = update_in_tx(&tx, rule_id, ctx, |rule| {
        if let Some(v) = patch.item_description {
            rule.item_description = Some(v);
        }
        if let Some(v) = patch.coverage_type {
            rule.coverage_type = v;
        }
        if let Some(v) = patch.coverage_value {
            rule.coverage_value = v;
        }
        if let Some(v) = patch.patient_copay_amount {
            rule.patient_copay_amount = v;
        }
        if let Some(v) = patch.tariff_amount {
            rule.tariff_amount = Some(v);
        }
        if let Some(v) = patch.is_active {
            rule.is_active = v;
        }
        if let Some(v) = patch.requires_preauthorization {
            rule.requires_preauthorization = v;
        }
        if let Some(v) = patch.max_quantity_per_visit {
            rule.max_quantity_per_visit = Some(v);
        }
        if let Some(v) = patch.max_amount_per_visit {
            rule.max_amount_per_visit = Some(v);
        }
        if let Some(v) = patch.effective_from {
            rule.effective_from = Some(v);
        }
        if let Some(v) = patch.effective_to {
            rule.effective_to = Some(v);
        }
        if let Some(v) = patch.notes {
            rule.notes = Some(v);
        }
        Ok(())
    })?;
    tx.commit()?;

    tracing::info!(rule_id = %rule_id, "Coverage rule updated");
    Ok(updated)
}

/// Changes only the value of a percentage rule.
pub fn quick_update_value(
    conn: &Connection,
    rule_id: &Uuid,
    value: f64,
    ctx: &WriteContext,
) -> Result<CoverageRule, CoverageError> {
    let tx = conn.unchecked_transaction()?;
    let updated = update_in_tx(&tx, rule_id, ctx, |rule| set_percentage(rule, value))?;
    tx.commit()?;
    Ok(updated)
}

/// Sets several percentage values under one batch id. Any failure rolls back the whole batch.
pub fn bulk_update_values(
    conn: &Connection,
    updates: &[(Uuid, f64)],
    ctx: &WriteContext,
) -> Result<Vec<CoverageRule>, CoverageError> {
    let tx = conn.unchecked_transaction()?;
    let mut updated = Vec::with_capacity(updates.len());
    for (rule_id, value) in updates {
        updated.push(update_in_tx(&tx, rule_id, ctx, |rule| set_percentage(rule, *value))?);
    }
    tx.commit()?;

    tracing::info!(batch_id = %ctx.batch_id, rules = updated.len(), "Coverage values bulk updated");
    Ok(updated)
}

fn set_percentage(rule: &mut CoverageRule, value: f64) -> Result<(), CoverageError> {
    if rule.coverage_type != CoverageType::Percentage {
        return Err(CoverageError::UnsupportedType {
            id: rule.id,
            coverage_type: rule.coverage_type,
        });
    }
    rule.coverage_value = value;
    Ok(())
}

fn update_in_tx<F>(
    conn: &Connection,
    rule_id: &Uuid,
    ctx: &WriteContext,
    change: F,
) -> Result<CoverageRule, CoverageError>
where
    F: FnOnce(&mut CoverageRule) -> Result<(), CoverageError>,
{
    let old = load_rule(conn, rule_id)?;
    let mut rule = old.clone();
    change(&mut rule)?;
    validate_rule(&rule)?;
    apply_type_rules(&mut rule);
    rule.updated_at = ctx.at;

    repository::update_coverage_rule(conn, &rule)?;
    record_history(conn, rule.id, HistoryAction::Updated, Some(&old), Some(&rule), ctx)?;
    Ok(rule)
}

/// Soft-deletes a rule.
pub fn delete_rule(conn: &Connection, rule_id: &Uuid, ctx: &WriteContext) -> Result<(), CoverageError> {
    let tx = conn.unchecked_transaction()?;
    let old = load_rule(&tx, rule_id)?;
    repository::soft_delete_coverage_rule(&tx, rule_id, &ctx.at)?;
    record_history(&tx, old.id, HistoryAction::Deleted, Some(&old), None, ctx)?;
    tx.commit()?;

    tracing::info!(rule_id = %rule_id, "Coverage rule deleted");
    Ok(())
}

/// Change history of a rule, newest first. Deleted rules keep their history.
pub fn rule_history(conn: &Connection, rule_id: &Uuid) -> Result<Vec<CoverageRuleHistory>, CoverageError> {
    let history = repository::get_rule_history(conn, rule_id)?;
    if history.is_empty() && repository::get_coverage_rule(conn, rule_id)?.is_none() {
        return Err(CoverageError::RuleNotFound(*rule_id));
    }
    Ok(history)
}
