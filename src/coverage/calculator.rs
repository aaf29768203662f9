use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CoverageError;
use crate::db::repository;
use crate::models::enums::{CoverageCategory, CoverageType};
use crate::models::*;

/// Insurer/patient division of one charged amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageSplit {
    pub insurer_amount: f64,
    pub patient_amount: f64,
    pub copay_percentage: f64,
}

/// Splits `amount` between insurer and patient under one coverage type.
pub fn split(coverage_type: CoverageType, coverage_value: f64, amount: f64) -> CoverageSplit {
    match coverage_type {
        CoverageType::Full => CoverageSplit {
            insurer_amount: amount,
            patient_amount: 0.0,
            copay_percentage: 0.0,
        },
        CoverageType::Excluded => CoverageSplit {
            insurer_amount: 0.0,
            patient_amount: amount,
            copay_percentage: 100.0,
        },
        CoverageType::Percentage => {
            let insurer = amount * coverage_value / 100.0;
            CoverageSplit {
                insurer_amount: insurer,
                patient_amount: amount - insurer,
                copay_percentage: 100.0 - coverage_value,
            }
        }
        CoverageType::Fixed => {
            let insurer = coverage_value.min(amount);
            let patient = amount - insurer;
            CoverageSplit {
                insurer_amount: insurer,
                patient_amount: patient,
                copay_percentage: if amount == 0.0 { 0.0 } else { patient / amount * 100.0 },
            }
        }
    }
}

/// Copay percentage stored on a rule. Fixed rules store 0 because their
/// copay depends on the charged price.
pub fn derived_copay_percentage(coverage_type: CoverageType, coverage_value: f64) -> f64 {
    match coverage_type {
        CoverageType::Percentage => 100.0 - coverage_value,
        CoverageType::Fixed | CoverageType::Full => 0.0,
        CoverageType::Excluded => 100.0,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Specific,
    General,
    PlanDefault,
    #[serde(rename = "none")]
    NoRule,
}

/// The rule terms that apply to a claim line, whether stored or derived
/// from a plan default.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicableRule {
    pub kind: RuleKind,
    pub rule_id: Option<Uuid>,
    pub coverage_type: CoverageType,
    pub coverage_value: f64,
    pub patient_copay_amount: f64,
    pub tariff_amount: Option<f64>,
    pub is_covered: bool,
    pub requires_preauthorization: bool,
    pub max_quantity_per_visit: Option<u32>,
    pub max_amount_per_visit: Option<f64>,
}

impl ApplicableRule {
    pub fn from_rule(kind: RuleKind, rule: &CoverageRule) -> Self {
        Self {
            kind,
            rule_id: Some(rule.id),
            coverage_type: rule.coverage_type,
            coverage_value: rule.coverage_value,
            patient_copay_amount: rule.patient_copay_amount,
            tariff_amount: rule.tariff_amount,
            is_covered: rule.is_covered,
            requires_preauthorization: rule.requires_preauthorization,
            max_quantity_per_visit: rule.max_quantity_per_visit,
            max_amount_per_visit: rule.max_amount_per_visit,
        }
    }

    /// Terms derived from a plan's category default. A 0% default means the
    /// category is not covered.
    pub fn plan_default(percentage: f64) -> Self {
        Self {
            kind: RuleKind::PlanDefault,
            rule_id: None,
            coverage_type: CoverageType::Percentage,
            coverage_value: percentage,
            patient_copay_amount: 0.0,
            tariff_amount: None,
            is_covered: percentage > 0.0,
            requires_preauthorization: false,
            max_quantity_per_visit: None,
            max_amount_per_visit: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoverageRequest {
    pub category: CoverageCategory,
    pub item_code: String,
    pub amount: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Service date; rules are matched on their effective window.
    pub date: NaiveDate,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageQuote {
    pub is_covered: bool,
    pub insurer_amount: f64,
    pub patient_amount: f64,
    pub coverage_percentage: f64,
    pub rule_kind: RuleKind,
    pub rule_id: Option<Uuid>,
    pub coverage_type: CoverageType,
    pub unit_price: f64,
    pub subtotal: f64,
    pub requires_preauthorization: bool,
    pub exceeded_limit: bool,
    pub limit_message: Option<String>,
}

/// Prices one claim line against the rule that applies to it.
pub fn quote(rule: Option<&ApplicableRule>, amount: f64, quantity: u32) -> CoverageQuote {
    let qty = f64::from(quantity);
    let unit_price = rule.and_then(|r| r.tariff_amount).unwrap_or(amount);
    let subtotal = unit_price * qty;

    let rule = match rule {
        Some(rule) if rule.is_covered => rule,
        _ => {
            return CoverageQuote {
                is_covered: false,
                insurer_amount: 0.0,
                patient_amount: round2(subtotal),
                coverage_percentage: 0.0,
                rule_kind: RuleKind::NoRule,
                rule_id: None,
                coverage_type: CoverageType::Excluded,
                unit_price,
                subtotal,
                requires_preauthorization: false,
                exceeded_limit: false,
                limit_message: None,
            }
        }
    };

    let mut limit_message = None;
    if let Some(max_qty) = rule.max_quantity_per_visit.filter(|m| *m > 0) {
        if quantity > max_qty {
            limit_message = Some(format!("Quantity {quantity} exceeds plan limit of {max_qty} per visit"));
        }
    }

    // Fixed coverage is per unit.
    let value = match rule.coverage_type {
        CoverageType::Fixed => rule.coverage_value * qty,
        _ => rule.coverage_value,
    };
    let parts = split(rule.coverage_type, value, subtotal);

    let mut insurer = parts.insurer_amount;
    let mut patient = parts.patient_amount + rule.patient_copay_amount * qty;

    if let Some(cap) = rule.max_amount_per_visit.filter(|m| *m > 0.0) {
        if insurer > cap {
            limit_message = Some(format!("Insurance coverage amount exceeds plan limit of {cap} per visit"));
            insurer = cap;
            patient = subtotal - cap;
        }
    }

    let coverage_percentage = match rule.coverage_type {
        CoverageType::Full => 100.0,
        CoverageType::Excluded => 0.0,
        CoverageType::Percentage => rule.coverage_value,
        CoverageType::Fixed if subtotal > 0.0 => parts.insurer_amount / subtotal * 100.0,
        CoverageType::Fixed => 0.0,
    };

    CoverageQuote {
        is_covered: true,
        insurer_amount: round2(insurer),
        patient_amount: round2(patient),
        coverage_percentage: round2(coverage_percentage),
        rule_kind: rule.kind,
        rule_id: rule.rule_id,
        coverage_type: rule.coverage_type,
        unit_price,
        subtotal,
        requires_preauthorization: rule.requires_preauthorization,
        exceeded_limit: limit_message.is_some(),
        limit_message,
    }
}

/// Finds the rule for an item on a date: the item's own exception, then the
/// category's general rule, then the plan's category default.
pub fn resolve_rule(
    conn: &Connection,
    plan: &InsurancePlan,
    category: CoverageCategory,
    item_code: &str,
    date: NaiveDate,
) -> Result<Option<ApplicableRule>, CoverageError> {
    let specific = repository::get_active_rules(conn, &plan.id, category, Some(item_code))?;
    if let Some(rule) = specific.iter().find(|r| r.is_effective_on(date)) {
        return Ok(Some(ApplicableRule::from_rule(RuleKind::Specific, rule)));
    }

    let general = repository::get_active_rules(conn, &plan.id, category, None)?;
    if let Some(rule) = general.iter().find(|r| r.is_effective_on(date)) {
        return Ok(Some(ApplicableRule::from_rule(RuleKind::General, rule)));
    }

    Ok(plan.category_default(category).map(ApplicableRule::plan_default))
}

/// Full claim-line coverage for one item under a plan.
pub fn calculate_coverage(
    conn: &Connection,
    plan_id: &Uuid,
    request: &CoverageRequest,
) -> Result<CoverageQuote, CoverageError> {
    if !request.amount.is_finite() || request.amount < 0.0 {
        return Err(CoverageError::validation("amount", "must be a non-negative number"));
    }
    if request.quantity == 0 {
        return Err(CoverageError::validation("quantity", "must be at least 1"));
    }
    let item_code = request.item_code.trim();
    if item_code.is_empty() {
        return Err(CoverageError::validation("item_code", "is required"));
    }

    let plan = repository::get_plan(conn, plan_id)?.ok_or(CoverageError::PlanNotFound(*plan_id))?;
    let rule = resolve_rule(conn, &plan, request.category, item_code, request.date)?;
    Ok(quote(rule.as_ref(), request.amount, request.quantity))
}
