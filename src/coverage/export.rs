use std::collections::HashMap;

use rusqlite::Connection;
use uuid::Uuid;

use super::rules::require_plan;
use super::CoverageError;
use crate::db::repository;
use crate::models::enums::{CoverageCategory, CoverageType};

pub const TEMPLATE_HEADER: [&str; 6] = [
    "item_code",
    "item_name",
    "current_price",
    "coverage_type",
    "coverage_value",
    "notes",
];

const FALLBACK_PERCENTAGE: f64 = 80.0;

fn template_type(coverage_type: CoverageType) -> &'static str {
    match coverage_type {
        CoverageType::Fixed => "fixed_amount",
        other => other.as_str(),
    }
}

/// A fill-in sheet with one line per catalog item of `category`. Items with
/// an exception carry its values; the rest are pre-filled from the general
/// rule, or 80% when the category has none.
pub fn coverage_template(
    conn: &Connection,
    plan_id: &Uuid,
    category: CoverageCategory,
) -> Result<String, CoverageError> {
    require_plan(conn, plan_id)?;

    let rules = repository::get_plan_rules(conn, plan_id, Some(category))?;
    let (default_type, default_value) = rules
        .iter()
        .find(|r| r.item_code.is_none())
        .map(|r| (r.coverage_type, r.coverage_value))
        .unwrap_or((CoverageType::Percentage, FALLBACK_PERCENTAGE));
    let exceptions: HashMap<&str, _> = rules
        .iter()
        .filter_map(|r| r.item_code.as_deref().map(|code| (code, r)))
        .collect();

    let items = repository::get_catalog_items(conn, category)?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(TEMPLATE_HEADER)?;
    for item in &items {
        let price = format!("{:.2}", item.current_price);
        // Shortest exact form, so a re-import restores the stored value.
        let (coverage_type, value, notes) = match exceptions.get(item.item_code.as_str()) {
            Some(rule) => (rule.coverage_type, rule.coverage_value, rule.notes.clone().unwrap_or_default()),
            None => (default_type, default_value, String::new()),
        };
        writer.write_record([
            item.item_code.as_str(),
            item.item_name.as_str(),
            price.as_str(),
            template_type(coverage_type),
            value.to_string().as_str(),
            notes.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CoverageError::validation("template", e.error().to_string()))?;
    tracing::debug!(plan_id = %plan_id, category = %category, items = items.len(), "Coverage template built");
    String::from_utf8(bytes).map_err(|e| CoverageError::validation("template", e.to_string()))
}
