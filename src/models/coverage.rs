use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{CoverageCategory, CoverageType, HistoryAction};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsurancePlan {
    pub id: Uuid,
    pub name: String,
    pub consultation_default: Option<f64>,
    pub drugs_default: Option<f64>,
    pub labs_default: Option<f64>,
    pub procedures_default: Option<f64>,
}

impl InsurancePlan {
    /// Plan-level default coverage percentage for a category.
    /// Ward and nursing never carry a plan default.
    pub fn category_default(&self, category: CoverageCategory) -> Option<f64> {
        match category {
            CoverageCategory::Consultation => self.consultation_default,
            CoverageCategory::Drug => self.drugs_default,
            CoverageCategory::Lab => self.labs_default,
            CoverageCategory::Procedure => self.procedures_default,
            CoverageCategory::Ward | CoverageCategory::Nursing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageRule {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub category: CoverageCategory,
    /// `None` marks the general rule for the category.
    pub item_code: Option<String>,
    pub item_description: Option<String>,
    pub coverage_type: CoverageType,
    pub coverage_value: f64,
    pub patient_copay_percentage: f64,
    pub patient_copay_amount: f64,
    pub tariff_amount: Option<f64>,
    pub is_covered: bool,
    pub is_active: bool,
    pub requires_preauthorization: bool,
    pub max_quantity_per_visit: Option<u32>,
    pub max_amount_per_visit: Option<f64>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl CoverageRule {
    pub fn is_exception(&self) -> bool {
        self.item_code.is_some()
    }

    /// Whether the rule's effective window contains `date` (open ends are unbounded).
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        let after_start = self.effective_from.map_or(true, |from| from <= date);
        let before_end = self.effective_to.map_or(true, |to| to >= date);
        after_start && before_end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageRuleHistory {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub action: HistoryAction,
    pub actor_id: String,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub batch_id: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub category: CoverageCategory,
    pub item_code: String,
    pub item_name: String,
    pub current_price: f64,
}
