//! Repository layer: entity-scoped database operations.
//!
//! Coverage administration and ward medication each get their own
//! sub-modules. All public functions are re-exported here.

mod administration;
mod catalog;
mod coverage_history;
mod coverage_rule;
mod plan;
mod prescription;

pub use administration::*;
pub use catalog::*;
pub use coverage_history::*;
pub use coverage_rule::*;
pub use plan::*;
pub use prescription::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use crate::db::sqlite::open_memory_database;
    use crate::db::DatabaseError;
    use crate::models::*;
    use crate::models::enums::*;
    use crate::schedule::SchedulePattern;
    use rusqlite::Connection;
    use uuid::Uuid;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn hm(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn make_plan(conn: &Connection) -> InsurancePlan {
        let plan = InsurancePlan {
            id: Uuid::new_v4(),
            name: "Corporate Gold".into(),
            consultation_default: Some(80.0),
            drugs_default: Some(70.0),
            labs_default: None,
            procedures_default: None,
        };
        insert_plan(conn, &plan).unwrap();
        plan
    }

    fn make_rule(plan_id: Uuid, item_code: Option<&str>) -> CoverageRule {
        CoverageRule {
            id: Uuid::new_v4(),
            plan_id,
            category: CoverageCategory::Drug,
            item_code: item_code.map(String::from),
            item_description: None,
            coverage_type: CoverageType::Percentage,
            coverage_value: 80.0,
            patient_copay_percentage: 20.0,
            patient_copay_amount: 0.0,
            tariff_amount: None,
            is_covered: true,
            is_active: true,
            requires_preauthorization: false,
            max_quantity_per_visit: None,
            max_amount_per_visit: None,
            effective_from: None,
            effective_to: None,
            notes: None,
            created_at: ts("2025-01-10 08:00:00"),
            updated_at: ts("2025-01-10 08:00:00"),
            deleted_at: None,
        }
    }

    fn make_prescription(conn: &Connection) -> Prescription {
        let rx = Prescription {
            id: Uuid::new_v4(),
            admission_id: Uuid::new_v4(),
            drug_name: "Amoxicillin 500mg".into(),
            frequency: "BID".into(),
            duration: "5 days".into(),
            dose_quantity: "1".into(),
            schedule_pattern: None,
            discontinuation: None,
            created_at: ts("2025-01-10 09:00:00"),
        };
        insert_prescription(conn, &rx).unwrap();
        rx
    }

    #[test]
    fn plan_insert_and_retrieve() {
        let conn = test_db();
        let plan = make_plan(&conn);
        let loaded = get_plan(&conn, &plan.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Corporate Gold");
        assert_eq!(loaded.category_default(CoverageCategory::Drug), Some(70.0));
        assert!(get_plan(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn coverage_rule_round_trip_preserves_optional_fields() {
        let conn = test_db();
        let plan = make_plan(&conn);
        let mut rule = make_rule(plan.id, Some("AMOX500"));
        rule.tariff_amount = Some(12.5);
        rule.max_quantity_per_visit = Some(30);
        rule.effective_from = NaiveDate::from_ymd_opt(2025, 1, 1);
        insert_coverage_rule(&conn, &rule).unwrap();

        let loaded = get_coverage_rule(&conn, &rule.id).unwrap().unwrap();
        assert_eq!(loaded, rule);
    }

    #[test]
    fn find_live_rule_separates_general_from_exception() {
        let conn = test_db();
        let plan = make_plan(&conn);
        let general = make_rule(plan.id, None);
        let exception = make_rule(plan.id, Some("AMOX500"));
        insert_coverage_rule(&conn, &general).unwrap();
        insert_coverage_rule(&conn, &exception).unwrap();

        let found = find_live_rule(&conn, &plan.id, CoverageCategory::Drug, None).unwrap().unwrap();
        assert_eq!(found.id, general.id);
        let found = find_live_rule(&conn, &plan.id, CoverageCategory::Drug, Some("AMOX500"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, exception.id);
        assert!(find_live_rule(&conn, &plan.id, CoverageCategory::Lab, None).unwrap().is_none());
    }

    #[test]
    fn soft_deleted_rule_is_invisible() {
        let conn = test_db();
        let plan = make_plan(&conn);
        let rule = make_rule(plan.id, Some("AMOX500"));
        insert_coverage_rule(&conn, &rule).unwrap();

        soft_delete_coverage_rule(&conn, &rule.id, &ts("2025-02-01 10:00:00")).unwrap();
        assert!(get_coverage_rule(&conn, &rule.id).unwrap().is_none());
        assert!(get_plan_rules(&conn, &plan.id, None).unwrap().is_empty());

        let again = soft_delete_coverage_rule(&conn, &rule.id, &ts("2025-02-01 10:00:00"));
        assert!(matches!(again, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn active_rules_put_latest_effective_first() {
        let conn = test_db();
        let plan = make_plan(&conn);
        let mut undated = make_rule(plan.id, None);
        undated.coverage_value = 50.0;
        let mut dated = make_rule(plan.id, None);
        dated.effective_from = NaiveDate::from_ymd_opt(2025, 1, 1);
        insert_coverage_rule(&conn, &undated).unwrap();
        insert_coverage_rule(&conn, &dated).unwrap();

        let rules = get_active_rules(&conn, &plan.id, CoverageCategory::Drug, None).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, dated.id);
    }

    #[test]
    fn history_lists_newest_first_and_groups_by_batch() {
        let conn = test_db();
        let plan = make_plan(&conn);
        let rule = make_rule(plan.id, None);
        insert_coverage_rule(&conn, &rule).unwrap();
        let batch = Uuid::new_v4();

        for (action, at) in [
            (HistoryAction::Created, "2025-01-10 08:00:00"),
            (HistoryAction::Updated, "2025-01-11 08:00:00"),
        ] {
            insert_history_entry(&conn, &CoverageRuleHistory {
                id: Uuid::new_v4(),
                rule_id: rule.id,
                action,
                actor_id: "user-7".into(),
                old_values: None,
                new_values: Some(serde_json::json!({"coverage_value": 80.0})),
                batch_id: batch,
                created_at: ts(at),
            }).unwrap();
        }

        let history = get_rule_history(&conn, &rule.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, HistoryAction::Updated);
        assert_eq!(get_batch_history(&conn, &batch).unwrap().len(), 2);
    }

    #[test]
    fn catalog_lookup_is_per_category() {
        let conn = test_db();
        upsert_catalog_item(&conn, &CatalogItem {
            category: CoverageCategory::Drug,
            item_code: "PARA500".into(),
            item_name: "Paracetamol 500mg".into(),
            current_price: 2.5,
        }).unwrap();

        assert!(catalog_item_exists(&conn, CoverageCategory::Drug, "PARA500").unwrap());
        assert!(!catalog_item_exists(&conn, CoverageCategory::Lab, "PARA500").unwrap());
        assert_eq!(get_catalog_items(&conn, CoverageCategory::Drug).unwrap().len(), 1);
    }

    #[test]
    fn prescription_pattern_and_discontinuation_persist() {
        let conn = test_db();
        let rx = make_prescription(&conn);
        let pattern = SchedulePattern::new(vec![hm("10:30"), hm("18:00")], vec![hm("06:00"), hm("18:00")]);
        update_schedule_pattern(&conn, &rx.id, &pattern).unwrap();

        let stop = Discontinuation {
            discontinued_at: ts("2025-01-12 11:00:00"),
            discontinued_by: "dr-1".into(),
            reason: "Allergic reaction observed".into(),
        };
        mark_discontinued(&conn, &rx.id, &stop).unwrap();

        let loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        assert_eq!(loaded.schedule_pattern, Some(pattern));
        assert_eq!(loaded.discontinuation, Some(stop.clone()));

        let twice = mark_discontinued(&conn, &rx.id, &stop);
        assert!(matches!(twice, Err(DatabaseError::ConstraintViolation(_))));
    }

    #[test]
    fn cancel_future_scheduled_leaves_past_and_given_rows() {
        let conn = test_db();
        let rx = make_prescription(&conn);
        let past = MedicationAdministration::scheduled(rx.id, rx.admission_id, ts("2025-01-10 06:00:00"), "1");
        let mut given = MedicationAdministration::scheduled(rx.id, rx.admission_id, ts("2025-01-11 06:00:00"), "1");
        given.status = AdministrationStatus::Given;
        let future = MedicationAdministration::scheduled(rx.id, rx.admission_id, ts("2025-01-11 18:00:00"), "1");
        for admin in [&past, &given, &future] {
            insert_administration(&conn, admin).unwrap();
        }

        let cancelled = cancel_future_scheduled(&conn, &rx.id, &ts("2025-01-10 12:00:00")).unwrap();
        assert_eq!(cancelled, 1);

        let rows = get_administrations_for_prescription(&conn, &rx.id).unwrap();
        let statuses: Vec<_> = rows.iter().map(|a| a.status).collect();
        assert_eq!(statuses, vec![
            AdministrationStatus::Scheduled,
            AdministrationStatus::Given,
            AdministrationStatus::Cancelled,
        ]);
    }

    #[test]
    fn reschedule_and_outcome_only_touch_scheduled_rows() {
        let conn = test_db();
        let rx = make_prescription(&conn);
        let admin = MedicationAdministration::scheduled(rx.id, rx.admission_id, ts("2025-01-11 06:00:00"), "1");
        insert_administration(&conn, &admin).unwrap();

        assert!(reschedule_administration(&conn, &admin.id, &ts("2025-01-11 07:00:00")).unwrap());
        let moved = get_administration(&conn, &admin.id).unwrap().unwrap();
        assert!(moved.is_adjusted);
        assert_eq!(moved.scheduled_time, ts("2025-01-11 07:00:00"));

        let recorded = record_administration_outcome(
            &conn, &admin.id, AdministrationStatus::Given, &ts("2025-01-11 07:05:00"), "nurse-3", None, None,
        ).unwrap();
        assert!(recorded);
        let given = get_administration(&conn, &admin.id).unwrap().unwrap();
        assert_eq!(given.dosage_given.as_deref(), Some("1"));
        assert_eq!(given.administered_by.as_deref(), Some("nurse-3"));

        assert!(!reschedule_administration(&conn, &admin.id, &ts("2025-01-11 08:00:00")).unwrap());
    }

    #[test]
    fn adjustments_list_newest_first() {
        let conn = test_db();
        let rx = make_prescription(&conn);
        let admin = MedicationAdministration::scheduled(rx.id, rx.admission_id, ts("2025-01-11 06:00:00"), "1");
        insert_administration(&conn, &admin).unwrap();

        for (to, at) in [("2025-01-11 07:00:00", "2025-01-10 10:00:00"), ("2025-01-11 08:00:00", "2025-01-10 11:00:00")] {
            insert_adjustment(&conn, &ScheduleAdjustment {
                id: Uuid::new_v4(),
                administration_id: admin.id,
                original_time: ts("2025-01-11 06:00:00"),
                adjusted_time: ts(to),
                reason: None,
                adjusted_by: "nurse-3".into(),
                created_at: ts(at),
            }).unwrap();
        }

        let history = get_adjustments(&conn, &admin.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].adjusted_time, ts("2025-01-11 08:00:00"));
    }
}
