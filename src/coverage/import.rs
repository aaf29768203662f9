//! CSV import of item-level coverage exceptions.
//!
//! Two layouts are accepted. The current one carries `coverage_type` and
//! `coverage_value`; the legacy one only `coverage_percentage`. The layout is
//! detected once from the header row, which counts as row 1.

use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use super::rules::{normalise_value, record_history, require_plan, validate_value};
use super::{derived_copay_percentage, CoverageError, WriteContext};
use crate::db::repository;
use crate::models::enums::{CoverageCategory, CoverageType, HistoryAction};
use crate::models::*;

const FIRST_DATA_ROW: usize = 2;
const ACCEPTED_TYPES: &str = "percentage, fixed, fixed_amount, full, excluded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetFormat {
    Legacy,
    Current,
}

/// One data row as read from the sheet, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedRow {
    OldFormat {
        item_code: Option<String>,
        item_name: Option<String>,
        coverage_percentage: Option<String>,
        notes: Option<String>,
    },
    NewFormat {
        item_code: Option<String>,
        item_name: Option<String>,
        coverage_type: Option<String>,
        coverage_value: Option<String>,
        tariff_amount: Option<String>,
        patient_copay_amount: Option<String>,
        notes: Option<String>,
    },
}

/// A validated row, identical whichever layout it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRowInput {
    pub item_code: String,
    pub item_description: Option<String>,
    pub coverage_type: CoverageType,
    pub coverage_value: f64,
    pub patient_copay_percentage: f64,
    pub is_covered: bool,
    pub tariff_amount: Option<f64>,
    pub patient_copay_amount: f64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub format: SheetFormat,
    pub rows: Vec<(usize, Result<ParsedRow, String>)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewRow {
    pub row: usize,
    #[serde(flatten)]
    pub input: CoverageRowInput,
    pub will_update: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub format: SheetFormat,
    pub total: usize,
    pub valid_rows: Vec<PreviewRow>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub batch_id: Uuid,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

fn parse_coverage_type(raw: &str) -> Option<CoverageType> {
    match raw.trim().to_lowercase().as_str() {
        "percentage" => Some(CoverageType::Percentage),
        "fixed" | "fixed_amount" => Some(CoverageType::Fixed),
        "full" => Some(CoverageType::Full),
        "excluded" => Some(CoverageType::Excluded),
        _ => None,
    }
}

fn parse_amount(field: &str, raw: Option<&str>) -> Result<Option<f64>, String> {
    match raw {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(Some)
            .ok_or_else(|| format!("{field} must be a non-negative number, got '{s}'")),
    }
}

impl ParsedRow {
    /// Validates the row and folds both layouts into one input. Legacy rows
    /// become percentage rules.
    pub fn normalise(self) -> Result<CoverageRowInput, String> {
        let (item_code, item_name, coverage_type, coverage_value, tariff, copay, notes) = match self {
            ParsedRow::OldFormat { item_code, item_name, coverage_percentage, notes } => {
                (item_code, item_name, Some("percentage".to_string()), coverage_percentage, None, None, notes)
            }
            ParsedRow::NewFormat {
                item_code,
                item_name,
                coverage_type,
                coverage_value,
                tariff_amount,
                patient_copay_amount,
                notes,
            } => (item_code, item_name, coverage_type, coverage_value, tariff_amount, patient_copay_amount, notes),
        };

        let item_code = item_code.ok_or_else(|| "Missing item_code".to_string())?;
        let raw_type = coverage_type.unwrap_or_default();
        let coverage_type = parse_coverage_type(&raw_type).ok_or_else(|| {
            let shown = if raw_type.is_empty() { "null" } else { raw_type.as_str() };
            format!("Invalid coverage_type: {shown}. Must be: {ACCEPTED_TYPES}")
        })?;

        let value = match coverage_type {
            CoverageType::Percentage | CoverageType::Fixed => {
                let raw = coverage_value.ok_or_else(|| "coverage_value is required".to_string())?;
                let value: f64 = raw
                    .parse()
                    .map_err(|_| format!("coverage_value must be a number, got '{raw}'"))?;
                validate_value(coverage_type, value).map_err(|e| match e {
                    CoverageError::Validation { message, .. } => format!("coverage_value {message}"),
                    other => other.to_string(),
                })?;
                value
            }
            CoverageType::Full | CoverageType::Excluded => 0.0,
        };
        let (coverage_value, is_covered) = normalise_value(coverage_type, value);

        Ok(CoverageRowInput {
            item_code,
            item_description: item_name,
            coverage_type,
            coverage_value,
            patient_copay_percentage: derived_copay_percentage(coverage_type, coverage_value),
            is_covered,
            tariff_amount: parse_amount("tariff_amount", tariff.as_deref())?,
            patient_copay_amount: parse_amount("patient_copay_amount", copay.as_deref())?.unwrap_or(0.0),
            notes,
        })
    }
}

fn normalise_header(h: &str) -> String {
    h.trim().to_lowercase().replace(' ', "_")
}

/// Reads a CSV sheet. Row numbers are sheet lines, with the header on line 1.
pub fn parse_sheet(data: &[u8]) -> Result<Sheet, CoverageError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(data);

    let header: Vec<String> = reader.headers()?.iter().map(normalise_header).collect();
    let column = |name: &str| header.iter().position(|h| h == name);

    let item_code_col = column("item_code")
        .ok_or_else(|| CoverageError::validation("file", "header must contain item_code"))?;
    let format = if column("coverage_type").is_some() {
        SheetFormat::Current
    } else if column("coverage_percentage").is_some() {
        SheetFormat::Legacy
    } else {
        return Err(CoverageError::validation(
            "file",
            "header must contain coverage_type or coverage_percentage",
        ));
    };

    let cols = [
        "item_name",
        "coverage_type",
        "coverage_value",
        "coverage_percentage",
        "tariff_amount",
        "patient_copay_amount",
        "notes",
    ]
    .map(column);
    let [name_col, type_col, value_col, pct_col, tariff_col, copay_col, notes_col] = cols;

    let mut rows = Vec::new();
    let mut last_row = FIRST_DATA_ROW - 1;
    for record in reader.records() {
        // Blank lines are skipped by the reader, so count from its line position.
        let line = match &record {
            Ok(record) => record.position(),
            Err(e) => e.position(),
        };
        let row = line
            .and_then(|p| usize::try_from(p.line()).ok())
            .unwrap_or(last_row + 1);
        last_row = row;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                rows.push((row, Err(format!("Unreadable row: {e}"))));
                continue;
            }
        };
        let cell = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let parsed = match format {
            SheetFormat::Legacy => ParsedRow::OldFormat {
                item_code: cell(Some(item_code_col)),
                item_name: cell(name_col),
                coverage_percentage: cell(pct_col),
                notes: cell(notes_col),
            },
            SheetFormat::Current => ParsedRow::NewFormat {
                item_code: cell(Some(item_code_col)),
                item_name: cell(name_col),
                coverage_type: cell(type_col),
                coverage_value: cell(value_col),
                tariff_amount: cell(tariff_col),
                patient_copay_amount: cell(copay_col),
                notes: cell(notes_col),
            },
        };
        rows.push((row, Ok(parsed)));
    }

    Ok(Sheet { format, rows })
}

/// Validates every row of a sheet against the catalog of `category`.
fn validate_sheet(
    conn: &Connection,
    category: CoverageCategory,
    sheet: Sheet,
) -> Result<(Vec<(usize, CoverageRowInput)>, Vec<RowError>), CoverageError> {
    let mut valid = Vec::new();
    let mut errors = Vec::new();

    for (row, parsed) in sheet.rows {
        let input = match parsed.and_then(ParsedRow::normalise) {
            Ok(input) => input,
            Err(error) => {
                errors.push(RowError { row, error });
                continue;
            }
        };
        if category.has_catalog() && !repository::catalog_item_exists(conn, category, &input.item_code)? {
            errors.push(RowError {
                row,
                error: format!("Item code {} not found in {} catalog", input.item_code, category),
            });
            continue;
        }
        valid.push((row, input));
    }
    Ok((valid, errors))
}

/// Validates a sheet without writing, reporting which rows would replace an existing exception.
pub fn preview_import(
    conn: &Connection,
    plan_id: &Uuid,
    category: CoverageCategory,
    data: &[u8],
) -> Result<ImportPreview, CoverageError> {
    require_plan(conn, plan_id)?;
    let sheet = parse_sheet(data)?;
    let format = sheet.format;
    let total = sheet.rows.len();
    let (valid, errors) = validate_sheet(conn, category, sheet)?;

    let mut valid_rows = Vec::with_capacity(valid.len());
    for (row, input) in valid {
        let will_update = repository::find_live_rule(conn, plan_id, category, Some(&input.item_code))?.is_some();
        valid_rows.push(PreviewRow { row, input, will_update });
    }

    Ok(ImportPreview {
        format,
        total,
        valid_rows,
        errors,
    })
}

/// Upserts the exception rule of every valid row. Invalid rows are skipped
/// and reported; all writes share the batch id of `ctx`.
pub fn import_coverage(
    conn: &Connection,
    plan_id: &Uuid,
    category: CoverageCategory,
    data: &[u8],
    ctx: &WriteContext,
) -> Result<ImportSummary, CoverageError> {
    require_plan(conn, plan_id)?;
    let sheet = parse_sheet(data)?;
    let (valid, errors) = validate_sheet(conn, category, sheet)?;

    for err in &errors {
        tracing::warn!(row = err.row, error = %err.error, "Coverage import row skipped");
    }

    let mut summary = ImportSummary {
        batch_id: ctx.batch_id,
        skipped: errors.len(),
        errors,
        ..ImportSummary::default()
    };

    let tx = conn.unchecked_transaction()?;
    for (_, input) in valid {
        match repository::find_live_rule(&tx, plan_id, category, Some(&input.item_code))? {
            Some(existing) => {
                let mut rule = existing.clone();
                apply_row(&mut rule, input, ctx);
                repository::update_coverage_rule(&tx, &rule)?;
                record_history(&tx, rule.id, HistoryAction::Updated, Some(&existing), Some(&rule), ctx)?;
                summary.updated += 1;
            }
            None => {
                let mut rule = CoverageRule {
                    id: Uuid::new_v4(),
                    plan_id: *plan_id,
                    category,
                    item_code: Some(input.item_code.clone()),
                    item_description: None,
                    coverage_type: input.coverage_type,
                    coverage_value: 0.0,
                    patient_copay_percentage: 0.0,
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
                    created_at: ctx.at,
                    updated_at: ctx.at,
                    deleted_at: None,
                };
                apply_row(&mut rule, input, ctx);
                repository::insert_coverage_rule(&tx, &rule)?;
                record_history(&tx, rule.id, HistoryAction::Created, None, Some(&rule), ctx)?;
                summary.created += 1;
            }
        }
    }
    tx.commit()?;

    tracing::info!(
        plan_id = %plan_id,
        category = %category,
        batch_id = %ctx.batch_id,
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "Coverage import finished"
    );
    Ok(summary)
}

fn apply_row(rule: &mut CoverageRule, input: CoverageRowInput, ctx: &WriteContext) {
    rule.item_description = input.item_description;
    rule.coverage_type = input.coverage_type;
    rule.coverage_value = input.coverage_value;
    rule.patient_copay_percentage = input.patient_copay_percentage;
    rule.patient_copay_amount = input.patient_copay_amount;
    rule.tariff_amount = input.tariff_amount;
    rule.is_covered = input.is_covered;
    rule.is_active = true;
    rule.effective_from = Some(ctx.at.date());
    rule.notes = input.notes;
    rule.updated_at = ctx.at;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use crate::db::sqlite::open_memory_database;

    fn ctx() -> WriteContext {
        let at = NaiveDateTime::parse_from_str("2025-05-02 14:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        WriteContext::new("billing-2", at)
    }

    fn setup() -> (Connection, Uuid) {
        let conn = open_memory_database().unwrap();
        let plan = InsurancePlan {
            id: Uuid::new_v4(),
            name: "Family Cover".into(),
            consultation_default: None,
            drugs_default: Some(50.0),
            labs_default: None,
            procedures_default: None,
        };
        repository::insert_plan(&conn, &plan).unwrap();
        for (code, name, price) in [("AMOX500", "Amoxicillin 500mg", 4.2), ("PARA500", "Paracetamol 500mg", 0.5)] {
            repository::upsert_catalog_item(&conn, &CatalogItem {
                category: CoverageCategory::Drug,
                item_code: code.into(),
                item_name: name.into(),
                current_price: price,
            })
            .unwrap();
        }
        (conn, plan.id)
    }

    #[test]
    fn unknown_coverage_type_reported_at_sheet_row() {
        let (conn, plan_id) = setup();
        let csv = "item_code,item_name,current_price,coverage_type,coverage_value,notes\n\
                   AMOX500,Amoxicillin,4.20,percentage,80,\n\
                   PARA500,Paracetamol,0.50,generous,90,\n";
        let summary = import_coverage(&conn, &plan_id, CoverageCategory::Drug, csv.as_bytes(), &ctx()).unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors[0].row, 3);
        assert!(summary.errors[0].error.contains("generous"));
    }

    #[test]
    fn row_numbers_survive_blank_lines() {
        let (conn, plan_id) = setup();
        let csv = "item_code,coverage_type,coverage_value\n\
                   AMOX500,percentage,80\n\
                   \n\
                   PARA500,generous,90\n";

        let sheet = parse_sheet(csv.as_bytes()).unwrap();
        let rows: Vec<usize> = sheet.rows.iter().map(|(row, _)| *row).collect();
        assert_eq!(rows, vec![2, 4]);

        let summary = import_coverage(&conn, &plan_id, CoverageCategory::Drug, csv.as_bytes(), &ctx()).unwrap();
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].row, 4);
    }

    #[test]
    fn legacy_row_matches_equivalent_current_row() {
        let legacy = parse_sheet(b"item_code,coverage_percentage\nAMOX500,75\n").unwrap();
        let current = parse_sheet(b"item_code,coverage_type,coverage_value\nAMOX500,percentage,75\n").unwrap();
        assert_eq!(legacy.format, SheetFormat::Legacy);
        assert_eq!(current.format, SheetFormat::Current);

        let from_legacy = legacy.rows[0].1.clone().unwrap().normalise().unwrap();
        let from_current = current.rows[0].1.clone().unwrap().normalise().unwrap();
        assert_eq!(from_legacy, from_current);
        assert_eq!(from_legacy.coverage_type, CoverageType::Percentage);
        assert_eq!(from_legacy.coverage_value, 75.0);
        assert_eq!(from_legacy.patient_copay_percentage, 25.0);
    }

    #[test]
    fn type_mapping_and_aliases() {
        let sheet = parse_sheet(
            b"Item Code,Coverage Type,Coverage Value\n\
              A,fixed_amount,30\n\
              B,full,12\n\
              C,excluded,\n\
              D,Percentage,101\n\
              ,percentage,50\n",
        )
        .unwrap();
        let results: Vec<_> = sheet.rows.into_iter().map(|(_, r)| r.and_then(ParsedRow::normalise)).collect();

        let fixed = results[0].as_ref().unwrap();
        assert_eq!((fixed.coverage_type, fixed.coverage_value, fixed.patient_copay_percentage), (CoverageType::Fixed, 30.0, 0.0));
        let full = results[1].as_ref().unwrap();
        assert_eq!((full.coverage_value, full.is_covered), (100.0, true));
        let excluded = results[2].as_ref().unwrap();
        assert_eq!((excluded.coverage_value, excluded.patient_copay_percentage, excluded.is_covered), (0.0, 100.0, false));
        assert!(results[3].as_ref().unwrap_err().contains("between 0 and 100"));
        assert_eq!(results[4].as_ref().unwrap_err(), "Missing item_code");
    }

    #[test]
    fn catalog_checked_for_drugs_only() {
        let (conn, plan_id) = setup();
        let csv = b"item_code,coverage_type,coverage_value\nUNKNOWN1,full,\n";
        let summary = import_coverage(&conn, &plan_id, CoverageCategory::Drug, csv, &ctx()).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors[0].row, 2);

        let summary = import_coverage(&conn, &plan_id, CoverageCategory::Procedure, csv, &ctx()).unwrap();
        assert_eq!(summary.created, 1);
    }

    #[test]
    fn reimport_updates_and_shares_batch() {
        let (conn, plan_id) = setup();
        let first = b"item_code,coverage_percentage\nAMOX500,60\nPARA500,70\n";
        import_coverage(&conn, &plan_id, CoverageCategory::Drug, first, &ctx()).unwrap();

        let second_ctx = ctx();
        let second = b"item_code,coverage_type,coverage_value,tariff_amount\nAMOX500,fixed,2.5,3.80\n";
        let summary = import_coverage(&conn, &plan_id, CoverageCategory::Drug, second, &second_ctx).unwrap();
        assert_eq!((summary.created, summary.updated), (0, 1));

        let rule = repository::find_live_rule(&conn, &plan_id, CoverageCategory::Drug, Some("AMOX500"))
            .unwrap()
            .unwrap();
        assert_eq!(rule.coverage_type, CoverageType::Fixed);
        assert_eq!(rule.tariff_amount, Some(3.8));

        let batch = repository::get_batch_history(&conn, &second_ctx.batch_id).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, HistoryAction::Updated);
    }

    #[test]
    fn preview_writes_nothing() {
        let (conn, plan_id) = setup();
        import_coverage(&conn, &plan_id, CoverageCategory::Drug, b"item_code,coverage_percentage\nAMOX500,60\n", &ctx())
            .unwrap();

        let csv = b"item_code,coverage_type,coverage_value\nAMOX500,full,\nPARA500,percentage,80\nNOPE,full,\n";
        let preview = preview_import(&conn, &plan_id, CoverageCategory::Drug, csv).unwrap();
        assert_eq!(preview.total, 3);
        assert_eq!(preview.valid_rows.len(), 2);
        assert!(preview.valid_rows[0].will_update);
        assert!(!preview.valid_rows[1].will_update);
        assert_eq!(preview.errors[0].row, 4);

        assert!(repository::find_live_rule(&conn, &plan_id, CoverageCategory::Drug, Some("PARA500"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn header_without_coverage_columns_rejected() {
        let err = parse_sheet(b"item_code,price\nA,1\n").unwrap_err();
        assert!(matches!(err, CoverageError::Validation { ref field, .. } if field == "file"));
    }
}
