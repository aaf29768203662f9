//! Insurance coverage: claim-line calculation, rule administration and
//! tabular import/export of item exceptions.

pub mod calculator;
pub mod export;
pub mod import;
pub mod rules;

pub use calculator::*;
pub use export::*;
pub use import::*;
pub use rules::*;

use chrono::NaiveDateTime;
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{CoverageCategory, CoverageType};

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("Insurance plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Coverage rule not found: {0}")]
    RuleNotFound(Uuid),

    #[error("A live {category} rule for item {} already exists", .item_code.as_deref().unwrap_or("(general)"))]
    DuplicateRule {
        category: CoverageCategory,
        item_code: Option<String>,
    },

    #[error("Rule {id} is {coverage_type}; only percentage rules take a quick value update")]
    UnsupportedType { id: Uuid, coverage_type: CoverageType },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for CoverageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}

/// Who is writing, when, and which batch the writes belong to.
/// Every rule write appends history under `batch_id`.
#[derive(Debug, Clone)]
pub struct WriteContext {
    pub actor_id: String,
    pub batch_id: Uuid,
    pub at: NaiveDateTime,
}

impl WriteContext {
    /// A context with a fresh batch id.
    pub fn new(actor_id: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            actor_id: actor_id.into(),
            batch_id: Uuid::new_v4(),
            at,
        }
    }
}
