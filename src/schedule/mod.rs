//! Inpatient medication schedules: frequency codes, day patterns, slot
//! generation and the persisted administration workflow.

pub mod defaults;
pub mod duration;
pub mod frequency;
pub mod generator;
pub mod pattern;
pub mod service;

pub use defaults::*;
pub use duration::*;
pub use frequency::*;
pub use generator::*;
pub use pattern::*;
pub use service::*;

use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::AdministrationStatus;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("Unrecognised frequency code: {0}")]
    UnknownFrequency(String),

    #[error("Cannot determine a day count from duration: {0}")]
    InvalidDuration(String),

    #[error("Prescription not found: {0}")]
    PrescriptionNotFound(Uuid),

    #[error("Administration not found: {0}")]
    AdministrationNotFound(Uuid),

    #[error("Prescription {0} is discontinued")]
    Discontinued(Uuid),

    #[error("Prescription {0} is PRN and has no fixed schedule")]
    AsNeeded(Uuid),

    #[error("Prescription {0} already has its STAT dose scheduled")]
    AlreadyScheduled(Uuid),

    #[error("Administration {id} is {status}, only scheduled doses can change")]
    NotScheduled { id: Uuid, status: AdministrationStatus },
}

impl ScheduleError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for ScheduleError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(e))
    }
}
