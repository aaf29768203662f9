use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schedule::SchedulePattern;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub admission_id: Uuid,
    pub drug_name: String,
    pub frequency: String,
    pub duration: String,
    pub dose_quantity: String,
    pub schedule_pattern: Option<SchedulePattern>,
    pub discontinuation: Option<Discontinuation>,
    pub created_at: NaiveDateTime,
}

impl Prescription {
    pub fn is_discontinued(&self) -> bool {
        self.discontinuation.is_some()
    }

    pub fn has_schedule(&self) -> bool {
        self.schedule_pattern.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discontinuation {
    pub discontinued_at: NaiveDateTime,
    pub discontinued_by: String,
    pub reason: String,
}
