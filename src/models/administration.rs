use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AdministrationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationAdministration {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub admission_id: Uuid,
    pub scheduled_time: NaiveDateTime,
    pub status: AdministrationStatus,
    pub administered_at: Option<NaiveDateTime>,
    pub administered_by: Option<String>,
    pub dosage_given: Option<String>,
    pub notes: Option<String>,
    pub is_adjusted: bool,
}

impl MedicationAdministration {
    /// A fresh `scheduled` row for one slot.
    pub fn scheduled(
        prescription_id: Uuid,
        admission_id: Uuid,
        scheduled_time: NaiveDateTime,
        dosage: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            prescription_id,
            admission_id,
            scheduled_time,
            status: AdministrationStatus::Scheduled,
            administered_at: None,
            administered_by: None,
            dosage_given: Some(dosage.to_string()),
            notes: None,
            is_adjusted: false,
        }
    }

    pub fn can_be_adjusted(&self) -> bool {
        self.status == AdministrationStatus::Scheduled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleAdjustment {
    pub id: Uuid,
    pub administration_id: Uuid,
    pub original_time: NaiveDateTime,
    pub adjusted_time: NaiveDateTime,
    pub reason: Option<String>,
    pub adjusted_by: String,
    pub created_at: NaiveDateTime,
}
