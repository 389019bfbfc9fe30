use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fee-class identity recorded during patient registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientIdentity {
    Regular,
    Student,
    Teacher,
    Staff,
    External,
}

/// Minimal patient projection the booking core needs: who may act for the
/// patient, and which fee class applies. Demographics stay with the org-data
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: Uuid,
    /// Account that registered this patient; self-bookings and declared
    /// dependents both resolve ownership through this field.
    pub user_id: Uuid,
    pub name: String,
    pub identity: PatientIdentity,
}

impl Patient {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }
}
