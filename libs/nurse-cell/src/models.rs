use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_models::lifecycle::{LifecycleError, RecordState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nurse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub contact_number: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub assigned_doctor_ids: Vec<Uuid>,
    /// Patient the nurse is currently attending, if any.
    pub assigned_patient_id: Option<Uuid>,
    #[serde(default)]
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Nurse {
    pub fn is_assigned_to_other_patient(&self, patient_id: Uuid) -> bool {
        self.assigned_patient_id.is_some_and(|assigned| assigned != patient_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNurseRequest {
    /// Auth user id of the nurse's account.
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub contact_number: Option<String>,
    pub department: Option<String>,
    #[serde(default)]
    pub assigned_doctor_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateNurseRequest {
    pub full_name: Option<String>,
    pub contact_number: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignDoctorsRequest {
    pub doctor_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeNurseStateRequest {
    pub state: RecordState,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NurseListQuery {
    pub department: Option<String>,
    pub include_inactive: Option<bool>,
}

#[derive(Error, Debug)]
pub enum NurseError {
    #[error("Nurse not found")]
    NotFound,

    #[error("Nurse with email {0} already exists")]
    EmailAlreadyExists(String),

    #[error("Nurse is {0}")]
    NotActive(RecordState),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Failed to parse nurse data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<NurseError> for AppError {
    fn from(err: NurseError) -> Self {
        match err {
            NurseError::NotFound => AppError::NotFound(err.to_string()),
            NurseError::EmailAlreadyExists(_) | NurseError::NotActive(_) => AppError::Conflict(err.to_string()),
            NurseError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            NurseError::Lifecycle(e) => AppError::from(e),
            NurseError::Database(SupabaseError::Auth(msg)) => AppError::Auth(msg),
            NurseError::Database(e) => AppError::Database(e.to_string()),
            NurseError::Parse(e) => AppError::Internal(e.to_string()),
        }
    }
}
