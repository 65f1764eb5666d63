use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_models::lifecycle::{LifecycleError, RecordState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
    #[serde(default)]
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePatientRequest {
    /// Auth user id of the patient's account.
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePatientRequest {
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_number: Option<String>,
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatientSearchQuery {
    pub name: Option<String>,
    pub contact_number: Option<String>,
    pub include_inactive: Option<bool>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePatientStateRequest {
    pub state: RecordState,
}

const BLOOD_GROUPS: [&str; 8] = ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"];

pub fn is_valid_blood_group(value: &str) -> bool {
    BLOOD_GROUPS.contains(&value.trim().to_uppercase().as_str())
}

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,
    
    #[error("Patient with email {email} already exists")]
    EmailAlreadyExists { email: String },

    #[error("Patient account is {0}")]
    NotActive(RecordState),
    
    #[error("Invalid date of birth")]
    InvalidDateOfBirth,
    
    #[error("Unauthorized access to patient data")]
    Unauthorized,
    
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Failed to parse patient data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<PatientError> for AppError {
    fn from(err: PatientError) -> Self {
        match err {
            PatientError::NotFound => AppError::NotFound(err.to_string()),
            PatientError::EmailAlreadyExists { .. } | PatientError::NotActive(_) => AppError::Conflict(err.to_string()),
            PatientError::InvalidDateOfBirth | PatientError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            PatientError::Unauthorized => AppError::Forbidden(err.to_string()),
            PatientError::Lifecycle(e) => AppError::from(e),
            PatientError::Database(SupabaseError::Auth(msg)) => AppError::Auth(msg),
            PatientError::Database(e) => AppError::Database(e.to_string()),
            PatientError::Parse(e) => AppError::Internal(e.to_string()),
        }
    }
}
