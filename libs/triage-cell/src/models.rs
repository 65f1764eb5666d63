use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use appointment_cell::{AppointmentError, Priority};
use doctor_cell::DoctorError;
use patient_cell::PatientError;
use shared_database::SupabaseError;
use shared_models::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageAssessment {
    pub id: Uuid,
    pub triage_user_id: Uuid,
    /// `None` for walk-ins without a patient account.
    pub patient_id: Option<Uuid>,
    pub patient_name: String,
    pub patient_contact: Option<String>,
    pub patient_age: Option<i32>,
    pub patient_gender: Option<String>,
    pub chief_complaint: String,
    pub vital_signs: Option<String>,
    pub priority_level: Priority,
    pub recommended_specialization: Option<String>,
    pub notes: Option<String>,
    pub status: AssessmentStatus,
    pub assigned_doctor_id: Option<Uuid>,
    pub appointment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    Assigned,
}

impl AssessmentStatus {
    pub fn can_transition_to(self, next: AssessmentStatus) -> bool {
        matches!((self, next), (AssessmentStatus::Pending, AssessmentStatus::Assigned))
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentStatus::Pending => write!(f, "pending"),
            AssessmentStatus::Assigned => write!(f, "assigned"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAssessmentRequest {
    /// Registered patient; name, contact and gender are then taken from the profile.
    pub patient_id: Option<Uuid>,
    pub patient_name: Option<String>,
    pub patient_contact: Option<String>,
    pub patient_age: Option<i32>,
    pub patient_gender: Option<String>,
    pub chief_complaint: String,
    pub vital_signs: Option<String>,
    pub priority_level: Priority,
    pub recommended_specialization: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssessmentListQuery {
    pub status: Option<AssessmentStatus>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignDoctorRequest {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Triage assessment not found")]
    NotFound,

    #[error("Assessment is already {0}")]
    AlreadyAssigned(AssessmentStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error(transparent)]
    Booking(#[from] AppointmentError),

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Failed to parse assessment data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<TriageError> for AppError {
    fn from(err: TriageError) -> Self {
        match err {
            TriageError::NotFound => AppError::NotFound(err.to_string()),
            TriageError::AlreadyAssigned(_) => AppError::Conflict(err.to_string()),
            TriageError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            TriageError::Patient(e) => e.into(),
            TriageError::Doctor(e) => e.into(),
            TriageError::Booking(e) => e.into(),
            TriageError::Database(SupabaseError::Auth(msg)) => AppError::Auth(msg),
            TriageError::Database(e) => AppError::Database(e.to_string()),
            TriageError::Parse(e) => AppError::Internal(e.to_string()),
        }
    }
}
