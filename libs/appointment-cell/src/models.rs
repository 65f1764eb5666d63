use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use doctor_cell::DoctorError;
use nurse_cell::{Nurse, NurseError};
use patient_cell::PatientError;
use shared_database::SupabaseError;
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub nurse_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Older rows may carry only a duration, or neither.
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub priority: Priority,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub triage_assessment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Active,
    Completed,
    Canceled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Active => write!(f, "active"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Standard,
    Urgent,
    Emergency,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Standard => write!(f, "standard"),
            Priority::Urgent => write!(f, "urgent"),
            Priority::Emergency => write!(f, "emergency"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub test_recommended: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    /// Defaults to the caller for patient self-service.
    pub patient_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub priority: Option<Priority>,
    /// Admin only: book even when the slot check fails.
    #[serde(default)]
    pub override_availability: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub appointment_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub override_availability: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub test_recommended: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub nurse_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignNurseRequest {
    /// `None` removes the current nurse.
    pub nurse_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentFilter {
    #[default]
    Upcoming,
    Past,
    Today,
    All,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub filter: Option<AppointmentFilter>,
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotCheckQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<i64>,
    pub exclude_appointment_id: Option<Uuid>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    /// Failed slot checks an admin chose to override.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub appointment: Appointment,
    pub treatment: Treatment,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusyNurse {
    pub nurse: Nurse,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NurseRoster {
    pub available: Vec<Nurse>,
    pub busy: Vec<BusyNurse>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("{0}")]
    SlotNotAvailable(String),

    #[error("Slot was just booked by another request")]
    SlotTaken,

    #[error("You already have an appointment at this time")]
    PatientDoubleBooked,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Treatment not found")]
    TreatmentNotFound,

    #[error(transparent)]
    Doctor(#[from] DoctorError),

    #[error(transparent)]
    Patient(#[from] PatientError),

    #[error(transparent)]
    Nurse(#[from] NurseError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for AppointmentError {
    fn from(err: SupabaseError) -> Self {
        if err.is_conflict() {
            AppointmentError::SlotTaken
        } else {
            AppointmentError::DatabaseError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppointmentError {
    fn from(err: serde_json::Error) -> Self {
        AppointmentError::DatabaseError(format!("Failed to parse appointment data: {}", err))
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::TreatmentNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::SlotNotAvailable(_)
            | AppointmentError::SlotTaken
            | AppointmentError::PatientDoubleBooked
            | AppointmentError::InvalidStatusTransition(_) => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidTime(_) => AppError::BadRequest(err.to_string()),
            AppointmentError::Unauthorized => AppError::Forbidden(err.to_string()),
            AppointmentError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            AppointmentError::Doctor(e) => e.into(),
            AppointmentError::Patient(e) => e.into(),
            AppointmentError::Nurse(e) => e.into(),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
