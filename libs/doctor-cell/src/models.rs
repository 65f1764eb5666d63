use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_database::SupabaseError;
use shared_models::error::AppError;
use shared_models::lifecycle::{LifecycleError, RecordState};

// ==============================================================================
// DOCTOR PROFILE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub specialization: String,
    pub qualification: Option<String>,
    pub experience_years: Option<i32>,
    pub contact_number: Option<String>,
    pub license_number: Option<String>,
    pub consultation_fee: Option<f64>,
    pub bio: Option<String>,
    #[serde(default)]
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    /// Auth user id of the doctor's account.
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub specialization: String,
    pub qualification: Option<String>,
    pub experience_years: Option<i32>,
    pub contact_number: Option<String>,
    pub license_number: Option<String>,
    pub consultation_fee: Option<f64>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub full_name: Option<String>,
    pub specialization: Option<String>,
    pub qualification: Option<String>,
    pub experience_years: Option<i32>,
    pub contact_number: Option<String>,
    pub license_number: Option<String>,
    pub consultation_fee: Option<f64>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSearchFilters {
    pub specialization: Option<String>,
    pub name: Option<String>,
    pub include_inactive: Option<bool>,
    pub limit: Option<i32>,
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeStateRequest {
    pub state: RecordState,
}

// ==============================================================================
// AVAILABILITY WINDOWS
// ==============================================================================

/// A published block during which a doctor accepts bookings on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub available_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl AvailabilityWindow {
    /// Half-open containment: `[start, end)` must lie inside `[self.start, self.end)`.
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start_time && end <= self.end_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub available_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// Replaces every window of the doctor within `[from, to]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceAvailabilityRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub windows: Vec<WindowSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor is {0} and cannot accept bookings")]
    NotActive(RecordState),

    #[error("Doctor with email {0} already exists")]
    EmailAlreadyExists(String),

    #[error("Availability window not found")]
    WindowNotFound,

    #[error("Window {start}-{end} on {date} overlaps an existing window")]
    OverlappingWindow {
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },

    #[error("Availability can only be published up to {days} days ahead")]
    OutsideHorizon { days: i64 },

    #[error("Unauthorized access to doctor data")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Failed to parse doctor data: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::WindowNotFound => AppError::NotFound(err.to_string()),
            DoctorError::NotActive(_) | DoctorError::EmailAlreadyExists(_) | DoctorError::OverlappingWindow { .. } => {
                AppError::Conflict(err.to_string())
            }
            DoctorError::OutsideHorizon { .. } | DoctorError::ValidationError(_) => {
                AppError::ValidationError(err.to_string())
            }
            DoctorError::Unauthorized => AppError::Forbidden(err.to_string()),
            DoctorError::Lifecycle(e) => AppError::from(e),
            DoctorError::Database(SupabaseError::Auth(msg)) => AppError::Auth(msg),
            DoctorError::Database(e) => AppError::Database(e.to_string()),
            DoctorError::Parse(e) => AppError::Internal(e.to_string()),
        }
    }
}
