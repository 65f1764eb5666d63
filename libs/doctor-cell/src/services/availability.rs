use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use reqwest::{header::{HeaderMap, HeaderValue}, Method};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityWindow, DoctorError, ReplaceAvailabilityRequest, WindowSpec};

/// Source of a doctor's published availability.
#[async_trait]
pub trait AvailabilityProvider: Send + Sync {
    /// Windows with `is_available = true` for the doctor on `date`, ordered by start time.
    async fn active_windows(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError>;
}

pub struct AvailabilityService {
    supabase: SupabaseClient,
    days_ahead: i64,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            days_ahead: config.availability_days_ahead,
        }
    }

    /// Publish a single window.
    pub async fn create_window(
        &self,
        doctor_id: Uuid,
        spec: WindowSpec,
        auth_token: &str,
    ) -> Result<AvailabilityWindow, DoctorError> {
        debug!("Creating availability window for doctor {}: {:?}", doctor_id, spec);

        validate_window(&spec)?;
        self.check_horizon(spec.available_date)?;

        let existing = self.list_windows(doctor_id, spec.available_date, spec.available_date, auth_token).await?;
        let existing_specs: Vec<WindowSpec> = existing.iter().map(to_spec).collect();
        if let Some(clash) = first_overlap(&spec, &existing_specs) {
            return Err(DoctorError::OverlappingWindow {
                date: clash.available_date,
                start: clash.start_time,
                end: clash.end_time,
            });
        }

        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/availability_windows",
            Some(auth_token),
            window_row(doctor_id, &spec),
        ).await?;

        let row = result.into_iter().next().ok_or(DoctorError::WindowNotFound)?;
        let window: AvailabilityWindow = serde_json::from_value(row)?;
        info!("Availability window {} created for doctor {}", window.id, doctor_id);

        Ok(window)
    }

    /// All windows (available or not) in the inclusive date range.
    pub async fn list_windows(
        &self,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let path = format!(
            "/rest/v1/availability_windows?doctor_id=eq.{}&available_date=gte.{}&available_date=lte.{}&order=available_date.asc,start_time.asc",
            doctor_id, from, to
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }

    /// Delete every window in `[from, to]` and publish the given set instead.
    pub async fn replace_range(
        &self,
        doctor_id: Uuid,
        request: ReplaceAvailabilityRequest,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        if request.from > request.to {
            return Err(DoctorError::ValidationError("Range start must not be after range end".to_string()));
        }
        self.check_horizon(request.to)?;

        for (index, spec) in request.windows.iter().enumerate() {
            validate_window(spec)?;
            if spec.available_date < request.from || spec.available_date > request.to {
                return Err(DoctorError::ValidationError(format!(
                    "Window on {} lies outside the replaced range {}..{}",
                    spec.available_date, request.from, request.to
                )));
            }
            if let Some(clash) = first_overlap(spec, &request.windows[..index]) {
                return Err(DoctorError::OverlappingWindow {
                    date: clash.available_date,
                    start: clash.start_time,
                    end: clash.end_time,
                });
            }
        }

        // Delete and insert run in one database transaction.
        let windows: Vec<Value> = request.windows.iter().map(window_param).collect();
        let created: Vec<Value> = self.supabase.request(
            Method::POST,
            "/rest/v1/rpc/replace_availability",
            Some(auth_token),
            Some(json!({
                "p_doctor_id": doctor_id,
                "p_from": request.from,
                "p_to": request.to,
                "p_windows": windows
            })),
        ).await?;

        info!(
            "Replaced availability for doctor {} between {} and {} with {} windows",
            doctor_id, request.from, request.to, created.len()
        );

        created
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }

    pub async fn delete_window(
        &self,
        doctor_id: Uuid,
        window_id: Uuid,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        let path = format!(
            "/rest/v1/availability_windows?id=eq.{}&doctor_id=eq.{}",
            window_id, doctor_id
        );
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        let deleted: Vec<Value> = self.supabase
            .request_with_headers(Method::DELETE, &path, Some(auth_token), None, Some(headers))
            .await?;

        if deleted.is_empty() {
            return Err(DoctorError::WindowNotFound);
        }

        info!("Availability window {} deleted for doctor {}", window_id, doctor_id);
        Ok(())
    }

    /// Default listing range: today through the booking horizon.
    pub fn default_range(&self) -> (NaiveDate, NaiveDate) {
        let today = Utc::now().date_naive();
        (today, today + Duration::days(self.days_ahead))
    }

    fn check_horizon(&self, date: NaiveDate) -> Result<(), DoctorError> {
        let (today, last) = self.default_range();
        if date < today {
            return Err(DoctorError::ValidationError("Cannot publish availability in the past".to_string()));
        }
        if date > last {
            return Err(DoctorError::OutsideHorizon { days: self.days_ahead });
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityProvider for AvailabilityService {
    async fn active_windows(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailabilityWindow>, DoctorError> {
        let path = format!(
            "/rest/v1/availability_windows?doctor_id=eq.{}&available_date=eq.{}&is_available=eq.true&order=start_time.asc",
            doctor_id, date
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }
}

fn validate_window(spec: &WindowSpec) -> Result<(), DoctorError> {
    if spec.start_time >= spec.end_time {
        return Err(DoctorError::ValidationError(format!(
            "Start time {} must be before end time {}",
            spec.start_time, spec.end_time
        )));
    }
    Ok(())
}

fn to_spec(window: &AvailabilityWindow) -> WindowSpec {
    WindowSpec {
        available_date: window.available_date,
        start_time: window.start_time,
        end_time: window.end_time,
    }
}

fn time_ranges_overlap(a: (NaiveTime, NaiveTime), b: (NaiveTime, NaiveTime)) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// First window in `others` on the same date that overlaps `spec`. Touching windows do not overlap.
pub fn first_overlap<'a>(spec: &WindowSpec, others: &'a [WindowSpec]) -> Option<&'a WindowSpec> {
    others.iter().find(|other| {
        other.available_date == spec.available_date
            && time_ranges_overlap((spec.start_time, spec.end_time), (other.start_time, other.end_time))
    })
}

fn window_param(spec: &WindowSpec) -> Value {
    json!({
        "available_date": spec.available_date,
        "start_time": spec.start_time.format("%H:%M:%S").to_string(),
        "end_time": spec.end_time.format("%H:%M:%S").to_string()
    })
}

fn window_row(doctor_id: Uuid, spec: &WindowSpec) -> Value {
    json!({
        "doctor_id": doctor_id,
        "available_date": spec.available_date,
        "start_time": spec.start_time.format("%H:%M:%S").to_string(),
        "end_time": spec.end_time.format("%H:%M:%S").to_string(),
        "is_available": true,
        "created_at": Utc::now().to_rfc3339()
    })
}
