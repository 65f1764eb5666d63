use chrono::Utc;
use reqwest::{header::{HeaderMap, HeaderValue}, Method};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, CompleteAppointmentRequest, Treatment};

pub struct TreatmentService {
    supabase: SupabaseClient,
}

impl TreatmentService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Insert or replace the treatment of an appointment (one per appointment).
    pub async fn record_treatment(
        &self,
        appointment: &Appointment,
        request: &CompleteAppointmentRequest,
        auth_token: &str,
    ) -> Result<Treatment, AppointmentError> {
        validate_treatment(appointment, request)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );

        let now = Utc::now().to_rfc3339();
        let body = json!({
            "appointment_id": appointment.id,
            "diagnosis": request.diagnosis.trim(),
            "prescription": request.prescription,
            "test_recommended": request.test_recommended,
            "notes": request.notes,
            "follow_up_required": request.follow_up_required,
            "follow_up_date": request.follow_up_date.filter(|_| request.follow_up_required),
            "created_at": now,
            "updated_at": now
        });

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/treatments?on_conflict=appointment_id",
            Some(auth_token),
            Some(body),
            Some(headers),
        ).await.map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next().ok_or(AppointmentError::TreatmentNotFound)?;
        let treatment: Treatment = serde_json::from_value(row)?;

        info!("Treatment recorded for appointment {}", appointment.id);
        Ok(treatment)
    }

    pub async fn get_treatment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Treatment, AppointmentError> {
        let path = format!("/rest/v1/treatments?appointment_id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        let row = rows.into_iter().next().ok_or(AppointmentError::TreatmentNotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Completed appointments of a patient with their treatments, newest first.
    pub async fn patient_history(&self, patient_id: Uuid, auth_token: &str) -> Result<Vec<Value>, AppointmentError> {
        debug!("Fetching treatment history for patient {}", patient_id);

        let path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&status=eq.{}&select=*,treatments(*)&order=appointment_date.desc,start_time.desc",
            patient_id, AppointmentStatus::Completed
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        Ok(rows)
    }
}

fn validate_treatment(appointment: &Appointment, request: &CompleteAppointmentRequest) -> Result<(), AppointmentError> {
    if request.diagnosis.trim().is_empty() {
        return Err(AppointmentError::ValidationError("Diagnosis is required".to_string()));
    }

    if request.follow_up_required {
        match request.follow_up_date {
            None => {
                return Err(AppointmentError::ValidationError(
                    "Follow-up date is required when a follow-up is requested".to_string(),
                ));
            }
            Some(date) if date <= appointment.appointment_date => {
                return Err(AppointmentError::ValidationError(
                    "Follow-up date must be after the appointment date".to_string(),
                ));
            }
            Some(_) => {}
        }
    }

    Ok(())
}
