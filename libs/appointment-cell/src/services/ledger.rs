use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::slot::BookingLedger;

/// `appointments` table as seen by the slot checker.
pub struct AppointmentLedger {
    supabase: SupabaseClient,
}

impl AppointmentLedger {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

#[async_trait]
impl BookingLedger for AppointmentLedger {
    async fn open_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=eq.{}&status=neq.{}",
            doctor_id, date, AppointmentStatus::Canceled
        );
        if let Some(exclude_id) = exclude {
            path.push_str(&format!("&id=neq.{}", exclude_id));
        }
        path.push_str("&order=start_time.asc");

        debug!("Loading open appointments for doctor {} on {}", doctor_id, date);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }
}
