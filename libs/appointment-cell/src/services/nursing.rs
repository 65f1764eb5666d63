use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use nurse_cell::{Nurse, NurseListQuery, NurseService};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, BookingOutcome, BusyNurse, NurseRoster};
use crate::services::booking::first_row;
use crate::services::slot::{booking_interval, intervals_overlap};

/// Nurse assignment to appointments. Clashes are reported, not enforced.
pub struct NursingService {
    supabase: SupabaseClient,
    nurses: NurseService,
    slot_minutes: i64,
}

impl NursingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            nurses: NurseService::new(config),
            slot_minutes: config.appointment_slot_minutes,
        }
    }

    /// Assign or clear (`None`) the nurse of an appointment.
    pub async fn assign_nurse(
        &self,
        appointment: &Appointment,
        nurse_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<BookingOutcome, AppointmentError> {
        if appointment.status == AppointmentStatus::Canceled {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let mut warnings = Vec::new();
        if let Some(nurse_id) = nurse_id {
            let nurse = self.nurses.require_active(nurse_id, auth_token).await?;
            let same_day = self.same_day_assignments(appointment, auth_token).await?;
            warnings = self.clashes(&nurse, appointment, &same_day);
            for warning in &warnings {
                warn!("Assigning nurse {} to appointment {} despite: {}", nurse_id, appointment.id, warning);
            }
        }

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment.id);
        let rows = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            json!({
                "nurse_id": nurse_id,
                "updated_at": Utc::now().to_rfc3339()
            }),
        ).await?;
        let updated = first_row(rows)?;

        if let Some(previous) = appointment.nurse_id.filter(|prev| Some(*prev) != nurse_id) {
            self.release_nurse(previous, appointment.patient_id, auth_token).await;
        }
        if let Some(nurse_id) = nurse_id {
            if appointment.status == AppointmentStatus::Active {
                self.nurses.set_assigned_patient(nurse_id, Some(appointment.patient_id), auth_token).await?;
            }
        }

        info!("Appointment {} nurse set to {:?}", appointment.id, nurse_id);
        Ok(BookingOutcome { appointment: updated, warnings })
    }

    /// Active nurses split into those free for the appointment and those that clash.
    pub async fn nurse_roster(&self, appointment: &Appointment, auth_token: &str) -> Result<NurseRoster, AppointmentError> {
        let nurses = self.nurses.list_nurses(NurseListQuery::default(), auth_token).await?;
        let same_day = self.same_day_assignments(appointment, auth_token).await?;

        let mut roster = NurseRoster { available: Vec::new(), busy: Vec::new() };
        for nurse in nurses {
            let mut reasons = self.clashes(&nurse, appointment, &same_day);
            if reasons.is_empty() {
                roster.available.push(nurse);
            } else {
                roster.busy.push(BusyNurse { nurse, reason: reasons.remove(0) });
            }
        }

        Ok(roster)
    }

    /// Free a nurse bound to `patient_id`. Failures are logged only.
    pub async fn release_nurse(&self, nurse_id: Uuid, patient_id: Uuid, auth_token: &str) {
        let result = async {
            let nurse = self.nurses.get_nurse(nurse_id, auth_token).await?;
            if nurse.assigned_patient_id == Some(patient_id) {
                self.nurses.set_assigned_patient(nurse_id, None, auth_token).await?;
            }
            Ok::<(), nurse_cell::NurseError>(())
        }.await;

        if let Err(e) = result {
            warn!("Failed to release nurse {}: {}", nurse_id, e);
        }
    }

    /// Other live appointments on the same date that already have a nurse.
    async fn same_day_assignments(&self, appointment: &Appointment, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?appointment_date=eq.{}&status=neq.{}&nurse_id=not.is.null&id=neq.{}",
            appointment.appointment_date, AppointmentStatus::Canceled, appointment.id
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    fn clashes(&self, nurse: &Nurse, appointment: &Appointment, same_day: &[Appointment]) -> Vec<String> {
        let target = booking_interval(appointment, self.slot_minutes);

        let mut reasons = Vec::new();
        if let Some(other) = same_day
            .iter()
            .filter(|a| a.nurse_id == Some(nurse.id))
            .find(|a| intervals_overlap(target, booking_interval(a, self.slot_minutes)))
        {
            reasons.push(format!(
                "Nurse is assigned to another appointment at {}",
                other.start_time.format("%H:%M")
            ));
        }
        if nurse.is_assigned_to_other_patient(appointment.patient_id) {
            reasons.push("Nurse is currently attending another patient".to_string());
        }
        if !nurse.assigned_doctor_ids.is_empty() && !nurse.assigned_doctor_ids.contains(&appointment.doctor_id) {
            reasons.push("Nurse is not assigned to this doctor".to_string());
        }
        reasons
    }
}
