use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentBookingService, BookAppointmentRequest, CancelAppointmentRequest, Priority,
};
use doctor_cell::{Doctor, DoctorSearchFilters, DoctorService};
use patient_cell::PatientService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::validation::require_text;

use crate::models::{
    AssessmentListQuery, AssessmentStatus, AssignDoctorRequest, CreateAssessmentRequest, TriageAssessment,
    TriageError,
};

pub struct TriageService {
    supabase: SupabaseClient,
    patients: PatientService,
    doctors: DoctorService,
    booking: AppointmentBookingService,
}

impl TriageService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            patients: PatientService::new(config),
            doctors: DoctorService::new(config),
            booking: AppointmentBookingService::new(config),
        }
    }

    pub async fn create_assessment(
        &self,
        triage_user_id: Uuid,
        request: CreateAssessmentRequest,
        auth_token: &str,
    ) -> Result<TriageAssessment, TriageError> {
        require_text("Chief complaint", &request.chief_complaint).map_err(TriageError::ValidationError)?;

        let (name, contact, gender) = match request.patient_id {
            Some(patient_id) => {
                let patient = self.patients.require_active(patient_id, auth_token).await?;
                (patient.full_name, patient.contact_number, patient.gender)
            }
            None => {
                let name = request.patient_name.unwrap_or_default();
                require_text("Patient name", &name).map_err(TriageError::ValidationError)?;
                (name.trim().to_string(), request.patient_contact, request.patient_gender)
            }
        };
        if let Some(age) = request.patient_age {
            if !(0..=150).contains(&age) {
                return Err(TriageError::ValidationError(format!("Invalid patient age: {}", age)));
            }
        }

        let now = Utc::now().to_rfc3339();
        let rows = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/triage_assessments",
            Some(auth_token),
            json!({
                "triage_user_id": triage_user_id,
                "patient_id": request.patient_id,
                "patient_name": name,
                "patient_contact": contact,
                "patient_age": request.patient_age,
                "patient_gender": gender,
                "chief_complaint": request.chief_complaint.trim(),
                "vital_signs": request.vital_signs,
                "priority_level": request.priority_level,
                "recommended_specialization": request.recommended_specialization,
                "notes": request.notes,
                "status": AssessmentStatus::Pending,
                "created_at": now,
                "updated_at": now
            }),
        ).await?;

        let assessment = first_row(rows)?;
        info!("Triage assessment {} created with priority {}", assessment.id, assessment.priority_level);
        Ok(assessment)
    }

    pub async fn get_assessment(&self, assessment_id: Uuid, auth_token: &str) -> Result<TriageAssessment, TriageError> {
        let path = format!("/rest/v1/triage_assessments?id=eq.{}", assessment_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        first_row(rows)
    }

    /// Emergencies first, then oldest first within a priority.
    pub async fn list_assessments(
        &self,
        query: AssessmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<TriageAssessment>, TriageError> {
        let mut path = "/rest/v1/triage_assessments?order=created_at.asc".to_string();
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(priority) = query.priority {
            path.push_str(&format!("&priority_level=eq.{}", priority));
        }
        debug!("Listing triage assessments: {}", path);

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        let mut assessments = rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(TriageError::from))
            .collect::<Result<Vec<TriageAssessment>, _>>()?;

        sort_by_urgency(&mut assessments);
        Ok(assessments)
    }

    /// Active doctors matching the recommended specialization, or all active doctors.
    pub async fn candidate_doctors(&self, assessment: &TriageAssessment, auth_token: &str) -> Result<Vec<Doctor>, TriageError> {
        let filters = DoctorSearchFilters {
            specialization: assessment.recommended_specialization.clone().filter(|s| !s.trim().is_empty()),
            limit: Some(200),
            ..Default::default()
        };
        Ok(self.doctors.search_doctors(filters, auth_token).await?)
    }

    /// Book the patient through the slot checker, then mark the assessment assigned.
    /// If the assessment cannot be marked, the new booking is canceled again.
    pub async fn assign_doctor(
        &self,
        assessment: &TriageAssessment,
        request: AssignDoctorRequest,
        auth_token: &str,
    ) -> Result<(TriageAssessment, Appointment), TriageError> {
        if !assessment.status.can_transition_to(AssessmentStatus::Assigned) {
            return Err(TriageError::AlreadyAssigned(assessment.status));
        }
        let patient_id = assessment.patient_id.ok_or_else(|| {
            TriageError::ValidationError("Walk-in patients must be registered before booking".to_string())
        })?;

        let appointment = self.booking.book_for_triage(
            BookAppointmentRequest {
                patient_id: Some(patient_id),
                doctor_id: request.doctor_id,
                appointment_date: request.appointment_date,
                start_time: request.start_time,
                end_time: request.end_time,
                duration_minutes: request.duration_minutes,
                reason: Some(assessment.chief_complaint.clone()),
                notes: assessment.notes.clone(),
                priority: Some(assessment.priority_level),
                override_availability: false,
            },
            patient_id,
            assessment.id,
            auth_token,
        ).await?;

        let updated = match self.mark_assigned(assessment.id, request.doctor_id, appointment.id, auth_token).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                warn!("Assessment {} was assigned by another request", assessment.id);
                self.release_booking(&appointment, auth_token).await;
                return Err(TriageError::AlreadyAssigned(AssessmentStatus::Assigned));
            }
            Err(e) => {
                self.release_booking(&appointment, auth_token).await;
                return Err(e);
            }
        };

        info!("Assessment {} assigned to doctor {} (appointment {})",
              assessment.id, request.doctor_id, appointment.id);
        Ok((updated, appointment))
    }

    /// Pending -> Assigned, guarded on the stored status. `None` when it was no longer pending.
    async fn mark_assigned(
        &self,
        assessment_id: Uuid,
        doctor_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<TriageAssessment>, TriageError> {
        let path = format!(
            "/rest/v1/triage_assessments?id=eq.{}&status=eq.{}",
            assessment_id, AssessmentStatus::Pending
        );
        let rows = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            json!({
                "status": AssessmentStatus::Assigned,
                "assigned_doctor_id": doctor_id,
                "appointment_id": appointment_id,
                "updated_at": Utc::now().to_rfc3339()
            }),
        ).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    async fn release_booking(&self, appointment: &Appointment, auth_token: &str) {
        let request = CancelAppointmentRequest {
            reason: Some("Triage assignment did not complete".to_string()),
        };
        match self.booking.cancel_appointment(appointment, request, "triage", auth_token).await {
            Ok(_) => warn!("Released appointment {} after failed triage assignment", appointment.id),
            Err(e) => error!("Could not release appointment {} after failed triage assignment: {}", appointment.id, e),
        }
    }
}

fn urgency_rank(priority: Priority) -> u8 {
    match priority {
        Priority::Emergency => 0,
        Priority::Urgent => 1,
        Priority::Standard => 2,
    }
}

pub fn sort_by_urgency(assessments: &mut [TriageAssessment]) {
    assessments.sort_by_key(|a| (urgency_rank(a.priority_level), a.created_at));
}

fn first_row(rows: Vec<Value>) -> Result<TriageAssessment, TriageError> {
    let row = rows.into_iter().next().ok_or(TriageError::NotFound)?;
    Ok(serde_json::from_value(row)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn assessment(priority: Priority, minutes_ago: i64) -> TriageAssessment {
        let created = Utc::now() - Duration::minutes(minutes_ago);
        TriageAssessment {
            id: Uuid::new_v4(),
            triage_user_id: Uuid::new_v4(),
            patient_id: None,
            patient_name: "Walk-in".to_string(),
            patient_contact: None,
            patient_age: Some(40),
            patient_gender: None,
            chief_complaint: "Chest pain".to_string(),
            vital_signs: None,
            priority_level: priority,
            recommended_specialization: None,
            notes: None,
            status: AssessmentStatus::Pending,
            assigned_doctor_id: None,
            appointment_id: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn emergencies_jump_the_queue() {
        let mut list = vec![
            assessment(Priority::Standard, 60),
            assessment(Priority::Urgent, 10),
            assessment(Priority::Emergency, 5),
            assessment(Priority::Urgent, 30),
        ];
        sort_by_urgency(&mut list);

        let order: Vec<_> = list.iter().map(|a| a.priority_level).collect();
        assert_eq!(order, vec![Priority::Emergency, Priority::Urgent, Priority::Urgent, Priority::Standard]);
        assert!(list[1].created_at < list[2].created_at);
    }
}
