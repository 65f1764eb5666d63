use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::{AvailabilityService, DoctorService};
use patient_cell::PatientService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentListQuery, AppointmentStatus,
    BookAppointmentRequest, BookingOutcome, CancelAppointmentRequest, RescheduleAppointmentRequest,
    SlotCheckQuery,
};
use crate::services::ledger::AppointmentLedger;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slot::{
    booking_interval, intervals_overlap, SlotAvailabilityChecker, SlotLength, SlotRequest, SlotVerdict,
};

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    checker: SlotAvailabilityChecker,
    lifecycle_service: AppointmentLifecycleService,
    doctors: DoctorService,
    patients: PatientService,
    slot_minutes: i64,
}

/// Where a booking comes from; decides which checks may be overridden.
#[derive(Debug, Clone, Copy)]
struct BookingSource {
    allow_override: bool,
    triage_assessment_id: Option<Uuid>,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        let checker = SlotAvailabilityChecker::new(
            Arc::new(AvailabilityService::new(config)),
            Arc::new(AppointmentLedger::new(config)),
            config.appointment_slot_minutes,
        );

        Self {
            supabase: SupabaseClient::new(config),
            checker,
            lifecycle_service: AppointmentLifecycleService::new(),
            doctors: DoctorService::new(config),
            patients: PatientService::new(config),
            slot_minutes: config.appointment_slot_minutes,
        }
    }

    /// Raw slot verdict for the slot-check endpoint.
    pub async fn check_slot(&self, query: SlotCheckQuery, auth_token: &str) -> Result<(SlotRequest, SlotVerdict), AppointmentError> {
        self.doctors.get_doctor(query.doctor_id, auth_token).await?;

        let request = SlotRequest {
            doctor_id: query.doctor_id,
            date: query.date,
            start_time: query.start_time,
            length: SlotLength::from_parts(query.end_time, query.duration_minutes, self.slot_minutes),
            exclude_appointment_id: query.exclude_appointment_id,
        };
        let verdict = self.checker.check(&request, auth_token).await?;

        Ok((request, verdict))
    }

    /// Book for `patient_id`. `allow_override` lets an admin book past a failed slot check.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        patient_id: Uuid,
        allow_override: bool,
        auth_token: &str,
    ) -> Result<BookingOutcome, AppointmentError> {
        self.create_booking(
            request,
            patient_id,
            BookingSource { allow_override, triage_assessment_id: None },
            auth_token,
        ).await
    }

    /// Book on behalf of a triage assessment. Never overrides the slot check.
    pub async fn book_for_triage(
        &self,
        request: BookAppointmentRequest,
        patient_id: Uuid,
        assessment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let outcome = self.create_booking(
            request,
            patient_id,
            BookingSource { allow_override: false, triage_assessment_id: Some(assessment_id) },
            auth_token,
        ).await?;
        Ok(outcome.appointment)
    }

    async fn create_booking(
        &self,
        request: BookAppointmentRequest,
        patient_id: Uuid,
        source: BookingSource,
        auth_token: &str,
    ) -> Result<BookingOutcome, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {} on {} at {}",
              patient_id, request.doctor_id, request.appointment_date, request.start_time);

        ensure_not_past(request.appointment_date)?;
        self.patients.require_active(patient_id, auth_token).await?;
        self.doctors.require_active(request.doctor_id, auth_token).await?;

        let slot = SlotRequest {
            doctor_id: request.doctor_id,
            date: request.appointment_date,
            start_time: request.start_time,
            length: SlotLength::from_parts(request.end_time, request.duration_minutes, self.slot_minutes),
            exclude_appointment_id: None,
        };
        let (warnings, (start, end)) = self.vet_slot(&slot, patient_id, source.allow_override, auth_token).await?;

        let now = Utc::now().to_rfc3339();
        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            json!({
                "patient_id": patient_id,
                "doctor_id": request.doctor_id,
                "nurse_id": null,
                "appointment_date": request.appointment_date,
                "start_time": request.start_time,
                "end_time": end.time(),
                "duration_minutes": (end - start).num_minutes(),
                "status": AppointmentStatus::Active,
                "priority": request.priority.unwrap_or_default(),
                "reason": request.reason,
                "notes": request.notes,
                "triage_assessment_id": source.triage_assessment_id,
                "created_at": now,
                "updated_at": now
            }),
        ).await?;

        let appointment = first_row(result)?;
        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);

        Ok(BookingOutcome { appointment, warnings })
    }

    pub async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        first_row(result)
    }

    pub async fn reschedule_appointment(
        &self,
        current: &Appointment,
        request: RescheduleAppointmentRequest,
        allow_override: bool,
        auth_token: &str,
    ) -> Result<BookingOutcome, AppointmentError> {
        debug!("Rescheduling appointment: {}", current.id);

        self.lifecycle_service.ensure_active(current.status)?;
        ensure_not_past(request.appointment_date)?;
        self.doctors.require_active(current.doctor_id, auth_token).await?;

        let slot = SlotRequest {
            doctor_id: current.doctor_id,
            date: request.appointment_date,
            start_time: request.start_time,
            length: SlotLength::from_parts(request.end_time, request.duration_minutes, self.slot_minutes),
            exclude_appointment_id: Some(current.id),
        };
        let (warnings, (start, end)) = self.vet_slot(&slot, current.patient_id, allow_override, auth_token).await?;

        let appointment = self.patch(current.id, json!({
            "appointment_date": request.appointment_date,
            "start_time": request.start_time,
            "end_time": end.time(),
            "duration_minutes": (end - start).num_minutes(),
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await?;

        info!("Appointment {} moved from {} {} to {} {}",
              current.id, current.appointment_date, current.start_time,
              appointment.appointment_date, appointment.start_time);
        Ok(BookingOutcome { appointment, warnings })
    }

    pub async fn cancel_appointment(
        &self,
        current: &Appointment,
        request: CancelAppointmentRequest,
        canceled_by: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment: {}", current.id);

        self.lifecycle_service.validate_status_transition(current.status, AppointmentStatus::Canceled)?;

        let note = match request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            Some(reason) => format!("Canceled by {}: {}", canceled_by, reason),
            None => format!("Canceled by {}", canceled_by),
        };
        let notes = match current.notes.as_deref() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, note),
            _ => note,
        };

        let appointment = self.patch(current.id, json!({
            "status": AppointmentStatus::Canceled,
            "notes": notes,
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await?;

        info!("Appointment {} canceled by {}", current.id, canceled_by);
        Ok(appointment)
    }

    /// Mark an active appointment completed. Treatment is recorded separately.
    pub async fn mark_completed(&self, current: &Appointment, auth_token: &str) -> Result<Appointment, AppointmentError> {
        self.lifecycle_service.validate_status_transition(current.status, AppointmentStatus::Completed)?;

        self.patch(current.id, json!({
            "status": AppointmentStatus::Completed,
            "updated_at": Utc::now().to_rfc3339()
        }), auth_token).await
    }

    pub async fn list_appointments(
        &self,
        query: AppointmentListQuery,
        nurse_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?{}", list_query_parts(&query, nurse_id, Utc::now().date_naive()).join("&"));
        debug!("Listing appointments: {}", path);

        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        result.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    pub(crate) async fn patch(&self, appointment_id: Uuid, body: Value, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result = self.supabase.request_returning(Method::PATCH, &path, Some(auth_token), body).await?;
        first_row(result)
    }

    /// Run the slot checker and the patient double-booking check. Failures become
    /// warnings when `allow_override` is set. Returns them with the slot interval.
    async fn vet_slot(
        &self,
        slot: &SlotRequest,
        patient_id: Uuid,
        allow_override: bool,
        auth_token: &str,
    ) -> Result<(Vec<String>, (NaiveDateTime, NaiveDateTime)), AppointmentError> {
        let (start, end) = slot.checked_interval()
            .map_err(|reason| AppointmentError::InvalidTime(reason.to_string()))?;
        if end.date() != slot.date {
            return Err(AppointmentError::InvalidTime("Appointment must end on the day it starts".to_string()));
        }

        let mut warnings = Vec::new();

        let verdict = self.checker.check(slot, auth_token).await?;
        if !verdict.available {
            if !allow_override {
                return Err(AppointmentError::SlotNotAvailable(verdict.reason));
            }
            warn!("Admin override for doctor {} on {} at {}: {}",
                  slot.doctor_id, slot.date, slot.start_time, verdict.reason);
            warnings.push(verdict.reason);
        }

        if self.patient_has_overlap(patient_id, slot, (start, end), auth_token).await? {
            if !allow_override {
                return Err(AppointmentError::PatientDoubleBooked);
            }
            let message = AppointmentError::PatientDoubleBooked.to_string();
            warn!("Admin override for patient {}: {}", patient_id, message);
            warnings.push(message);
        }

        Ok((warnings, (start, end)))
    }

    async fn patient_has_overlap(
        &self,
        patient_id: Uuid,
        slot: &SlotRequest,
        requested: (NaiveDateTime, NaiveDateTime),
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let mut path = format!(
            "/rest/v1/appointments?patient_id=eq.{}&appointment_date=eq.{}&status=neq.{}",
            patient_id, slot.date, AppointmentStatus::Canceled
        );
        if let Some(exclude) = slot.exclude_appointment_id {
            path.push_str(&format!("&id=neq.{}", exclude));
        }

        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        let appointments = rows.into_iter()
            .map(|row| serde_json::from_value::<Appointment>(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(appointments.iter()
            .any(|a| intervals_overlap(requested, booking_interval(a, self.checker.default_minutes()))))
    }
}

fn ensure_not_past(date: NaiveDate) -> Result<(), AppointmentError> {
    if date < Utc::now().date_naive() {
        return Err(AppointmentError::InvalidTime("Cannot book appointments in the past".to_string()));
    }
    Ok(())
}

pub(crate) fn first_row(rows: Vec<Value>) -> Result<Appointment, AppointmentError> {
    let row = rows.into_iter().next().ok_or(AppointmentError::NotFound)?;
    Ok(serde_json::from_value(row)?)
}

/// PostgREST filters for an appointment listing relative to `today`.
pub fn list_query_parts(query: &AppointmentListQuery, nurse_id: Option<Uuid>, today: NaiveDate) -> Vec<String> {
    let mut parts = Vec::new();

    if let Some(patient_id) = query.patient_id {
        parts.push(format!("patient_id=eq.{}", patient_id));
    }
    if let Some(doctor_id) = query.doctor_id {
        parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if let Some(nurse_id) = nurse_id {
        parts.push(format!("nurse_id=eq.{}", nurse_id));
    }
    if let Some(status) = query.status {
        parts.push(format!("status=eq.{}", status));
    }

    let filter = query.filter.unwrap_or_default();
    match filter {
        AppointmentFilter::Upcoming => {
            parts.push(format!("appointment_date=gte.{}", today));
            if query.status.is_none() {
                parts.push(format!("status=eq.{}", AppointmentStatus::Active));
            }
            parts.push("order=appointment_date.asc,start_time.asc".to_string());
        }
        AppointmentFilter::Today => {
            parts.push(format!("appointment_date=eq.{}", today));
            parts.push("order=start_time.asc".to_string());
        }
        AppointmentFilter::Past => {
            parts.push(format!("or=(appointment_date.lt.{},status.neq.{})", today, AppointmentStatus::Active));
            parts.push("order=appointment_date.desc,start_time.desc".to_string());
        }
        AppointmentFilter::All => {
            parts.push("order=appointment_date.desc,start_time.desc".to_string());
        }
    }

    parts.push(format!("limit={}", query.limit.unwrap_or(50).clamp(1, 200)));
    if let Some(offset) = query.offset {
        parts.push(format!("offset={}", offset.max(0)));
    }

    parts
}

/// Days ahead of `today` a listing considers "upcoming" for reminders.
pub fn reminder_dates(today: NaiveDate) -> [NaiveDate; 2] {
    [today, today + Duration::days(1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn upcoming_defaults_to_active_from_today() {
        let parts = list_query_parts(&AppointmentListQuery::default(), None, today());
        assert!(parts.contains(&"appointment_date=gte.2025-06-01".to_string()));
        assert!(parts.contains(&"status=eq.active".to_string()));
        assert!(parts.contains(&"limit=50".to_string()));
    }

    #[test]
    fn past_includes_finished_appointments() {
        let query = AppointmentListQuery {
            filter: Some(AppointmentFilter::Past),
            patient_id: Some(Uuid::nil()),
            ..Default::default()
        };
        let parts = list_query_parts(&query, None, today());
        assert_eq!(parts[0], format!("patient_id=eq.{}", Uuid::nil()));
        assert!(parts.contains(&"or=(appointment_date.lt.2025-06-01,status.neq.active)".to_string()));
    }

    #[test]
    fn nurse_scope_and_limits() {
        let nurse = Uuid::new_v4();
        let query = AppointmentListQuery {
            filter: Some(AppointmentFilter::All),
            limit: Some(1000),
            offset: Some(-5),
            ..Default::default()
        };
        let parts = list_query_parts(&query, Some(nurse), today());
        assert!(parts.contains(&format!("nurse_id=eq.{}", nurse)));
        assert!(parts.contains(&"limit=200".to_string()));
        assert!(parts.contains(&"offset=0".to_string()));
    }

    #[test]
    fn reminders_cover_today_and_tomorrow() {
        assert_eq!(reminder_dates(today())[1], NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
    }
}
