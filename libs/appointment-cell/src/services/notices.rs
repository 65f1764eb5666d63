use chrono::{NaiveDate, NaiveTime};
use tracing::warn;
use uuid::Uuid;

use doctor_cell::DoctorService;
use notification_cell::templates::{self, AppointmentSummary, TreatmentNote};
use notification_cell::{NotificationKind, NotificationProducer};
use patient_cell::PatientService;
use shared_config::AppConfig;

use crate::models::{Appointment, Treatment};

/// Queues patient emails for appointment events. Never fails the caller.
pub struct AppointmentNotifier {
    patients: PatientService,
    doctors: DoctorService,
    producer: NotificationProducer,
}

impl AppointmentNotifier {
    pub fn new(config: &AppConfig, producer: NotificationProducer) -> Self {
        Self {
            patients: PatientService::new(config),
            doctors: DoctorService::new(config),
            producer,
        }
    }

    pub async fn booked(&self, appointment: &Appointment, auth_token: &str) {
        if let Some(summary) = self.summary(appointment, auth_token).await {
            self.producer.notify(
                &format!("booking:{}", appointment.id),
                NotificationKind::BookingConfirmation,
                templates::booking_confirmation(&summary),
            ).await;
        }
    }

    pub async fn canceled(&self, appointment: &Appointment, auth_token: &str) {
        if let Some(summary) = self.summary(appointment, auth_token).await {
            self.producer.notify(
                &format!("cancel:{}", appointment.id),
                NotificationKind::Cancellation,
                templates::cancellation(&summary),
            ).await;
        }
    }

    pub async fn rescheduled(
        &self,
        appointment: &Appointment,
        previous_date: NaiveDate,
        previous_time: NaiveTime,
        auth_token: &str,
    ) {
        if let Some(summary) = self.summary(appointment, auth_token).await {
            self.producer.notify(
                &format!(
                    "reschedule:{}:{}T{}",
                    appointment.id, appointment.appointment_date, appointment.start_time.format("%H:%M")
                ),
                NotificationKind::Reschedule,
                templates::reschedule(&summary, previous_date, previous_time),
            ).await;
        }
    }

    pub async fn treated(&self, appointment: &Appointment, treatment: &Treatment, auth_token: &str) {
        if let Some(summary) = self.summary(appointment, auth_token).await {
            let note = TreatmentNote {
                diagnosis: treatment.diagnosis.clone(),
                prescription: treatment.prescription.clone(),
                test_recommended: treatment.test_recommended.clone(),
                notes: treatment.notes.clone(),
                follow_up_date: treatment.follow_up_date.filter(|_| treatment.follow_up_required),
            };
            self.producer.notify(
                &format!("treatment:{}", appointment.id),
                NotificationKind::TreatmentSummary,
                templates::treatment_summary(&summary, &note),
            ).await;
        }
    }

    async fn summary(&self, appointment: &Appointment, auth_token: &str) -> Option<AppointmentSummary> {
        build_summary(&self.patients, &self.doctors, appointment, auth_token).await
    }
}

pub(crate) async fn build_summary(
    patients: &PatientService,
    doctors: &DoctorService,
    appointment: &Appointment,
    auth_token: &str,
) -> Option<AppointmentSummary> {
    let patient = patients.get_patient(appointment.patient_id, auth_token).await;
    let doctor = doctors.get_doctor(appointment.doctor_id, auth_token).await;

    match (patient, doctor) {
        (Ok(patient), Ok(doctor)) => Some(AppointmentSummary {
            patient_name: patient.full_name,
            patient_email: patient.email,
            doctor_name: doctor.full_name,
            specialization: Some(doctor.specialization).filter(|s| !s.is_empty()),
            date: appointment.appointment_date,
            start_time: appointment.start_time,
        }),
        (Err(e), _) => {
            skip_notice(appointment.id, &e.to_string());
            None
        }
        (_, Err(e)) => {
            skip_notice(appointment.id, &e.to_string());
            None
        }
    }
}

fn skip_notice(appointment_id: Uuid, reason: &str) {
    warn!("Skipping email for appointment {}: {}", appointment_id, reason);
}
