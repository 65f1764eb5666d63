//! Scheduled emails: daily appointment reminders and monthly doctor reports.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use reqwest::Method;
use serde_json::Value;
use tokio::time::{interval, Duration as TickDuration};
use tracing::{error, info, instrument};
use uuid::Uuid;

use doctor_cell::{Doctor, DoctorSearchFilters, DoctorService};
use notification_cell::templates::{self, MonthlyReport, ReminderDay, ReportLine};
use notification_cell::{EnqueueOutcome, NotificationKind, NotificationProducer};
use patient_cell::PatientService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, Priority};
use crate::services::booking::reminder_dates;
use crate::services::notices::build_summary;

const DOCTOR_PAGE_SIZE: i32 = 200;

pub struct DigestService {
    supabase: SupabaseClient,
    doctors: DoctorService,
    patients: PatientService,
    producer: NotificationProducer,
    auth_token: String,
}

impl DigestService {
    pub fn new(config: &AppConfig, producer: NotificationProducer) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctors: DoctorService::new(config),
            patients: PatientService::new(config),
            producer,
            auth_token: config.system_token().to_string(),
        }
    }

    /// Queue reminders for active appointments today and tomorrow. Returns how many were queued.
    #[instrument(skip(self))]
    pub async fn send_daily_reminders(&self, today: NaiveDate) -> Result<usize, AppointmentError> {
        let [first, second] = reminder_dates(today);
        let path = format!(
            "/rest/v1/appointments?appointment_date=in.({},{})&status=eq.{}&order=appointment_date.asc,start_time.asc",
            first, second, AppointmentStatus::Active
        );
        let appointments = self.fetch_appointments(&path).await?;

        let mut queued = 0;
        for appointment in &appointments {
            let Some(summary) = build_summary(&self.patients, &self.doctors, appointment, &self.auth_token).await else {
                continue;
            };
            let day = if appointment.appointment_date == today { ReminderDay::Today } else { ReminderDay::Tomorrow };

            let outcome = self.producer.enqueue(
                &format!("reminder:{}:{}", appointment.id, today),
                NotificationKind::AppointmentReminder,
                templates::appointment_reminder(&summary, day),
            ).await;
            match outcome {
                Ok(EnqueueOutcome::Queued(_)) => queued += 1,
                Ok(EnqueueOutcome::Duplicate { .. }) => {}
                Err(e) => error!("Failed to queue reminder for appointment {}: {}", appointment.id, e),
            }
        }

        info!("Queued {} of {} appointment reminders", queued, appointments.len());
        Ok(queued)
    }

    /// Queue last month's report for every active doctor. Returns how many were queued.
    #[instrument(skip(self))]
    pub async fn send_monthly_reports(&self, today: NaiveDate) -> Result<usize, AppointmentError> {
        let (month_start, month_end) = previous_month(today);
        let label = month_start.format("%B %Y").to_string();
        let month_key = month_start.format("%Y-%m").to_string();

        let mut queued = 0;
        for doctor in self.active_doctors().await? {
            let path = format!(
                "/rest/v1/appointments?doctor_id=eq.{}&appointment_date=gte.{}&appointment_date=lte.{}&order=appointment_date.asc,start_time.asc",
                doctor.id, month_start, month_end
            );
            let appointments = self.fetch_appointments(&path).await?;
            let names = self.patient_names(&appointments).await;
            let report = build_report(&doctor, &label, &appointments, &names);

            let outcome = self.producer.enqueue(
                &format!("report:{}:{}", doctor.id, month_key),
                NotificationKind::MonthlyReport,
                templates::monthly_report(&report),
            ).await;
            match outcome {
                Ok(EnqueueOutcome::Queued(_)) => queued += 1,
                Ok(EnqueueOutcome::Duplicate { .. }) => {}
                Err(e) => error!("Failed to queue monthly report for doctor {}: {}", doctor.id, e),
            }
        }

        info!("Queued {} monthly reports for {}", queued, label);
        Ok(queued)
    }

    async fn active_doctors(&self) -> Result<Vec<Doctor>, AppointmentError> {
        let mut doctors = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.doctors.search_doctors(
                DoctorSearchFilters {
                    limit: Some(DOCTOR_PAGE_SIZE),
                    offset: Some(offset),
                    ..Default::default()
                },
                &self.auth_token,
            ).await?;
            let done = page.len() < DOCTOR_PAGE_SIZE as usize;
            doctors.extend(page);
            if done {
                return Ok(doctors);
            }
            offset += DOCTOR_PAGE_SIZE;
        }
    }

    async fn fetch_appointments(&self, path: &str) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, Some(&self.auth_token), None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(AppointmentError::from))
            .collect()
    }

    async fn patient_names(&self, appointments: &[Appointment]) -> HashMap<Uuid, String> {
        let mut names = HashMap::new();
        for appointment in appointments.iter().take(10) {
            if names.contains_key(&appointment.patient_id) {
                continue;
            }
            let name = match self.patients.get_patient(appointment.patient_id, &self.auth_token).await {
                Ok(patient) => patient.full_name,
                Err(_) => "Unknown patient".to_string(),
            };
            names.insert(appointment.patient_id, name);
        }
        names
    }
}

/// First and last day of the month before `today`.
pub fn previous_month(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let this_month_start = today.with_day(1).unwrap_or(today);
    let month_end = this_month_start - Duration::days(1);
    let month_start = month_end.with_day(1).unwrap_or(month_end);
    (month_start, month_end)
}

pub fn build_report(
    doctor: &Doctor,
    month: &str,
    appointments: &[Appointment],
    patient_names: &HashMap<Uuid, String>,
) -> MonthlyReport {
    MonthlyReport {
        doctor_name: doctor.full_name.clone(),
        doctor_email: doctor.email.clone(),
        month: month.to_string(),
        total: appointments.len(),
        completed: appointments.iter().filter(|a| a.status == AppointmentStatus::Completed).count(),
        canceled: appointments.iter().filter(|a| a.status == AppointmentStatus::Canceled).count(),
        emergency: appointments.iter().filter(|a| a.priority == Priority::Emergency).count(),
        urgent: appointments.iter().filter(|a| a.priority == Priority::Urgent).count(),
        appointments: appointments
            .iter()
            .take(10)
            .map(|a| ReportLine {
                date: a.appointment_date,
                patient_name: patient_names
                    .get(&a.patient_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown patient".to_string()),
                status: a.status.to_string(),
            })
            .collect(),
    }
}

/// Which digests already ran, so each fires once per day / month.
#[derive(Debug, Default, Clone)]
pub struct DigestSchedule {
    last_reminder: Option<NaiveDate>,
    last_report: Option<(i32, u32)>,
}

impl DigestSchedule {
    pub fn reminders_due(&self, now: NaiveDateTime, reminder_hour: u32) -> bool {
        now.hour() >= reminder_hour && self.last_reminder != Some(now.date())
    }

    pub fn reports_due(&self, now: NaiveDateTime, report_hour: u32) -> bool {
        now.day() == 1
            && now.hour() >= report_hour
            && self.last_report != Some((now.year(), now.month()))
    }

    pub fn mark_reminders(&mut self, date: NaiveDate) {
        self.last_reminder = Some(date);
    }

    pub fn mark_reports(&mut self, date: NaiveDate) {
        self.last_report = Some((date.year(), date.month()));
    }
}

/// Tick once a minute and fire digests when due. Dedup keys make reruns after
/// a restart harmless.
pub async fn run_digest_scheduler(config: Arc<AppConfig>, producer: NotificationProducer) {
    let service = DigestService::new(&config, producer);
    let mut schedule = DigestSchedule::default();
    let mut ticker = interval(TickDuration::from_secs(60));

    info!(
        "Digest scheduler started (reminders at {:02}:00, reports on day 1 at {:02}:00)",
        config.reminder_hour, config.report_hour
    );

    loop {
        ticker.tick().await;
        let now = Local::now().naive_local();

        if schedule.reminders_due(now, config.reminder_hour) {
            match service.send_daily_reminders(now.date()).await {
                Ok(_) => schedule.mark_reminders(now.date()),
                Err(e) => error!("Daily reminders failed: {}", e),
            }
        }

        if schedule.reports_due(now, config.report_hour) {
            match service.send_monthly_reports(now.date()).await {
                Ok(_) => schedule.mark_reports(now.date()),
                Err(e) => error!("Monthly reports failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn previous_month_handles_year_boundary() {
        let (start, end) = previous_month(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());

        let (start, end) = previous_month(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    }

    #[test]
    fn reminders_fire_once_per_day_after_hour() {
        let mut schedule = DigestSchedule::default();
        assert!(!schedule.reminders_due(at(2025, 6, 1, 8), 9));
        assert!(schedule.reminders_due(at(2025, 6, 1, 9), 9));

        schedule.mark_reminders(at(2025, 6, 1, 9).date());
        assert!(!schedule.reminders_due(at(2025, 6, 1, 15), 9));
        assert!(schedule.reminders_due(at(2025, 6, 2, 9), 9));
    }

    #[test]
    fn reports_fire_on_first_of_month_only() {
        let mut schedule = DigestSchedule::default();
        assert!(!schedule.reports_due(at(2025, 6, 2, 11), 10));
        assert!(!schedule.reports_due(at(2025, 6, 1, 9), 10));
        assert!(schedule.reports_due(at(2025, 6, 1, 10), 10));

        schedule.mark_reports(at(2025, 6, 1, 10).date());
        assert!(!schedule.reports_due(at(2025, 6, 1, 23), 10));
        assert!(schedule.reports_due(at(2025, 7, 1, 10), 10));
    }
}
