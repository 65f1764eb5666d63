//! Plain-text email bodies for appointment events and scheduled digests.

use chrono::{NaiveDate, NaiveTime};

use crate::OutgoingEmail;

const SIGNATURE: &str = "Hospital Management System";

/// Details of one appointment as shown to a patient.
#[derive(Debug, Clone)]
pub struct AppointmentSummary {
    pub patient_name: String,
    pub patient_email: String,
    pub doctor_name: String,
    pub specialization: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone)]
pub struct TreatmentNote {
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub test_recommended: Option<String>,
    pub notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderDay {
    Today,
    Tomorrow,
}

#[derive(Debug, Clone)]
pub struct ReportLine {
    pub date: NaiveDate,
    pub patient_name: String,
    pub status: String,
}

#[derive(Debug, Clone, Default)]
pub struct MonthlyReport {
    pub doctor_name: String,
    pub doctor_email: String,
    /// Month label, e.g. "June 2025".
    pub month: String,
    pub total: usize,
    pub completed: usize,
    pub canceled: usize,
    pub emergency: usize,
    pub urgent: usize,
    pub appointments: Vec<ReportLine>,
}

impl MonthlyReport {
    /// Appointments neither completed nor canceled by month end.
    pub fn no_shows(&self) -> usize {
        self.total.saturating_sub(self.completed + self.canceled)
    }

    pub fn standard(&self) -> usize {
        self.total.saturating_sub(self.emergency + self.urgent)
    }
}

fn long_date(date: NaiveDate) -> String {
    date.format("%A, %d %B %Y").to_string()
}

fn clock(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}

fn doctor_lines(summary: &AppointmentSummary) -> String {
    let mut lines = format!("Doctor: Dr. {}\n", summary.doctor_name);
    if let Some(ref specialization) = summary.specialization {
        lines.push_str(&format!("Specialization: {}\n", specialization));
    }
    lines
}

pub fn booking_confirmation(summary: &AppointmentSummary) -> OutgoingEmail {
    OutgoingEmail {
        to: summary.patient_email.clone(),
        subject: "Appointment Confirmation".to_string(),
        body: format!(
            "Dear {},\n\nYour appointment has been booked successfully.\n\n{}Date: {}\nTime: {}\n\n\
             Please arrive 10 minutes before your scheduled time.\n\nThank you,\n{}\n",
            summary.patient_name,
            doctor_lines(summary),
            long_date(summary.date),
            clock(summary.start_time),
            SIGNATURE
        ),
    }
}

pub fn cancellation(summary: &AppointmentSummary) -> OutgoingEmail {
    OutgoingEmail {
        to: summary.patient_email.clone(),
        subject: "Appointment Canceled".to_string(),
        body: format!(
            "Dear {},\n\nThe following appointment has been canceled:\n\n{}Date: {}\nTime: {}\n\n\
             If you wish to reschedule, please book a new appointment.\n\nThank you,\n{}\n",
            summary.patient_name,
            doctor_lines(summary),
            long_date(summary.date),
            clock(summary.start_time),
            SIGNATURE
        ),
    }
}

pub fn reschedule(summary: &AppointmentSummary, previous_date: NaiveDate, previous_time: NaiveTime) -> OutgoingEmail {
    OutgoingEmail {
        to: summary.patient_email.clone(),
        subject: "Appointment Rescheduled".to_string(),
        body: format!(
            "Dear {},\n\nYour appointment has been moved.\n\nPrevious: {} at {}\nNew: {} at {}\n{}\n\
             Please arrive 10 minutes before your scheduled time.\n\nThank you,\n{}\n",
            summary.patient_name,
            long_date(previous_date),
            clock(previous_time),
            long_date(summary.date),
            clock(summary.start_time),
            doctor_lines(summary),
            SIGNATURE
        ),
    }
}

pub fn treatment_summary(summary: &AppointmentSummary, treatment: &TreatmentNote) -> OutgoingEmail {
    let mut body = format!(
        "Dear {},\n\nHere is the summary of your recent appointment:\n\n\
         APPOINTMENT DETAILS:\n--------------------\n{}Date: {}\nTime: {}\n\n\
         DIAGNOSIS:\n----------\n{}\n\n\
         PRESCRIPTION:\n-------------\n{}\n\n\
         TESTS RECOMMENDED:\n------------------\n{}\n\n\
         NOTES:\n------\n{}\n",
        summary.patient_name,
        doctor_lines(summary),
        long_date(summary.date),
        clock(summary.start_time),
        treatment.diagnosis,
        treatment.prescription.as_deref().unwrap_or("None prescribed"),
        treatment.test_recommended.as_deref().unwrap_or("None"),
        treatment.notes.as_deref().unwrap_or("None"),
    );

    if let Some(follow_up) = treatment.follow_up_date {
        body.push_str(&format!(
            "\nFOLLOW-UP:\n----------\nPlease schedule a follow-up appointment on or after {}.\n",
            follow_up.format("%d %B %Y")
        ));
    }

    body.push_str(&format!(
        "\nIf you have any questions, please contact us or log in to your account.\n\nTake care,\n{}\n",
        SIGNATURE
    ));

    OutgoingEmail {
        to: summary.patient_email.clone(),
        subject: format!("Treatment Summary - Appointment on {}", summary.date.format("%d %b %Y")),
        body,
    }
}

pub fn appointment_reminder(summary: &AppointmentSummary, day: ReminderDay) -> OutgoingEmail {
    let (label, notice) = match day {
        ReminderDay::Today => ("Today", "Your appointment is TODAY."),
        ReminderDay::Tomorrow => ("Tomorrow", "Your appointment is TOMORROW."),
    };

    OutgoingEmail {
        to: summary.patient_email.clone(),
        subject: format!("Appointment Reminder - {}", label),
        body: format!(
            "Dear {},\n\nThis is a friendly reminder about your upcoming appointment:\n\n{}Date: {}\nTime: {}\n\n\
             {} Please arrive 10 minutes early.\n\n\
             If you need to cancel or reschedule, please log in to your account.\n\nThank you,\n{}\n",
            summary.patient_name,
            doctor_lines(summary),
            long_date(summary.date),
            clock(summary.start_time),
            notice,
            SIGNATURE
        ),
    }
}

pub fn monthly_report(report: &MonthlyReport) -> OutgoingEmail {
    let mut body = format!(
        "Dear Dr. {},\n\nHere is your appointment summary for {}:\n\n\
         STATISTICS:\n-----------\nTotal Appointments: {}\nCompleted: {}\nCanceled: {}\nNo-shows: {}\n\n\
         PRIORITY BREAKDOWN:\n-------------------\nEmergency Cases: {}\nUrgent Cases: {}\nStandard Cases: {}\n\n\
         PATIENT DETAILS:\n----------------",
        report.doctor_name,
        report.month,
        report.total,
        report.completed,
        report.canceled,
        report.no_shows(),
        report.emergency,
        report.urgent,
        report.standard(),
    );

    for line in report.appointments.iter().take(10) {
        body.push_str(&format!(
            "\n- {}: {} ({})",
            line.date.format("%d %b"),
            line.patient_name,
            line.status
        ));
    }
    if report.total > 10 {
        body.push_str(&format!("\n... and {} more appointments", report.total - 10));
    }

    body.push_str(&format!("\n\nThank you for your dedication!\n\nBest regards,\n{}\n", SIGNATURE));

    OutgoingEmail {
        to: report.doctor_email.clone(),
        subject: format!("Monthly Appointment Report - {}", report.month),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> AppointmentSummary {
        AppointmentSummary {
            patient_name: "Jane Doe".to_string(),
            patient_email: "jane@example.com".to_string(),
            doctor_name: "Gregory House".to_string(),
            specialization: Some("Diagnostics".to_string()),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn reminder_mentions_day() {
        let email = appointment_reminder(&summary(), ReminderDay::Tomorrow);
        assert_eq!(email.subject, "Appointment Reminder - Tomorrow");
        assert!(email.body.contains("TOMORROW"));
        assert!(email.body.contains("Sunday, 01 June 2025"));
        assert!(email.body.contains("09:00 AM"));
    }

    #[test]
    fn treatment_summary_includes_follow_up_only_when_set() {
        let mut note = TreatmentNote {
            diagnosis: "Seasonal flu".to_string(),
            prescription: None,
            test_recommended: None,
            notes: None,
            follow_up_date: None,
        };
        let without = treatment_summary(&summary(), &note);
        assert!(without.body.contains("None prescribed"));
        assert!(!without.body.contains("FOLLOW-UP"));

        note.follow_up_date = NaiveDate::from_ymd_opt(2025, 6, 15);
        let with = treatment_summary(&summary(), &note);
        assert!(with.body.contains("on or after 15 June 2025"));
    }

    #[test]
    fn monthly_report_lists_first_ten() {
        let report = MonthlyReport {
            doctor_name: "Gregory House".to_string(),
            doctor_email: "house@hospital.com".to_string(),
            month: "May 2025".to_string(),
            total: 12,
            completed: 8,
            canceled: 2,
            emergency: 1,
            urgent: 3,
            appointments: (1..=12)
                .map(|day| ReportLine {
                    date: NaiveDate::from_ymd_opt(2025, 5, day).unwrap(),
                    patient_name: format!("Patient {}", day),
                    status: "completed".to_string(),
                })
                .collect(),
        };

        let email = monthly_report(&report);
        assert_eq!(email.subject, "Monthly Appointment Report - May 2025");
        assert!(email.body.contains("No-shows: 2"));
        assert!(email.body.contains("Standard Cases: 8"));
        assert!(email.body.contains("Patient 10"));
        assert!(!email.body.contains("Patient 11"));
        assert!(email.body.contains("... and 2 more appointments"));
    }
}
