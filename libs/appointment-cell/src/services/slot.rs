//! Slot availability: does a requested interval fit a doctor's published
//! windows without overlapping another live booking?

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use doctor_cell::{AvailabilityProvider, AvailabilityWindow};
use shared_config::DEFAULT_SLOT_MINUTES;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

pub const REASON_AVAILABLE: &str = "Slot available";
pub const REASON_NO_WINDOWS: &str = "Doctor not available on this date";
pub const REASON_OUTSIDE_WINDOWS: &str = "Requested time is outside doctor's availability";
pub const REASON_END_BEFORE_START: &str = "Requested end time must be after start time";
pub const REASON_TOO_LONG: &str = "Requested duration must not exceed 1440 minutes";

/// Longest slot a request may ask for.
pub const MAX_SLOT_MINUTES: i64 = 24 * 60;

/// How long a requested slot lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLength {
    Until(NaiveTime),
    Minutes(i64),
}

impl Default for SlotLength {
    fn default() -> Self {
        SlotLength::Minutes(DEFAULT_SLOT_MINUTES)
    }
}

impl SlotLength {
    /// Explicit end time wins over a duration; neither falls back to `default_minutes`.
    pub fn from_parts(end_time: Option<NaiveTime>, duration_minutes: Option<i64>, default_minutes: i64) -> Self {
        match (end_time, duration_minutes) {
            (Some(end), _) => SlotLength::Until(end),
            (None, Some(minutes)) => SlotLength::Minutes(minutes),
            (None, None) => SlotLength::Minutes(default_minutes),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub length: SlotLength,
    /// Booking to ignore, used when re-checking an appointment being moved.
    pub exclude_appointment_id: Option<Uuid>,
}

impl SlotRequest {
    /// `None` when the requested length is longer than a day.
    pub fn interval(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let start = self.date.and_time(self.start_time);
        let end = match self.length {
            SlotLength::Until(end) => self.date.and_time(end),
            SlotLength::Minutes(minutes) => plus_minutes(start, minutes)?,
        };
        Some((start, end))
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        self.interval().map(|(_, end)| end.time())
    }

    /// The requested interval, or the reason it cannot be booked at all.
    pub fn checked_interval(&self) -> Result<(NaiveDateTime, NaiveDateTime), &'static str> {
        let (start, end) = self.interval().ok_or(REASON_TOO_LONG)?;
        if end <= start {
            return Err(REASON_END_BEFORE_START);
        }
        Ok((start, end))
    }
}

/// Non-positive lengths collapse to `start` so they fail the end-after-start test.
fn plus_minutes(start: NaiveDateTime, minutes: i64) -> Option<NaiveDateTime> {
    if minutes > MAX_SLOT_MINUTES {
        return None;
    }
    Duration::try_minutes(minutes.max(0)).and_then(|d| start.checked_add_signed(d))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotVerdict {
    pub available: bool,
    pub reason: String,
}

impl SlotVerdict {
    fn available() -> Self {
        Self { available: true, reason: REASON_AVAILABLE.to_string() }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self { available: false, reason: reason.into() }
    }
}

/// Source of the bookings a new slot must not collide with.
#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Non-canceled appointments of `doctor_id` on `date`, minus `exclude` if given.
    async fn open_appointments(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        exclude: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError>;
}

/// Occupied interval of an existing booking: end time, else duration, else the default slot.
pub fn booking_interval(appointment: &Appointment, default_minutes: i64) -> (NaiveDateTime, NaiveDateTime) {
    let start = appointment.appointment_date.and_time(appointment.start_time);
    let end = match (appointment.end_time, appointment.duration_minutes) {
        (Some(end), _) => Some(appointment.appointment_date.and_time(end)),
        (None, Some(minutes)) => plus_minutes(start, minutes),
        (None, None) => None,
    };
    let end = end
        .or_else(|| plus_minutes(start, default_minutes))
        .unwrap_or(start);
    (start, end)
}

/// Half-open overlap: touching intervals do not overlap.
pub fn intervals_overlap(a: (NaiveDateTime, NaiveDateTime), b: (NaiveDateTime, NaiveDateTime)) -> bool {
    !(b.1 <= a.0 || b.0 >= a.1)
}

/// First live booking overlapping `requested`.
pub fn first_conflict<'a>(
    request: &SlotRequest,
    requested: (NaiveDateTime, NaiveDateTime),
    bookings: &'a [Appointment],
    default_minutes: i64,
) -> Option<&'a Appointment> {
    bookings
        .iter()
        .filter(|b| b.status != AppointmentStatus::Canceled)
        .filter(|b| Some(b.id) != request.exclude_appointment_id)
        .find(|b| intervals_overlap(requested, booking_interval(b, default_minutes)))
}

fn conflict_verdict(existing: &Appointment) -> SlotVerdict {
    SlotVerdict::rejected(format!(
        "Conflicts with existing appointment at {}",
        existing.start_time.format("%H:%M")
    ))
}

/// Decide a slot against already-fetched bookings and windows.
///
/// Canceled rows and the excluded id are skipped here as well, so raw rows
/// can be handed in.
pub fn evaluate_slot(
    request: &SlotRequest,
    bookings: &[Appointment],
    windows: &[AvailabilityWindow],
    default_minutes: i64,
) -> SlotVerdict {
    let requested = match request.checked_interval() {
        Ok(interval) => interval,
        Err(reason) => return SlotVerdict::rejected(reason),
    };

    if let Some(existing) = first_conflict(request, requested, bookings, default_minutes) {
        return conflict_verdict(existing);
    }

    let windows: Vec<&AvailabilityWindow> = windows
        .iter()
        .filter(|w| w.is_available && w.available_date == request.date)
        .collect();
    if windows.is_empty() {
        return SlotVerdict::rejected(REASON_NO_WINDOWS);
    }

    // The whole slot must sit inside one window; adjacent windows are not merged.
    let fits = windows.iter().any(|w| {
        let window = (request.date.and_time(w.start_time), request.date.and_time(w.end_time));
        requested.0 >= window.0 && requested.1 <= window.1
    });
    if !fits {
        return SlotVerdict::rejected(REASON_OUTSIDE_WINDOWS);
    }

    SlotVerdict::available()
}

pub struct SlotAvailabilityChecker {
    availability: Arc<dyn AvailabilityProvider>,
    ledger: Arc<dyn BookingLedger>,
    default_minutes: i64,
}

impl SlotAvailabilityChecker {
    pub fn new(
        availability: Arc<dyn AvailabilityProvider>,
        ledger: Arc<dyn BookingLedger>,
        default_minutes: i64,
    ) -> Self {
        Self {
            availability,
            ledger,
            default_minutes,
        }
    }

    pub fn default_minutes(&self) -> i64 {
        self.default_minutes
    }

    /// Run both checks. Storage failures are errors; an unavailable slot is not.
    pub async fn check(&self, request: &SlotRequest, auth_token: &str) -> Result<SlotVerdict, AppointmentError> {
        debug!(
            "Checking slot for doctor {} on {} at {}",
            request.doctor_id, request.date, request.start_time
        );

        let requested = match request.checked_interval() {
            Ok(interval) => interval,
            Err(reason) => return Ok(SlotVerdict::rejected(reason)),
        };

        let bookings = self.ledger
            .open_appointments(request.doctor_id, request.date, request.exclude_appointment_id, auth_token)
            .await?;

        if let Some(existing) = first_conflict(request, requested, &bookings, self.default_minutes) {
            return Ok(conflict_verdict(existing));
        }

        let windows = self.availability
            .active_windows(request.doctor_id, request.date, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(evaluate_slot(request, &bookings, &windows, self.default_minutes))
    }
}
