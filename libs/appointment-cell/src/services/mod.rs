pub mod booking;
pub mod digest;
pub mod ledger;
pub mod lifecycle;
pub mod notices;
pub mod nursing;
pub mod slot;
pub mod treatment;

pub use booking::AppointmentBookingService;
pub use digest::DigestService;
pub use ledger::AppointmentLedger;
pub use notices::AppointmentNotifier;
pub use nursing::NursingService;
pub use slot::{BookingLedger, SlotAvailabilityChecker, SlotLength, SlotRequest, SlotVerdict};
pub use treatment::TreatmentService;
