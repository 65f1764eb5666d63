pub mod availability;
pub mod doctor;

pub use availability::{AvailabilityProvider, AvailabilityService};
pub use doctor::DoctorService;
