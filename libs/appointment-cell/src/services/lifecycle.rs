use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }

        Ok(())
    }

    /// Only active appointments may be moved, canceled, or completed.
    pub fn ensure_active(&self, current_status: AppointmentStatus) -> Result<(), AppointmentError> {
        if current_status != AppointmentStatus::Active {
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }
        Ok(())
    }

    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Active => vec![AppointmentStatus::Completed, AppointmentStatus::Canceled],
            // Terminal states
            AppointmentStatus::Completed | AppointmentStatus::Canceled => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
