// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::error::BookingError;
use crate::models::AppointmentStatus;

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), BookingError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(BookingError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Every status reachable in one step from `current_status`.
    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Approved,
                AppointmentStatus::Rejected,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Approved => vec![
                AppointmentStatus::Finished,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Rejected => vec![AppointmentStatus::Cancelled],
            // Terminal states
            AppointmentStatus::Finished => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Participants, branch, reason and slot may only change before the visit is settled.
    pub fn is_editable(&self, status: AppointmentStatus) -> bool {
        matches!(status, AppointmentStatus::Pending | AppointmentStatus::Approved)
    }

    pub fn ensure_editable(&self, status: AppointmentStatus) -> Result<(), BookingError> {
        if self.is_editable(status) {
            Ok(())
        } else {
            Err(BookingError::NotEditable(status))
        }
    }
}
