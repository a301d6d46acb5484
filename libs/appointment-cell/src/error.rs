use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::AppointmentStatus;
use crate::store::StoreError;

/// Everything a booking or slot operation can refuse with. Messages are shown to
/// end users as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BookingError {
    #[error("{}", .0.join(" "))]
    InvalidInput(Vec<String>),

    #[error("Selected time slot does not exist.")]
    SlotNotFound,

    #[error("Appointment not found.")]
    AppointmentNotFound,

    #[error("Selected patient does not exist.")]
    PatientNotFound,

    #[error("Selected doctor does not exist.")]
    DoctorNotFound,

    #[error("Selected branch does not exist.")]
    BranchNotFound,

    #[error("Selected time slot is no longer available.")]
    SlotUnavailable,

    #[error("Time slot has been booked with an appointment and cannot be changed.")]
    SlotBooked,

    #[error("Time slot must start in the future.")]
    PastSlot,

    #[error("Start time must be before end time.")]
    InvalidRange,

    #[error("Time slot overlaps with an existing slot.")]
    Overlap,

    #[error("Selected doctor does not match the time slot's doctor.")]
    DoctorMismatch,

    #[error("Selected user cannot be a patient.")]
    InvalidPatientRole,

    #[error("Selected user is not a doctor.")]
    InvalidDoctorRole,

    #[error("This patient already has a conflicting appointment.")]
    ConflictingAppointment,

    #[error("Appointment cannot be changed while it is {0}.")]
    NotEditable(AppointmentStatus),

    #[error("Appointment cannot move from {from} to {to}.")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("You are not allowed to perform this action.")]
    Forbidden,

    /// Storage fault. The detail is logged, never shown.
    #[error("An error occurred while saving changes. Please try again.")]
    PersistenceFailure(String),
}

impl BookingError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        BookingError::InvalidInput(vec![message.into()])
    }

    /// Ordered messages for the caller to display, all of them.
    pub fn messages(&self) -> Vec<String> {
        match self {
            BookingError::InvalidInput(messages) => messages.clone(),
            other => vec![other.to_string()],
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::SlotNotFound
            | BookingError::AppointmentNotFound
            | BookingError::PatientNotFound
            | BookingError::DoctorNotFound
            | BookingError::BranchNotFound => StatusCode::NOT_FOUND,
            BookingError::SlotUnavailable
            | BookingError::SlotBooked
            | BookingError::Overlap
            | BookingError::ConflictingAppointment => StatusCode::CONFLICT,
            BookingError::Forbidden => StatusCode::FORBIDDEN,
            BookingError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotTaken(_) => BookingError::SlotUnavailable,
            StoreError::PatientBusy(_) => BookingError::ConflictingAppointment,
            other => BookingError::PersistenceFailure(other.to_string()),
        }
    }
}

impl From<JsonRejection> for BookingError {
    fn from(rejection: JsonRejection) -> Self {
        BookingError::invalid_input(rejection.body_text())
    }
}

impl From<PathRejection> for BookingError {
    fn from(rejection: PathRejection) -> Self {
        BookingError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for BookingError {
    fn from(rejection: QueryRejection) -> Self {
        BookingError::invalid_input(rejection.body_text())
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            BookingError::PersistenceFailure(detail) => error!("Booking persistence failure: {}", detail),
            other => warn!("Booking request rejected ({}): {}", status, other),
        }

        let body = Json(json!({
            "success": false,
            "errors": self.messages()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_keeps_every_message() {
        let err = BookingError::InvalidInput(vec![
            "Invalid patient selection.".to_string(),
            "Invalid branch selection.".to_string(),
        ]);
        assert_eq!(err.messages().len(), 2);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_errors_translate() {
        assert_eq!(
            BookingError::from(StoreError::SlotTaken("appointments_time_slot_id_key".into())),
            BookingError::SlotUnavailable
        );

        let err = BookingError::from(StoreError::Backend("connection reset".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.to_string().contains("connection reset"));
    }
}
