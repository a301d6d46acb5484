// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::BookingError;
use crate::models::{
    Appointment, AppointmentChanges, AppointmentStatus, Branch, CallerIdentity,
    CreateAppointmentRequest, NewAppointment, UpdateAppointmentRequest, UserRecord,
    MAX_REASON_LENGTH,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::SlotAvailabilityService;
use crate::store::{ClinicStore, StoreError};

const INVALID_PATIENT: &str = "Invalid patient selection.";
const INVALID_DOCTOR: &str = "Invalid doctor selection.";
const INVALID_BRANCH: &str = "Invalid branch selection.";
const INVALID_SLOT: &str = "Invalid time slot selection.";
const REASON_TOO_LONG: &str = "Reason cannot exceed 500 characters.";

/// Validated create input.
#[derive(Debug)]
struct BookingInput {
    patient_id: i64,
    doctor_id: i64,
    branch_id: i64,
    slot_id: i64,
    reason: String,
}

/// Creates, edits, approves and removes appointments while keeping each
/// appointment and its slot pointing at one another.
pub struct AppointmentBookingService {
    store: Arc<dyn ClinicStore>,
    slots: SlotAvailabilityService,
    conflicts: ConflictDetectionService,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self {
            slots: SlotAvailabilityService::new(Arc::clone(&store)),
            conflicts: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle: AppointmentLifecycleService::new(),
            store,
        }
    }

    pub async fn create(
        &self,
        caller: &CallerIdentity,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, BookingError> {
        let input = validate_create_input(request)?;
        debug!(
            "Booking slot {} for patient {} with doctor {}",
            input.slot_id, input.patient_id, input.doctor_id
        );

        if !caller.may_book(input.patient_id, input.doctor_id) {
            return Err(BookingError::Forbidden);
        }

        let slot = self.slots.find_slot(input.slot_id).await?;
        if !slot.is_available() {
            return Err(BookingError::SlotUnavailable);
        }
        if slot.start_time < Utc::now() {
            return Err(BookingError::PastSlot);
        }
        if slot.doctor_id != input.doctor_id {
            return Err(BookingError::DoctorMismatch);
        }

        self.require_patient(input.patient_id).await?;
        self.require_doctor(input.doctor_id).await?;
        self.require_branch(input.branch_id).await?;

        if self
            .conflicts
            .has_conflict(input.patient_id, slot.start_time, slot.end_time, None)
            .await?
        {
            return Err(BookingError::ConflictingAppointment);
        }

        let appointment = self
            .store
            .book_slot(NewAppointment {
                user_id: input.patient_id,
                doctor_id: input.doctor_id,
                branch_id: input.branch_id,
                reason: input.reason,
                time_slot_id: input.slot_id,
            })
            .await
            .map_err(slot_write_error)?;

        info!(
            "Appointment {} booked on slot {} for patient {}",
            appointment.id, appointment.time_slot_id, appointment.user_id
        );
        Ok(appointment)
    }

    /// Omitted fields keep their value. Everything that changes is committed together.
    pub async fn update(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, BookingError> {
        let current = self.find_appointment(appointment_id).await?;
        if !caller.is_party_to(&current) {
            return Err(BookingError::Forbidden);
        }
        self.lifecycle.ensure_editable(current.status)?;

        validate_update_input(&request)?;

        let changes = AppointmentChanges {
            user_id: request.user_id.unwrap_or(current.user_id),
            doctor_id: request.doctor_id.unwrap_or(current.doctor_id),
            branch_id: request.branch_id.unwrap_or(current.branch_id),
            reason: request.reason.unwrap_or_else(|| current.reason.clone()),
        };
        let target_slot_id = request.time_slot_id.unwrap_or(current.time_slot_id);

        if !caller.may_book(changes.user_id, changes.doctor_id) {
            return Err(BookingError::Forbidden);
        }

        let slot_changed = target_slot_id != current.time_slot_id;
        let patient_changed = changes.user_id != current.user_id;
        let doctor_changed = changes.doctor_id != current.doctor_id;

        let slot = self.slots.find_slot(target_slot_id).await?;
        if slot_changed {
            if !slot.is_available() {
                return Err(BookingError::SlotUnavailable);
            }
            if slot.start_time < Utc::now() {
                return Err(BookingError::PastSlot);
            }
        }
        if (slot_changed || doctor_changed) && slot.doctor_id != changes.doctor_id {
            return Err(BookingError::DoctorMismatch);
        }

        if patient_changed {
            self.require_patient(changes.user_id).await?;
        }
        if doctor_changed {
            self.require_doctor(changes.doctor_id).await?;
        }
        if changes.branch_id != current.branch_id {
            self.require_branch(changes.branch_id).await?;
        }

        if (slot_changed || patient_changed)
            && self
                .conflicts
                .has_conflict(changes.user_id, slot.start_time, slot.end_time, Some(appointment_id))
                .await?
        {
            return Err(BookingError::ConflictingAppointment);
        }

        let updated = if slot_changed {
            let moved = self
                .store
                .move_booking(appointment_id, current.time_slot_id, target_slot_id, &changes)
                .await
                .map_err(slot_write_error)?;
            info!(
                "Appointment {} moved from slot {} to slot {}",
                appointment_id, current.time_slot_id, target_slot_id
            );
            moved
        } else {
            let updated = self
                .store
                .update_appointment(appointment_id, &changes)
                .await
                .map_err(appointment_write_error)?;
            info!("Appointment {} updated", appointment_id);
            updated
        };

        Ok(updated)
    }

    /// Frees the slot, then removes the row, as two commits in that order. A
    /// failure of the second commit leaves a free slot and a surviving row, never
    /// a booked slot without its appointment.
    pub async fn delete(&self, caller: &CallerIdentity, appointment_id: i64) -> Result<(), BookingError> {
        let appointment = self.find_appointment(appointment_id).await?;
        if !caller.is_party_to(&appointment) {
            return Err(BookingError::Forbidden);
        }

        self.slots.release(appointment.time_slot_id).await?;

        if let Err(e) = self.store.delete_appointment(appointment_id).await {
            error!(
                "Slot {} released but appointment {} could not be removed: {}",
                appointment.time_slot_id, appointment_id, e
            );
            return Err(appointment_write_error(e));
        }

        info!("Appointment {} deleted, slot {} is free", appointment_id, appointment.time_slot_id);
        Ok(())
    }

    pub async fn approve(&self, caller: &CallerIdentity, appointment_id: i64) -> Result<Appointment, BookingError> {
        let appointment = self.find_appointment(appointment_id).await?;
        if !caller.is_staff() {
            return Err(BookingError::Forbidden);
        }

        if appointment.status == AppointmentStatus::Approved {
            debug!("Appointment {} already approved", appointment_id);
            return Ok(appointment);
        }

        self.commit_status(appointment, AppointmentStatus::Approved).await
    }

    /// Moves the appointment through its status machine. The slot stays linked
    /// whatever the new status is.
    pub async fn change_status(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        if new_status == AppointmentStatus::Approved {
            return self.approve(caller, appointment_id).await;
        }

        let appointment = self.find_appointment(appointment_id).await?;
        if !caller.is_party_to(&appointment) {
            return Err(BookingError::Forbidden);
        }

        let allowed = match new_status {
            AppointmentStatus::Cancelled => true,
            _ => caller.is_staff() || caller.user_id == appointment.doctor_id,
        };
        if !allowed {
            warn!(
                "User {} may not mark appointment {} as {}",
                caller.user_id, appointment_id, new_status
            );
            return Err(BookingError::Forbidden);
        }

        self.commit_status(appointment, new_status).await
    }

    async fn commit_status(
        &self,
        appointment: Appointment,
        new_status: AppointmentStatus,
    ) -> Result<Appointment, BookingError> {
        self.lifecycle
            .validate_status_transition(appointment.status, new_status)?;

        let updated = self
            .store
            .set_appointment_status(appointment.id, new_status)
            .await
            .map_err(appointment_write_error)?;

        info!(
            "Appointment {} status changed from {} to {}",
            appointment.id, appointment.status, new_status
        );
        Ok(updated)
    }

    async fn find_appointment(&self, appointment_id: i64) -> Result<Appointment, BookingError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(BookingError::AppointmentNotFound)
    }

    async fn require_patient(&self, user_id: i64) -> Result<UserRecord, BookingError> {
        let patient = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(BookingError::PatientNotFound)?;

        if !patient.role.is_patient_eligible() {
            return Err(BookingError::InvalidPatientRole);
        }
        Ok(patient)
    }

    async fn require_doctor(&self, user_id: i64) -> Result<UserRecord, BookingError> {
        let doctor = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(BookingError::DoctorNotFound)?;

        if !doctor.role.is_doctor() {
            return Err(BookingError::InvalidDoctorRole);
        }
        Ok(doctor)
    }

    async fn require_branch(&self, branch_id: i64) -> Result<Branch, BookingError> {
        self.store
            .get_branch(branch_id)
            .await?
            .ok_or(BookingError::BranchNotFound)
    }
}

fn positive(id: Option<i64>) -> Option<i64> {
    id.filter(|value| *value > 0)
}

fn reason_too_long(reason: &str) -> bool {
    reason.chars().count() > MAX_REASON_LENGTH
}

/// Reports every bad field at once, in form order.
fn validate_create_input(request: CreateAppointmentRequest) -> Result<BookingInput, BookingError> {
    let mut errors = Vec::new();

    let patient_id = positive(request.user_id);
    if patient_id.is_none() {
        errors.push(INVALID_PATIENT.to_string());
    }
    let doctor_id = positive(request.doctor_id);
    if doctor_id.is_none() {
        errors.push(INVALID_DOCTOR.to_string());
    }
    let branch_id = positive(request.branch_id);
    if branch_id.is_none() {
        errors.push(INVALID_BRANCH.to_string());
    }
    let slot_id = positive(request.time_slot_id);
    if slot_id.is_none() {
        errors.push(INVALID_SLOT.to_string());
    }

    let reason = request.reason.unwrap_or_default();
    if reason_too_long(&reason) {
        errors.push(REASON_TOO_LONG.to_string());
    }

    match (patient_id, doctor_id, branch_id, slot_id) {
        (Some(patient_id), Some(doctor_id), Some(branch_id), Some(slot_id)) if errors.is_empty() => {
            Ok(BookingInput { patient_id, doctor_id, branch_id, slot_id, reason })
        }
        _ => Err(BookingError::InvalidInput(errors)),
    }
}

fn validate_update_input(request: &UpdateAppointmentRequest) -> Result<(), BookingError> {
    let mut errors = Vec::new();

    for (value, message) in [
        (request.user_id, INVALID_PATIENT),
        (request.doctor_id, INVALID_DOCTOR),
        (request.branch_id, INVALID_BRANCH),
        (request.time_slot_id, INVALID_SLOT),
    ] {
        if value.is_some_and(|id| id <= 0) {
            errors.push(message.to_string());
        }
    }
    if request.reason.as_deref().is_some_and(reason_too_long) {
        errors.push(REASON_TOO_LONG.to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(BookingError::InvalidInput(errors))
    }
}

fn slot_write_error(err: StoreError) -> BookingError {
    match err {
        StoreError::Missing(_) => BookingError::SlotNotFound,
        other => BookingError::from(other),
    }
}

fn appointment_write_error(err: StoreError) -> BookingError {
    match err {
        StoreError::Missing(_) => BookingError::AppointmentNotFound,
        other => BookingError::from(other),
    }
}
