// libs/appointment-cell/src/store/mod.rs
//
// Persistence gateway for users, branches, time slots and appointments.
// Every method is one commit; `book_slot` and `move_booking` are the only
// multi-row writes and must be atomic in every implementation.

pub mod memory;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared_database::{SupabaseClient, SupabaseError};

use crate::models::{
    Appointment, AppointmentChanges, AppointmentStatus, Branch, NewAppointment, NewTimeSlot,
    TimeSlot, UserRecord,
};

pub use memory::{ClinicSeed, MemoryStore, StoreEvent};
pub use supabase::SupabaseStore;

/// SQLSTATE raised by the booking functions when the patient already holds an
/// overlapping appointment.
pub const PATIENT_OVERLAP: &str = "CB001";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The slot is already linked to an appointment, or the one-appointment-per-slot
    /// unique index rejected the write.
    #[error("Time slot already booked: {0}")]
    SlotTaken(String),

    /// The patient already holds an appointment overlapping the slot, found
    /// inside the booking commit.
    #[error("Patient already booked at that time: {0}")]
    PatientBusy(String),

    #[error("Record not found: {0}")]
    Missing(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::UniqueViolation(detail) => StoreError::SlotTaken(detail),
            SupabaseError::NotFound(detail) => StoreError::Missing(detail),
            SupabaseError::Api { code: Some(code), message, .. } if code == PATIENT_OVERLAP => {
                StoreError::PatientBusy(message)
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Slot query. Results are ordered by start time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotFilter {
    pub ids: Option<Vec<i64>>,
    pub doctor_id: Option<i64>,
    pub available_only: bool,
    /// Inclusive lower bound on start time.
    pub starts_from: Option<DateTime<Utc>>,
    /// Exclusive lower bound on start time.
    pub starts_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on start time.
    pub starts_before: Option<DateTime<Utc>>,
}

impl SlotFilter {
    pub fn for_doctor(doctor_id: i64) -> Self {
        Self { doctor_id: Some(doctor_id), ..Self::default() }
    }

    pub fn by_ids(ids: Vec<i64>) -> Self {
        Self { ids: Some(ids), ..Self::default() }
    }

    pub fn matches(&self, slot: &TimeSlot) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&slot.id) {
                return false;
            }
        }
        if self.doctor_id.is_some_and(|d| d != slot.doctor_id) {
            return false;
        }
        if self.available_only && !slot.is_available() {
            return false;
        }
        if self.starts_from.is_some_and(|t| slot.start_time < t) {
            return false;
        }
        if self.starts_after.is_some_and(|t| slot.start_time <= t) {
            return false;
        }
        if self.starts_before.is_some_and(|t| slot.start_time >= t) {
            return false;
        }
        true
    }
}

/// Appointment query. Results are ordered by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub ids: Option<Vec<i64>>,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub exclude_id: Option<i64>,
}

impl AppointmentFilter {
    pub fn for_patient(patient_id: i64) -> Self {
        Self { patient_id: Some(patient_id), ..Self::default() }
    }

    pub fn for_doctor(doctor_id: i64) -> Self {
        Self { doctor_id: Some(doctor_id), ..Self::default() }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&appointment.id) {
                return false;
            }
        }
        if self.patient_id.is_some_and(|p| p != appointment.user_id) {
            return false;
        }
        if self.doctor_id.is_some_and(|d| d != appointment.doctor_id) {
            return false;
        }
        if self.exclude_id == Some(appointment.id) {
            return false;
        }
        true
    }
}

#[async_trait]
pub trait ClinicStore: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_auth_id(&self, auth_id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self, ids: &[i64]) -> Result<Vec<UserRecord>, StoreError>;

    async fn get_branch(&self, branch_id: i64) -> Result<Option<Branch>, StoreError>;

    async fn list_branches(&self, ids: &[i64]) -> Result<Vec<Branch>, StoreError>;

    async fn get_slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, StoreError>;

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<TimeSlot>, StoreError>;

    async fn insert_slot(&self, slot: NewTimeSlot) -> Result<TimeSlot, StoreError>;

    /// Changes the interval of an unbooked slot. `SlotTaken` if it is booked.
    async fn update_slot_times(
        &self,
        slot_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeSlot, StoreError>;

    /// Removes an unbooked slot. `SlotTaken` if it is booked.
    async fn delete_slot(&self, slot_id: i64) -> Result<(), StoreError>;

    /// Links the slot to the appointment only if it is still free. `SlotTaken` otherwise.
    async fn reserve_slot(&self, slot_id: i64, appointment_id: i64) -> Result<TimeSlot, StoreError>;

    /// Clears the slot's appointment link. A free slot is left untouched.
    async fn release_slot(&self, slot_id: i64) -> Result<(), StoreError>;

    async fn get_appointment(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError>;

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    /// Inserts a pending appointment and reserves its slot in one transaction.
    async fn book_slot(&self, booking: NewAppointment) -> Result<Appointment, StoreError>;

    /// Releases `from_slot_id`, reserves `to_slot_id` and rewrites the appointment
    /// fields in one transaction.
    async fn move_booking(
        &self,
        appointment_id: i64,
        from_slot_id: i64,
        to_slot_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError>;

    async fn update_appointment(
        &self,
        appointment_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError>;

    async fn set_appointment_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError>;

    /// Removes the appointment row. Callers release its slot first.
    async fn delete_appointment(&self, appointment_id: i64) -> Result<(), StoreError>;
}

/// Hands out a store for one request.
#[derive(Clone)]
pub enum StoreProvider {
    /// PostgREST calls carry the caller's bearer token so row level security applies.
    Supabase(Arc<SupabaseClient>),
    Memory(Arc<MemoryStore>),
}

impl StoreProvider {
    pub fn scoped(&self, auth_token: &str) -> Arc<dyn ClinicStore> {
        match self {
            StoreProvider::Supabase(client) => {
                Arc::new(SupabaseStore::new(Arc::clone(client), auth_token))
            }
            StoreProvider::Memory(store) => Arc::clone(store) as Arc<dyn ClinicStore>,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn slot(id: i64, doctor_id: i64, hour: u32, booked: bool) -> TimeSlot {
        let start = Utc.with_ymd_and_hms(2030, 1, 2, hour, 0, 0).unwrap();
        TimeSlot {
            id,
            doctor_id,
            start_time: start,
            end_time: start + Duration::minutes(30),
            appointment_id: booked.then_some(100 + id),
        }
    }

    #[test]
    fn test_slot_filter_bounds() {
        let nine = slot(1, 10, 9, false);
        let boundary = Utc.with_ymd_and_hms(2030, 1, 2, 9, 0, 0).unwrap();

        assert!(SlotFilter { starts_from: Some(boundary), ..Default::default() }.matches(&nine));
        assert!(!SlotFilter { starts_after: Some(boundary), ..Default::default() }.matches(&nine));
        assert!(!SlotFilter { starts_before: Some(boundary), ..Default::default() }.matches(&nine));
        assert!(!SlotFilter::for_doctor(11).matches(&nine));
    }

    #[test]
    fn test_available_only_skips_booked() {
        let filter = SlotFilter { available_only: true, ..Default::default() };
        assert!(filter.matches(&slot(1, 10, 9, false)));
        assert!(!filter.matches(&slot(2, 10, 10, true)));
    }

    #[test]
    fn test_supabase_unique_violation_becomes_slot_taken() {
        let err = StoreError::from(SupabaseError::UniqueViolation("dup".into()));
        assert_eq!(err, StoreError::SlotTaken("dup".into()));
    }

    #[test]
    fn test_supabase_sqlstates_map_to_store_errors() {
        let overlap = SupabaseError::Api {
            status: 400,
            code: Some(PATIENT_OVERLAP.to_string()),
            message: "patient 1 already has an appointment at that time".into(),
        };
        assert_eq!(
            StoreError::from(overlap),
            StoreError::PatientBusy("patient 1 already has an appointment at that time".into())
        );

        let foreign_key = SupabaseError::Api {
            status: 409,
            code: Some("23503".to_string()),
            message: "violates foreign key constraint".into(),
        };
        assert!(matches!(StoreError::from(foreign_key), StoreError::Backend(_)));
    }
}
