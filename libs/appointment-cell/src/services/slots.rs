// libs/appointment-cell/src/services/slots.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::error::BookingError;
use crate::models::{
    format_slot_time, format_time_range, AvailableSlotView, NewTimeSlot, TimeSlot, TimeSlotView,
    UserRecord,
};
use crate::store::{AppointmentFilter, ClinicStore, SlotFilter, StoreError};

/// Owns the rule that a slot is available exactly when no appointment
/// references it, and every write that changes a slot.
pub struct SlotAvailabilityService {
    store: Arc<dyn ClinicStore>,
}

impl SlotAvailabilityService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    pub async fn find_slot(&self, slot_id: i64) -> Result<TimeSlot, BookingError> {
        self.store
            .get_slot(slot_id)
            .await?
            .ok_or(BookingError::SlotNotFound)
    }

    pub fn is_bookable(&self, slot: &TimeSlot, as_of: DateTime<Utc>) -> bool {
        slot.is_bookable(as_of)
    }

    /// Conditional write: a slot that is booked by the time the write lands is
    /// never overwritten.
    pub async fn reserve(&self, slot_id: i64, appointment_id: i64) -> Result<TimeSlot, BookingError> {
        let slot = self
            .store
            .reserve_slot(slot_id, appointment_id)
            .await
            .map_err(|e| match e {
                StoreError::Missing(_) => BookingError::SlotNotFound,
                other => BookingError::from(other),
            })?;

        info!("Slot {} reserved for appointment {}", slot_id, appointment_id);
        Ok(slot)
    }

    pub async fn release(&self, slot_id: i64) -> Result<(), BookingError> {
        self.store.release_slot(slot_id).await.map_err(|e| match e {
            StoreError::Missing(_) => BookingError::SlotNotFound,
            other => BookingError::from(other),
        })?;

        debug!("Slot {} released", slot_id);
        Ok(())
    }

    pub async fn create_slot(
        &self,
        doctor_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeSlot, BookingError> {
        debug!("Creating slot for doctor {} from {} to {}", doctor_id, start_time, end_time);

        self.require_doctor(doctor_id).await?;
        validate_interval(start_time, end_time, Utc::now())?;
        self.ensure_no_overlap(doctor_id, start_time, end_time, None).await?;

        let slot = self
            .store
            .insert_slot(NewTimeSlot { doctor_id, start_time, end_time })
            .await?;

        info!("Slot {} created for doctor {}", slot.id, doctor_id);
        Ok(slot)
    }

    /// Moves an unbooked slot. The owning doctor never changes.
    pub async fn update_slot_time(
        &self,
        slot_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeSlot, BookingError> {
        let slot = self.find_slot(slot_id).await?;
        if !slot.is_available() {
            warn!("Refusing to move booked slot {}", slot_id);
            return Err(BookingError::SlotBooked);
        }

        validate_interval(start_time, end_time, Utc::now())?;
        self.ensure_no_overlap(slot.doctor_id, start_time, end_time, Some(slot_id)).await?;

        let updated = self
            .store
            .update_slot_times(slot_id, start_time, end_time)
            .await
            .map_err(booked_or_missing)?;

        info!("Slot {} moved to {} - {}", slot_id, start_time, end_time);
        Ok(updated)
    }

    pub async fn delete_slot(&self, slot_id: i64) -> Result<(), BookingError> {
        let slot = self.find_slot(slot_id).await?;
        if !slot.is_available() {
            warn!("Refusing to delete booked slot {}", slot_id);
            return Err(BookingError::SlotBooked);
        }

        self.store.delete_slot(slot_id).await.map_err(booked_or_missing)?;

        info!("Slot {} deleted", slot_id);
        Ok(())
    }

    pub async fn get_slot_view(&self, slot_id: i64) -> Result<TimeSlotView, BookingError> {
        let slot = self.find_slot(slot_id).await?;
        let doctor = self.store.get_user(slot.doctor_id).await?;

        let reason = match slot.appointment_id {
            Some(appointment_id) => self
                .store
                .get_appointment(appointment_id)
                .await?
                .map(|a| a.reason),
            None => None,
        };

        Ok(slot_view(&slot, doctor.as_ref(), reason))
    }

    /// All slots of one doctor, booked or not, ordered by start time.
    pub async fn list_doctor_slots(&self, doctor_id: i64) -> Result<Vec<TimeSlotView>, BookingError> {
        let doctor = self.require_doctor(doctor_id).await.map_err(|e| match e {
            BookingError::InvalidDoctorRole => BookingError::DoctorNotFound,
            other => other,
        })?;

        let slots = self.store.list_slots(&SlotFilter::for_doctor(doctor_id)).await?;

        let appointment_ids: Vec<i64> = slots.iter().filter_map(|s| s.appointment_id).collect();
        let reasons: HashMap<i64, String> = if appointment_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .list_appointments(&AppointmentFilter {
                    ids: Some(appointment_ids),
                    ..Default::default()
                })
                .await?
                .into_iter()
                .map(|a| (a.id, a.reason))
                .collect()
        };

        Ok(slots
            .iter()
            .map(|slot| {
                let reason = slot.appointment_id.and_then(|id| reasons.get(&id).cloned());
                slot_view(slot, Some(&doctor), reason)
            })
            .collect())
    }

    /// Free slots starting after `as_of`, optionally for one doctor and one
    /// calendar day, ordered by start time.
    pub async fn available_slots(
        &self,
        doctor_id: Option<i64>,
        date: Option<NaiveDate>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<AvailableSlotView>, BookingError> {
        let mut filter = SlotFilter {
            doctor_id,
            available_only: true,
            starts_after: Some(as_of),
            ..Default::default()
        };

        if let Some(day) = date {
            let day_start = day.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
            filter.starts_from = day_start;
            filter.starts_before = day_start.map(|t| t + Duration::days(1));
        }

        let slots = self.store.list_slots(&filter).await?;
        debug!("Found {} available slots", slots.len());

        let mut doctor_ids: Vec<i64> = slots.iter().map(|s| s.doctor_id).collect();
        doctor_ids.sort_unstable();
        doctor_ids.dedup();

        let doctors: HashMap<i64, UserRecord> = self
            .store
            .list_users(&doctor_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(slots
            .into_iter()
            .map(|slot| AvailableSlotView {
                id: slot.id,
                doctor_id: slot.doctor_id,
                doctor_name: doctors
                    .get(&slot.doctor_id)
                    .map(UserRecord::full_name)
                    .unwrap_or_default(),
                start_time: slot.start_time,
                end_time: slot.end_time,
                formatted_time: format_slot_time(slot.start_time, slot.end_time),
                date: slot.start_time.date_naive(),
                is_available: slot.is_available(),
            })
            .collect())
    }

    async fn require_doctor(&self, doctor_id: i64) -> Result<UserRecord, BookingError> {
        let doctor = self
            .store
            .get_user(doctor_id)
            .await?
            .ok_or(BookingError::DoctorNotFound)?;

        if !doctor.role.is_doctor() {
            return Err(BookingError::InvalidDoctorRole);
        }
        Ok(doctor)
    }

    async fn ensure_no_overlap(
        &self,
        doctor_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_slot_id: Option<i64>,
    ) -> Result<(), BookingError> {
        let existing = self.store.list_slots(&SlotFilter::for_doctor(doctor_id)).await?;

        if let Some(clash) = existing
            .iter()
            .filter(|s| Some(s.id) != exclude_slot_id)
            .find(|s| s.overlaps(start_time, end_time))
        {
            warn!(
                "Slot {} - {} for doctor {} overlaps slot {}",
                start_time, end_time, doctor_id, clash.id
            );
            return Err(BookingError::Overlap);
        }
        Ok(())
    }
}

fn validate_interval(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), BookingError> {
    if start_time >= end_time {
        return Err(BookingError::InvalidRange);
    }
    if start_time <= now {
        return Err(BookingError::PastSlot);
    }
    Ok(())
}

// The slot was free when read; a conditional write that then misses means it
// got booked or removed in between.
fn booked_or_missing(err: StoreError) -> BookingError {
    match err {
        StoreError::SlotTaken(_) => BookingError::SlotBooked,
        StoreError::Missing(_) => BookingError::SlotNotFound,
        other => BookingError::from(other),
    }
}

fn slot_view(slot: &TimeSlot, doctor: Option<&UserRecord>, appointment_reason: Option<String>) -> TimeSlotView {
    TimeSlotView {
        id: slot.id,
        doctor_id: slot.doctor_id,
        doctor_name: doctor.map(UserRecord::full_name).unwrap_or_default(),
        start_time: slot.start_time,
        end_time: slot.end_time,
        appointment_id: slot.appointment_id,
        appointment_reason,
        is_available: slot.is_available(),
        time_range: format_time_range(slot.start_time, slot.end_time),
        status_text: if slot.is_available() { "Available" } else { "Booked" }.to_string(),
    }
}
