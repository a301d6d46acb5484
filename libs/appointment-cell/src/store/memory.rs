// libs/appointment-cell/src/store/memory.rs
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    intervals_overlap, Appointment, AppointmentChanges, AppointmentStatus, Branch, NewAppointment,
    NewTimeSlot, TimeSlot, UserRecord,
};

use super::{AppointmentFilter, ClinicStore, SlotFilter, StoreError};

/// One committed write, in commit order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SlotInserted(i64),
    SlotUpdated(i64),
    SlotDeleted(i64),
    SlotReserved { slot_id: i64, appointment_id: i64 },
    SlotReleased(i64),
    AppointmentInserted(i64),
    AppointmentUpdated(i64),
    AppointmentDeleted(i64),
}

/// Reference data loaded at startup from `BOOKING_SEED_FILE`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicSeed {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub branches: Vec<Branch>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, UserRecord>,
    branches: BTreeMap<i64, Branch>,
    slots: BTreeMap<i64, TimeSlot>,
    appointments: BTreeMap<i64, Appointment>,
    next_slot_id: i64,
    next_appointment_id: i64,
    /// Only kept when the store was built with `MemoryStore::recording`.
    journal: Option<Vec<StoreEvent>>,
}

impl Tables {
    fn record(&mut self, event: StoreEvent) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(event);
        }
    }

    fn slot_mut(&mut self, slot_id: i64) -> Result<&mut TimeSlot, StoreError> {
        self.slots
            .get_mut(&slot_id)
            .ok_or_else(|| StoreError::Missing(format!("time slot {}", slot_id)))
    }

    fn appointment_mut(&mut self, appointment_id: i64) -> Result<&mut Appointment, StoreError> {
        self.appointments
            .get_mut(&appointment_id)
            .ok_or_else(|| StoreError::Missing(format!("appointment {}", appointment_id)))
    }

    /// Unique index on `appointments.time_slot_id`.
    fn slot_claimed_by_other(&self, slot_id: i64, appointment_id: Option<i64>) -> bool {
        self.appointments
            .values()
            .any(|a| a.time_slot_id == slot_id && Some(a.id) != appointment_id)
    }

    fn ensure_unbooked(&self, slot_id: i64) -> Result<(), StoreError> {
        match self.slots.get(&slot_id) {
            None => Err(StoreError::Missing(format!("time slot {}", slot_id))),
            Some(slot) if !slot.is_available() => {
                Err(StoreError::SlotTaken(format!("time slot {}", slot_id)))
            }
            Some(_) => Ok(()),
        }
    }

    /// Another appointment of the patient whose slot overlaps `slot_id`.
    fn ensure_patient_free(
        &self,
        patient_id: i64,
        slot_id: i64,
        appointment_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let Some(target) = self.slots.get(&slot_id) else {
            return Ok(());
        };

        let clash = self
            .appointments
            .values()
            .filter(|a| a.user_id == patient_id && Some(a.id) != appointment_id)
            .filter_map(|a| self.slots.get(&a.time_slot_id))
            .any(|held| {
                intervals_overlap(held.start_time, held.end_time, target.start_time, target.end_time)
            });

        if clash {
            return Err(StoreError::PatientBusy(format!(
                "patient {} already holds an appointment overlapping time slot {}",
                patient_id, slot_id
            )));
        }
        Ok(())
    }
}

/// Process-local store behind one lock. Each trait call takes the write lock
/// once, so every call is a single atomic commit.
///
/// `new` keeps no history; `recording` also journals every commit.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_journal(None)
    }

    pub fn recording() -> Self {
        Self::with_journal(Some(Vec::new()))
    }

    fn with_journal(journal: Option<Vec<StoreEvent>>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_slot_id: 1,
                next_appointment_id: 1,
                journal,
                ..Tables::default()
            }),
        }
    }

    pub async fn from_seed(seed: ClinicSeed) -> Self {
        let store = Self::new();
        for user in seed.users {
            store.insert_user(user).await;
        }
        for branch in seed.branches {
            store.insert_branch(branch).await;
        }
        for slot in seed.time_slots {
            store.seed_slot(slot).await;
        }
        store
    }

    pub async fn insert_user(&self, user: UserRecord) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn insert_branch(&self, branch: Branch) {
        self.tables.write().await.branches.insert(branch.id, branch);
    }

    /// Loads a slot as-is, past or booked. Not journaled.
    pub async fn seed_slot(&self, slot: TimeSlot) {
        let mut tables = self.tables.write().await;
        tables.next_slot_id = tables.next_slot_id.max(slot.id + 1);
        tables.slots.insert(slot.id, slot);
    }

    /// Loads an appointment as-is and links its slot. Not journaled.
    pub async fn seed_appointment(&self, appointment: Appointment) {
        let mut tables = self.tables.write().await;
        tables.next_appointment_id = tables.next_appointment_id.max(appointment.id + 1);
        if let Some(slot) = tables.slots.get_mut(&appointment.time_slot_id) {
            slot.appointment_id = Some(appointment.id);
        }
        tables.appointments.insert(appointment.id, appointment);
    }

    /// Commits so far, oldest first. Empty unless the store is recording.
    pub async fn journal(&self) -> Vec<StoreEvent> {
        self.tables.read().await.journal.clone().unwrap_or_default()
    }
}

#[async_trait]
impl ClinicStore for MemoryStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn find_user_by_auth_id(&self, auth_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.auth_id == Some(auth_id))
            .cloned())
    }

    async fn list_users(&self, ids: &[i64]) -> Result<Vec<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn get_branch(&self, branch_id: i64) -> Result<Option<Branch>, StoreError> {
        Ok(self.tables.read().await.branches.get(&branch_id).cloned())
    }

    async fn list_branches(&self, ids: &[i64]) -> Result<Vec<Branch>, StoreError> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.branches.get(id).cloned()).collect())
    }

    async fn get_slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, StoreError> {
        Ok(self.tables.read().await.slots.get(&slot_id).cloned())
    }

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<TimeSlot>, StoreError> {
        let tables = self.tables.read().await;
        let mut slots: Vec<TimeSlot> = tables
            .slots
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.start_time, s.id));
        Ok(slots)
    }

    async fn insert_slot(&self, slot: NewTimeSlot) -> Result<TimeSlot, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_slot_id;
        tables.next_slot_id += 1;

        let row = TimeSlot {
            id,
            doctor_id: slot.doctor_id,
            start_time: slot.start_time,
            end_time: slot.end_time,
            appointment_id: None,
        };
        tables.slots.insert(id, row.clone());
        tables.record(StoreEvent::SlotInserted(id));
        Ok(row)
    }

    async fn update_slot_times(
        &self,
        slot_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeSlot, StoreError> {
        let mut tables = self.tables.write().await;
        tables.ensure_unbooked(slot_id)?;

        let slot = tables.slot_mut(slot_id)?;
        slot.start_time = start_time;
        slot.end_time = end_time;
        let updated = slot.clone();
        tables.record(StoreEvent::SlotUpdated(slot_id));
        Ok(updated)
    }

    async fn delete_slot(&self, slot_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.ensure_unbooked(slot_id)?;

        tables.slots.remove(&slot_id);
        tables.record(StoreEvent::SlotDeleted(slot_id));
        Ok(())
    }

    async fn reserve_slot(&self, slot_id: i64, appointment_id: i64) -> Result<TimeSlot, StoreError> {
        let mut tables = self.tables.write().await;
        tables.ensure_unbooked(slot_id)?;

        let slot = tables.slot_mut(slot_id)?;
        slot.appointment_id = Some(appointment_id);
        let reserved = slot.clone();
        tables.record(StoreEvent::SlotReserved { slot_id, appointment_id });
        Ok(reserved)
    }

    async fn release_slot(&self, slot_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let slot = tables.slot_mut(slot_id)?;
        if slot.appointment_id.take().is_some() {
            tables.record(StoreEvent::SlotReleased(slot_id));
        }
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError> {
        Ok(self.tables.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn book_slot(&self, booking: NewAppointment) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        tables.ensure_unbooked(booking.time_slot_id)?;
        if tables.slot_claimed_by_other(booking.time_slot_id, None) {
            return Err(StoreError::SlotTaken(format!("time slot {}", booking.time_slot_id)));
        }
        tables.ensure_patient_free(booking.user_id, booking.time_slot_id, None)?;

        let id = tables.next_appointment_id;
        tables.next_appointment_id += 1;

        let appointment = Appointment {
            id,
            user_id: booking.user_id,
            doctor_id: booking.doctor_id,
            branch_id: booking.branch_id,
            reason: booking.reason,
            time_slot_id: booking.time_slot_id,
            status: AppointmentStatus::Pending,
            created_at: Utc::now(),
        };

        tables.slot_mut(booking.time_slot_id)?.appointment_id = Some(id);
        tables.appointments.insert(id, appointment.clone());
        tables.record(StoreEvent::AppointmentInserted(id));
        tables.record(StoreEvent::SlotReserved {
            slot_id: booking.time_slot_id,
            appointment_id: id,
        });

        debug!("Memory store booked slot {} for appointment {}", booking.time_slot_id, id);
        Ok(appointment)
    }

    async fn move_booking(
        &self,
        appointment_id: i64,
        from_slot_id: i64,
        to_slot_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.appointments.contains_key(&appointment_id) {
            return Err(StoreError::Missing(format!("appointment {}", appointment_id)));
        }
        tables.ensure_unbooked(to_slot_id)?;
        if tables.slot_claimed_by_other(to_slot_id, Some(appointment_id)) {
            return Err(StoreError::SlotTaken(format!("time slot {}", to_slot_id)));
        }
        tables.ensure_patient_free(changes.user_id, to_slot_id, Some(appointment_id))?;

        // Validated above; nothing below can fail, so the commit is all-or-nothing.
        if let Some(old) = tables.slots.get_mut(&from_slot_id) {
            if old.appointment_id == Some(appointment_id) {
                old.appointment_id = None;
                tables.record(StoreEvent::SlotReleased(from_slot_id));
            }
        }

        tables.slot_mut(to_slot_id)?.appointment_id = Some(appointment_id);
        tables.record(StoreEvent::SlotReserved { slot_id: to_slot_id, appointment_id });

        let appointment = tables.appointment_mut(appointment_id)?;
        appointment.user_id = changes.user_id;
        appointment.doctor_id = changes.doctor_id;
        appointment.branch_id = changes.branch_id;
        appointment.reason = changes.reason.clone();
        appointment.time_slot_id = to_slot_id;
        let moved = appointment.clone();
        tables.record(StoreEvent::AppointmentUpdated(appointment_id));

        Ok(moved)
    }

    async fn update_appointment(
        &self,
        appointment_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        let appointment = tables.appointment_mut(appointment_id)?;
        appointment.user_id = changes.user_id;
        appointment.doctor_id = changes.doctor_id;
        appointment.branch_id = changes.branch_id;
        appointment.reason = changes.reason.clone();
        let updated = appointment.clone();
        tables.record(StoreEvent::AppointmentUpdated(appointment_id));
        Ok(updated)
    }

    async fn set_appointment_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let mut tables = self.tables.write().await;
        let appointment = tables.appointment_mut(appointment_id)?;
        appointment.status = status;
        let updated = appointment.clone();
        tables.record(StoreEvent::AppointmentUpdated(appointment_id));
        Ok(updated)
    }

    async fn delete_appointment(&self, appointment_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.appointments.remove(&appointment_id).is_none() {
            return Err(StoreError::Missing(format!("appointment {}", appointment_id)));
        }
        tables.record(StoreEvent::AppointmentDeleted(appointment_id));
        Ok(())
    }
}
