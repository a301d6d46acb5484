#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentChanges, AppointmentStatus, Branch, CallerIdentity,
    CreateAppointmentRequest, NewAppointment, NewTimeSlot, Role, TimeSlot, UserRecord,
};
use appointment_cell::store::{
    AppointmentFilter, ClinicStore, MemoryStore, SlotFilter, StoreError,
};

pub const STUDENT: i64 = 1;
pub const OTHER_STUDENT: i64 = 2;
pub const DOCTOR: i64 = 10;
pub const OTHER_DOCTOR: i64 = 11;
pub const STAFF: i64 = 20;
pub const BRANCH: i64 = 3;

/// `hour:minute` on the day `days_ahead` days from today, UTC.
pub fn at(days_ahead: i64, hour: u32, minute: u32) -> DateTime<Utc> {
    (Utc::now().date_naive() + Duration::days(days_ahead))
        .and_hms_opt(hour, minute, 0)
        .unwrap()
        .and_utc()
}

pub fn user(id: i64, first_name: &str, last_name: &str, role: Role, auth_id: Option<Uuid>) -> UserRecord {
    UserRecord {
        id,
        auth_id,
        first_name: first_name.to_string(),
        middle_name: None,
        last_name: last_name.to_string(),
        email: Some(format!("{}@clinic.test", first_name.to_lowercase())),
        role,
    }
}

/// Two students, two doctors, one staff member and one branch.
pub async fn clinic() -> Arc<MemoryStore> {
    let store = MemoryStore::recording();
    store.insert_user(user(STUDENT, "Ana", "Cruz", Role::Student, None)).await;
    store.insert_user(user(OTHER_STUDENT, "Ben", "Reyes", Role::Student, None)).await;
    store.insert_user(user(DOCTOR, "Maria", "Santos", Role::Doctor, None)).await;
    store.insert_user(user(OTHER_DOCTOR, "Jose", "Lim", Role::Doctor, None)).await;
    store.insert_user(user(STAFF, "Carla", "Diaz", Role::ClinicStaff, None)).await;
    store
        .insert_branch(Branch {
            id: BRANCH,
            name: "Main Campus".to_string(),
            address: Some("1 University Ave".to_string()),
        })
        .await;
    Arc::new(store)
}

pub async fn add_slot(
    store: &MemoryStore,
    id: i64,
    doctor_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> TimeSlot {
    let slot = TimeSlot { id, doctor_id, start_time, end_time, appointment_id: None };
    store.seed_slot(slot.clone()).await;
    slot
}

pub fn staff() -> CallerIdentity {
    CallerIdentity::new(STAFF, Role::ClinicStaff)
}

pub fn student() -> CallerIdentity {
    CallerIdentity::new(STUDENT, Role::Student)
}

pub fn doctor() -> CallerIdentity {
    CallerIdentity::new(DOCTOR, Role::Doctor)
}

pub fn booking(patient_id: i64, doctor_id: i64, slot_id: i64) -> CreateAppointmentRequest {
    CreateAppointmentRequest {
        user_id: Some(patient_id),
        doctor_id: Some(doctor_id),
        branch_id: Some(BRANCH),
        reason: Some("Check-up".to_string()),
        time_slot_id: Some(slot_id),
    }
}

pub fn appointment_row(id: i64, patient_id: i64, doctor_id: i64, slot_id: i64, status: AppointmentStatus) -> Appointment {
    Appointment {
        id,
        user_id: patient_id,
        doctor_id,
        branch_id: BRANCH,
        reason: "Check-up".to_string(),
        time_slot_id: slot_id,
        status,
        created_at: Utc::now(),
    }
}

/// Any two slots of one doctor overlapping is a broken store.
pub async fn assert_no_doctor_overlaps(store: &MemoryStore, doctor_id: i64) {
    let slots = store.list_slots(&SlotFilter::for_doctor(doctor_id)).await.unwrap();
    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            assert!(
                !(a.start_time < b.end_time && a.end_time > b.start_time),
                "slots {} and {} overlap",
                a.id,
                b.id
            );
        }
    }
}

/// Every slot link points at an appointment that points back, and vice versa.
pub async fn assert_links_consistent(store: &MemoryStore) {
    let slots = store.list_slots(&SlotFilter::default()).await.unwrap();
    let appointments = store.list_appointments(&AppointmentFilter::default()).await.unwrap();

    for slot in &slots {
        if let Some(appointment_id) = slot.appointment_id {
            let appointment = appointments
                .iter()
                .find(|a| a.id == appointment_id)
                .unwrap_or_else(|| panic!("slot {} is booked by missing appointment {}", slot.id, appointment_id));
            assert_eq!(appointment.time_slot_id, slot.id);
        }
    }
    for appointment in &appointments {
        let slot = slots.iter().find(|s| s.id == appointment.time_slot_id).unwrap();
        assert_eq!(slot.appointment_id, Some(appointment.id));
    }
}

/// Wraps a `MemoryStore` to interleave or break individual commits.
pub struct InterleavingStore {
    pub inner: Arc<MemoryStore>,
    /// Yield to the scheduler before the booking commit so concurrent callers
    /// all pass their availability checks first.
    pub yield_before_booking: bool,
    pub fail_delete: bool,
    /// The appointment's slot as seen between the release and delete commits.
    pub seen_before_delete: Mutex<Vec<(Option<TimeSlot>, Option<Appointment>)>>,
}

impl InterleavingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            yield_before_booking: false,
            fail_delete: false,
            seen_before_delete: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ClinicStore for InterleavingStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.inner.get_user(user_id).await
    }

    async fn find_user_by_auth_id(&self, auth_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        self.inner.find_user_by_auth_id(auth_id).await
    }

    async fn list_users(&self, ids: &[i64]) -> Result<Vec<UserRecord>, StoreError> {
        self.inner.list_users(ids).await
    }

    async fn get_branch(&self, branch_id: i64) -> Result<Option<Branch>, StoreError> {
        self.inner.get_branch(branch_id).await
    }

    async fn list_branches(&self, ids: &[i64]) -> Result<Vec<Branch>, StoreError> {
        self.inner.list_branches(ids).await
    }

    async fn get_slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, StoreError> {
        self.inner.get_slot(slot_id).await
    }

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<TimeSlot>, StoreError> {
        self.inner.list_slots(filter).await
    }

    async fn insert_slot(&self, slot: NewTimeSlot) -> Result<TimeSlot, StoreError> {
        self.inner.insert_slot(slot).await
    }

    async fn update_slot_times(
        &self,
        slot_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeSlot, StoreError> {
        self.inner.update_slot_times(slot_id, start_time, end_time).await
    }

    async fn delete_slot(&self, slot_id: i64) -> Result<(), StoreError> {
        self.inner.delete_slot(slot_id).await
    }

    async fn reserve_slot(&self, slot_id: i64, appointment_id: i64) -> Result<TimeSlot, StoreError> {
        self.inner.reserve_slot(slot_id, appointment_id).await
    }

    async fn release_slot(&self, slot_id: i64) -> Result<(), StoreError> {
        self.inner.release_slot(slot_id).await
    }

    async fn get_appointment(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError> {
        self.inner.get_appointment(appointment_id).await
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list_appointments(filter).await
    }

    async fn book_slot(&self, booking: NewAppointment) -> Result<Appointment, StoreError> {
        if self.yield_before_booking {
            tokio::task::yield_now().await;
        }
        self.inner.book_slot(booking).await
    }

    async fn move_booking(
        &self,
        appointment_id: i64,
        from_slot_id: i64,
        to_slot_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        self.inner
            .move_booking(appointment_id, from_slot_id, to_slot_id, changes)
            .await
    }

    async fn update_appointment(
        &self,
        appointment_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        self.inner.update_appointment(appointment_id, changes).await
    }

    async fn set_appointment_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        self.inner.set_appointment_status(appointment_id, status).await
    }

    async fn delete_appointment(&self, appointment_id: i64) -> Result<(), StoreError> {
        let appointment = self.inner.get_appointment(appointment_id).await?;
        let slot = match &appointment {
            Some(a) => self.inner.get_slot(a.time_slot_id).await?,
            None => None,
        };
        self.seen_before_delete.lock().await.push((slot, appointment));

        if self.fail_delete {
            return Err(StoreError::Backend("connection reset by peer".to_string()));
        }
        self.inner.delete_appointment(appointment_id).await
    }
}
