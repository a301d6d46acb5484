// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

/// Longest reason text an appointment may carry.
pub const MAX_REASON_LENGTH: usize = 500;

/// Half-open interval overlap: `[a_start, a_end)` and `[b_start, b_end)` share
/// at least one instant. Back-to-back intervals do not overlap.
pub fn intervals_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

// ==============================================================================
// PEOPLE AND PLACES
// ==============================================================================

/// Role codes as stored in `users.role`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "i16", into = "i16")]
pub enum Role {
    Student,
    Doctor,
    ClinicStaff,
}

impl Role {
    /// Students and clinic staff may be booked as patients.
    pub fn is_patient_eligible(self) -> bool {
        matches!(self, Role::Student | Role::ClinicStaff)
    }

    pub fn is_doctor(self) -> bool {
        self == Role::Doctor
    }

    pub fn is_staff(self) -> bool {
        self == Role::ClinicStaff
    }
}

impl TryFrom<i16> for Role {
    type Error = String;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Role::Student),
            1 => Ok(Role::Doctor),
            2 => Ok(Role::ClinicStaff),
            other => Err(format!("unknown role code {}", other)),
        }
    }
}

impl From<Role> for i16 {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => 0,
            Role::Doctor => 1,
            Role::ClinicStaff => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    #[serde(default)]
    pub auth_id: Option<Uuid>,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
}

impl UserRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

// ==============================================================================
// TIME SLOTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    pub id: i64,
    pub doctor_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_id: Option<i64>,
}

impl TimeSlot {
    pub fn is_available(&self) -> bool {
        self.appointment_id.is_none()
    }

    /// Free and still ahead of `as_of`.
    pub fn is_bookable(&self, as_of: DateTime<Utc>) -> bool {
        self.is_available() && self.start_time > as_of
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_overlap(self.start_time, self.end_time, start, end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTimeSlot {
    pub doctor_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Rejected,
    Approved,
    Finished,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_approved(self) -> bool {
        matches!(self, AppointmentStatus::Approved | AppointmentStatus::Finished)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Rejected => write!(f, "rejected"),
            AppointmentStatus::Approved => write!(f, "approved"),
            AppointmentStatus::Finished => write!(f, "finished"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    /// The patient.
    pub user_id: i64,
    pub doctor_id: i64,
    pub branch_id: i64,
    #[serde(default)]
    pub reason: String,
    pub time_slot_id: i64,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Row written by the booking transaction; the store assigns id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAppointment {
    pub user_id: i64,
    pub doctor_id: i64,
    pub branch_id: i64,
    pub reason: String,
    pub time_slot_id: i64,
}

/// Field values an update commits together. Slot moves go through
/// `ClinicStore::move_booking` instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentChanges {
    pub user_id: i64,
    pub doctor_id: i64,
    pub branch_id: i64,
    pub reason: String,
}

// ==============================================================================
// CALLER
// ==============================================================================

/// Who is asking. Resolved once per request and passed down explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: i64,
    pub role: Role,
}

impl CallerIdentity {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    /// Staff, the patient, or the treating doctor.
    pub fn is_party_to(&self, appointment: &Appointment) -> bool {
        self.is_staff()
            || appointment.user_id == self.user_id
            || appointment.doctor_id == self.user_id
    }

    /// Students book for themselves, doctors into their own schedule, staff for anyone.
    pub fn may_book(&self, patient_id: i64, doctor_id: i64) -> bool {
        match self.role {
            Role::ClinicStaff => true,
            Role::Student => patient_id == self.user_id,
            Role::Doctor => doctor_id == self.user_id,
        }
    }

    pub fn may_manage_slots_of(&self, doctor_id: i64) -> bool {
        self.is_staff() || (self.role.is_doctor() && self.user_id == doctor_id)
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub doctor_id: Option<i64>,
    #[serde(default)]
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub time_slot_id: Option<i64>,
}

/// Omitted fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub user_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub reason: Option<String>,
    pub time_slot_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub doctor_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSlotRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableSlotsQuery {
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// VIEW MODELS
// ==============================================================================

/// One event for the calendar widget. Field names follow the widget's event object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: i64,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub background_color: String,
    pub border_color: String,
    pub class_name: String,
    pub extended_props: CalendarEventProps,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEventProps {
    pub user_id: i64,
    pub doctor_id: i64,
    pub branch_id: i64,
    pub reason: String,
    pub user_full_name: String,
    pub doctor_name: String,
    pub branch_name: String,
    pub time_slot_id: i64,
    pub status: AppointmentStatus,
    pub is_approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentView {
    pub id: i64,
    pub user_id: i64,
    pub doctor_id: i64,
    pub branch_id: i64,
    pub reason: String,
    pub time_slot_id: i64,
    pub status: AppointmentStatus,
    pub is_approved: bool,
    pub user_full_name: String,
    pub doctor_name: String,
    pub branch_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub formatted_time_range: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlotView {
    pub id: i64,
    pub doctor_id: i64,
    pub doctor_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub formatted_time: String,
    pub date: NaiveDate,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlotView {
    pub id: i64,
    pub doctor_id: i64,
    pub doctor_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub appointment_id: Option<i64>,
    pub appointment_reason: Option<String>,
    pub is_available: bool,
    pub time_range: String,
    pub status_text: String,
}

// ==============================================================================
// FORMATTING
// ==============================================================================

/// `"Mar 5, 2030 9:00 AM - 9:30 AM"`
pub fn format_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{} - {}", start.format("%b %-d, %Y %-I:%M %p"), end.format("%-I:%M %p"))
}

/// `"Mar 05, 2030 9:00 AM - 9:30 AM"`
pub fn format_slot_time(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!("{} - {}", start.format("%b %d, %Y %-I:%M %p"), end.format("%-I:%M %p"))
}
