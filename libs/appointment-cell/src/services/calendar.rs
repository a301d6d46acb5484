use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::BookingError;
use crate::models::{
    format_time_range, Appointment, AppointmentStatus, AppointmentView, Branch, CalendarEvent,
    CalendarEventProps, CalendarQuery, CallerIdentity, Role, TimeSlot, UserRecord,
};
use crate::store::{AppointmentFilter, ClinicStore, SlotFilter};

pub const BRANCH_COLORS: [&str; 6] = [
    "#007bff", "#28a745", "#dc3545", "#ffc107", "#17a2b8", "#6f42c1",
];

pub fn branch_color(branch_id: i64) -> &'static str {
    BRANCH_COLORS[branch_id.rem_euclid(BRANCH_COLORS.len() as i64) as usize]
}

pub fn status_class(status: AppointmentStatus) -> String {
    format!("appointment-{}", status)
}

/// Names and intervals an appointment listing is decorated with.
#[derive(Default)]
struct Lookups {
    users: HashMap<i64, UserRecord>,
    branches: HashMap<i64, Branch>,
    slots: HashMap<i64, TimeSlot>,
}

impl Lookups {
    async fn load(store: &dyn ClinicStore, appointments: &[Appointment]) -> Result<Self, BookingError> {
        if appointments.is_empty() {
            return Ok(Self::default());
        }

        let mut user_ids: Vec<i64> = appointments
            .iter()
            .flat_map(|a| [a.user_id, a.doctor_id])
            .collect();
        user_ids.sort_unstable();
        user_ids.dedup();

        let mut branch_ids: Vec<i64> = appointments.iter().map(|a| a.branch_id).collect();
        branch_ids.sort_unstable();
        branch_ids.dedup();

        let slot_ids: Vec<i64> = appointments.iter().map(|a| a.time_slot_id).collect();

        Ok(Self {
            users: store
                .list_users(&user_ids)
                .await?
                .into_iter()
                .map(|u| (u.id, u))
                .collect(),
            branches: store
                .list_branches(&branch_ids)
                .await?
                .into_iter()
                .map(|b| (b.id, b))
                .collect(),
            slots: store
                .list_slots(&SlotFilter::by_ids(slot_ids))
                .await?
                .into_iter()
                .map(|s| (s.id, s))
                .collect(),
        })
    }

    fn name_of(&self, user_id: i64) -> String {
        self.users.get(&user_id).map(UserRecord::full_name).unwrap_or_default()
    }

    fn branch_name(&self, branch_id: i64) -> String {
        self.branches.get(&branch_id).map(|b| b.name.clone()).unwrap_or_default()
    }
}

/// Read side of the appointment book: the calendar feed and single-record views.
pub struct CalendarService {
    store: Arc<dyn ClinicStore>,
}

impl CalendarService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    /// Staff see every appointment; students and doctors see their own. An
    /// appointment is listed when its slot intersects `[start, end)`.
    pub async fn list_appointments(
        &self,
        caller: &CallerIdentity,
        query: &CalendarQuery,
    ) -> Result<Vec<CalendarEvent>, BookingError> {
        let filter = match caller.role {
            Role::ClinicStaff => AppointmentFilter::default(),
            Role::Student => AppointmentFilter::for_patient(caller.user_id),
            Role::Doctor => AppointmentFilter::for_doctor(caller.user_id),
        };

        let appointments = self.store.list_appointments(&filter).await?;
        let lookups = Lookups::load(self.store.as_ref(), &appointments).await?;

        let mut events: Vec<CalendarEvent> = appointments
            .iter()
            .filter_map(|appointment| {
                let slot = lookups.slots.get(&appointment.time_slot_id)?;
                in_window(slot, query).then(|| calendar_event(appointment, slot, &lookups))
            })
            .collect();
        events.sort_by_key(|e| (e.start, e.id));

        debug!("Calendar for user {} has {} events", caller.user_id, events.len());
        Ok(events)
    }

    pub async fn get_appointment(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
    ) -> Result<AppointmentView, BookingError> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or(BookingError::AppointmentNotFound)?;

        if !caller.is_party_to(&appointment) {
            return Err(BookingError::Forbidden);
        }

        let lookups = Lookups::load(self.store.as_ref(), std::slice::from_ref(&appointment)).await?;
        let slot = lookups
            .slots
            .get(&appointment.time_slot_id)
            .ok_or(BookingError::SlotNotFound)?;

        Ok(AppointmentView {
            id: appointment.id,
            user_id: appointment.user_id,
            doctor_id: appointment.doctor_id,
            branch_id: appointment.branch_id,
            reason: appointment.reason.clone(),
            time_slot_id: appointment.time_slot_id,
            status: appointment.status,
            is_approved: appointment.status.is_approved(),
            user_full_name: lookups.name_of(appointment.user_id),
            doctor_name: lookups.name_of(appointment.doctor_id),
            branch_name: lookups.branch_name(appointment.branch_id),
            start_time: slot.start_time,
            end_time: slot.end_time,
            formatted_time_range: format_time_range(slot.start_time, slot.end_time),
            created_at: appointment.created_at,
        })
    }
}

fn in_window(slot: &TimeSlot, query: &CalendarQuery) -> bool {
    query.end.map_or(true, |end| slot.start_time < end)
        && query.start.map_or(true, |start| slot.end_time > start)
}

fn calendar_event(appointment: &Appointment, slot: &TimeSlot, lookups: &Lookups) -> CalendarEvent {
    let patient = lookups.name_of(appointment.user_id);
    let title = if appointment.reason.is_empty() {
        patient.clone()
    } else {
        format!("{} - {}", patient, appointment.reason)
    };
    let color = branch_color(appointment.branch_id).to_string();

    CalendarEvent {
        id: appointment.id,
        title,
        start: slot.start_time,
        end: slot.end_time,
        background_color: color.clone(),
        border_color: color,
        class_name: status_class(appointment.status),
        extended_props: CalendarEventProps {
            user_id: appointment.user_id,
            doctor_id: appointment.doctor_id,
            branch_id: appointment.branch_id,
            reason: appointment.reason.clone(),
            user_full_name: patient,
            doctor_name: lookups.name_of(appointment.doctor_id),
            branch_name: lookups.branch_name(appointment.branch_id),
            time_slot_id: appointment.time_slot_id,
            status: appointment.status,
            is_approved: appointment.status.is_approved(),
        },
    }
}
