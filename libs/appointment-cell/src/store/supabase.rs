// libs/appointment-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{
    Appointment, AppointmentChanges, AppointmentStatus, Branch, NewAppointment, NewTimeSlot,
    TimeSlot, UserRecord,
};

use super::{AppointmentFilter, ClinicStore, SlotFilter, StoreError};

const USER_COLUMNS: &str = "id,auth_id,first_name,middle_name,last_name,email,role";

/// PostgREST-backed store. Multi-row writes go through the SQL functions in
/// `sql/booking.sql`, which run in one transaction each.
pub struct SupabaseStore {
    client: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseStore {
    pub fn new(client: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            client,
            auth_token: auth_token.to_string(),
        }
    }

    async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        let rows: Vec<T> = self
            .client
            .request(Method::GET, path, Some(&self.auth_token), None)
            .await?;
        Ok(rows)
    }

    async fn select_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        Ok(self.select(path).await?.into_iter().next())
    }

    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Vec<T>, StoreError> {
        let rows = self
            .client
            .request_returning(method, path, Some(&self.auth_token), body)
            .await?;
        Ok(rows)
    }

    /// A conditional write on an unbooked slot touched nothing: either the slot
    /// is gone or someone holds it.
    async fn explain_untouched_slot(&self, slot_id: i64) -> StoreError {
        match self.get_slot(slot_id).await {
            Ok(Some(_)) => StoreError::SlotTaken(format!("time slot {}", slot_id)),
            Ok(None) => StoreError::Missing(format!("time slot {}", slot_id)),
            Err(e) => e,
        }
    }

    fn changes_body(changes: &AppointmentChanges) -> Value {
        json!({
            "user_id": changes.user_id,
            "doctor_id": changes.doctor_id,
            "branch_id": changes.branch_id,
            "reason": changes.reason
        })
    }
}

fn id_list(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
}

fn encoded_time(time: DateTime<Utc>) -> String {
    urlencoding::encode(&time.to_rfc3339()).into_owned()
}

fn slot_query(filter: &SlotFilter) -> String {
    let mut query_parts = Vec::new();

    if let Some(ids) = &filter.ids {
        query_parts.push(format!("id=in.({})", id_list(ids)));
    }
    if let Some(doctor_id) = filter.doctor_id {
        query_parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if filter.available_only {
        query_parts.push("appointment_id=is.null".to_string());
    }
    if let Some(from) = filter.starts_from {
        query_parts.push(format!("start_time=gte.{}", encoded_time(from)));
    }
    if let Some(after) = filter.starts_after {
        query_parts.push(format!("start_time=gt.{}", encoded_time(after)));
    }
    if let Some(before) = filter.starts_before {
        query_parts.push(format!("start_time=lt.{}", encoded_time(before)));
    }
    query_parts.push("order=start_time.asc,id.asc".to_string());

    format!("/rest/v1/time_slots?{}", query_parts.join("&"))
}

fn appointment_query(filter: &AppointmentFilter) -> String {
    let mut query_parts = Vec::new();

    if let Some(ids) = &filter.ids {
        query_parts.push(format!("id=in.({})", id_list(ids)));
    }
    if let Some(patient_id) = filter.patient_id {
        query_parts.push(format!("user_id=eq.{}", patient_id));
    }
    if let Some(doctor_id) = filter.doctor_id {
        query_parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if let Some(exclude_id) = filter.exclude_id {
        query_parts.push(format!("id=neq.{}", exclude_id));
    }
    query_parts.push("order=id.asc".to_string());

    format!("/rest/v1/appointments?{}", query_parts.join("&"))
}

#[async_trait]
impl ClinicStore for SupabaseStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.select_one(&format!("/rest/v1/users?id=eq.{}&select={}", user_id, USER_COLUMNS))
            .await
    }

    async fn find_user_by_auth_id(&self, auth_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        self.select_one(&format!("/rest/v1/users?auth_id=eq.{}&select={}", auth_id, USER_COLUMNS))
            .await
    }

    async fn list_users(&self, ids: &[i64]) -> Result<Vec<UserRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(&format!("/rest/v1/users?id=in.({})&select={}", id_list(ids), USER_COLUMNS))
            .await
    }

    async fn get_branch(&self, branch_id: i64) -> Result<Option<Branch>, StoreError> {
        self.select_one(&format!("/rest/v1/branches?id=eq.{}", branch_id)).await
    }

    async fn list_branches(&self, ids: &[i64]) -> Result<Vec<Branch>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(&format!("/rest/v1/branches?id=in.({})", id_list(ids))).await
    }

    async fn get_slot(&self, slot_id: i64) -> Result<Option<TimeSlot>, StoreError> {
        self.select_one(&format!("/rest/v1/time_slots?id=eq.{}", slot_id)).await
    }

    async fn list_slots(&self, filter: &SlotFilter) -> Result<Vec<TimeSlot>, StoreError> {
        if filter.ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }
        self.select(&slot_query(filter)).await
    }

    async fn insert_slot(&self, slot: NewTimeSlot) -> Result<TimeSlot, StoreError> {
        let body = json!({
            "doctor_id": slot.doctor_id,
            "start_time": slot.start_time.to_rfc3339(),
            "end_time": slot.end_time.to_rfc3339()
        });

        self.write::<TimeSlot>(Method::POST, "/rest/v1/time_slots", Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Failed to create time slot".to_string()))
    }

    async fn update_slot_times(
        &self,
        slot_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<TimeSlot, StoreError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}&appointment_id=is.null", slot_id);
        let body = json!({
            "start_time": start_time.to_rfc3339(),
            "end_time": end_time.to_rfc3339()
        });

        match self.write::<TimeSlot>(Method::PATCH, &path, Some(body)).await?.into_iter().next() {
            Some(slot) => Ok(slot),
            None => Err(self.explain_untouched_slot(slot_id).await),
        }
    }

    async fn delete_slot(&self, slot_id: i64) -> Result<(), StoreError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}&appointment_id=is.null", slot_id);

        let deleted: Vec<TimeSlot> = self.write(Method::DELETE, &path, None).await?;
        if deleted.is_empty() {
            return Err(self.explain_untouched_slot(slot_id).await);
        }
        Ok(())
    }

    async fn reserve_slot(&self, slot_id: i64, appointment_id: i64) -> Result<TimeSlot, StoreError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}&appointment_id=is.null", slot_id);
        let body = json!({ "appointment_id": appointment_id });

        match self.write::<TimeSlot>(Method::PATCH, &path, Some(body)).await?.into_iter().next() {
            Some(slot) => Ok(slot),
            None => Err(self.explain_untouched_slot(slot_id).await),
        }
    }

    async fn release_slot(&self, slot_id: i64) -> Result<(), StoreError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);

        let _: Value = self
            .client
            .request(
                Method::PATCH,
                &path,
                Some(&self.auth_token),
                Some(json!({ "appointment_id": null })),
            )
            .await?;
        Ok(())
    }

    async fn get_appointment(&self, appointment_id: i64) -> Result<Option<Appointment>, StoreError> {
        self.select_one(&format!("/rest/v1/appointments?id=eq.{}", appointment_id)).await
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        if filter.ids.as_ref().is_some_and(|ids| ids.is_empty()) {
            return Ok(Vec::new());
        }
        self.select(&appointment_query(filter)).await
    }

    async fn book_slot(&self, booking: NewAppointment) -> Result<Appointment, StoreError> {
        let args = json!({
            "p_user_id": booking.user_id,
            "p_doctor_id": booking.doctor_id,
            "p_branch_id": booking.branch_id,
            "p_reason": booking.reason,
            "p_time_slot_id": booking.time_slot_id
        });

        let appointment: Appointment = self
            .client
            .rpc("book_time_slot", Some(&self.auth_token), args)
            .await?;

        debug!("Booked slot {} as appointment {}", booking.time_slot_id, appointment.id);
        Ok(appointment)
    }

    async fn move_booking(
        &self,
        appointment_id: i64,
        from_slot_id: i64,
        to_slot_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        let args = json!({
            "p_appointment_id": appointment_id,
            "p_from_slot_id": from_slot_id,
            "p_to_slot_id": to_slot_id,
            "p_user_id": changes.user_id,
            "p_doctor_id": changes.doctor_id,
            "p_branch_id": changes.branch_id,
            "p_reason": changes.reason
        });

        let appointment: Appointment = self
            .client
            .rpc("move_appointment_slot", Some(&self.auth_token), args)
            .await?;
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        appointment_id: i64,
        changes: &AppointmentChanges,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        self.write::<Appointment>(Method::PATCH, &path, Some(Self::changes_body(changes)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Missing(format!("appointment {}", appointment_id)))
    }

    async fn set_appointment_status(
        &self,
        appointment_id: i64,
        status: AppointmentStatus,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        self.write::<Appointment>(Method::PATCH, &path, Some(json!({ "status": status })))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Missing(format!("appointment {}", appointment_id)))
    }

    async fn delete_appointment(&self, appointment_id: i64) -> Result<(), StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let deleted: Vec<Appointment> = self.write(Method::DELETE, &path, None).await?;
        if deleted.is_empty() {
            return Err(StoreError::Missing(format!("appointment {}", appointment_id)));
        }
        Ok(())
    }
}
