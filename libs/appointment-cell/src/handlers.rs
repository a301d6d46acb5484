// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::error::BookingError;
use crate::models::{
    AvailableSlotsQuery, CalendarQuery, CallerIdentity, CreateAppointmentRequest,
    CreateSlotRequest, StatusChangeRequest, UpdateAppointmentRequest, UpdateSlotRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::calendar::CalendarService;
use crate::services::slots::SlotAvailabilityService;
use crate::store::{ClinicStore, StoreProvider};

/// Shared by every appointment and time-slot route.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub stores: StoreProvider,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, stores: StoreProvider) -> Self {
        Self { config, stores }
    }
}

/// Maps the authenticated login to its clinic user record.
async fn resolve_caller(store: &dyn ClinicStore, user: &User) -> Result<CallerIdentity, BookingError> {
    let auth_id = Uuid::parse_str(&user.id).map_err(|_| {
        warn!("Token subject {} is not a valid user id", user.id);
        BookingError::Forbidden
    })?;

    let record = store.find_user_by_auth_id(auth_id).await?.ok_or_else(|| {
        warn!("No clinic user is linked to login {}", auth_id);
        BookingError::Forbidden
    })?;

    Ok(CallerIdentity::new(record.id, record.role))
}

/// Store and caller for one request.
async fn request_context(
    state: &AppointmentState,
    auth: &Authorization<Bearer>,
    user: &User,
) -> Result<(Arc<dyn ClinicStore>, CallerIdentity), BookingError> {
    let store = state.stores.scoped(auth.token());
    let caller = resolve_caller(store.as_ref(), user).await?;
    Ok((store, caller))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Query(query), _): WithRejection<Query<CalendarQuery>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    let events = CalendarService::new(store).list_appointments(&caller, &query).await?;

    Ok(Json(json!(events)))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(appointment_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    let view = CalendarService::new(store).get_appointment(&caller, appointment_id).await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<CreateAppointmentRequest>, BookingError>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    let appointment = AppointmentBookingService::new(store).create(&caller, request).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment created successfully.",
        "appointment_id": appointment.id,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(appointment_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateAppointmentRequest>, BookingError>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    let appointment = AppointmentBookingService::new(store)
        .update(&caller, appointment_id, request)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment updated successfully.",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn approve_appointment(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(appointment_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    let appointment = AppointmentBookingService::new(store)
        .approve(&caller, appointment_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment approved successfully.",
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn change_appointment_status(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(appointment_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<StatusChangeRequest>, BookingError>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    let appointment = AppointmentBookingService::new(store)
        .change_status(&caller, appointment_id, request.status)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Appointment marked as {}.", appointment.status),
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(appointment_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;

    AppointmentBookingService::new(store)
        .delete(&caller, appointment_id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment deleted successfully."
    })))
}

#[axum::debug_handler]
pub async fn list_available_slots(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Query(query), _): WithRejection<Query<AvailableSlotsQuery>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, _caller) = request_context(&state, &auth, &user).await?;

    let slots = SlotAvailabilityService::new(store)
        .available_slots(query.doctor_id, query.date, Utc::now())
        .await?;

    Ok(Json(json!(slots)))
}

// ==============================================================================
// TIME SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_time_slot(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(slot_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, _caller) = request_context(&state, &auth, &user).await?;

    let view = SlotAvailabilityService::new(store).get_slot_view(slot_id).await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn list_doctor_time_slots(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(doctor_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, _caller) = request_context(&state, &auth, &user).await?;

    let slots = SlotAvailabilityService::new(store).list_doctor_slots(doctor_id).await?;

    Ok(Json(json!(slots)))
}

#[axum::debug_handler]
pub async fn create_time_slot(
    State(state): State<Arc<AppointmentState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<CreateSlotRequest>, BookingError>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;
    if !caller.may_manage_slots_of(request.doctor_id) {
        return Err(BookingError::Forbidden);
    }

    let slot = SlotAvailabilityService::new(store)
        .create_slot(request.doctor_id, request.start_time, request.end_time)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Time slot created successfully.",
        "time_slot": slot
    })))
}

#[axum::debug_handler]
pub async fn update_time_slot(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(slot_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    WithRejection(Json(request), _): WithRejection<Json<UpdateSlotRequest>, BookingError>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;
    let slots = SlotAvailabilityService::new(store);

    let current = slots.find_slot(slot_id).await?;
    if !caller.may_manage_slots_of(current.doctor_id) {
        return Err(BookingError::Forbidden);
    }

    let slot = slots
        .update_slot_time(slot_id, request.start_time, request.end_time)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Time slot updated successfully.",
        "time_slot": slot
    })))
}

#[axum::debug_handler]
pub async fn delete_time_slot(
    State(state): State<Arc<AppointmentState>>,
    WithRejection(Path(slot_id), _): WithRejection<Path<i64>, BookingError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, BookingError> {
    let (store, caller) = request_context(&state, &auth, &user).await?;
    let slots = SlotAvailabilityService::new(store);

    let current = slots.find_slot(slot_id).await?;
    if !caller.may_manage_slots_of(current.doctor_id) {
        return Err(BookingError::Forbidden);
    }

    slots.delete_slot(slot_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Time slot deleted successfully."
    })))
}
