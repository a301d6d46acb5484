// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(state: Arc<AppointmentState>) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments).post(handlers::create_appointment))
        .route("/available-slots", get(handlers::list_available_slots))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/approve", post(handlers::approve_appointment))
        .route("/{appointment_id}/status", post(handlers::change_appointment_status))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn time_slot_routes(state: Arc<AppointmentState>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::create_time_slot))
        .route(
            "/{slot_id}",
            get(handlers::get_time_slot)
                .put(handlers::update_time_slot)
                .delete(handlers::delete_time_slot),
        )
        .route("/doctor/{doctor_id}", get(handlers::list_doctor_time_slots))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
