use std::sync::Arc;

use axum::{http::Uri, routing::get, Router};

use appointment_cell::{appointment_routes, time_slot_routes, AppointmentState, StoreProvider};
use shared_config::AppConfig;
use shared_models::error::AppError;

pub fn create_router(config: Arc<AppConfig>, stores: StoreProvider) -> Router {
    let state = Arc::new(AppointmentState::new(config, stores));

    Router::new()
        .route("/", get(|| async { "Clinic booking API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/time-slots", time_slot_routes(state))
        .fallback(|uri: Uri| async move { AppError::NotFound(format!("No route for {}", uri.path())) })
}
