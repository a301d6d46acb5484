pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use error::BookingError;
pub use handlers::AppointmentState;
pub use router::{appointment_routes, time_slot_routes};
pub use store::{ClinicStore, MemoryStore, StoreProvider};
