use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::BookingError;
use crate::models::{Appointment, TimeSlot};
use crate::store::{AppointmentFilter, ClinicStore, SlotFilter};

/// Patient-scoped double-booking check. A patient may not hold two
/// appointments whose slots overlap, whichever doctors they are with.
pub struct ConflictDetectionService {
    store: Arc<dyn ClinicStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn ClinicStore>) -> Self {
        Self { store }
    }

    pub async fn has_conflict(
        &self,
        patient_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<i64>,
    ) -> Result<bool, BookingError> {
        let conflicts = self
            .find_conflicts(patient_id, start_time, end_time, exclude_appointment_id)
            .await?;

        if !conflicts.is_empty() {
            warn!(
                "Patient {} already holds {} appointment(s) overlapping {} - {}",
                patient_id,
                conflicts.len(),
                start_time,
                end_time
            );
        }
        Ok(!conflicts.is_empty())
    }

    /// The patient's appointments whose slot overlaps `[start_time, end_time)`.
    pub async fn find_conflicts(
        &self,
        patient_id: i64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<i64>,
    ) -> Result<Vec<Appointment>, BookingError> {
        debug!(
            "Checking conflicts for patient {} from {} to {}",
            patient_id, start_time, end_time
        );

        let filter = AppointmentFilter {
            patient_id: Some(patient_id),
            exclude_id: exclude_appointment_id,
            ..Default::default()
        };
        let appointments = self.store.list_appointments(&filter).await?;
        if appointments.is_empty() {
            return Ok(Vec::new());
        }

        let slot_ids: Vec<i64> = appointments.iter().map(|a| a.time_slot_id).collect();
        let slots: HashMap<i64, TimeSlot> = self
            .store
            .list_slots(&SlotFilter::by_ids(slot_ids))
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        Ok(appointments
            .into_iter()
            .filter(|a| {
                slots
                    .get(&a.time_slot_id)
                    .is_some_and(|slot| slot.overlaps(start_time, end_time))
            })
            .collect())
    }
}
