mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};

use appointment_cell::error::BookingError;
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::slots::SlotAvailabilityService;
use appointment_cell::store::{ClinicStore, MemoryStore, StoreEvent};

use common::*;

fn engine(store: &Arc<MemoryStore>) -> SlotAvailabilityService {
    SlotAvailabilityService::new(store.clone())
}

#[tokio::test]
async fn test_back_to_back_slots_are_allowed_and_overlaps_refused() {
    let store = clinic().await;
    let slots = engine(&store);

    slots.create_slot(DOCTOR, at(2, 10, 0), at(2, 10, 30)).await.unwrap();
    slots.create_slot(DOCTOR, at(2, 10, 30), at(2, 11, 0)).await.unwrap();

    assert_eq!(
        slots.create_slot(DOCTOR, at(2, 10, 15), at(2, 10, 45)).await,
        Err(BookingError::Overlap)
    );

    // another doctor's schedule is independent
    slots.create_slot(OTHER_DOCTOR, at(2, 10, 15), at(2, 10, 45)).await.unwrap();

    assert_no_doctor_overlaps(&store, DOCTOR).await;
    assert_no_doctor_overlaps(&store, OTHER_DOCTOR).await;
}

#[tokio::test]
async fn test_create_slot_validates_interval_and_doctor() {
    let store = clinic().await;
    let slots = engine(&store);

    assert_eq!(
        slots.create_slot(DOCTOR, at(2, 11, 0), at(2, 10, 0)).await,
        Err(BookingError::InvalidRange)
    );
    assert_eq!(
        slots.create_slot(DOCTOR, at(2, 11, 0), at(2, 11, 0)).await,
        Err(BookingError::InvalidRange)
    );
    assert_eq!(
        slots
            .create_slot(DOCTOR, Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1))
            .await,
        Err(BookingError::PastSlot)
    );
    assert_eq!(
        slots.create_slot(STUDENT, at(2, 9, 0), at(2, 9, 30)).await,
        Err(BookingError::InvalidDoctorRole)
    );
    assert_eq!(
        slots.create_slot(999, at(2, 9, 0), at(2, 9, 30)).await,
        Err(BookingError::DoctorNotFound)
    );

    assert!(store.journal().await.is_empty());
}

#[tokio::test]
async fn test_update_slot_excludes_itself_from_overlap_scan() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    add_slot(&store, 2, DOCTOR, at(2, 10, 0), at(2, 10, 30)).await;
    let slots = engine(&store);

    let moved = slots.update_slot_time(1, at(2, 9, 15), at(2, 9, 45)).await.unwrap();
    assert_eq!(moved.start_time, at(2, 9, 15));
    assert_eq!(moved.doctor_id, DOCTOR);

    assert_eq!(
        slots.update_slot_time(1, at(2, 9, 45), at(2, 10, 15)).await,
        Err(BookingError::Overlap)
    );
    assert_eq!(
        slots.update_slot_time(1, at(2, 9, 30), at(2, 9, 0)).await,
        Err(BookingError::InvalidRange)
    );
    assert_eq!(
        slots.update_slot_time(42, at(2, 12, 0), at(2, 12, 30)).await,
        Err(BookingError::SlotNotFound)
    );

    assert_no_doctor_overlaps(&store, DOCTOR).await;
}

#[tokio::test]
async fn test_booked_slot_cannot_be_moved_or_deleted() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    AppointmentBookingService::new(store.clone())
        .create(&staff(), booking(STUDENT, DOCTOR, 1))
        .await
        .unwrap();
    let slots = engine(&store);

    assert_eq!(
        slots.update_slot_time(1, at(3, 9, 0), at(3, 9, 30)).await,
        Err(BookingError::SlotBooked)
    );
    assert_eq!(slots.delete_slot(1).await, Err(BookingError::SlotBooked));
    assert!(store.get_slot(1).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_free_slot() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;

    engine(&store).delete_slot(1).await.unwrap();

    assert!(store.get_slot(1).await.unwrap().is_none());
    assert_eq!(store.journal().await, vec![StoreEvent::SlotDeleted(1)]);
}

#[tokio::test]
async fn test_reserve_never_overwrites_a_booking() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    let slots = engine(&store);

    slots.reserve(1, 100).await.unwrap();
    assert_eq!(slots.reserve(1, 200).await, Err(BookingError::SlotUnavailable));
    assert_eq!(store.get_slot(1).await.unwrap().unwrap().appointment_id, Some(100));
    assert_eq!(slots.reserve(7, 100).await, Err(BookingError::SlotNotFound));
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    let slots = engine(&store);
    slots.reserve(1, 100).await.unwrap();

    slots.release(1).await.unwrap();
    let once = store.get_slot(1).await.unwrap();
    slots.release(1).await.unwrap();
    let twice = store.get_slot(1).await.unwrap();

    assert_eq!(once, twice);
    assert!(twice.unwrap().is_available());
    assert_eq!(
        store.journal().await,
        vec![
            StoreEvent::SlotReserved { slot_id: 1, appointment_id: 100 },
            StoreEvent::SlotReleased(1),
        ]
    );
}

#[tokio::test]
async fn test_is_bookable() {
    let store = clinic().await;
    let future = add_slot(&store, 1, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    let slots = engine(&store);

    assert!(slots.is_bookable(&future, Utc::now()));
    assert!(!slots.is_bookable(&future, at(2, 9, 0)));
}

#[tokio::test]
async fn test_available_slots_are_future_free_and_ordered() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(-1, 9, 0), at(-1, 9, 30)).await;
    add_slot(&store, 2, DOCTOR, at(3, 11, 0), at(3, 11, 30)).await;
    add_slot(&store, 3, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    add_slot(&store, 4, OTHER_DOCTOR, at(2, 8, 0), at(2, 8, 30)).await;
    add_slot(&store, 5, DOCTOR, at(2, 10, 0), at(2, 10, 30)).await;
    engine(&store).reserve(5, 77).await.unwrap();

    let slots = engine(&store);

    let all: Vec<i64> = slots
        .available_slots(None, None, Utc::now())
        .await
        .unwrap()
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(all, vec![4, 3, 2]);

    let doctor_only = slots.available_slots(Some(DOCTOR), None, Utc::now()).await.unwrap();
    assert_eq!(doctor_only.iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 2]);
    assert_eq!(doctor_only[0].doctor_name, "Maria Santos");
    assert!(doctor_only.iter().all(|s| s.is_available));

    let day = at(2, 0, 0).date_naive();
    let on_day = slots.available_slots(Some(DOCTOR), Some(day), Utc::now()).await.unwrap();
    assert_eq!(on_day.len(), 1);
    assert_eq!(on_day[0].id, 3);
    assert_eq!(on_day[0].date, day);
}

#[tokio::test]
async fn test_list_doctor_slots_shows_bookings() {
    let store = clinic().await;
    add_slot(&store, 1, DOCTOR, at(2, 10, 0), at(2, 10, 30)).await;
    add_slot(&store, 2, DOCTOR, at(2, 9, 0), at(2, 9, 30)).await;
    let appointment = AppointmentBookingService::new(store.clone())
        .create(&staff(), booking(STUDENT, DOCTOR, 1))
        .await
        .unwrap();
    let slots = engine(&store);

    let views = slots.list_doctor_slots(DOCTOR).await.unwrap();
    assert_eq!(views.iter().map(|v| v.id).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(views[0].status_text, "Available");
    assert_eq!(views[1].status_text, "Booked");
    assert_eq!(views[1].appointment_id, Some(appointment.id));
    assert_eq!(views[1].appointment_reason.as_deref(), Some("Check-up"));

    assert_matches!(slots.list_doctor_slots(STUDENT).await, Err(BookingError::DoctorNotFound));

    let single = slots.get_slot_view(1).await.unwrap();
    assert_eq!(single.doctor_name, "Maria Santos");
    assert!(!single.is_available);
}
